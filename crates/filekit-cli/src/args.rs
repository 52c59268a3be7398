//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use filekit_core::search::{SizeFilter, SizeOperator, SizeUnit};
use filekit_core::ConflictPolicy;

/// Copy, move, delete, archive and search files.
#[derive(Parser, Debug)]
#[command(name = "filekit", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file [default: ~/.config/filekit/config.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy files and folders into a directory
    Copy {
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,
        /// Target directory
        #[arg(short = 't', long = "to")]
        destination: PathBuf,
        /// What to do when a target name already exists (overrides config)
        #[arg(long, value_enum)]
        conflict: Option<ConflictArg>,
    },

    /// Move files and folders into a directory
    Move {
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,
        #[arg(short = 't', long = "to")]
        destination: PathBuf,
        #[arg(long, value_enum)]
        conflict: Option<ConflictArg>,
    },

    /// Delete files and folders, recursively
    Delete {
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Search a tree by name, size and content
    Search {
        root: PathBuf,
        /// Shell-style pattern matched against the whole file name
        #[arg(long, conflicts_with = "regex")]
        glob: Option<String>,
        /// Regular expression searched for in the file name
        #[arg(long)]
        regex: Option<String>,
        /// Text the file must contain
        #[arg(long)]
        content: Option<String>,
        /// Size constraint such as `>10KB`, `<1.5MB` or `=4096`
        #[arg(long, value_parser = parse_size_filter)]
        size: Option<SizeFilter>,
        #[arg(long)]
        case_sensitive: bool,
        /// Only look at the root's immediate children
        #[arg(long)]
        no_recursive: bool,
        /// Include dot files and dot directories
        #[arg(long)]
        hidden: bool,
    },

    /// Find files with identical content
    Dupes { root: PathBuf },

    /// Total size of the regular files under a path
    Size { path: PathBuf },

    /// Compress a folder into a zip archive
    Compress { folder: PathBuf, output: PathBuf },

    /// Extract a zip archive into a directory
    Extract { archive: PathBuf, destination: PathBuf },

    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    Fail,
    Overwrite,
    Skip,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Fail => ConflictPolicy::FailOnExisting,
            ConflictArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictArg::Skip => ConflictPolicy::SkipExisting,
        }
    }
}

/// Parses `[<|>|=]<number>[B|KB|MB|GB]`. A bare number means `=` and bytes.
pub fn parse_size_filter(text: &str) -> Result<SizeFilter, String> {
    let text = text.trim();
    let (op, rest) = match text.chars().next() {
        Some('>') => (SizeOperator::GreaterThan, &text[1..]),
        Some('<') => (SizeOperator::LessThan, &text[1..]),
        Some('=') => (SizeOperator::EqualTo, &text[1..]),
        _ => (SizeOperator::EqualTo, text),
    };

    let rest = rest.trim();
    let split = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, unit) = rest.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size value: {number:?}"))?;
    let unit = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => SizeUnit::B,
        "K" | "KB" => SizeUnit::KB,
        "M" | "MB" => SizeUnit::MB,
        "G" | "GB" => SizeUnit::GB,
        other => return Err(format!("unknown size unit: {other:?}")),
    };

    Ok(SizeFilter::new(op, value, unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_size_with_operator_and_unit() {
        let filter = parse_size_filter(">10KB").unwrap();
        assert_eq!(filter.op(), SizeOperator::GreaterThan);
        assert_eq!(filter.threshold(), 10 * 1024);
    }

    #[test]
    fn parse_size_fractional_megabytes() {
        let filter = parse_size_filter("<1.5mb").unwrap();
        assert_eq!(filter.op(), SizeOperator::LessThan);
        assert_eq!(filter.threshold(), 1_572_864);
    }

    #[test]
    fn parse_bare_number_is_equal_bytes() {
        let filter = parse_size_filter("4096").unwrap();
        assert_eq!(filter.op(), SizeOperator::EqualTo);
        assert_eq!(filter.threshold(), 4096);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size_filter(">").is_err());
        assert!(parse_size_filter("10TB").is_err());
        assert!(parse_size_filter("abc").is_err());
    }

    #[test]
    fn copy_parses_sources_and_destination() {
        let args = Args::try_parse_from([
            "filekit", "copy", "a.txt", "b.txt", "--to", "out", "--conflict", "skip",
        ])
        .unwrap();
        match args.command {
            Command::Copy {
                sources,
                destination,
                conflict,
            } => {
                assert_eq!(sources, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert_eq!(destination, PathBuf::from("out"));
                assert_eq!(conflict, Some(ConflictArg::Skip));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn glob_and_regex_conflict() {
        let result = Args::try_parse_from([
            "filekit", "search", ".", "--glob", "*.txt", "--regex", "txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from(["filekit", "ls", "--json", "-c", "x.toml"]).unwrap();
        assert!(args.json);
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn conflict_arg_maps_to_policy() {
        assert_eq!(
            ConflictPolicy::from(ConflictArg::Fail),
            ConflictPolicy::FailOnExisting
        );
        assert_eq!(
            ConflictPolicy::from(ConflictArg::Skip),
            ConflictPolicy::SkipExisting
        );
    }
}
