//! Subcommand handlers.
//!
//! Long-running work goes through the background handles in
//! [`filekit_core::task`]; this module only turns their events into
//! progress output and their results into text or JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use filekit_core::event::{OperationEvent, ScanEvent, SearchEvent};
use filekit_core::fs::{total_reclaimable, ArchiveCodec, ArchiveJob};
use filekit_core::task;
use filekit_core::{
    calculate_directory_size, nfc_string, read_directory, BulkExecutor, Config,
    DuplicateDetector, DuplicateGroup, HashingEngine, OperationKind, OperationRequest,
    OperationResult, SearchEngine, SearchQuery,
};

use crate::args::{Command, ConflictArg};
use crate::progress::{self, format_size};

pub async fn run(command: Command, config: &Config, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Copy {
            sources,
            destination,
            conflict,
        } => {
            let request = OperationRequest::copy(sources, destination)
                .with_conflict_policy(policy(conflict, config));
            bulk(request, json).await
        }
        Command::Move {
            sources,
            destination,
            conflict,
        } => {
            let request = OperationRequest::move_to(sources, destination)
                .with_conflict_policy(policy(conflict, config));
            bulk(request, json).await
        }
        Command::Delete { paths, yes } => {
            if config.general.confirm_delete && !yes && !confirm_delete(&paths)? {
                eprintln!("Aborted.");
                return Ok(());
            }
            bulk(OperationRequest::delete(paths), json).await
        }
        Command::Search {
            root,
            glob,
            regex,
            content,
            size,
            case_sensitive,
            no_recursive,
            hidden,
        } => {
            let mut query = config.base_query();
            if let Some(glob) = glob {
                query = query.name_glob(nfc_string(&glob));
            }
            if let Some(regex) = regex {
                query = query.name_regex(nfc_string(&regex));
            }
            if let Some(content) = content {
                query = query.content(content);
            }
            if let Some(size) = size {
                query = query.size(size);
            }
            if case_sensitive {
                query = query.case_sensitive(true);
            }
            if no_recursive {
                query = query.recursive(false);
            }
            if hidden {
                query = query.show_hidden(true);
            }
            search(&root, &query, json).await
        }
        Command::Dupes { root } => dupes(root, config, json).await,
        Command::Size { path } => {
            let bytes = tokio::task::spawn_blocking({
                let path = path.clone();
                move || calculate_directory_size(&path)
            })
            .await??;
            if json {
                let value = serde_json::json!({ "path": path, "bytes": bytes });
                println!("{value}");
            } else {
                println!("{}\t{}", format_size(bytes), path.display());
            }
            Ok(())
        }
        Command::Compress { folder, output } => {
            archive(ArchiveJob::compress(folder, output)?, "Compressing", json).await
        }
        Command::Extract {
            archive: source,
            destination,
        } => archive(ArchiveJob::extract(source, destination)?, "Extracting", json).await,
        Command::Ls { path } => {
            let entries = read_directory(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    let suffix = if entry.is_dir() { "/" } else { "" };
                    let size = if entry.is_dir() {
                        "-".to_string()
                    } else {
                        format_size(entry.size())
                    };
                    println!("{size:>10}  {}{suffix}", entry.name());
                }
            }
            Ok(())
        }
        Command::ShowConfig => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn policy(arg: Option<ConflictArg>, config: &Config) -> filekit_core::ConflictPolicy {
    arg.map(Into::into)
        .unwrap_or(config.operations.conflict_policy)
}

fn confirm_delete(paths: &[PathBuf]) -> anyhow::Result<bool> {
    for path in paths {
        eprintln!("  {}", path.display());
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(format!("Delete {} item(s) permanently?", paths.len()))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

async fn bulk(request: OperationRequest, json: bool) -> anyhow::Result<()> {
    let bar = progress::bar(json)?;
    let mut handle = task::start_bulk_operation(BulkExecutor::new(), request)?;

    while let Some(event) = handle.next_event().await {
        match event {
            OperationEvent::Progress(progress) => {
                bar.set_length(progress.estimated_total.max(progress.processed));
                bar.set_position(progress.processed);
                bar.set_message(progress.current.display().to_string());
            }
            OperationEvent::Finished(_) => bar.finish_and_clear(),
        }
    }

    let result = handle.wait().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_operation(&result);
    }

    if !result.failures.is_empty() {
        anyhow::bail!("{} item(s) failed", result.failures.len());
    }
    Ok(())
}

fn print_operation(result: &OperationResult) {
    let verb = match result.kind {
        OperationKind::Copy => "Copied",
        OperationKind::Move => "Moved",
        OperationKind::Delete => "Deleted",
    };
    println!(
        "{verb} {} of {} item(s), {} skipped, {} failed{}",
        result.succeeded,
        result.estimated_total,
        result.skipped,
        result.failures.len(),
        if result.cancelled { " (cancelled)" } else { "" }
    );
    for failure in &result.failures {
        eprintln!("  {}: {}", failure.path.display(), failure.message);
    }
}

async fn search(root: &Path, query: &SearchQuery, json: bool) -> anyhow::Result<()> {
    let mut handle = task::start_search(SearchEngine::new(), root, query)?;

    while let Some(event) = handle.next_event().await {
        match event {
            SearchEvent::Found(result) if json => {
                println!("{}", serde_json::to_string(&result)?);
            }
            SearchEvent::Found(result) => println!("{}", result.entry.path().display()),
            SearchEvent::Finished(outcome) => {
                if !json {
                    eprintln!(
                        "{} match(es) in {} entries",
                        outcome.matched, outcome.scanned
                    );
                }
            }
        }
    }

    handle.wait().await?;
    Ok(())
}

async fn dupes(root: PathBuf, config: &Config, json: bool) -> anyhow::Result<()> {
    let detector = DuplicateDetector::new(config.duplicate_walk_options())
        .with_hasher(HashingEngine::new().with_max_file_size(config.duplicates.max_file_size()));
    let spinner = progress::spinner(json, "Scanning for duplicates...")?;
    let mut handle = task::start_duplicate_scan(detector, root);

    while let Some(event) = handle.next_event().await {
        match event {
            ScanEvent::Progress(progress) => {
                spinner.set_message(format!("{} files examined", progress.examined));
            }
            ScanEvent::Finished { .. } => spinner.finish_and_clear(),
        }
    }

    let groups = handle.wait().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        print_groups(&groups);
    }
    Ok(())
}

fn print_groups(groups: &[DuplicateGroup]) {
    if groups.is_empty() {
        println!("No duplicates found.");
        return;
    }
    for group in groups {
        println!(
            "{} copies of {} ({} reclaimable) {}",
            group.len(),
            format_size(group.size()),
            format_size(group.reclaimable_bytes()),
            group.fingerprint()
        );
        for entry in group.entries() {
            println!("    {}", entry.path().display());
        }
    }
    println!(
        "{} group(s), {} reclaimable",
        groups.len(),
        format_size(total_reclaimable(groups))
    );
}

async fn archive(job: ArchiveJob, label: &str, json: bool) -> anyhow::Result<()> {
    let spinner = progress::spinner(json, &format!("{label} {}...", job.source.display()))?;
    let codec = ArchiveCodec::new();
    let destination = job.destination.clone();

    let outcome = tokio::task::spawn_blocking(move || job.run(&codec))
        .await
        .context("archive worker failed")?;
    spinner.finish_and_clear();
    outcome?;

    if json {
        println!("{}", serde_json::json!({ "written": destination }));
    } else {
        println!("{label} done: {}", destination.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copy_command_copies_into_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("out");
        fs::write(&src, "hello").unwrap();
        fs::create_dir(&dest).unwrap();

        let command = Command::Copy {
            sources: vec![src.clone()],
            destination: dest.clone(),
            conflict: None,
        };
        run(command, &Config::default(), true).await.unwrap();

        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
        assert!(src.exists());
    }

    #[tokio::test]
    async fn conflicting_copy_reports_failure() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("out");
        fs::write(&src, "new").unwrap();
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("a.txt"), "old").unwrap();

        let command = Command::Copy {
            sources: vec![src],
            destination: dest.clone(),
            conflict: None,
        };
        assert!(run(command, &Config::default(), true).await.is_err());
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "old");
    }

    #[tokio::test]
    async fn conflict_flag_overrides_config() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("out");
        fs::write(&src, "new").unwrap();
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("a.txt"), "old").unwrap();

        let command = Command::Copy {
            sources: vec![src],
            destination: dest.clone(),
            conflict: Some(ConflictArg::Overwrite),
        };
        run(command, &Config::default(), true).await.unwrap();
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn delete_with_yes_skips_prompt() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("doomed");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("inner.txt"), "x").unwrap();

        let command = Command::Delete {
            paths: vec![dir.clone()],
            yes: true,
        };
        run(command, &Config::default(), true).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn compress_then_extract() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("docs");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("readme.md"), "# docs").unwrap();
        let zip = tmp.path().join("docs.zip");
        let out = tmp.path().join("out");

        run(
            Command::Compress {
                folder,
                output: zip.clone(),
            },
            &Config::default(),
            true,
        )
        .await
        .unwrap();
        run(
            Command::Extract {
                archive: zip,
                destination: out.clone(),
            },
            &Config::default(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(fs::read_to_string(out.join("readme.md")).unwrap(), "# docs");
    }

    #[tokio::test]
    async fn search_rejects_bad_regex() {
        let tmp = TempDir::new().unwrap();
        let command = Command::Search {
            root: tmp.path().to_path_buf(),
            glob: None,
            regex: Some("(".into()),
            content: None,
            size: None,
            case_sensitive: false,
            no_recursive: false,
            hidden: false,
        };
        assert!(run(command, &Config::default(), true).await.is_err());
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let command = Command::Size {
            path: tmp.path().join("missing"),
        };
        assert!(run(command, &Config::default(), true).await.is_err());
    }
}
