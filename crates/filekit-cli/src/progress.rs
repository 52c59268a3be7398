//! Progress bars and size formatting for terminal output.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Bar for jobs with a known unit count. Hidden in JSON mode so stdout
/// and stderr stay machine-readable.
pub fn bar(hidden: bool) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "  {spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} ({percent}%) {wide_msg}",
        )?
        .progress_chars("━━╾─"),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

/// Spinner for jobs without a known total.
pub fn spinner(hidden: bool, message: &str) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?.tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷ "),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn format_size_larger_units() {
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn hidden_bars_build() {
        assert!(bar(true).unwrap().is_hidden());
        assert!(spinner(true, "scanning").unwrap().is_hidden());
    }
}
