//! Progress reporting and console summaries
//!
//! A spinner for the walk, a bar for the hash pass, and styled summary
//! blocks printed after each phase.

use crate::hasher::{HashProgress, HashSummary};
use crate::reconcile::{MoveEvent, ReconcileSummary};
use crate::walker::{WalkProgress, WalkStats};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Mapping preview length in the reconcile summary
const PREVIEW_MOVES: usize = 10;

/// Progress reporter for one phase
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Spinner for phases of unknown length (the walk)
    pub fn spinner() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Bar over `total` files (the hash pass)
    pub fn bar(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Update the walk display
    pub fn update_walk(&self, progress: &WalkProgress) {
        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0} dirs/s | Skipped: {} | {}",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.dirs_per_second(),
            progress.skipped,
            progress.current,
        );
        self.bar.set_message(msg);
    }

    /// Update the hash display
    pub fn update_hash(&self, progress: &HashProgress) {
        self.bar.set_position(progress.position);
        self.bar.set_message(format!(
            "ok {} | reused {} | errors {} | {}",
            format_number(progress.hashed),
            format_number(progress.carried_over),
            format_number(progress.errored),
            progress.current,
        ));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of a run
pub fn print_header(action: &str, source: &str, output: &Path) {
    println!();
    println!(
        "{} {} {}",
        style("ftp-inventory").cyan().bold(),
        env!("CARGO_PKG_VERSION"),
        style(action).dim()
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}

/// Print a summary of the walk
pub fn print_walk_summary(stats: &WalkStats) {
    println!();
    println!("{}", style("Walk Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Directories:").bold(), format_number(stats.dirs_visited));
    println!("  {} {}", style("Files:").bold(), format_number(stats.files));
    println!("  {} {}", style("Total Size:").bold(), format_size(stats.bytes, BINARY));
    println!("  {} {:.1}s", style("Duration:").bold(), stats.duration.as_secs_f64());
    if stats.dirs_skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped dirs:").yellow().bold(),
            format_number(stats.dirs_skipped)
        );
    }
    if stats.malformed_lines > 0 {
        println!(
            "  {} {}",
            style("Bad lines:").yellow().bold(),
            format_number(stats.malformed_lines)
        );
    }
}

/// Print a summary of the hash pass and the files written
pub fn print_hash_summary(summary: &HashSummary, outputs: &[&Path]) {
    let secs = summary.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.hashed as f64 / secs
    } else {
        0.0
    };

    println!();
    if summary.completed {
        println!("{}", style("Hashing Complete").green().bold());
    } else {
        println!("{}", style("Hashing Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files:").bold(), format_number(summary.total));
    println!("  {} {}", style("Hashed:").bold(), format_number(summary.hashed));
    if summary.carried_over > 0 {
        println!("  {} {}", style("Carried over:").bold(), format_number(summary.carried_over));
    }
    if summary.already_hashed > 0 {
        println!("  {} {}", style("Already hashed:").bold(), format_number(summary.already_hashed));
    }
    println!(
        "  {} {} scheduled, {} recovery",
        style("Reconnects:").bold(),
        format_number(summary.scheduled_reconnects),
        format_number(summary.recovery_reconnects)
    );
    println!("  {} {:.1}s ({:.1} files/sec)", style("Duration:").bold(), secs, rate);
    if summary.errored > 0 {
        println!("  {} {}", style("Errors:").yellow().bold(), format_number(summary.errored));
    }
    for output in outputs {
        println!("  {} {}", style("Saved:").bold(), output.display());
    }
    println!();
}

/// Print reconciliation counts and a preview of the moves
pub fn print_reconcile_summary(summary: &ReconcileSummary, events: &[MoveEvent]) {
    println!();
    println!("{}", style("Reconciliation").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Moved/renamed:").bold(), summary.moved);
    println!("  {} {}", style("Unchanged:").bold(), summary.unchanged);
    println!("  {} {}", style("New:").bold(), summary.new);
    println!("  {} {}", style("Deleted:").bold(), summary.deleted);
    if summary.duplicate_hashes > 0 {
        println!(
            "  {} {}",
            style("Duplicate hashes:").yellow().bold(),
            summary.duplicate_hashes
        );
    }
    let unclassifiable = summary.unclassifiable_before + summary.unclassifiable_after;
    if unclassifiable > 0 {
        println!(
            "  {} {} before, {} after",
            style("Unhashed:").yellow().bold(),
            summary.unclassifiable_before,
            summary.unclassifiable_after
        );
    }

    if events.is_empty() {
        println!();
        println!("  No files were moved or renamed.");
        println!();
        return;
    }

    println!();
    println!("  {}", style(format!("Sample mappings (first {}):", PREVIEW_MOVES)).bold());
    for (i, event) in events.iter().take(PREVIEW_MOVES).enumerate() {
        println!("  {}. {}", i + 1, event.filename);
        println!("     {} {}", style("OLD:").dim(), event.old_url);
        println!("     {} {}", style("NEW:").dim(), event.new_url);
    }
    if events.len() > PREVIEW_MOVES {
        println!("  ... and {} more", events.len() - PREVIEW_MOVES);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
