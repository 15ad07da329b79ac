//! Progress reporting for linkage passes
//!
//! Progress bars are drawn with indicatif. When progress is switched off
//! the same calls return hidden bars, so callers never branch on it.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Style of the per-pass scoring bar
pub const PASS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} pairs ({per_sec}) {msg}";

/// Style of spinners for work of unknown length
pub const SPINNER_TEMPLATE: &str = "{spinner:.green} {elapsed_precise} {msg}";

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Create the progress bar of one scoring pass
///
/// # Arguments
/// * `length` - Number of candidate pairs in the pass
/// * `description` - Message shown next to the bar
/// * `visible` - Whether the bar is drawn at all
#[must_use]
pub fn create_pass_progress_bar(length: u64, description: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(length);
    pb.set_style(bar_style(PASS_TEMPLATE));
    pb.set_message(description.to_string());
    pb
}

/// Create a spinner for operations without a known length
#[must_use]
pub fn create_spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a progress bar with an optional completion message
pub fn finish_progress_bar(pb: &ProgressBar, message: Option<&str>) {
    if let Some(msg) = message {
        pb.finish_with_message(msg.to_string());
    } else {
        pb.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bars_still_count() {
        let pb = create_pass_progress_bar(10, "pass 0", false);
        pb.inc(4);
        assert_eq!(pb.position(), 4);
        finish_progress_bar(&pb, Some("done"));
        assert!(pb.is_finished());
    }
}
