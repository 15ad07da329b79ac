//! Logging helpers
//!
//! Standardized messages for file operations and pass results.

use std::path::Path;
use std::time::Duration;

use crate::algorithm::linkage::linker::PassSummary;

/// Log an operation start with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `path` - Path of the file or directory being operated on
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{} {}", operation, path.display());
}

/// Log an operation completion with consistent format
///
/// # Arguments
/// * `operation` - Past-tense description of the operation
/// * `path` - Path of the file or directory that was operated on
/// * `items` - Number of records or pairs processed
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(operation: &str, path: &Path, items: usize, elapsed: Option<Duration>) {
    if let Some(duration) = elapsed {
        log::info!(
            "Successfully {} {} items at {} in {:?}",
            operation,
            items,
            path.display(),
            duration
        );
    } else {
        log::info!("Successfully {} {} items at {}", operation, items, path.display());
    }
}

/// Log a warning, optionally tied to a path
pub fn log_warning(message: &str, path: Option<&Path>) {
    if let Some(path) = path {
        log::warn!("{}: {}", message, path.display());
    } else {
        log::warn!("{message}");
    }
}

/// Log the candidate and per-tier counts of a finished pass
pub fn log_pass_summary(summary: &PassSummary) {
    log::info!(
        "Pass {} ({}): {} candidates, strict {}, moderate {}, relaxed {}, review {}, {} records newly excluded",
        summary.pass,
        summary.label,
        summary.candidates,
        summary.strict,
        summary.moderate,
        summary.relaxed,
        summary.review,
        summary.newly_excluded
    );
}
