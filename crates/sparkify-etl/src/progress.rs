//! Progress bar for batch runs

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Whether an interactive progress bar can be drawn
pub fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// Per-file progress bar; hidden when `visible` is false
pub fn create_file_progress(total: u64, message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_still_counts() {
        let pb = create_file_progress(3, "song files", false);
        pb.inc(2);
        assert_eq!(pb.position(), 2);
        assert!(pb.is_hidden());
    }
}
