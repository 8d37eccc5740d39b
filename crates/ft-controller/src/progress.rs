//! Console progress display
//!
//! Prints one aligned line per status change:
//!
//! ```text
//!     smoke/check_mounts.sh ------------------ [Running]
//!     smoke/check_mounts.sh ------------------ [Finished]
//! ```

use std::path::Path;

use crossterm::style::Stylize;

use ft_core::traits::StatusSink;
use ft_core::types::{TestCase, TestResult};

const DELIM_WIDTH: usize = 30;

/// Writes status lines to stdout.
pub struct ConsoleSink {
    max_path_len: usize,
}

impl ConsoleSink {
    /// Sized from the catalog so every path column aligns.
    pub fn new(tests: &[TestCase]) -> Self {
        let max_path_len = tests.iter().map(|t| t.rel_path.len()).max().unwrap_or(0);
        Self { max_path_len }
    }

    fn colored_status(status: TestResult) -> String {
        let text = status.as_str();
        let styled = match status {
            TestResult::Finished => text.green(),
            TestResult::Failed | TestResult::Aborted => text.red(),
            TestResult::Skipped => text.dark_grey(),
            TestResult::Running => text.white(),
            TestResult::NotRun => text.grey(),
        };
        styled.to_string()
    }
}

impl StatusSink for ConsoleSink {
    fn test_status(&self, rel_path: &str, status: TestResult, bundle: Option<&Path>) {
        let delim = "-".repeat(DELIM_WIDTH.saturating_sub(1));
        println!(
            "\t{path:>width$} {delim} [{status}]",
            path = rel_path,
            width = self.max_path_len,
            delim = delim,
            status = Self::colored_status(status),
        );
        if let Some(bundle) = bundle {
            println!("\t{:>width$} failure bundle: {}", "", bundle.display(), width = self.max_path_len);
        }
    }

    fn prompt(&self, msg: &str) {
        println!("{}", msg);
    }
}
