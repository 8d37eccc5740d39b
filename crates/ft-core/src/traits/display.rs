//! The display seam

use std::path::Path;

use crate::types::TestResult;

/// Receives live per-test status changes. Irrelevant for protocol
/// correctness; the default methods make a null sink trivial.
pub trait StatusSink: Send + Sync {
    /// One test changed state.
    fn test_status(&self, rel_path: &str, status: TestResult, bundle: Option<&Path>) {
        let _ = (rel_path, status, bundle);
    }

    /// Out-of-band prompt line (e.g. the final summary).
    fn prompt(&self, msg: &str) {
        let _ = msg;
    }
}

/// A sink that swallows everything.
pub struct NullSink;

impl StatusSink for NullSink {}
