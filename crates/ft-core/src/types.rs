//! Shared test types

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one test within a run.
///
/// Transitions are forward-only for a given test within one run; no test ever
/// returns to `NotRun`. `Skipped` is assigned before the run starts for tests
/// that belong only to disabled groups and is never produced by a progress
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestResult {
    /// Not yet reported by any agent
    NotRun,
    /// An agent has started executing the test
    Running,
    /// Terminal: the test passed
    Finished,
    /// Terminal: the test failed
    Failed,
    /// Terminal: the test was interrupted
    Aborted,
    /// Terminal: excluded before the run started
    Skipped,
}

impl TestResult {
    /// All recognized values, in wire-text order.
    pub const ALL: [TestResult; 6] = [
        TestResult::Aborted,
        TestResult::Failed,
        TestResult::Finished,
        TestResult::NotRun,
        TestResult::Running,
        TestResult::Skipped,
    ];

    /// The exact text carried in `status` fields on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::NotRun => "NotRun",
            TestResult::Running => "Running",
            TestResult::Finished => "Finished",
            TestResult::Failed => "Failed",
            TestResult::Aborted => "Aborted",
            TestResult::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = UnknownResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotRun" => Ok(TestResult::NotRun),
            "Running" => Ok(TestResult::Running),
            "Finished" => Ok(TestResult::Finished),
            "Failed" => Ok(TestResult::Failed),
            "Aborted" => Ok(TestResult::Aborted),
            "Skipped" => Ok(TestResult::Skipped),
            other => Err(UnknownResult(other.to_string())),
        }
    }
}

/// A status string outside the recognized [`TestResult`] set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResult(pub String);

impl fmt::Display for UnknownResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown test result {:?}", self.0)
    }
}

impl std::error::Error for UnknownResult {}

/// One test script and its run state.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Absolute path on the controller
    pub abs_path: PathBuf,
    /// Path relative to the test root; the stable key shared by controller
    /// and agents, since absolute paths differ between hosts
    pub rel_path: String,
    /// Groups the script declares as enabled
    pub groups: BTreeSet<String>,
    /// Groups the script declares as disabled
    pub disabled_groups: BTreeSet<String>,
    /// Whether the script declares itself parallel-safe
    pub parallel: bool,
    /// Current lifecycle state
    pub result: TestResult,
    /// `host:path` reference to a failure bundle on the test server
    pub remote_bundle: Option<String>,
    /// Local path of the failure bundle after download
    pub local_bundle: Option<PathBuf>,
}

impl TestCase {
    /// Create a fresh test case in `NotRun` state.
    pub fn new(abs_path: PathBuf, rel_path: impl Into<String>) -> Self {
        Self {
            abs_path,
            rel_path: rel_path.into(),
            groups: BTreeSet::new(),
            disabled_groups: BTreeSet::new(),
            parallel: false,
            result: TestResult::NotRun,
            remote_bundle: None,
            local_bundle: None,
        }
    }

    /// Whether the test matches any of the requested groups at all,
    /// enabled or disabled.
    pub fn declares_any(&self, requested: &BTreeSet<String>) -> bool {
        !self.groups.is_disjoint(requested) || !self.disabled_groups.is_disjoint(requested)
    }

    /// Whether every requested group the test matches is a disabled one.
    /// Such a test is in scope but pre-assigned `Skipped`.
    pub fn only_disabled_for(&self, requested: &BTreeSet<String>) -> bool {
        self.groups.is_disjoint(requested) && !self.disabled_groups.is_disjoint(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_text_roundtrip() {
        for result in TestResult::ALL {
            assert_eq!(result.as_str().parse::<TestResult>().unwrap(), result);
        }
    }

    #[test]
    fn test_result_rejects_unknown_text() {
        let err = "Exploded".parse::<TestResult>().unwrap_err();
        assert_eq!(err, UnknownResult("Exploded".to_string()));
    }

    #[test]
    fn test_group_matching() {
        let mut case = TestCase::new(PathBuf::from("/t/a.sh"), "a.sh");
        case.groups.insert("smoke".to_string());
        case.disabled_groups.insert("slow".to_string());

        let smoke: BTreeSet<String> = ["smoke".to_string()].into();
        let slow: BTreeSet<String> = ["slow".to_string()].into();
        let other: BTreeSet<String> = ["other".to_string()].into();

        assert!(case.declares_any(&smoke));
        assert!(!case.only_disabled_for(&smoke));

        assert!(case.declares_any(&slow));
        assert!(case.only_disabled_for(&slow));

        assert!(!case.declares_any(&other));
    }
}
