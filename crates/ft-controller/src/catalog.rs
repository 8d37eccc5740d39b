//! Test catalog discovery
//!
//! Walks the local test root (or an explicit selection) and parses the
//! directive header of each script:
//!
//! ```text
//! #group-smoke : enabled
//! #group-slow : disabled
//! #parallel : true
//! ```
//!
//! A `#group-<name>` line adds the script to that group's enabled or disabled
//! list. A script may declare `#parallel` at most once. Any directive that
//! does not parse aborts the whole run rather than silently skipping the
//! offending script.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ft_core::error::CatalogError;
use ft_core::types::{TestCase, TestResult};

const GROUP_PREFIX: &str = "#group-";
const PARALLEL_PREFIX: &str = "#parallel";
const GROUP_ENABLED: &str = "enabled";
const GROUP_DISABLED: &str = "disabled";

/// Collect the tests to run.
///
/// With explicit `requested_tests`, each named script (relative to the root)
/// is loaded as-is. Otherwise the root is walked recursively and a script is
/// in scope when it declares any of `requested_groups`; scripts whose every
/// matching group is disabled are pre-assigned [`TestResult::Skipped`].
pub fn discover(
    test_root: &Path,
    requested_tests: &[String],
    requested_groups: &[String],
) -> Result<Vec<TestCase>, CatalogError> {
    let mut tests = Vec::new();

    if !requested_tests.is_empty() {
        for rel in requested_tests {
            let abs = test_root.join(rel);
            if !abs.is_file() {
                return Err(CatalogError::ScriptNotFound(abs));
            }
            tests.push(parse_script(&abs, test_root)?);
        }
        return Ok(tests);
    }

    let requested: BTreeSet<String> = requested_groups.iter().cloned().collect();
    let mut scripts = Vec::new();
    collect_scripts(test_root, &mut scripts)?;
    scripts.sort();

    for script in scripts {
        let mut case = parse_script(&script, test_root)?;
        if !case.declares_any(&requested) {
            continue;
        }
        if case.only_disabled_for(&requested) {
            case.result = TestResult::Skipped;
        }
        tests.push(case);
    }

    Ok(tests)
}

fn collect_scripts(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::ScriptNotFound(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| CatalogError::Unreadable {
        script: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| CatalogError::Unreadable {
            script: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_scripts(&path, out)?;
        } else {
            out.push(path);
        }
    }

    Ok(())
}

/// Parse one script's directive header into a fresh `TestCase`.
pub fn parse_script(script: &Path, test_root: &Path) -> Result<TestCase, CatalogError> {
    let content = std::fs::read_to_string(script).map_err(|e| CatalogError::Unreadable {
        script: script.to_path_buf(),
        source: e,
    })?;

    let rel = script
        .strip_prefix(test_root)
        .unwrap_or(script)
        .to_string_lossy()
        .into_owned();
    let mut case = TestCase::new(script.to_path_buf(), rel);

    let mut parallel_seen = false;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix(GROUP_PREFIX) {
            let (group, state) = split_directive(rest).ok_or_else(|| malformed(script, line))?;
            if group.is_empty() {
                return Err(malformed(script, line));
            }
            match state {
                GROUP_ENABLED => {
                    case.groups.insert(group.to_string());
                }
                GROUP_DISABLED => {
                    case.disabled_groups.insert(group.to_string());
                }
                _ => return Err(malformed(script, line)),
            }
        } else if let Some(rest) = line.strip_prefix(PARALLEL_PREFIX) {
            if parallel_seen {
                return Err(CatalogError::DuplicateParallel(script.to_path_buf()));
            }
            parallel_seen = true;

            let (_, value) = split_directive(rest).ok_or_else(|| malformed(script, line))?;
            match value.to_ascii_lowercase().as_str() {
                "true" => case.parallel = true,
                "false" => case.parallel = false,
                _ => return Err(malformed(script, line)),
            }
        }
    }

    Ok(case)
}

/// Split `"name : value"` (spaces around the colon optional) into its parts.
fn split_directive(rest: &str) -> Option<(&str, &str)> {
    let (left, right) = rest.split_once(':')?;
    Some((left.trim(), right.trim()))
}

fn malformed(script: &Path, line: &str) -> CatalogError {
    CatalogError::MalformedScript {
        script: script.to_path_buf(),
        line: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use tempfile::TempDir;

    fn write_script(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_group_selection_with_disabled_membership() {
        // b.sh declares smoke only as disabled, so it is pre-assigned Skipped.
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "a.sh", "#group-smoke : enabled\necho ok\n");
        write_script(dir.path(), "b.sh", "#group-smoke : disabled\necho ok\n");

        let tests = discover(dir.path(), &[], &["smoke".to_string()]).unwrap();
        assert_eq!(tests.len(), 2);

        let a = tests.iter().find(|t| t.rel_path == "a.sh").unwrap();
        let b = tests.iter().find(|t| t.rel_path == "b.sh").unwrap();
        assert_eq!(a.result, TestResult::NotRun);
        assert_eq!(b.result, TestResult::Skipped);
    }

    #[test]
    fn test_unrelated_scripts_are_out_of_scope() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "a.sh", "#group-smoke : enabled\n");
        write_script(dir.path(), "b.sh", "#group-perf : enabled\n");

        let tests = discover(dir.path(), &[], &["smoke".to_string()]).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].rel_path, "a.sh");
    }

    #[test]
    fn test_explicit_test_selection() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "sub/a.sh", "echo ok\n");

        let tests = discover(dir.path(), &["sub/a.sh".to_string()], &[]).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].rel_path, "sub/a.sh");
        assert_eq!(tests[0].result, TestResult::NotRun);
    }

    #[test]
    fn test_explicit_missing_test_errors() {
        let dir = TempDir::new().unwrap();
        let err = discover(dir.path(), &["ghost.sh".to_string()], &[]).unwrap_err();
        assert!(matches!(err, CatalogError::ScriptNotFound(_)));
    }

    #[test]
    fn test_multiple_groups_and_parallel() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "a.sh",
            "#group-a : enabled\n#group-b:enabled\n#group-c : disabled\n#parallel : true\n",
        );

        let case = parse_script(&script, dir.path()).unwrap();
        assert_eq!(
            case.groups,
            ["a".to_string(), "b".to_string()].into_iter().collect()
        );
        assert_eq!(case.disabled_groups, ["c".to_string()].into_iter().collect());
        assert!(case.parallel);
    }

    #[test]
    fn test_malformed_group_state_aborts() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "a.sh", "#group-smoke : sometimes\n");
        let err = parse_script(&script, dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedScript { .. }));
    }

    #[test]
    fn test_group_without_colon_aborts() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "a.sh", "#group-smoke enabled\n");
        let err = parse_script(&script, dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedScript { .. }));
    }

    #[test]
    fn test_duplicate_parallel_aborts() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "a.sh", "#parallel : true\n#parallel : false\n");
        let err = parse_script(&script, dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateParallel(_)));
    }

    #[test]
    fn test_invalid_parallel_value_aborts() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "a.sh", "#parallel : maybe\n");
        let err = parse_script(&script, dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedScript { .. }));
    }

    #[test]
    fn test_nested_discovery_uses_relative_keys() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "suite/deep/x.sh", "#group-smoke : enabled\n");

        let tests = discover(dir.path(), &[], &["smoke".to_string()]).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].rel_path, "suite/deep/x.sh");
    }
}
