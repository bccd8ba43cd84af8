//! Locates a test in a parsed JUnit tree.

use crate::models::{TestIdentifier, TestSuite, TestVerdict};

/// Verdict of `test` in the tree rooted at `suite`.
///
/// The suite path must match exactly from `suite` downward. When sibling
/// suites share a name, the first one that yields a decided verdict wins.
pub fn test_verdict(test: &TestIdentifier, suite: &TestSuite) -> TestVerdict {
    verdict_along_path(&test.test_suites, &test.test_name, suite)
}

fn verdict_along_path(path: &[String], test_name: &str, suite: &TestSuite) -> TestVerdict {
    let Some((head, rest)) = path.split_first() else {
        return TestVerdict::Skipped;
    };
    if suite.name != *head {
        return TestVerdict::Skipped;
    }

    let Some(next) = rest.first() else {
        return match suite.test_cases.iter().find(|case| case.name == test_name) {
            Some(case) if case.failure.is_some() => TestVerdict::Failed,
            Some(_) => TestVerdict::Passed,
            None => TestVerdict::Skipped,
        };
    };

    suite
        .children
        .iter()
        .filter(|child| child.name == *next)
        .map(|child| verdict_along_path(rest, test_name, child))
        .find(TestVerdict::is_decided)
        .unwrap_or(TestVerdict::Skipped)
}
