//! JUnit XML result document model.
//!
//! Suites nest recursively and may interleave test cases with child suites,
//! which is why the crate enables quick-xml's `overlapped-lists` feature.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// `<testsuites>` root element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuites {
    #[serde(rename = "testsuite", default)]
    pub suites: Vec<TestSuite>,
}

/// `<testsuite>` element: a named, possibly nested group of test cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@tests", default)]
    pub num_tests: u32,
    #[serde(rename = "@skipped", default)]
    pub num_skipped: u32,
    #[serde(rename = "@failures", default)]
    pub num_failed: u32,
    #[serde(rename = "@time", default)]
    pub duration: f64,
    #[serde(rename = "testcase", default, skip_serializing_if = "Vec::is_empty")]
    pub test_cases: Vec<TestCase>,
    #[serde(rename = "testsuite", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestSuite>,
}

/// `<testcase>` element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@time", default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipMessage>,
    #[serde(rename = "system-out", default, skip_serializing_if = "String::is_empty")]
    pub system_out: String,
}

/// `<failure>` element with its message attribute and body text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureOutput {
    #[serde(rename = "@message", default)]
    pub message: String,
    #[serde(rename = "$text", default)]
    pub output: String,
}

/// `<skipped>` element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipMessage {
    #[serde(rename = "@message", default)]
    pub message: String,
}

impl TestSuites {
    /// Parse a JUnit document whose root is either `<testsuites>` or a
    /// single `<testsuite>`.
    pub fn from_xml(data: &[u8]) -> AppResult<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| AppError::Serialization(format!("JUnit file is not UTF-8: {}", e)))?;

        match root_element_name(text)?.as_deref() {
            Some("testsuites") => quick_xml::de::from_str(text)
                .map_err(|e| AppError::Serialization(format!("Failed to parse testsuites: {}", e))),
            Some("testsuite") => {
                let suite: TestSuite = quick_xml::de::from_str(text).map_err(|e| {
                    AppError::Serialization(format!("Failed to parse testsuite: {}", e))
                })?;
                Ok(TestSuites {
                    suites: vec![suite],
                })
            }
            Some(other) => Err(AppError::Serialization(format!(
                "Unexpected JUnit root element <{}>",
                other
            ))),
            None => Err(AppError::Serialization(
                "JUnit file has no root element".to_string(),
            )),
        }
    }
}

fn root_element_name(text: &str) -> AppResult<Option<String>> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(Some(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => continue,
            Err(e) => {
                return Err(AppError::Serialization(format!(
                    "Malformed JUnit XML at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
        }
    }
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        TestSuite {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Walk `path` below this suite, creating missing child suites, and
    /// return the innermost one.
    pub fn add_suite_path(&mut self, path: &[String]) -> &mut TestSuite {
        let mut current = self;
        for name in path {
            let idx = match current.children.iter().position(|c| &c.name == name) {
                Some(idx) => idx,
                None => {
                    current.children.push(TestSuite::new(name.clone()));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[idx];
        }
        current
    }

    /// Recompute `tests`, `failures` and `skipped` from the leaves upward.
    ///
    /// A case with both a failure and a skip marker counts as failed only.
    pub fn update_test_counts(&mut self) {
        let mut tests = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for case in &self.test_cases {
            tests += 1;
            if case.failure.is_some() {
                failed += 1;
            } else if case.skipped.is_some() {
                skipped += 1;
            }
        }

        for child in &mut self.children {
            child.update_test_counts();
            tests += child.num_tests;
            failed += child.num_failed;
            skipped += child.num_skipped;
        }

        self.num_tests = tests;
        self.num_failed = failed;
        self.num_skipped = skipped;
    }

    /// Serialize as a standalone `<testsuite>` document.
    pub fn to_xml(&self) -> AppResult<String> {
        let body = quick_xml::se::to_string_with_root("testsuite", self)
            .map_err(|e| AppError::Serialization(format!("Failed to write JUnit XML: {}", e)))?;
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n",
            body
        ))
    }
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        TestCase {
            name: name.into(),
            ..Default::default()
        }
    }
}
