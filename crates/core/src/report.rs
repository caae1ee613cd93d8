//! Test outcomes, attachments and run summaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::TestInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
	Passed,
	Failed,
	/// Errored outside of an assertion (setup, driver, environment).
	Broken,
	Skipped,
}

impl TestStatus {
	pub fn is_failure(self) -> bool {
		matches!(self, TestStatus::Failed | TestStatus::Broken)
	}
}

impl std::fmt::Display for TestStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			TestStatus::Passed => "passed",
			TestStatus::Failed => "failed",
			TestStatus::Broken => "broken",
			TestStatus::Skipped => "skipped",
		})
	}
}

/// What the test runner reports when a test ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
	pub status: TestStatus,
	pub error: Option<String>,
}

impl TestOutcome {
	pub fn passed() -> Self {
		Self {
			status: TestStatus::Passed,
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			status: TestStatus::Failed,
			error: Some(error.into()),
		}
	}

	pub fn broken(error: impl Into<String>) -> Self {
		Self {
			status: TestStatus::Broken,
			error: Some(error.into()),
		}
	}

	pub fn skipped() -> Self {
		Self {
			status: TestStatus::Skipped,
			error: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
	Screenshot,
	PageSource,
	DriverLog,
	ApiLog,
}

/// Diagnostic artifact produced for a finished test.
///
/// `body` holds the content until it is persisted; only metadata is
/// serialized into reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
	pub name: String,
	pub kind: AttachmentKind,
	pub content_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<PathBuf>,
	pub size_bytes: u64,
	#[serde(skip)]
	pub body: Vec<u8>,
}

impl Attachment {
	pub fn new(name: impl Into<String>, kind: AttachmentKind, content_type: &str, body: Vec<u8>) -> Self {
		Self {
			name: name.into(),
			kind,
			content_type: content_type.to_string(),
			path: None,
			size_bytes: body.len() as u64,
			body,
		}
	}

	/// File extension matching the content type.
	pub fn extension(&self) -> &'static str {
		match self.content_type.as_str() {
			"image/png" => "png",
			"text/html" => "html",
			"application/json" => "json",
			"application/xml" | "text/xml" => "xml",
			_ => "txt",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
	pub info: TestInfo,
	pub status: TestStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub duration_ms: u64,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
	pub total: u64,
	pub passed: u64,
	pub failed: u64,
	pub broken: u64,
	pub skipped: u64,
	pub duration_ms: u64,
}

impl RunSummary {
	pub fn record(&mut self, status: TestStatus) {
		self.total += 1;
		match status {
			TestStatus::Passed => self.passed += 1,
			TestStatus::Failed => self.failed += 1,
			TestStatus::Broken => self.broken += 1,
			TestStatus::Skipped => self.skipped += 1,
		}
	}

	pub fn is_success(&self) -> bool {
		self.failed == 0 && self.broken == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn summary_counts_by_status() {
		let mut summary = RunSummary::default();
		for status in [TestStatus::Passed, TestStatus::Passed, TestStatus::Broken, TestStatus::Skipped] {
			summary.record(status);
		}
		assert_eq!(summary.total, 4);
		assert_eq!(summary.passed, 2);
		assert!(!summary.is_success());
	}

	#[test]
	fn attachment_body_is_not_serialized() {
		let attachment = Attachment::new("shot", AttachmentKind::Screenshot, "image/png", vec![1, 2, 3]);
		let json = serde_json::to_value(&attachment).unwrap();
		assert_eq!(json["sizeBytes"], 3);
		assert_eq!(json["kind"], "screenshot");
		assert!(json.get("body").is_none());
		assert_eq!(attachment.extension(), "png");
	}
}
