//! Run logging and the JSON run report.

use std::path::PathBuf;

use async_trait::async_trait;
use drover_protocol::DriverEvent;
use drover_runtime::DriversStore;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{LifecycleEvent, LifecycleListener};
use crate::report::{RunSummary, TestResult};

/// File name of the run report inside the artifacts directory.
pub const REPORT_FILE: &str = "report.json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
	run_id: &'a str,
	environment: &'a str,
	summary: &'a RunSummary,
	tests: &'a [TestResult],
}

#[derive(Default)]
struct RunState {
	run_id: String,
	environment: String,
	results: Vec<TestResult>,
}

/// Logs lifecycle progress and collects results; writes
/// [`REPORT_FILE`] when the execution finishes and an artifacts
/// directory is configured.
pub struct RunReporter {
	artifacts_dir: Option<PathBuf>,
	state: Mutex<RunState>,
}

impl RunReporter {
	pub fn new(artifacts_dir: Option<PathBuf>) -> Self {
		Self {
			artifacts_dir,
			state: Mutex::new(RunState::default()),
		}
	}

	/// Results collected so far.
	pub fn results(&self) -> Vec<TestResult> {
		self.state.lock().results.clone()
	}

	async fn write_report(&self, summary: &RunSummary) -> Result<Option<PathBuf>> {
		let Some(dir) = &self.artifacts_dir else {
			return Ok(None);
		};
		let body = {
			let state = self.state.lock();
			serde_json::to_vec_pretty(&RunReport {
				run_id: &state.run_id,
				environment: &state.environment,
				summary,
				tests: &state.results,
			})?
		};
		tokio::fs::create_dir_all(dir).await?;
		let path = dir.join(REPORT_FILE);
		tokio::fs::write(&path, body).await?;
		Ok(Some(path))
	}
}

#[async_trait]
impl LifecycleListener for RunReporter {
	fn name(&self) -> &str {
		"run-reporter"
	}

	fn order(&self) -> i32 {
		-100
	}

	async fn on_event(&self, event: &LifecycleEvent) -> Result<()> {
		match event {
			LifecycleEvent::ExecutionStart(start) => {
				let mut state = self.state.lock();
				state.run_id = start.run_id.clone();
				state.environment = start.environment.name.clone();
				info!(target = "drover.run", run_id = %start.run_id, environment = %start.environment.name, "execution started");
			}
			LifecycleEvent::SuiteStart { suite } => info!(target = "drover.run", %suite, "suite started"),
			LifecycleEvent::ClassStart { class } => debug!(target = "drover.run", %class, "class started"),
			LifecycleEvent::TestStart(ctx) => debug!(target = "drover.run", test = %ctx.info().id(), "test started"),
			LifecycleEvent::TestFinish { result, .. } => {
				info!(
					target = "drover.run",
					test = %result.info.id(),
					status = %result.status,
					duration_ms = result.duration_ms,
					attachments = result.attachments.len(),
					"test finished"
				);
				self.state.lock().results.push(TestResult::clone(result));
			}
			LifecycleEvent::ClassFinish { class } => debug!(target = "drover.run", %class, "class finished"),
			LifecycleEvent::SuiteFinish { suite } => info!(target = "drover.run", %suite, "suite finished"),
			LifecycleEvent::ExecutionFinish(summary) => {
				info!(
					target = "drover.run",
					total = summary.total,
					passed = summary.passed,
					failed = summary.failed,
					broken = summary.broken,
					skipped = summary.skipped,
					duration_ms = summary.duration_ms,
					"execution finished"
				);
				if let Some(path) = self.write_report(summary).await? {
					info!(target = "drover.run", path = %path.display(), "report written");
				}
			}
		}
		Ok(())
	}
}

/// Logs every [`DriverEvent`] from `store` until the store is dropped.
pub fn spawn_driver_event_logger(store: &DriversStore) -> JoinHandle<()> {
	let mut rx = store.subscribe();
	tokio::spawn(async move {
		loop {
			match rx.recv().await {
				Ok(DriverEvent::Started {
					device,
					scope,
					session_id,
					..
				}) => {
					debug!(target = "drover.driver", %device, %scope, %session_id, "driver registered");
				}
				Ok(DriverEvent::Stopped {
					device,
					session_id,
					lifetime_ms,
					clean,
					..
				}) => {
					if clean {
						debug!(target = "drover.driver", %device, %session_id, lifetime_ms, "driver evicted");
					} else {
						warn!(target = "drover.driver", %device, %session_id, lifetime_ms, "driver evicted after failed quit");
					}
				}
				Err(broadcast::error::RecvError::Lagged(n)) => {
					warn!(target = "drover.driver", dropped = n, "driver event logger lagged");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use std::fs;
	use std::sync::Arc;

	use super::*;
	use crate::context::TestInfo;
	use crate::report::TestStatus;

	#[tokio::test]
	async fn writes_report_with_collected_results() {
		let dir = tempfile::tempdir().unwrap();
		let reporter = RunReporter::new(Some(dir.path().join("artifacts")));

		let result = TestResult {
			info: TestInfo::new("smoke", "Cart", "adds_item"),
			status: TestStatus::Passed,
			error: None,
			duration_ms: 12,
			attachments: Vec::new(),
		};
		reporter.state.lock().results.push(result);

		let mut summary = RunSummary::default();
		summary.record(TestStatus::Passed);
		reporter
			.on_event(&LifecycleEvent::ExecutionFinish(Arc::new(summary)))
			.await
			.unwrap();

		let written: serde_json::Value =
			serde_json::from_slice(&fs::read(dir.path().join("artifacts").join(REPORT_FILE)).unwrap()).unwrap();
		assert_eq!(written["summary"]["passed"], 1);
		assert_eq!(written["tests"][0]["info"]["name"], "adds_item");
	}

	#[tokio::test]
	async fn no_artifacts_dir_writes_nothing() {
		let reporter = RunReporter::new(None);
		let summary = Arc::new(RunSummary::default());
		reporter.on_event(&LifecycleEvent::ExecutionFinish(summary)).await.unwrap();
		assert!(reporter.results().is_empty());
	}
}
