//! Finish processors: diagnostics collected from a test's drivers and API
//! traffic once it ends.

use async_trait::async_trait;
use drover_protocol::DeviceType;
use drover_runtime::{DriverHolder, Error as DriverError};
use tracing::{debug, warn};

use crate::context::TestExecutionContext;
use crate::error::Result;
use crate::report::{Attachment, AttachmentKind, TestResult};

/// Produces attachments for a finished test.
///
/// Processors see only drivers that are still running. A driver that fails
/// to produce a diagnostic is skipped, so one broken session never costs
/// the attachments of the others.
#[async_trait]
pub trait FinishProcessor: Send + Sync {
	fn name(&self) -> &str;

	async fn process(&self, ctx: &TestExecutionContext, result: &TestResult) -> Result<Vec<Attachment>>;
}

fn skip_driver(err: &DriverError, holder: &DriverHolder, processor: &str) {
	match err {
		DriverError::Unsupported(_) => {
			debug!(target = "drover.processors", processor, device = %holder.device(), "not supported by driver");
		}
		err => warn!(
			target = "drover.processors",
			processor,
			device = %holder.device(),
			session_id = holder.session_id(),
			error = %err,
			"driver diagnostic failed; skipping driver"
		),
	}
}

pub struct ScreenshotProcessor;

#[async_trait]
impl FinishProcessor for ScreenshotProcessor {
	fn name(&self) -> &str {
		"screenshot"
	}

	async fn process(&self, ctx: &TestExecutionContext, _result: &TestResult) -> Result<Vec<Attachment>> {
		let mut attachments = Vec::new();
		for holder in ctx.active_drivers() {
			match holder.native().screenshot().await {
				Ok(png) => attachments.push(Attachment::new(
					format!("screenshot-{}", holder.device().name()),
					AttachmentKind::Screenshot,
					"image/png",
					png,
				)),
				Err(err) => skip_driver(&err, &holder, self.name()),
			}
		}
		Ok(attachments)
	}
}

pub struct PageSourceProcessor;

#[async_trait]
impl FinishProcessor for PageSourceProcessor {
	fn name(&self) -> &str {
		"page_source"
	}

	async fn process(&self, ctx: &TestExecutionContext, _result: &TestResult) -> Result<Vec<Attachment>> {
		let mut attachments = Vec::new();
		for holder in ctx.active_drivers() {
			let content_type = match holder.device_type() {
				Some(DeviceType::Web) => "text/html",
				_ => "application/xml",
			};
			match holder.native().page_source().await {
				Ok(source) => attachments.push(Attachment::new(
					format!("page-source-{}", holder.device().name()),
					AttachmentKind::PageSource,
					content_type,
					source.into_bytes(),
				)),
				Err(err) => skip_driver(&err, &holder, self.name()),
			}
		}
		Ok(attachments)
	}
}

/// Log buffers worth draining for a driver.
fn log_kinds(holder: &DriverHolder) -> &'static [&'static str] {
	match holder.device_type() {
		Some(DeviceType::Web) => &["browser"],
		Some(DeviceType::Mobile) => &["logcat", "syslog"],
		_ => &["driver"],
	}
}

pub struct DriverLogsProcessor;

#[async_trait]
impl FinishProcessor for DriverLogsProcessor {
	fn name(&self) -> &str {
		"driver_logs"
	}

	async fn process(&self, ctx: &TestExecutionContext, _result: &TestResult) -> Result<Vec<Attachment>> {
		let mut attachments = Vec::new();
		for holder in ctx.active_drivers() {
			for kind in log_kinds(&holder) {
				match holder.native().logs(kind).await {
					Ok(entries) if entries.is_empty() => {}
					Ok(entries) => attachments.push(Attachment::new(
						format!("{kind}-log-{}", holder.device().name()),
						AttachmentKind::DriverLog,
						"application/json",
						serde_json::to_vec_pretty(&entries)?,
					)),
					// iOS drivers reject "logcat" and vice versa.
					Err(DriverError::WebDriver { error, .. }) if error == "invalid argument" => {}
					Err(err) => skip_driver(&err, &holder, self.name()),
				}
			}
		}
		Ok(attachments)
	}
}

pub struct ApiLogProcessor;

#[async_trait]
impl FinishProcessor for ApiLogProcessor {
	fn name(&self) -> &str {
		"api_log"
	}

	async fn process(&self, ctx: &TestExecutionContext, _result: &TestResult) -> Result<Vec<Attachment>> {
		let calls = ctx.api_calls();
		if calls.is_empty() {
			return Ok(Vec::new());
		}
		Ok(vec![Attachment::new(
			"api-calls",
			AttachmentKind::ApiLog,
			"application/json",
			serde_json::to_vec_pretty(&calls)?,
		)])
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use drover_protocol::{Browser, Device, DriverProperties, Environment};
	use drover_runtime::testing::{FakeDriver, FakeResolver};
	use drover_runtime::{DriverManager, DriverPool, DriverResolver, DriversStore};

	use super::*;
	use crate::api::ApiCall;
	use crate::context::{ClassContext, TestInfo};
	use crate::report::TestStatus;

	fn context_with_store() -> (TestExecutionContext, Arc<DriversStore>) {
		let manager = DriverManager::new(DriverProperties::default())
			.with_resolvers([Arc::new(FakeResolver::new(DeviceType::Web)) as Arc<dyn DriverResolver>]);
		let store = Arc::new(DriversStore::new());
		let pool = Arc::new(DriverPool::new(manager, store.clone()));
		let env = Environment::new("local").with_device(Device::web("chrome", Browser::Chrome));
		let ctx = TestExecutionContext::new(
			TestInfo::new("s", "C", "t"),
			Arc::new(env),
			Arc::new(ClassContext::new("C")),
			pool,
		);
		(ctx, store)
	}

	fn context() -> TestExecutionContext {
		context_with_store().0
	}

	fn failed(ctx: &TestExecutionContext) -> TestResult {
		TestResult {
			info: ctx.info().clone(),
			status: TestStatus::Failed,
			error: Some("assertion".into()),
			duration_ms: 1,
			attachments: Vec::new(),
		}
	}

	#[tokio::test]
	async fn screenshot_per_active_driver() {
		let ctx = context();
		ctx.driver_by_type(DeviceType::Web).await.unwrap();
		let attachments = ScreenshotProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert_eq!(attachments.len(), 1);
		assert_eq!(attachments[0].name, "screenshot-chrome");
		assert_eq!(attachments[0].content_type, "image/png");
	}

	#[tokio::test]
	async fn broken_session_does_not_drop_other_attachments() {
		let (ctx, store) = context_with_store();
		let healthy = Device::web("chrome", Browser::Chrome);
		let broken = Device::web("firefox", Browser::Firefox);
		let holder = DriverHolder::new(broken.clone(), FakeDriver::broken("gone")).with_device_type(DeviceType::Web);
		store.add_driver(broken.clone(), Arc::new(holder)).await;
		ctx.driver(&broken).await.unwrap();
		ctx.driver(&healthy).await.unwrap();

		let screenshots = ScreenshotProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert_eq!(screenshots.len(), 1);
		assert_eq!(screenshots[0].name, "screenshot-chrome");

		let logs = DriverLogsProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert_eq!(logs.len(), 1);
		assert_eq!(logs[0].name, "browser-log-chrome");
	}

	#[tokio::test]
	async fn unsupported_page_source_is_skipped() {
		let ctx = context();
		ctx.driver_by_type(DeviceType::Web).await.unwrap();
		let attachments = PageSourceProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert!(attachments.is_empty());
	}

	#[tokio::test]
	async fn web_drivers_drain_browser_log() {
		let ctx = context();
		ctx.driver_by_type(DeviceType::Web).await.unwrap();
		let attachments = DriverLogsProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert_eq!(attachments.len(), 1);
		assert_eq!(attachments[0].name, "browser-log-chrome");
	}

	#[tokio::test]
	async fn api_log_only_when_calls_were_made() {
		let ctx = context();
		assert!(ApiLogProcessor.process(&ctx, &failed(&ctx)).await.unwrap().is_empty());

		ctx.record_api_call(ApiCall {
			method: "GET".into(),
			url: "http://api/me".into(),
			status: Some(200),
			duration_ms: 3,
			user: None,
			error: None,
		});
		let attachments = ApiLogProcessor.process(&ctx, &failed(&ctx)).await.unwrap();
		assert_eq!(attachments[0].kind, AttachmentKind::ApiLog);
	}
}
