//! drover: scoped WebDriver/Appium driver lifecycle for UI and API test runs.
//!
//! A test runner drives an [`Orchestrator`] through its hooks. Tests get a
//! [`TestExecutionContext`] that hands out drivers for the active
//! [`Environment`]'s devices; the orchestrator quits each driver when its
//! [`DriverScope`] ends and enriches failed results with screenshots, page
//! sources, driver logs and API call logs.
//!
//! # Examples
//!
//! ```ignore
//! use drover::{ExecutionConfig, Orchestrator, TestInfo, TestOutcome};
//! use drover::protocol::DeviceType;
//!
//! #[tokio::main]
//! async fn main() -> drover::Result<()> {
//!     let config = ExecutionConfig::load(None)?;
//!     let run = Orchestrator::builder(config).build()?;
//!
//!     run.suite_started("smoke").await;
//!     let ctx = run.test_started(TestInfo::new("smoke", "Login", "valid_user"), None).await?;
//!     let driver = ctx.driver_by_type(DeviceType::Web).await?;
//!     println!("session {}", driver.session_id());
//!     run.test_finished(ctx, TestOutcome::passed()).await;
//!     run.suite_finished("smoke").await;
//!
//!     let summary = run.execution_finished().await;
//!     assert!(summary.is_success());
//!     Ok(())
//! }
//! ```
//!
//! [`Environment`]: drover_protocol::Environment
//! [`DriverScope`]: drover_protocol::DriverScope

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod processors;
pub mod registry;
pub mod report;
pub mod reporter;

pub use api::{ApiCall, ApiClient, ApiRequest, ApiResponse};
pub use auth::{AuthProperties, AuthProvider, AuthToken, BearerAuthProvider, StaticTokenProvider, TokenCache, User};
pub use config::{ExecutionConfig, ReportingProperties};
pub use context::{ClassContext, TestExecutionContext, TestInfo};
pub use data::DataLoader;
pub use error::{Error, Result};
pub use events::{ExecutionStart, LifecycleBus, LifecycleEvent, LifecycleListener, Subscription};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use processors::{ApiLogProcessor, DriverLogsProcessor, FinishProcessor, PageSourceProcessor, ScreenshotProcessor};
pub use registry::{Component, ComponentRegistry, Fixture, Tag};
pub use report::{Attachment, AttachmentKind, RunSummary, TestOutcome, TestResult, TestStatus};
pub use reporter::{RunReporter, spawn_driver_event_logger};

/// Device, environment and scope types.
pub use drover_protocol as protocol;
/// Driver resolution and storage.
pub use drover_runtime as runtime;
