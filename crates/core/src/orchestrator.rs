//! Test lifecycle orchestration.
//!
//! The [`Orchestrator`] is driven by a test runner's hooks. It owns the
//! driver pool and decides when drivers die:
//!
//! | Hook | Evicts |
//! |---|---|
//! | [`test_finished`](Orchestrator::test_finished) | `Method` drivers the test used |
//! | [`class_finished`](Orchestrator::class_finished) | all `Class` drivers |
//! | [`suite_finished`](Orchestrator::suite_finished) | all `Suite` drivers |
//! | [`execution_finished`](Orchestrator::execution_finished) | everything |

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use drover_protocol::{DriverScope, Environment};
use drover_runtime::{DriverManager, DriverPool, DriverResolver, DriversStore, default_resolvers};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::auth::{AuthProvider, BearerAuthProvider, TokenCache, User};
use crate::config::{ExecutionConfig, ReportingProperties};
use crate::context::{ClassContext, TestExecutionContext, TestInfo};
use crate::data::DataLoader;
use crate::error::Result;
use crate::events::{ExecutionStart, LifecycleBus, LifecycleEvent, LifecycleListener};
use crate::processors::{ApiLogProcessor, DriverLogsProcessor, FinishProcessor, PageSourceProcessor, ScreenshotProcessor};
use crate::registry::{ComponentRegistry, Fixture};
use crate::report::{RunSummary, TestOutcome, TestResult, TestStatus};
use crate::reporter::{RunReporter, spawn_driver_event_logger};

/// Data directory used when the config names none.
const DEFAULT_DATA_DIR: &str = "data";
/// Environment parameter holding the base URL for [`ApiClient`]s.
pub const API_URL_PARAM: &str = "apiUrl";

/// Configures and builds an [`Orchestrator`].
pub struct OrchestratorBuilder {
	config: ExecutionConfig,
	environment: Option<String>,
	resolvers: Vec<Arc<dyn DriverResolver>>,
	default_resolvers: bool,
	listeners: Vec<Arc<dyn LifecycleListener>>,
	processors: Vec<Arc<dyn FinishProcessor>>,
	auth_provider: Option<Arc<dyn AuthProvider>>,
	registry: ComponentRegistry,
	http: Option<Client>,
}

impl OrchestratorBuilder {
	pub fn new(config: ExecutionConfig) -> Self {
		let registry = ComponentRegistry::with_builtins(config.users.clone());
		Self {
			config,
			environment: None,
			resolvers: Vec::new(),
			default_resolvers: true,
			listeners: Vec::new(),
			processors: Vec::new(),
			auth_provider: None,
			registry,
			http: None,
		}
	}

	/// Selects the environment instead of `$DROVER_ENV` or the config.
	pub fn environment(mut self, name: impl Into<String>) -> Self {
		self.environment = Some(name.into());
		self
	}

	/// Adds a resolver ahead of the built-in ones.
	pub fn resolver(mut self, resolver: Arc<dyn DriverResolver>) -> Self {
		self.resolvers.push(resolver);
		self
	}

	/// Skips the built-in grid and Appium resolvers.
	pub fn without_default_resolvers(mut self) -> Self {
		self.default_resolvers = false;
		self
	}

	pub fn listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
		self.listeners.push(listener);
		self
	}

	/// Adds a processor after the configured built-in ones.
	pub fn processor(mut self, processor: Arc<dyn FinishProcessor>) -> Self {
		self.processors.push(processor);
		self
	}

	/// Overrides the token provider derived from the `auth` config section.
	pub fn auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
		self.auth_provider = Some(provider);
		self
	}

	pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
		&mut self.registry
	}

	pub fn http_client(mut self, client: Client) -> Self {
		self.http = Some(client);
		self
	}

	pub fn build(self) -> Result<Orchestrator> {
		let environment = Arc::new(self.config.active_environment(self.environment.as_deref())?);
		let http = match self.http {
			Some(client) => client,
			None => Client::builder().build()?,
		};

		let mut resolvers = self.resolvers;
		if self.default_resolvers {
			resolvers.extend(default_resolvers(http.clone(), &self.config.driver));
		}
		let manager = DriverManager::new(self.config.driver.clone()).with_resolvers(resolvers);
		let store = Arc::new(DriversStore::new());
		let pool = Arc::new(DriverPool::new(manager, store.clone()));

		let reporting = self.config.reporting.clone();
		let mut processors = builtin_processors(&reporting);
		processors.extend(self.processors);

		let auth_provider = self.auth_provider.or_else(|| {
			self.config
				.auth
				.clone()
				.map(|props| Arc::new(BearerAuthProvider::new(http.clone(), props)) as Arc<dyn AuthProvider>)
		});
		let tokens = auth_provider.map(|provider| Arc::new(TokenCache::new(provider)));

		let bus = LifecycleBus::new();
		let reporter = Arc::new(RunReporter::new(reporting.artifacts_dir.clone()));
		bus.register(reporter.clone());
		for listener in self.listeners {
			bus.register(listener);
		}

		info!(
			target = "drover.orchestrator",
			environment = %environment.name,
			devices = environment.devices.len(),
			processors = processors.len(),
			"orchestrator ready"
		);

		Ok(Orchestrator {
			config: Arc::new(self.config),
			environment,
			pool,
			store,
			bus,
			registry: self.registry,
			processors,
			reporting,
			reporter,
			http,
			tokens,
			execution_start: OnceCell::new(),
			classes: DashMap::new(),
			summary: Mutex::new(RunSummary::default()),
			started: Instant::now(),
			finished: AtomicBool::new(false),
		})
	}
}

fn builtin_processors(reporting: &ReportingProperties) -> Vec<Arc<dyn FinishProcessor>> {
	let mut processors: Vec<Arc<dyn FinishProcessor>> = Vec::new();
	if reporting.screenshot {
		processors.push(Arc::new(ScreenshotProcessor));
	}
	if reporting.page_source {
		processors.push(Arc::new(PageSourceProcessor));
	}
	if reporting.driver_logs {
		processors.push(Arc::new(DriverLogsProcessor));
	}
	if reporting.api_log {
		processors.push(Arc::new(ApiLogProcessor));
	}
	processors
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}

/// Directory-safe form of a test id.
fn artifact_dir_name(id: &str) -> String {
	id.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

/// Drives one test run: lifecycle events, driver eviction and result
/// enrichment.
pub struct Orchestrator {
	config: Arc<ExecutionConfig>,
	environment: Arc<Environment>,
	pool: Arc<DriverPool>,
	store: Arc<DriversStore>,
	bus: LifecycleBus,
	registry: ComponentRegistry,
	processors: Vec<Arc<dyn FinishProcessor>>,
	reporting: ReportingProperties,
	reporter: Arc<RunReporter>,
	http: Client,
	tokens: Option<Arc<TokenCache>>,
	execution_start: OnceCell<Arc<ExecutionStart>>,
	classes: DashMap<String, Arc<ClassContext>>,
	summary: Mutex<RunSummary>,
	started: Instant,
	finished: AtomicBool,
}

impl Orchestrator {
	pub fn builder(config: ExecutionConfig) -> OrchestratorBuilder {
		OrchestratorBuilder::new(config)
	}

	pub fn config(&self) -> &Arc<ExecutionConfig> {
		&self.config
	}

	pub fn environment(&self) -> &Arc<Environment> {
		&self.environment
	}

	pub fn pool(&self) -> &Arc<DriverPool> {
		&self.pool
	}

	pub fn store(&self) -> &Arc<DriversStore> {
		&self.store
	}

	pub fn bus(&self) -> &LifecycleBus {
		&self.bus
	}

	pub fn registry(&self) -> &ComponentRegistry {
		&self.registry
	}

	pub fn reporter(&self) -> &Arc<RunReporter> {
		&self.reporter
	}

	pub fn user(&self, name: &str) -> Option<&User> {
		self.config.user(name)
	}

	/// Client for API steps, based at the environment's `apiUrl` parameter.
	pub fn api_client(&self) -> ApiClient {
		let mut client = ApiClient::new(self.http.clone());
		if let Some(base) = self.environment.param_str(API_URL_PARAM) {
			client = client.with_base_url(base);
		}
		if let Some(tokens) = &self.tokens {
			client = client.with_tokens(tokens.clone());
		}
		client
	}

	pub fn data_loader(&self) -> DataLoader {
		let dir = self.config.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
		DataLoader::new(dir, self.environment.name.clone())
	}

	/// The run's [`ExecutionStart`], published on first call.
	pub async fn ensure_execution_started(&self) -> Arc<ExecutionStart> {
		self.execution_start
			.get_or_init(|| async {
				spawn_driver_event_logger(&self.store);
				let started_at_ms = now_ms();
				let start = Arc::new(ExecutionStart {
					run_id: format!("{started_at_ms:x}-{}", std::process::id()),
					started_at_ms,
					environment: self.environment.clone(),
					config: self.config.clone(),
				});
				self.bus.publish(LifecycleEvent::ExecutionStart(start.clone())).await;
				start
			})
			.await
			.clone()
	}

	pub async fn suite_started(&self, suite: &str) {
		self.ensure_execution_started().await;
		self.bus
			.publish(LifecycleEvent::SuiteStart { suite: suite.to_string() })
			.await;
	}

	pub async fn class_started(&self, class: &str) -> Arc<ClassContext> {
		let context = self.class_context(class);
		self.bus
			.publish(LifecycleEvent::ClassStart { class: class.to_string() })
			.await;
		context
	}

	fn class_context(&self, class: &str) -> Arc<ClassContext> {
		self.classes
			.entry(class.to_string())
			.or_insert_with(|| Arc::new(ClassContext::new(class)))
			.clone()
	}

	/// Creates the test's context, announces it, then injects the fixture.
	///
	/// An injection failure is returned after `TestStart` was published;
	/// the caller should still report the test through
	/// [`test_finished`](Self::test_finished).
	pub async fn test_started(
		&self,
		info: TestInfo,
		fixture: Option<&mut dyn Fixture>,
	) -> Result<Arc<TestExecutionContext>> {
		self.ensure_execution_started().await;
		let class = self.class_context(&info.class);
		let ctx = Arc::new(TestExecutionContext::new(
			info,
			self.environment.clone(),
			class,
			self.pool.clone(),
		));
		self.bus.publish(LifecycleEvent::TestStart(ctx.clone())).await;

		if let Some(fixture) = fixture {
			self.registry.inject(fixture, &ctx).await?;
		}
		Ok(ctx)
	}

	fn should_attach(&self, status: TestStatus) -> bool {
		status != TestStatus::Skipped && (status.is_failure() || !self.reporting.attach_on_failure_only)
	}

	/// Enriches the outcome, publishes `TestFinish` and evicts the
	/// `Method` drivers this test used.
	pub async fn test_finished(&self, ctx: Arc<TestExecutionContext>, outcome: TestOutcome) -> Arc<TestResult> {
		let mut result = TestResult {
			info: ctx.info().clone(),
			status: outcome.status,
			error: outcome.error,
			duration_ms: ctx.elapsed().as_millis() as u64,
			attachments: Vec::new(),
		};

		if self.should_attach(result.status) {
			for processor in &self.processors {
				match processor.process(&ctx, &result).await {
					Ok(attachments) => result.attachments.extend(attachments),
					Err(err) => warn!(
						target = "drover.orchestrator",
						processor = processor.name(),
						test = %result.info.id(),
						error = %err,
						"finish processor failed; skipping"
					),
				}
			}
			self.persist_attachments(&mut result).await;
		}

		self.summary.lock().record(result.status);
		let result = Arc::new(result);
		self.bus
			.publish(LifecycleEvent::TestFinish {
				result: result.clone(),
				context: ctx.clone(),
			})
			.await;

		for holder in ctx.active_drivers() {
			if holder.scope() == DriverScope::Method {
				self.store.remove_driver(holder.device()).await;
			}
		}
		result
	}

	async fn persist_attachments(&self, result: &mut TestResult) {
		let Some(root) = &self.reporting.artifacts_dir else {
			return;
		};
		if result.attachments.is_empty() {
			return;
		}
		let dir = root.join(artifact_dir_name(&result.info.id()));
		if let Err(err) = tokio::fs::create_dir_all(&dir).await {
			warn!(target = "drover.orchestrator", dir = %dir.display(), error = %err, "cannot create artifacts dir");
			return;
		}
		for attachment in &mut result.attachments {
			let path = dir.join(format!("{}.{}", attachment.name, attachment.extension()));
			match tokio::fs::write(&path, &attachment.body).await {
				Ok(()) => {
					attachment.path = Some(path);
					attachment.body = Vec::new();
				}
				Err(err) => {
					warn!(target = "drover.orchestrator", path = %path.display(), error = %err, "cannot write attachment");
				}
			}
		}
	}

	/// Clears the class's shared data and evicts `Class` drivers.
	pub async fn class_finished(&self, class: &str) {
		if let Some((_, context)) = self.classes.remove(class) {
			context.clear();
		}
		let evicted = self.store.clear_all_scope(DriverScope::Class).await;
		debug!(target = "drover.orchestrator", %class, evicted, "class drivers evicted");
		self.bus
			.publish(LifecycleEvent::ClassFinish { class: class.to_string() })
			.await;
	}

	pub async fn suite_finished(&self, suite: &str) {
		let evicted = self.store.clear_all_scope(DriverScope::Suite).await;
		debug!(target = "drover.orchestrator", %suite, evicted, "suite drivers evicted");
		self.bus
			.publish(LifecycleEvent::SuiteFinish { suite: suite.to_string() })
			.await;
	}

	/// Evicts every driver and publishes `ExecutionFinish`. Later calls
	/// only return the summary.
	pub async fn execution_finished(&self) -> RunSummary {
		if self.finished.swap(true, Ordering::AcqRel) {
			return self.summary.lock().clone();
		}
		let evicted = self.store.clear_all().await;
		debug!(target = "drover.orchestrator", evicted, "all drivers evicted");

		let summary = {
			let mut summary = self.summary.lock();
			summary.duration_ms = self.started.elapsed().as_millis() as u64;
			summary.clone()
		};
		self.bus
			.publish(LifecycleEvent::ExecutionFinish(Arc::new(summary.clone())))
			.await;
		summary
	}
}
