//! Per-test and per-class execution state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use drover_protocol::{Device, DeviceType, Environment};
use drover_runtime::{DriverHolder, DriverPool};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiCall;
use crate::error::{Error, Result};

/// Identity of a test as reported by the runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
	pub suite: String,
	pub class: String,
	pub name: String,
	/// Runner-supplied parameters (data-driven rows and the like).
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub params: Map<String, Value>,
}

impl TestInfo {
	pub fn new(suite: impl Into<String>, class: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			suite: suite.into(),
			class: class.into(),
			name: name.into(),
			params: Map::new(),
		}
	}

	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.params.insert(key.into(), value.into());
		self
	}

	/// `class::name`, unique within a run.
	pub fn id(&self) -> String {
		format!("{}::{}", self.class, self.name)
	}
}

/// State shared by all tests of one class; cleared when the class ends.
#[derive(Debug, Default)]
pub struct ClassContext {
	class: String,
	params: RwLock<Map<String, Value>>,
}

impl ClassContext {
	pub fn new(class: impl Into<String>) -> Self {
		Self {
			class: class.into(),
			params: RwLock::new(Map::new()),
		}
	}

	pub fn class(&self) -> &str {
		&self.class
	}

	pub fn param(&self, key: &str) -> Option<Value> {
		self.params.read().get(key).cloned()
	}

	pub fn set_param(&self, key: impl Into<String>, value: impl Into<Value>) {
		self.params.write().insert(key.into(), value.into());
	}

	pub fn clear(&self) {
		self.params.write().clear();
	}
}

/// Everything a running test can reach: its environment, drivers, class
/// state and recorded API traffic.
pub struct TestExecutionContext {
	info: TestInfo,
	environment: Arc<Environment>,
	class: Arc<ClassContext>,
	pool: Arc<DriverPool>,
	params: RwLock<Map<String, Value>>,
	drivers: Mutex<Vec<Arc<DriverHolder>>>,
	api_calls: Mutex<Vec<ApiCall>>,
	started: Instant,
}

impl TestExecutionContext {
	pub fn new(info: TestInfo, environment: Arc<Environment>, class: Arc<ClassContext>, pool: Arc<DriverPool>) -> Self {
		let params = info.params.clone();
		Self {
			info,
			environment,
			class,
			pool,
			params: RwLock::new(params),
			drivers: Mutex::new(Vec::new()),
			api_calls: Mutex::new(Vec::new()),
			started: Instant::now(),
		}
	}

	pub fn info(&self) -> &TestInfo {
		&self.info
	}

	pub fn environment(&self) -> &Arc<Environment> {
		&self.environment
	}

	pub fn class(&self) -> &Arc<ClassContext> {
		&self.class
	}

	pub fn elapsed(&self) -> Duration {
		self.started.elapsed()
	}

	/// Parameter lookup: test, then class, then environment.
	pub fn param(&self, key: &str) -> Option<Value> {
		self.params
			.read()
			.get(key)
			.cloned()
			.or_else(|| self.class.param(key))
			.or_else(|| self.environment.params.get(key).cloned())
	}

	pub fn param_str(&self, key: &str) -> Option<String> {
		self.param(key).and_then(|v| v.as_str().map(str::to_string))
	}

	pub fn set_param(&self, key: impl Into<String>, value: impl Into<Value>) {
		self.params.write().insert(key.into(), value.into());
	}

	/// The live driver for `device`, started on first use and remembered
	/// as used by this test.
	pub async fn driver(&self, device: &Device) -> Result<Arc<DriverHolder>> {
		let holder = self.pool.driver(device).await?;
		let mut drivers = self.drivers.lock();
		drivers.retain(|h| !h.is_quit());
		if !drivers.iter().any(|h| Arc::ptr_eq(h, &holder)) {
			drivers.push(holder.clone());
		}
		Ok(holder)
	}

	/// The driver for the environment's first device of `device_type`.
	pub async fn driver_by_type(&self, device_type: DeviceType) -> Result<Arc<DriverHolder>> {
		let device = self
			.environment
			.device_by_type(device_type)
			.cloned()
			.ok_or_else(|| {
				Error::Environment(format!(
					"environment '{}' declares no {device_type} device",
					self.environment.name
				))
			})?;
		self.driver(&device).await
	}

	/// Drivers this test used that are still running.
	pub fn active_drivers(&self) -> Vec<Arc<DriverHolder>> {
		self.drivers.lock().iter().filter(|h| !h.is_quit()).cloned().collect()
	}

	pub fn record_api_call(&self, call: ApiCall) {
		self.api_calls.lock().push(call);
	}

	pub fn api_calls(&self) -> Vec<ApiCall> {
		self.api_calls.lock().clone()
	}
}

impl std::fmt::Debug for TestExecutionContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TestExecutionContext")
			.field("test", &self.info.id())
			.field("environment", &self.environment.name)
			.field("drivers", &self.drivers.lock().len())
			.field("api_calls", &self.api_calls.lock().len())
			.finish()
	}
}
