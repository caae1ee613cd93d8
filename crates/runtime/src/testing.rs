//! In-memory fakes for exercising driver lifecycle without a grid.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use drover_protocol::{Device, DeviceType};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::holder::DriverHolder;
use crate::native::{LogEntry, NativeDriver};
use crate::resolver::DriverResolver;

/// Native driver that records how often it was quit.
#[derive(Debug, Default)]
pub struct FakeDriver {
	session_id: String,
	quits: AtomicUsize,
	fail_quit: bool,
	broken: bool,
	quit_delay: Option<Duration>,
	source: Mutex<Option<String>>,
}

impl FakeDriver {
	pub fn new(session_id: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			session_id: session_id.into(),
			..Default::default()
		})
	}

	/// A driver whose native quit always fails (it still counts the call).
	pub fn failing_quit(session_id: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			session_id: session_id.into(),
			fail_quit: true,
			..Default::default()
		})
	}

	/// A driver whose session is gone: every diagnostic call fails.
	pub fn broken(session_id: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			session_id: session_id.into(),
			broken: true,
			..Default::default()
		})
	}

	fn check_session(&self) -> Result<()> {
		if self.broken {
			return Err(Error::WebDriver {
				error: "invalid session id".into(),
				message: format!("session {} does not exist", self.session_id),
			});
		}
		Ok(())
	}

	/// A driver whose quit yields for `delay`, widening race windows.
	pub fn slow_quit(session_id: impl Into<String>, delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			session_id: session_id.into(),
			quit_delay: Some(delay),
			..Default::default()
		})
	}

	pub fn set_page_source(&self, source: impl Into<String>) {
		*self.source.lock() = Some(source.into());
	}

	pub fn quit_count(&self) -> usize {
		self.quits.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl NativeDriver for FakeDriver {
	fn session_id(&self) -> &str {
		&self.session_id
	}

	async fn quit(&self) -> Result<()> {
		self.quits.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.quit_delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail_quit {
			return Err(Error::WebDriver {
				error: "unknown error".into(),
				message: "fake quit failure".into(),
			});
		}
		Ok(())
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		self.check_session()?;
		Ok(b"\x89PNG fake".to_vec())
	}

	async fn page_source(&self) -> Result<String> {
		self.check_session()?;
		self.source.lock().clone().ok_or(Error::Unsupported("page_source"))
	}

	async fn logs(&self, kind: &str) -> Result<Vec<LogEntry>> {
		self.check_session()?;
		Ok(vec![LogEntry {
			level: "INFO".into(),
			message: format!("{kind} log from {}", self.session_id),
			timestamp: 0,
		}])
	}
}

/// Resolver that hands out [`FakeDriver`]s and remembers them.
pub struct FakeResolver {
	device_type: DeviceType,
	set_type: bool,
	fail: bool,
	created: Mutex<Vec<Arc<FakeDriver>>>,
	counter: AtomicUsize,
}

impl FakeResolver {
	pub fn new(device_type: DeviceType) -> Self {
		Self {
			device_type,
			set_type: true,
			fail: false,
			created: Mutex::new(Vec::new()),
			counter: AtomicUsize::new(0),
		}
	}

	/// Simulates a buggy resolver that forgets to tag the device type.
	pub fn without_device_type(mut self) -> Self {
		self.set_type = false;
		self
	}

	/// Every `init_driver` call fails.
	pub fn failing(mut self) -> Self {
		self.fail = true;
		self
	}

	pub fn created(&self) -> Vec<Arc<FakeDriver>> {
		self.created.lock().clone()
	}

	pub fn init_count(&self) -> usize {
		self.counter.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl DriverResolver for FakeResolver {
	fn device_type(&self) -> DeviceType {
		self.device_type
	}

	async fn init_driver(&self, device: &Device) -> Result<DriverHolder> {
		let n = self.counter.fetch_add(1, Ordering::SeqCst);
		if self.fail {
			return Err(Error::WebDriver {
				error: "session not created".into(),
				message: format!("fake resolver refused {}", device.name()),
			});
		}
		// Yield so concurrent callers interleave inside initialization.
		tokio::task::yield_now().await;
		let native = FakeDriver::new(format!("{}-{n}", device.name()));
		self.created.lock().push(native.clone());
		let holder = DriverHolder::new(device.clone(), native);
		Ok(if self.set_type { holder.with_device_type(self.device_type) } else { holder })
	}
}
