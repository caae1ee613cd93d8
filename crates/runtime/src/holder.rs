//! [`DriverHolder`]: a native driver plus its lifecycle metadata.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use drover_protocol::{Device, DeviceType, DriverScope};
use tracing::debug;

use crate::error::Result;
use crate::native::NativeDriver;

/// Owns exactly one native driver for one [`Device`].
///
/// The resolver that builds a holder must tag it with the device type via
/// [`with_device_type`](Self::with_device_type); the scope is assigned by
/// the [`DriverManager`](crate::DriverManager) afterwards.
pub struct DriverHolder {
	native: Arc<dyn NativeDriver>,
	device: Device,
	device_type: Option<DeviceType>,
	scope: DriverScope,
	started_at: Instant,
	/// Unix epoch milliseconds at initialization.
	init_time_ms: u64,
	quit: AtomicBool,
}

impl DriverHolder {
	pub fn new(device: Device, native: Arc<dyn NativeDriver>) -> Self {
		let init_time_ms = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_millis() as u64)
			.unwrap_or_default();
		Self {
			native,
			device,
			device_type: None,
			scope: DriverScope::default(),
			started_at: Instant::now(),
			init_time_ms,
			quit: AtomicBool::new(false),
		}
	}

	pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
		self.device_type = Some(device_type);
		self
	}

	pub fn with_scope(mut self, scope: DriverScope) -> Self {
		self.scope = scope;
		self
	}

	pub fn device(&self) -> &Device {
		&self.device
	}

	pub fn device_type(&self) -> Option<DeviceType> {
		self.device_type
	}

	pub fn scope(&self) -> DriverScope {
		self.scope
	}

	pub fn init_time_ms(&self) -> u64 {
		self.init_time_ms
	}

	pub fn age(&self) -> Duration {
		self.started_at.elapsed()
	}

	pub fn session_id(&self) -> &str {
		self.native.session_id()
	}

	/// The wrapped native driver.
	pub fn native(&self) -> &Arc<dyn NativeDriver> {
		&self.native
	}

	/// Typed access to the native driver.
	pub fn native_as<T: NativeDriver>(&self) -> Option<&T> {
		self.native.downcast_ref::<T>()
	}

	pub fn is_quit(&self) -> bool {
		self.quit.load(Ordering::Acquire)
	}

	/// Quits the native driver. Only the first call reaches the native
	/// driver; later calls return `Ok(false)` without side effects.
	pub async fn quit(&self) -> Result<bool> {
		if self.quit.swap(true, Ordering::AcqRel) {
			return Ok(false);
		}
		debug!(
			target = "drover.driver",
			device = %self.device,
			session_id = self.native.session_id(),
			scope = %self.scope,
			"quitting driver"
		);
		self.native.quit().await?;
		Ok(true)
	}
}

impl std::fmt::Debug for DriverHolder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DriverHolder")
			.field("device", &self.device.name())
			.field("device_type", &self.device_type)
			.field("scope", &self.scope)
			.field("session_id", &self.native.session_id())
			.field("quit", &self.is_quit())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use drover_protocol::Browser;

	use super::*;
	use crate::testing::FakeDriver;

	#[tokio::test]
	async fn quit_reaches_native_driver_once() {
		let native = FakeDriver::new("s-1");
		let holder = DriverHolder::new(Device::web("main", Browser::Chrome), native.clone());

		assert!(holder.quit().await.unwrap());
		assert!(!holder.quit().await.unwrap());
		assert!(holder.is_quit());
		assert_eq!(native.quit_count(), 1);
	}

	#[test]
	fn native_as_downcasts_to_concrete_type() {
		let holder = DriverHolder::new(Device::web("main", Browser::Chrome), FakeDriver::new("s-2"));
		assert_eq!(holder.native_as::<FakeDriver>().map(|d| d.session_id()), Some("s-2"));
	}

	#[test]
	fn defaults_to_execution_scope_without_type() {
		let holder = DriverHolder::new(Device::web("main", Browser::Chrome), FakeDriver::new("s-3"));
		assert_eq!(holder.scope(), DriverScope::Execution);
		assert_eq!(holder.device_type(), None);
	}
}
