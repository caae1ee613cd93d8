//! Store-aware driver acquisition.

use std::sync::Arc;

use drover_protocol::Device;
use tracing::debug;

use crate::error::Result;
use crate::holder::DriverHolder;
use crate::manager::DriverManager;
use crate::store::DriversStore;

/// Hands out the live driver for a device, starting one on first use.
///
/// Initialization takes the store's per-device lock, so concurrent first
/// requests start only one native driver per key, and a request arriving
/// while the previous driver is being evicted waits for its quit to finish.
pub struct DriverPool {
	manager: DriverManager,
	store: Arc<DriversStore>,
}

impl DriverPool {
	pub fn new(manager: DriverManager, store: Arc<DriversStore>) -> Self {
		Self { manager, store }
	}

	pub fn store(&self) -> &Arc<DriversStore> {
		&self.store
	}

	pub fn manager(&self) -> &DriverManager {
		&self.manager
	}

	/// Returns the live driver for `device`, initializing it if needed.
	pub async fn driver(&self, device: &Device) -> Result<Arc<DriverHolder>> {
		if let Some(holder) = self.live(device) {
			return Ok(holder);
		}

		let lock = self.store.device_lock(device);
		let _guard = lock.lock().await;

		if let Some(holder) = self.live(device) {
			debug!(target = "drover.pool", %device, "driver initialized by a concurrent request");
			return Ok(holder);
		}

		let holder = Arc::new(self.manager.get_driver(device).await?);
		self.store.insert_locked(device.clone(), holder.clone()).await;
		Ok(holder)
	}

	fn live(&self, device: &Device) -> Option<Arc<DriverHolder>> {
		self.store.get_driver(device).filter(|h| !h.is_quit())
	}
}
