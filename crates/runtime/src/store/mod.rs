//! Concurrent keyed cache of live drivers with scope-based eviction.
//!
//! Uses [`DashMap`] so parallel tests can look up, insert and evict without
//! a global lock. Each device has its own async lock: eviction holds it
//! while the driver quits and only then drops the entry, so a replacement
//! for the same device cannot start until the old session is gone.
//! [`DriverHolder::quit`] is idempotent, so a holder that escaped via a
//! cloned `Arc` is never quit twice.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use drover_protocol::{Device, DeviceType, DriverEvent, DriverScope};
use futures_util::future::join_all;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::holder::DriverHolder;

const EVENT_CAPACITY: usize = 256;

/// Thread-safe registry of [`DriverHolder`]s by [`Device`].
pub struct DriversStore {
	drivers: DashMap<Device, Arc<DriverHolder>>,
	locks: DashMap<Device, Arc<Mutex<()>>>,
	events: broadcast::Sender<DriverEvent>,
}

impl Default for DriversStore {
	fn default() -> Self {
		Self::new()
	}
}

impl DriversStore {
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			drivers: DashMap::new(),
			locks: DashMap::new(),
			events,
		}
	}

	/// Receives [`DriverEvent`]s for every registration and eviction.
	pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
		self.events.subscribe()
	}

	pub fn len(&self) -> usize {
		self.drivers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.drivers.is_empty()
	}

	/// Snapshot of the devices that currently have a live driver.
	pub fn devices(&self) -> Vec<Device> {
		self.drivers.iter().map(|e| e.key().clone()).collect()
	}

	pub fn get_driver(&self, device: &Device) -> Option<Arc<DriverHolder>> {
		self.drivers.get(device).map(|e| e.value().clone())
	}

	pub fn get_required_driver(&self, device: &Device) -> Result<Arc<DriverHolder>> {
		self.get_driver(device).ok_or_else(|| Error::DriverNotFound {
			device: Box::new(device.clone()),
		})
	}

	/// First live driver whose holder is tagged with `device_type`.
	///
	/// Iteration order follows the map's sharding, so with several matches
	/// which one is returned is unspecified.
	pub fn find_inited_driver_by_type(&self, device_type: DeviceType) -> Option<Arc<DriverHolder>> {
		self.drivers
			.iter()
			.find(|e| e.value().device_type() == Some(device_type))
			.map(|e| e.value().clone())
	}

	/// Registers `holder` under `device`, quitting any different holder it
	/// replaces before the new one is stored.
	pub async fn add_driver(&self, device: Device, holder: Arc<DriverHolder>) {
		let lock = self.device_lock(&device);
		let _guard = lock.lock().await;
		self.insert_locked(device, holder).await;
	}

	/// Insert step of [`add_driver`](Self::add_driver); the caller must hold
	/// the device lock.
	pub(crate) async fn insert_locked(&self, device: Device, holder: Arc<DriverHolder>) {
		if let Some(previous) = self.get_driver(&device) {
			if Arc::ptr_eq(&previous, &holder) {
				return;
			}
			debug!(target = "drover.store", device = %previous.device(), "replacing live driver");
			self.quit_and_remove(&device, previous).await;
		}
		self.drivers.insert(device.clone(), holder.clone());
		let _ = self.events.send(DriverEvent::Started {
			device_type: holder.device_type().unwrap_or_else(|| device.device_type()),
			device,
			scope: holder.scope(),
			session_id: holder.session_id().to_string(),
		});
	}

	/// Quits and then removes the driver for `device`. Returns whether this
	/// call evicted it.
	pub async fn remove_driver(&self, device: &Device) -> bool {
		let lock = self.device_lock(device);
		let _guard = lock.lock().await;
		match self.get_driver(device) {
			Some(holder) => self.quit_and_remove(device, holder).await,
			None => false,
		}
	}

	/// Evicts every driver. Returns the number evicted by this call.
	pub async fn clear_all(&self) -> usize {
		self.evict_where(|_| true).await
	}

	/// Evicts exactly the drivers in `scope`.
	pub async fn clear_all_scope(&self, scope: DriverScope) -> usize {
		self.evict_where(|h| h.scope() == scope).await
	}

	/// Evicts every driver not in `scope`.
	pub async fn clear_all_besides(&self, scope: DriverScope) -> usize {
		self.evict_where(|h| h.scope() != scope).await
	}

	async fn evict_where<F>(&self, predicate: F) -> usize
	where
		F: Fn(&DriverHolder) -> bool,
	{
		let keys: Vec<Device> = self
			.drivers
			.iter()
			.filter(|e| predicate(e.value().as_ref()))
			.map(|e| e.key().clone())
			.collect();

		let predicate = &predicate;
		let evicted = join_all(keys.iter().map(|device| async move {
			let lock = self.device_lock(device);
			let _guard = lock.lock().await;
			// The slot may have been evicted or replaced since the snapshot.
			match self.get_driver(device) {
				Some(holder) if predicate(holder.as_ref()) => self.quit_and_remove(device, holder).await,
				_ => false,
			}
		}))
		.await;
		evicted.into_iter().filter(|&e| e).count()
	}

	/// Lock serializing initialization, replacement and eviction of the
	/// driver for `device`.
	pub(crate) fn device_lock(&self, device: &Device) -> Arc<Mutex<()>> {
		self.locks
			.entry(device.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Quits `holder` while it is still registered, then drops its entry.
	/// The caller must hold the device lock.
	async fn quit_and_remove(&self, device: &Device, holder: Arc<DriverHolder>) -> bool {
		let clean = match holder.quit().await {
			Ok(_) => true,
			Err(err) => {
				warn!(
					target = "drover.store",
					device = %holder.device(),
					session_id = holder.session_id(),
					error = %err,
					"driver quit failed; evicting anyway"
				);
				false
			}
		};
		if self.drivers.remove_if(device, |_, h| Arc::ptr_eq(h, &holder)).is_none() {
			return false;
		}
		let _ = self.events.send(DriverEvent::Stopped {
			device: holder.device().clone(),
			scope: holder.scope(),
			session_id: holder.session_id().to_string(),
			lifetime_ms: holder.age().as_millis() as u64,
			clean,
		});
		true
	}
}
