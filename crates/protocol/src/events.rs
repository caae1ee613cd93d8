//! Driver lifecycle notifications.

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceType};
use crate::scope::DriverScope;

/// Emitted by the driver store whenever a driver enters or leaves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DriverEvent {
	/// A driver was initialized and registered.
	Started {
		device: Device,
		device_type: DeviceType,
		scope: DriverScope,
		session_id: String,
	},
	/// A driver was quit and evicted.
	Stopped {
		device: Device,
		scope: DriverScope,
		session_id: String,
		/// Milliseconds between initialization and eviction.
		lifetime_ms: u64,
		/// Whether the native quit call succeeded.
		clean: bool,
	},
}

impl DriverEvent {
	pub fn device(&self) -> &Device {
		match self {
			DriverEvent::Started { device, .. } | DriverEvent::Stopped { device, .. } => device,
		}
	}
}
