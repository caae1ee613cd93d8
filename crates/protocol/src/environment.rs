//! Named run environments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::{Device, DeviceType};

/// A named set of devices plus free-form run parameters (locale, base URL,
/// default user and so on).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub devices: Vec<Device>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub params: Map<String, Value>,
}

impl Environment {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn with_device(mut self, device: Device) -> Self {
		self.devices.push(device);
		self
	}

	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.params.insert(key.into(), value.into());
		self
	}

	/// First declared device of the given type.
	pub fn device_by_type(&self, device_type: DeviceType) -> Option<&Device> {
		self.devices.iter().find(|d| d.device_type() == device_type)
	}

	pub fn device(&self, name: &str) -> Option<&Device> {
		self.devices.iter().find(|d| d.name() == name)
	}

	/// String parameter lookup; non-string values are not coerced.
	pub fn param_str(&self, key: &str) -> Option<&str> {
		self.params.get(key).and_then(Value::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::{Browser, MobilePlatform};

	#[test]
	fn finds_first_device_by_type() {
		let env = Environment::new("staging")
			.with_device(Device::mobile("pixel", MobilePlatform::Android))
			.with_device(Device::web("chrome", Browser::Chrome))
			.with_device(Device::web("firefox", Browser::Firefox));

		assert_eq!(env.device_by_type(DeviceType::Web).map(Device::name), Some("chrome"));
		assert_eq!(env.device_by_type(DeviceType::Desktop), None);
		assert_eq!(env.device("firefox").map(Device::device_type), Some(DeviceType::Web));
	}

	#[test]
	fn param_str_ignores_non_strings() {
		let env = Environment::new("local").with_param("locale", "de-DE").with_param("retries", 2);
		assert_eq!(env.param_str("locale"), Some("de-DE"));
		assert_eq!(env.param_str("retries"), None);
	}
}
