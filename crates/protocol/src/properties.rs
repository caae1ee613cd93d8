//! Driver-wide defaults shared by every resolver.

use serde::{Deserialize, Serialize};

use crate::scope::DriverScope;

fn default_startup_timeout_ms() -> u64 {
	60_000
}

/// General driver settings, typically the `driver` section of the
/// execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProperties {
	/// Scope applied when the device does not request one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<DriverScope>,
	/// Selenium Grid endpoint for web devices.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub grid_url: Option<String>,
	/// Appium server endpoint for mobile and desktop devices.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub appium_url: Option<String>,
	/// Upper bound for creating a remote session.
	#[serde(default = "default_startup_timeout_ms")]
	pub startup_timeout_ms: u64,
}

impl Default for DriverProperties {
	fn default() -> Self {
		Self {
			scope: None,
			grid_url: None,
			appium_url: None,
			startup_timeout_ms: default_startup_timeout_ms(),
		}
	}
}

impl DriverProperties {
	pub fn with_scope(mut self, scope: DriverScope) -> Self {
		self.scope = Some(scope);
		self
	}

	pub fn with_grid_url(mut self, url: impl Into<String>) -> Self {
		self.grid_url = Some(url.into());
		self
	}

	pub fn with_appium_url(mut self, url: impl Into<String>) -> Self {
		self.appium_url = Some(url.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_take_defaults() {
		let props: DriverProperties = serde_json::from_str(r#"{"scope":"suite"}"#).unwrap();
		assert_eq!(props.scope, Some(DriverScope::Suite));
		assert_eq!(props.startup_timeout_ms, 60_000);
		assert_eq!(props.grid_url, None);
	}
}
