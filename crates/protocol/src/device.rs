//! Declarative device descriptions.
//!
//! A [`Device`] says which browser, mobile device or desktop application a
//! test needs. Two devices are the same key when their name, kind and
//! declared capabilities match; lifetime hints such as [`DriverScope`] and
//! routing hints such as the grid URL do not change identity.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scope::DriverScope;

/// Coarse device category used to match resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	Web,
	Mobile,
	Desktop,
}

impl std::fmt::Display for DeviceType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DeviceType::Web => write!(f, "web"),
			DeviceType::Mobile => write!(f, "mobile"),
			DeviceType::Desktop => write!(f, "desktop"),
		}
	}
}

/// Desktop browser engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
	#[default]
	Chrome,
	Firefox,
	Edge,
	Safari,
}

impl Browser {
	/// W3C `browserName` value.
	pub fn browser_name(self) -> &'static str {
		match self {
			Browser::Chrome => "chrome",
			Browser::Firefox => "firefox",
			Browser::Edge => "MicrosoftEdge",
			Browser::Safari => "safari",
		}
	}
}

impl std::fmt::Display for Browser {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Browser::Chrome => write!(f, "chrome"),
			Browser::Firefox => write!(f, "firefox"),
			Browser::Edge => write!(f, "edge"),
			Browser::Safari => write!(f, "safari"),
		}
	}
}

/// Mobile operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobilePlatform {
	Android,
	Ios,
}

impl MobilePlatform {
	pub fn platform_name(self) -> &'static str {
		match self {
			MobilePlatform::Android => "Android",
			MobilePlatform::Ios => "iOS",
		}
	}

	/// Default Appium automation engine for the platform.
	pub fn automation_name(self) -> &'static str {
		match self {
			MobilePlatform::Android => "UiAutomator2",
			MobilePlatform::Ios => "XCUITest",
		}
	}
}

/// Kind-specific device fields, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DeviceKind {
	Web {
		#[serde(default)]
		browser: Browser,
		#[serde(default)]
		headless: bool,
	},
	Mobile {
		platform: MobilePlatform,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		device_name: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		app: Option<String>,
	},
	Desktop {
		app: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		platform: Option<String>,
	},
}

impl DeviceKind {
	pub fn device_type(&self) -> DeviceType {
		match self {
			DeviceKind::Web { .. } => DeviceType::Web,
			DeviceKind::Mobile { .. } => DeviceType::Mobile,
			DeviceKind::Desktop { .. } => DeviceType::Desktop,
		}
	}

	/// Identity capabilities implied by the kind itself.
	fn base_capabilities(&self) -> Map<String, Value> {
		let mut caps = Map::new();
		match self {
			DeviceKind::Web { browser, .. } => {
				caps.insert("browserName".into(), Value::from(browser.browser_name()));
			}
			DeviceKind::Mobile { platform, device_name, app } => {
				caps.insert("platformName".into(), Value::from(platform.platform_name()));
				caps.insert("appium:automationName".into(), Value::from(platform.automation_name()));
				if let Some(name) = device_name {
					caps.insert("appium:deviceName".into(), Value::from(name.as_str()));
				}
				if let Some(app) = app {
					caps.insert("appium:app".into(), Value::from(app.as_str()));
				}
			}
			DeviceKind::Desktop { app, platform } => {
				caps.insert("platformName".into(), Value::from(platform.as_deref().unwrap_or("windows")));
				caps.insert("appium:automationName".into(), Value::from("Windows"));
				caps.insert("appium:app".into(), Value::from(app.as_str()));
			}
		}
		caps
	}
}

/// A device a test run needs a driver for.
///
/// Built once through the constructors and `with_*` methods, then shared
/// read-only (typically behind an `Arc` or cloned as a map key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
	name: String,
	#[serde(flatten)]
	kind: DeviceKind,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	capabilities: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	scope: Option<DriverScope>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	grid_url: Option<String>,
}

impl Device {
	pub fn new(name: impl Into<String>, kind: DeviceKind) -> Self {
		Self {
			name: name.into(),
			kind,
			capabilities: Map::new(),
			scope: None,
			grid_url: None,
		}
	}

	/// Shorthand for a desktop browser.
	pub fn web(name: impl Into<String>, browser: Browser) -> Self {
		Self::new(name, DeviceKind::Web { browser, headless: false })
	}

	/// Shorthand for a mobile device with no app (mobile browser session).
	pub fn mobile(name: impl Into<String>, platform: MobilePlatform) -> Self {
		Self::new(
			name,
			DeviceKind::Mobile {
				platform,
				device_name: None,
				app: None,
			},
		)
	}

	/// Shorthand for a desktop application.
	pub fn desktop(name: impl Into<String>, app: impl Into<String>) -> Self {
		Self::new(
			name,
			DeviceKind::Desktop {
				app: app.into(),
				platform: None,
			},
		)
	}

	/// Adds a declared capability. Declared capabilities override the ones
	/// implied by the device kind.
	pub fn with_capability(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.capabilities.insert(key.into(), value.into());
		self
	}

	pub fn with_scope(mut self, scope: DriverScope) -> Self {
		self.scope = Some(scope);
		self
	}

	pub fn with_grid_url(mut self, url: impl Into<String>) -> Self {
		self.grid_url = Some(url.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &DeviceKind {
		&self.kind
	}

	pub fn device_type(&self) -> DeviceType {
		self.kind.device_type()
	}

	/// Scope requested by the device itself, if any.
	pub fn scope(&self) -> Option<DriverScope> {
		self.scope
	}

	pub fn grid_url(&self) -> Option<&str> {
		self.grid_url.as_deref()
	}

	/// Capabilities exactly as declared, without kind-derived keys.
	pub fn declared_capabilities(&self) -> &Map<String, Value> {
		&self.capabilities
	}

	/// Effective W3C capabilities: kind-derived keys overlaid with the
	/// declared ones.
	pub fn capabilities(&self) -> Map<String, Value> {
		let mut caps = self.kind.base_capabilities();
		for (key, value) in &self.capabilities {
			caps.insert(key.clone(), value.clone());
		}
		caps
	}
}

impl PartialEq for Device {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.kind == other.kind && self.capabilities == other.capabilities
	}
}

impl Eq for Device {}

impl Hash for Device {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.kind.hash(state);
		let mut keys: Vec<&String> = self.capabilities.keys().collect();
		keys.sort();
		for key in keys {
			key.hash(state);
			self.capabilities[key.as_str()].to_string().hash(state);
		}
	}
}

impl std::fmt::Display for Device {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.kind {
			DeviceKind::Web { browser, .. } => write!(f, "{} (web/{browser})", self.name),
			DeviceKind::Mobile { platform, .. } => write!(f, "{} (mobile/{})", self.name, platform.platform_name()),
			DeviceKind::Desktop { app, .. } => write!(f, "{} (desktop/{app})", self.name),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn identity_ignores_scope_and_grid() {
		let a = Device::web("main", Browser::Chrome).with_scope(DriverScope::Suite);
		let b = Device::web("main", Browser::Chrome).with_grid_url("http://grid:4444");
		assert_eq!(a, b);

		let mut set = HashSet::new();
		set.insert(a);
		assert!(set.contains(&b));
	}

	#[test]
	fn identity_includes_capabilities() {
		let a = Device::web("main", Browser::Chrome).with_capability("acceptInsecureCerts", true);
		let b = Device::web("main", Browser::Chrome);
		assert_ne!(a, b);
	}

	#[test]
	fn hash_is_independent_of_capability_insertion_order() {
		use std::collections::hash_map::DefaultHasher;

		let a = Device::web("main", Browser::Firefox)
			.with_capability("a", 1)
			.with_capability("b", 2);
		let b = Device::web("main", Browser::Firefox)
			.with_capability("b", 2)
			.with_capability("a", 1);

		let hash = |d: &Device| {
			let mut h = DefaultHasher::new();
			d.hash(&mut h);
			h.finish()
		};
		assert_eq!(a, b);
		assert_eq!(hash(&a), hash(&b));
	}

	#[test]
	fn declared_capabilities_override_kind_defaults() {
		let device = Device::mobile("pixel", MobilePlatform::Android).with_capability("appium:automationName", "Espresso");
		let caps = device.capabilities();
		assert_eq!(caps["platformName"], "Android");
		assert_eq!(caps["appium:automationName"], "Espresso");
	}

	#[test]
	fn deserializes_tagged_kind() {
		let json = serde_json::json!({
			"name": "checkout",
			"type": "web",
			"browser": "firefox",
			"headless": true,
			"scope": "class",
			"capabilities": { "acceptInsecureCerts": true }
		});
		let device: Device = serde_json::from_value(json).unwrap();
		assert_eq!(device.device_type(), DeviceType::Web);
		assert_eq!(device.scope(), Some(DriverScope::Class));
		assert_eq!(
			device.kind(),
			&DeviceKind::Web {
				browser: Browser::Firefox,
				headless: true
			}
		);
		assert_eq!(device.capabilities()["browserName"], "firefox");
	}

	#[test]
	fn deserializes_mobile_fields_in_camel_case() {
		let json = serde_json::json!({
			"name": "iphone",
			"type": "mobile",
			"platform": "ios",
			"deviceName": "iPhone 15",
			"app": "/apps/shop.ipa"
		});
		let device: Device = serde_json::from_value(json).unwrap();
		let caps = device.capabilities();
		assert_eq!(caps["platformName"], "iOS");
		assert_eq!(caps["appium:deviceName"], "iPhone 15");
		assert_eq!(caps["appium:automationName"], "XCUITest");
	}

	#[test]
	fn display_names_kind() {
		let device = Device::desktop("notepad", "C:/Windows/notepad.exe");
		assert_eq!(device.to_string(), "notepad (desktop/C:/Windows/notepad.exe)");
	}
}
