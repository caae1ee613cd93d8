//! Device → native driver resolution.
//!
//! A [`DriverResolver`] knows how to start drivers for one [`DeviceType`].
//! The [`DriverManager`](crate::DriverManager) asks resolvers in
//! registration order and uses the first whose [`can_resolve`] accepts the
//! device. Built-in resolvers talk W3C WebDriver to a Selenium Grid
//! ([`RemoteWebResolver`]) or an Appium server ([`AppiumResolver`],
//! [`DesktopResolver`]).
//!
//! [`can_resolve`]: DriverResolver::can_resolve

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drover_protocol::{Browser, Device, DeviceKind, DeviceType, DriverProperties};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::holder::DriverHolder;
use crate::webdriver::{LogEndpoint, RemoteSession};

/// Strategy for turning a [`Device`] into a [`DriverHolder`].
#[async_trait]
pub trait DriverResolver: Send + Sync {
	/// The device type this resolver serves.
	fn device_type(&self) -> DeviceType;

	/// Whether this resolver accepts `device`. Defaults to a type match.
	fn can_resolve(&self, device: &Device) -> bool {
		device.device_type() == self.device_type()
	}

	/// Starts a native driver. Implementations must tag the returned holder
	/// with [`DriverHolder::with_device_type`].
	async fn init_driver(&self, device: &Device) -> Result<DriverHolder>;
}

async fn start_remote(
	client: &Client,
	endpoint: &str,
	device: &Device,
	capabilities: Map<String, Value>,
	log_endpoint: LogEndpoint,
	timeout_ms: u64,
) -> Result<Arc<RemoteSession>> {
	debug!(target = "drover.resolver", %device, endpoint, "starting remote session");
	let start = RemoteSession::start(client, endpoint, capabilities, log_endpoint);
	match tokio::time::timeout(Duration::from_millis(timeout_ms), start).await {
		Ok(session) => Ok(Arc::new(session?)),
		Err(_) => Err(Error::Timeout(format!(
			"session for {device} was not created on {endpoint} within {timeout_ms}ms"
		))),
	}
}

/// Appends `arg` to `caps[options_key].args` unless already present.
fn push_browser_arg(caps: &mut Map<String, Value>, options_key: &str, arg: &str) {
	let options = caps
		.entry(options_key.to_string())
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(options) = options.as_object_mut() else {
		warn!(target = "drover.resolver", options_key, "browser options capability is not an object; leaving it untouched");
		return;
	};
	let args = options.entry("args").or_insert_with(|| Value::Array(Vec::new()));
	if let Some(args) = args.as_array_mut() {
		if !args.iter().any(|a| a.as_str() == Some(arg)) {
			args.push(Value::from(arg));
		}
	}
}

/// Translates a web device into W3C capabilities, including vendor
/// headless switches.
pub fn web_capabilities(device: &Device) -> Map<String, Value> {
	let mut caps = device.capabilities();
	if let DeviceKind::Web { browser, headless: true } = device.kind() {
		match browser {
			Browser::Chrome => push_browser_arg(&mut caps, "goog:chromeOptions", "--headless=new"),
			Browser::Edge => push_browser_arg(&mut caps, "ms:edgeOptions", "--headless=new"),
			Browser::Firefox => push_browser_arg(&mut caps, "moz:firefoxOptions", "-headless"),
			Browser::Safari => {
				warn!(target = "drover.resolver", %device, "safari has no headless mode; starting headed");
			}
		}
	}
	caps
}

/// Resolves [`DeviceType::Web`] devices against a Selenium Grid.
///
/// The grid URL comes from the device, else from
/// [`DriverProperties::grid_url`].
pub struct RemoteWebResolver {
	client: Client,
	properties: DriverProperties,
}

impl RemoteWebResolver {
	pub fn new(client: Client, properties: DriverProperties) -> Self {
		Self { client, properties }
	}
}

#[async_trait]
impl DriverResolver for RemoteWebResolver {
	fn device_type(&self) -> DeviceType {
		DeviceType::Web
	}

	async fn init_driver(&self, device: &Device) -> Result<DriverHolder> {
		let endpoint = device
			.grid_url()
			.or(self.properties.grid_url.as_deref())
			.ok_or_else(|| Error::MissingEndpoint {
				device: Box::new(device.clone()),
			})?;
		let session = start_remote(
			&self.client,
			endpoint,
			device,
			web_capabilities(device),
			LogEndpoint::Selenium,
			self.properties.startup_timeout_ms,
		)
		.await?;
		Ok(DriverHolder::new(device.clone(), session).with_device_type(DeviceType::Web))
	}
}

fn appium_endpoint<'a>(device: &'a Device, properties: &'a DriverProperties) -> Result<&'a str> {
	device
		.grid_url()
		.or(properties.appium_url.as_deref())
		.ok_or_else(|| Error::MissingEndpoint {
			device: Box::new(device.clone()),
		})
}

/// Resolves [`DeviceType::Mobile`] devices against an Appium server.
pub struct AppiumResolver {
	client: Client,
	properties: DriverProperties,
}

impl AppiumResolver {
	pub fn new(client: Client, properties: DriverProperties) -> Self {
		Self { client, properties }
	}
}

#[async_trait]
impl DriverResolver for AppiumResolver {
	fn device_type(&self) -> DeviceType {
		DeviceType::Mobile
	}

	async fn init_driver(&self, device: &Device) -> Result<DriverHolder> {
		let endpoint = appium_endpoint(device, &self.properties)?;
		let session = start_remote(
			&self.client,
			endpoint,
			device,
			device.capabilities(),
			LogEndpoint::Legacy,
			self.properties.startup_timeout_ms,
		)
		.await?;
		Ok(DriverHolder::new(device.clone(), session).with_device_type(DeviceType::Mobile))
	}
}

/// Resolves [`DeviceType::Desktop`] applications through an Appium
/// Windows/Mac driver.
pub struct DesktopResolver {
	client: Client,
	properties: DriverProperties,
}

impl DesktopResolver {
	pub fn new(client: Client, properties: DriverProperties) -> Self {
		Self { client, properties }
	}
}

#[async_trait]
impl DriverResolver for DesktopResolver {
	fn device_type(&self) -> DeviceType {
		DeviceType::Desktop
	}

	async fn init_driver(&self, device: &Device) -> Result<DriverHolder> {
		let endpoint = appium_endpoint(device, &self.properties)?;
		let session = start_remote(
			&self.client,
			endpoint,
			device,
			device.capabilities(),
			LogEndpoint::Legacy,
			self.properties.startup_timeout_ms,
		)
		.await?;
		Ok(DriverHolder::new(device.clone(), session).with_device_type(DeviceType::Desktop))
	}
}

/// The built-in resolvers in their default order: web, mobile, desktop.
pub fn default_resolvers(client: Client, properties: &DriverProperties) -> Vec<Arc<dyn DriverResolver>> {
	vec![
		Arc::new(RemoteWebResolver::new(client.clone(), properties.clone())),
		Arc::new(AppiumResolver::new(client.clone(), properties.clone())),
		Arc::new(DesktopResolver::new(client, properties.clone())),
	]
}

#[cfg(test)]
mod tests {
	use drover_protocol::MobilePlatform;
	use serde_json::json;

	use super::*;

	#[test]
	fn headless_chrome_gets_chrome_options_arg() {
		let device = Device::new(
			"ci",
			DeviceKind::Web {
				browser: Browser::Chrome,
				headless: true,
			},
		);
		let caps = web_capabilities(&device);
		assert_eq!(caps["browserName"], "chrome");
		assert_eq!(caps["goog:chromeOptions"]["args"], json!(["--headless=new"]));
	}

	#[test]
	fn headless_arg_merges_into_declared_options() {
		let device = Device::new(
			"ci",
			DeviceKind::Web {
				browser: Browser::Firefox,
				headless: true,
			},
		)
		.with_capability("moz:firefoxOptions", json!({ "args": ["-private"], "prefs": { "a": 1 } }));
		let caps = web_capabilities(&device);
		assert_eq!(caps["moz:firefoxOptions"]["args"], json!(["-private", "-headless"]));
		assert_eq!(caps["moz:firefoxOptions"]["prefs"]["a"], 1);
	}

	#[test]
	fn headed_devices_keep_plain_capabilities() {
		let device = Device::web("local", Browser::Edge);
		let caps = web_capabilities(&device);
		assert_eq!(caps["browserName"], "MicrosoftEdge");
		assert!(!caps.contains_key("ms:edgeOptions"));
	}

	#[test]
	fn resolvers_match_by_device_type() {
		let resolvers = default_resolvers(Client::new(), &DriverProperties::default());
		let phone = Device::mobile("pixel", MobilePlatform::Android);
		let matched: Vec<DeviceType> = resolvers
			.iter()
			.filter(|r| r.can_resolve(&phone))
			.map(|r| r.device_type())
			.collect();
		assert_eq!(matched, vec![DeviceType::Mobile]);
	}

	#[tokio::test]
	async fn web_resolver_requires_an_endpoint() {
		let resolver = RemoteWebResolver::new(Client::new(), DriverProperties::default());
		let err = resolver.init_driver(&Device::web("main", Browser::Chrome)).await.unwrap_err();
		assert!(matches!(err, Error::MissingEndpoint { .. }));
	}
}
