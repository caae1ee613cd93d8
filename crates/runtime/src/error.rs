//! Error types for driver resolution and lifecycle.

use drover_protocol::Device;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, holding or evicting drivers.
#[derive(Debug, Error)]
pub enum Error {
	/// No registered resolver accepts the device.
	#[error("No driver resolver registered for device {device}")]
	NoResolver { device: Box<Device> },

	/// A resolver accepted the device but failed to start a driver.
	#[error("Failed to initialize driver for device {device}: {source}")]
	DriverInit {
		device: Box<Device>,
		#[source]
		source: Box<Error>,
	},

	/// A resolver returned a holder without tagging its device type.
	#[error("Driver resolver for device {device} did not set a device type")]
	DeviceTypeUnset { device: Box<Device> },

	/// Required driver lookup missed.
	#[error("No live driver for device {device}")]
	DriverNotFound { device: Box<Device> },

	/// No grid / server URL could be determined for a remote session.
	#[error("No remote endpoint configured for device {device}")]
	MissingEndpoint { device: Box<Device> },

	/// W3C WebDriver error response.
	#[error("WebDriver {error}: {message}")]
	WebDriver {
		/// W3C error code (e.g., "session not created", "invalid session id")
		error: String,
		message: String,
	},

	/// Operation not supported by this native driver.
	#[error("Operation not supported by driver: {0}")]
	Unsupported(&'static str),

	/// Timeout waiting for a remote endpoint.
	#[error("Timeout: {0}")]
	Timeout(String),

	#[error("Invalid endpoint URL: {0}")]
	Url(#[from] url::ParseError),

	/// HTTP transport error.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Base64 decode error: {0}")]
	Base64(#[from] base64::DecodeError),
}

impl Error {
	pub(crate) fn driver_init(device: &Device, source: Error) -> Self {
		Error::DriverInit {
			device: Box::new(device.clone()),
			source: Box::new(source),
		}
	}

	/// Device this error was raised for, when it names one.
	pub fn device(&self) -> Option<&Device> {
		match self {
			Error::NoResolver { device }
			| Error::DriverInit { device, .. }
			| Error::DeviceTypeUnset { device }
			| Error::DriverNotFound { device }
			| Error::MissingEndpoint { device } => Some(device),
			_ => None,
		}
	}
}
