//! The native driver abstraction wrapped by [`DriverHolder`].
//!
//! [`DriverHolder`]: crate::DriverHolder

use async_trait::async_trait;
use downcast_rs::{DowncastSync, impl_downcast};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One entry from a driver-side log buffer (browser console, driver, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
	pub level: String,
	pub message: String,
	/// Unix epoch milliseconds as reported by the driver.
	#[serde(default)]
	pub timestamp: u64,
}

/// A live connection to a browser, device or application.
///
/// Implementations own exactly one remote session. Only [`quit`](Self::quit)
/// is required to release it; the diagnostics hooks default to
/// [`Error::Unsupported`].
#[async_trait]
pub trait NativeDriver: DowncastSync {
	/// Session identifier assigned by the remote end.
	fn session_id(&self) -> &str;

	/// Ends the remote session and releases native resources.
	async fn quit(&self) -> Result<()>;

	/// PNG bytes of the current viewport.
	async fn screenshot(&self) -> Result<Vec<u8>> {
		Err(Error::Unsupported("screenshot"))
	}

	/// Serialized DOM / view hierarchy of the current page.
	async fn page_source(&self) -> Result<String> {
		Err(Error::Unsupported("page_source"))
	}

	/// Drains the named log buffer (e.g., "browser", "driver", "logcat").
	async fn logs(&self, _kind: &str) -> Result<Vec<LogEntry>> {
		Err(Error::Unsupported("logs"))
	}
}

impl_downcast!(sync NativeDriver);
