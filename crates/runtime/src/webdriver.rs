//! Minimal W3C WebDriver client for remote grids and Appium servers.
//!
//! Only the commands the lifecycle needs are implemented: new session,
//! delete session, screenshot, page source, current URL and log retrieval.
//! Element location and waits are left to dedicated WebDriver crates.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::native::{LogEntry, NativeDriver};

/// Path segment (relative to the session) used to fetch log buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEndpoint {
	/// Selenium Grid / chromedriver extension: `se/log`.
	Selenium,
	/// Appium and legacy JSON wire: `log`.
	Legacy,
}

impl LogEndpoint {
	fn path(self) -> &'static str {
		match self {
			LogEndpoint::Selenium => "se/log",
			LogEndpoint::Legacy => "log",
		}
	}
}

/// A remote WebDriver session.
pub struct RemoteSession {
	client: Client,
	session_url: Url,
	session_id: String,
	capabilities: Value,
	log_endpoint: LogEndpoint,
}

impl std::fmt::Debug for RemoteSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteSession")
			.field("session_url", &self.session_url.as_str())
			.field("session_id", &self.session_id)
			.finish()
	}
}

/// Normalizes an endpoint so relative joins append instead of replace.
pub(crate) fn endpoint_url(endpoint: &str) -> Result<Url> {
	let mut url = Url::parse(endpoint)?;
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	Ok(url)
}

impl RemoteSession {
	/// Creates a new session on `endpoint` with the given `alwaysMatch`
	/// capabilities.
	pub async fn start(client: &Client, endpoint: &str, capabilities: Map<String, Value>, log_endpoint: LogEndpoint) -> Result<Self> {
		let base = endpoint_url(endpoint)?;
		let body = json!({ "capabilities": { "alwaysMatch": capabilities } });

		debug!(target = "drover.webdriver", endpoint = %base, "creating remote session");
		let value = send(client, Method::POST, base.join("session")?, Some(body)).await?;

		let session_id = value
			.get("sessionId")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::WebDriver {
				error: "session not created".into(),
				message: "new session response carried no sessionId".into(),
			})?
			.to_string();
		let capabilities = value.get("capabilities").cloned().unwrap_or(Value::Null);
		let session_url = base.join(&format!("session/{session_id}"))?;

		debug!(target = "drover.webdriver", %session_id, "remote session created");
		Ok(Self {
			client: client.clone(),
			session_url,
			session_id,
			capabilities,
			log_endpoint,
		})
	}

	/// Capabilities the remote end actually granted.
	pub fn capabilities(&self) -> &Value {
		&self.capabilities
	}

	pub async fn current_url(&self) -> Result<String> {
		let value = self.command(Method::GET, "url", None).await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
		let url = Url::parse(&format!("{}/{path}", self.session_url))?;
		send(&self.client, method, url, body).await
	}
}

async fn send(client: &Client, method: Method, url: Url, body: Option<Value>) -> Result<Value> {
	let mut request = client.request(method, url);
	if let Some(body) = body {
		request = request.json(&body);
	}
	let response = request.send().await?;
	let status = response.status();
	let text = response.text().await?;

	if !status.is_success() {
		// Proxies in front of a grid answer with HTML or plain text.
		let value = serde_json::from_str::<Value>(&text)
			.ok()
			.and_then(|payload| payload.get("value").cloned())
			.unwrap_or(Value::Null);
		let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
		let message = match value.get("message").and_then(Value::as_str) {
			Some(message) => message.to_string(),
			None if !text.trim().is_empty() => format!("{status}: {}", text.trim()),
			None => status.to_string(),
		};
		return Err(Error::WebDriver { error, message });
	}
	let payload: Value = serde_json::from_str(&text)?;
	Ok(payload.get("value").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl NativeDriver for RemoteSession {
	fn session_id(&self) -> &str {
		&self.session_id
	}

	async fn quit(&self) -> Result<()> {
		match send(&self.client, Method::DELETE, self.session_url.clone(), None).await {
			Ok(_) => Ok(()),
			Err(Error::WebDriver { error, .. }) if error == "invalid session id" => {
				warn!(target = "drover.webdriver", session_id = %self.session_id, "session already gone on quit");
				Ok(())
			}
			Err(err) => Err(err),
		}
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		let value = self.command(Method::GET, "screenshot", None).await?;
		let encoded = value.as_str().unwrap_or_default();
		Ok(STANDARD.decode(encoded)?)
	}

	async fn page_source(&self) -> Result<String> {
		let value = self.command(Method::GET, "source", None).await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	async fn logs(&self, kind: &str) -> Result<Vec<LogEntry>> {
		let value = self
			.command(Method::POST, self.log_endpoint.path(), Some(json!({ "type": kind })))
			.await?;
		Ok(serde_json::from_value(value)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoint_url_appends_trailing_slash() {
		let url = endpoint_url("http://grid:4444/wd/hub").unwrap();
		assert_eq!(url.join("session").unwrap().as_str(), "http://grid:4444/wd/hub/session");

		let url = endpoint_url("http://grid:4444").unwrap();
		assert_eq!(url.join("session").unwrap().as_str(), "http://grid:4444/session");
	}

	#[test]
	fn endpoint_url_rejects_garbage() {
		assert!(matches!(endpoint_url("not a url"), Err(Error::Url(_))));
	}
}
