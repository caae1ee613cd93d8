//! HTTP client for API steps, with per-user authentication and call
//! recording into the test context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{TokenCache, User};
use crate::context::TestExecutionContext;
use crate::error::{Error, Result};

/// An outgoing API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
	pub method: Method,
	pub url: String,
	/// Header names are stored lowercased.
	pub headers: BTreeMap<String, String>,
	pub body: Option<Value>,
	/// Authenticate as this user before sending.
	pub user: Option<User>,
}

impl ApiRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			headers: BTreeMap::new(),
			body: None,
			user: None,
		}
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::POST, url)
	}

	pub fn with_json(mut self, body: Value) -> Self {
		self.body = Some(body);
		self
	}

	pub fn as_user(mut self, user: User) -> Self {
		self.user = Some(user);
		self
	}

	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.set_header(name, value);
		self
	}

	pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
		self.headers.insert(name.to_ascii_lowercase(), value.into());
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}

/// A received API response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
	pub status: u16,
	pub headers: BTreeMap<String, String>,
	pub body: Vec<u8>,
}

impl ApiResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}
}

/// One API call as recorded in the test context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
	pub method: String,
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	pub duration_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Sends [`ApiRequest`]s, resolving relative URLs against a base URL.
#[derive(Clone)]
pub struct ApiClient {
	http: Client,
	base_url: Option<String>,
	tokens: Option<Arc<TokenCache>>,
}

impl ApiClient {
	pub fn new(http: Client) -> Self {
		Self {
			http,
			base_url: None,
			tokens: None,
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	pub fn with_tokens(mut self, tokens: Arc<TokenCache>) -> Self {
		self.tokens = Some(tokens);
		self
	}

	fn resolve_url(&self, url: &str) -> String {
		match &self.base_url {
			Some(base) if !url.contains("://") => {
				format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
			}
			_ => url.to_string(),
		}
	}

	/// Sends `request`, recording the call into `ctx` when given.
	///
	/// Non-2xx statuses are returned as responses, not errors.
	pub async fn send(&self, mut request: ApiRequest, ctx: Option<&TestExecutionContext>) -> Result<ApiResponse> {
		let url = self.resolve_url(&request.url);
		let user = request.user.clone();
		if let Some(user) = &user {
			let tokens = self.tokens.as_ref().ok_or_else(|| Error::Auth {
				user: user.key().to_string(),
				reason: "no auth provider configured".into(),
			})?;
			tokens.auth(user, &mut request).await?;
		}

		let started = Instant::now();
		let result = self.dispatch(&request, &url).await;
		let duration_ms = started.elapsed().as_millis() as u64;

		debug!(
			target = "drover.api",
			method = %request.method,
			url = %url,
			status = result.as_ref().ok().map(|r| r.status),
			duration_ms,
			"api call"
		);

		if let Some(ctx) = ctx {
			ctx.record_api_call(ApiCall {
				method: request.method.to_string(),
				url,
				status: result.as_ref().ok().map(|r| r.status),
				duration_ms,
				user: user.map(|u| u.key().to_string()),
				error: result.as_ref().err().map(ToString::to_string),
			});
		}
		result
	}

	async fn dispatch(&self, request: &ApiRequest, url: &str) -> Result<ApiResponse> {
		let mut builder = self.http.request(request.method.clone(), url);
		for (name, value) in &request.headers {
			builder = builder.header(name, value);
		}
		if let Some(body) = &request.body {
			builder = builder.json(body);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
			.collect();
		let body = response.bytes().await?.to_vec();
		Ok(ApiResponse { status, headers, body })
	}
}
