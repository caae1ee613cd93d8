//! User credentials, token acquisition and per-user token caching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiRequest;
use crate::error::{Error, Result};

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// A configured test user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	/// Key under which the user is configured; filled from the map key
	/// when omitted.
	#[serde(default)]
	pub name: String,
	pub username: String,
	#[serde(default)]
	pub password: String,
}

impl User {
	pub fn new(name: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			username: username.into(),
			password: password.into(),
		}
	}

	/// Cache key: the configured name, or the login if unnamed.
	pub fn key(&self) -> &str {
		if self.name.is_empty() { &self.username } else { &self.name }
	}
}

impl std::fmt::Debug for User {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("User")
			.field("name", &self.name)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// OAuth2 token endpoint settings for [`BearerAuthProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProperties {
	pub token_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}

/// An access token and its expiry.
#[derive(Debug, Clone)]
pub struct AuthToken {
	pub value: String,
	pub token_type: String,
	pub expires_at: Option<Instant>,
}

impl AuthToken {
	pub fn bearer(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			token_type: "Bearer".into(),
			expires_at: None,
		}
	}

	pub fn expiring_in(mut self, ttl: Duration) -> Self {
		self.expires_at = Some(Instant::now() + ttl);
		self
	}

	pub fn is_expired(&self) -> bool {
		self.expires_at
			.is_some_and(|at| Instant::now() + EXPIRY_MARGIN >= at)
	}

	/// Value for the `Authorization` header.
	pub fn header_value(&self) -> String {
		format!("{} {}", self.token_type, self.value)
	}
}

/// Acquires tokens for users and applies them to requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
	async fn get_auth_token(&self, user: &User) -> Result<AuthToken>;

	/// Attaches `token` to `request`. Defaults to an `Authorization` header.
	fn apply(&self, token: &AuthToken, request: &mut ApiRequest) {
		request.set_header("Authorization", token.header_value());
	}
}

/// Caches one token per user, refreshing expired ones through the
/// provider.
///
/// Concurrent refreshes for the same user are not coalesced; each caller
/// may hit the provider and the last write wins.
pub struct TokenCache {
	provider: Arc<dyn AuthProvider>,
	tokens: DashMap<String, AuthToken>,
}

impl TokenCache {
	pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
		Self {
			provider,
			tokens: DashMap::new(),
		}
	}

	/// A valid token for `user`, fetching a new one when missing or expired.
	pub async fn token(&self, user: &User) -> Result<AuthToken> {
		if let Some(token) = self.tokens.get(user.key()).filter(|t| !t.is_expired()) {
			return Ok(token.clone());
		}
		debug!(target = "drover.auth", user = user.key(), "fetching auth token");
		let token = self.provider.get_auth_token(user).await?;
		self.tokens.insert(user.key().to_string(), token.clone());
		Ok(token)
	}

	/// Authenticates `request` as `user`.
	pub async fn auth(&self, user: &User, request: &mut ApiRequest) -> Result<()> {
		let token = self.token(user).await?;
		self.provider.apply(&token, request);
		Ok(())
	}

	pub fn invalidate(&self, user: &User) {
		self.tokens.remove(user.key());
	}

	pub fn clear(&self) {
		self.tokens.clear();
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<u64>,
}

/// OAuth2 token endpoint client: password grant for users with a login,
/// client credentials otherwise.
pub struct BearerAuthProvider {
	client: Client,
	properties: AuthProperties,
}

impl BearerAuthProvider {
	pub fn new(client: Client, properties: AuthProperties) -> Self {
		Self { client, properties }
	}
}

#[async_trait]
impl AuthProvider for BearerAuthProvider {
	async fn get_auth_token(&self, user: &User) -> Result<AuthToken> {
		let auth_error = |reason: String| Error::Auth {
			user: user.key().to_string(),
			reason,
		};

		// Users without a login authenticate as the client itself.
		let mut form = if user.username.is_empty() {
			vec![("grant_type", "client_credentials")]
		} else {
			vec![
				("grant_type", "password"),
				("username", user.username.as_str()),
				("password", user.password.as_str()),
			]
		};
		if let Some(id) = &self.properties.client_id {
			form.push(("client_id", id.as_str()));
		}
		if let Some(secret) = &self.properties.client_secret {
			form.push(("client_secret", secret.as_str()));
		}
		if let Some(scope) = &self.properties.scope {
			form.push(("scope", scope.as_str()));
		}

		let response = self.client.post(&self.properties.token_url).form(&form).send().await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(auth_error(format!("token endpoint returned {status}: {body}")));
		}
		let parsed: TokenResponse = response
			.json()
			.await
			.map_err(|err| auth_error(format!("malformed token response: {err}")))?;

		let token = AuthToken {
			value: parsed.access_token,
			token_type: parsed.token_type.unwrap_or_else(|| "Bearer".into()),
			expires_at: None,
		};
		Ok(match parsed.expires_in {
			Some(secs) => token.expiring_in(Duration::from_secs(secs)),
			None => token,
		})
	}
}

/// Hands out a fixed token regardless of user.
pub struct StaticTokenProvider {
	token: AuthToken,
}

impl StaticTokenProvider {
	pub fn new(token: AuthToken) -> Self {
		Self { token }
	}
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
	async fn get_auth_token(&self, _user: &User) -> Result<AuthToken> {
		Ok(self.token.clone())
	}
}
