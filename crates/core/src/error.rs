//! Error types for the drover orchestration layer.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for drover operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors grouped by functional area.
#[derive(Debug, Error)]
pub enum Error {
	/// The base execution configuration could not be loaded.
	#[error("configuration error ({path}): {reason}")]
	Config { path: PathBuf, reason: String },

	/// Environment selection or preparation failed.
	#[error("environment setup failed: {0}")]
	Environment(String),

	/// Test data file could not be loaded or parsed.
	#[error("test data '{name}' could not be loaded: {reason}")]
	DataLoading { name: String, reason: String },

	/// Token acquisition failed.
	#[error("authentication failed for user '{user}': {reason}")]
	Auth { user: String, reason: String },

	/// A fixture requested a component that could not be provided.
	#[error("injection of '{tag}' failed: {reason}")]
	Injection { tag: String, reason: String },

	/// Driver resolution or lifecycle failure.
	#[error(transparent)]
	Driver(#[from] drover_runtime::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

impl Error {
	pub(crate) fn injection(tag: impl std::fmt::Display, reason: impl Into<String>) -> Self {
		Error::Injection {
			tag: tag.to_string(),
			reason: reason.into(),
		}
	}
}
