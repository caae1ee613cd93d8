//! Environment-aware JSON test data.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Loads `<dir>/<environment>/<name>.json`, falling back to
/// `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DataLoader {
	dir: PathBuf,
	environment: String,
}

impl DataLoader {
	pub fn new(dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
		Self {
			dir: dir.into(),
			environment: environment.into(),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// The file `load(name)` would read, if any exists.
	pub fn locate(&self, name: &str) -> Option<PathBuf> {
		let file = format!("{name}.json");
		[self.dir.join(&self.environment).join(&file), self.dir.join(&file)]
			.into_iter()
			.find(|p| p.is_file())
	}

	pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
		let data_error = |reason: String| Error::DataLoading {
			name: name.to_string(),
			reason,
		};
		let path = self.locate(name).ok_or_else(|| {
			data_error(format!(
				"no {name}.json under {} (environment '{}')",
				self.dir.display(),
				self.environment
			))
		})?;
		debug!(target = "drover.data", name, path = %path.display(), "loading test data");
		let content = fs::read_to_string(&path).map_err(|err| data_error(format!("{}: {err}", path.display())))?;
		serde_json::from_str(&content).map_err(|err| data_error(format!("{}: {err}", path.display())))
	}
}
