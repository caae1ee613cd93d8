//! Execution configuration loading.
//!
//! The configuration is a JSON document located, in order, at an explicit
//! path, at `$DROVER_CONFIG`, or at `./drover.json`. String values may
//! reference the process environment with `${VAR}` or `${VAR:-default}`.
//! An entry whose placeholder cannot be resolved is logged and dropped
//! rather than failing the whole run; failing to read or parse the file
//! is fatal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use drover_protocol::{DriverProperties, Environment};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{AuthProperties, User};
use crate::error::{Error, Result};

/// Schema version for configuration files.
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DROVER_CONFIG";
/// Environment variable selecting the active environment.
pub const ENVIRONMENT_ENV: &str = "DROVER_ENV";
/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "drover.json";
/// Environment name used when nothing selects one.
pub const DEFAULT_ENVIRONMENT: &str = "default";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder pattern is valid")
});

fn default_true() -> bool {
	true
}

/// Controls which attachments finish processors produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingProperties {
	/// Only enrich results of failed tests.
	#[serde(default = "default_true")]
	pub attach_on_failure_only: bool,
	#[serde(default = "default_true")]
	pub screenshot: bool,
	#[serde(default = "default_true")]
	pub page_source: bool,
	#[serde(default)]
	pub driver_logs: bool,
	#[serde(default = "default_true")]
	pub api_log: bool,
	/// Where attachments and the run report are written. Nothing is
	/// written when unset.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifacts_dir: Option<PathBuf>,
}

impl Default for ReportingProperties {
	fn default() -> Self {
		Self {
			attach_on_failure_only: true,
			screenshot: true,
			page_source: true,
			driver_logs: false,
			api_log: true,
			artifacts_dir: None,
		}
	}
}

/// Whole-run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
	#[serde(default)]
	pub schema: u32,
	#[serde(default)]
	pub driver: DriverProperties,
	#[serde(default)]
	pub reporting: ReportingProperties,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub environments: BTreeMap<String, Environment>,
	/// Active environment name; `$DROVER_ENV` takes precedence.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data_dir: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub users: BTreeMap<String, User>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<AuthProperties>,
}

impl ExecutionConfig {
	/// Creates an empty config with current [`SCHEMA_VERSION`].
	pub fn new() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			..Default::default()
		}
	}

	/// Resolves the config path: explicit, then `$DROVER_CONFIG`, then
	/// `./drover.json`.
	pub fn locate(explicit: Option<&Path>) -> PathBuf {
		explicit
			.map(Path::to_path_buf)
			.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
			.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
	}

	/// Loads the configuration, resolving placeholders from the process
	/// environment.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		let path = Self::locate(explicit);
		Self::load_from(&path, |name| std::env::var(name).ok())
	}

	/// Loads `path`, resolving placeholders through `lookup`.
	pub fn load_from<F>(path: &Path, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let config_error = |reason: String| Error::Config {
			path: path.to_path_buf(),
			reason,
		};

		let content = fs::read_to_string(path).map_err(|err| config_error(err.to_string()))?;
		let mut value: Value = serde_json::from_str(&content).map_err(|err| config_error(err.to_string()))?;
		resolve_placeholders(&mut value, &lookup, "");

		let schema = value.get("schema").and_then(Value::as_u64).unwrap_or(SCHEMA_VERSION as u64);
		if schema != SCHEMA_VERSION as u64 {
			return Err(config_error(format!(
				"unsupported schema {schema} (expected {SCHEMA_VERSION})"
			)));
		}

		let mut config: Self = serde_json::from_value(value).map_err(|err| config_error(err.to_string()))?;
		config.schema = SCHEMA_VERSION;
		for (name, env) in config.environments.iter_mut() {
			if env.name.is_empty() {
				env.name = name.clone();
			}
		}
		for (name, user) in config.users.iter_mut() {
			if user.name.is_empty() {
				user.name = name.clone();
			}
		}
		debug!(
			target = "drover.config",
			path = %path.display(),
			environments = config.environments.len(),
			"loaded execution config"
		);
		Ok(config)
	}

	/// Name of the environment to use: explicit override, then
	/// `$DROVER_ENV`, then the configured default, then `"default"`.
	pub fn active_environment_name(&self, explicit: Option<&str>) -> String {
		explicit
			.map(str::to_string)
			.or_else(|| std::env::var(ENVIRONMENT_ENV).ok().filter(|s| !s.is_empty()))
			.or_else(|| self.environment.clone())
			.unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
	}

	/// Looks up an environment by name.
	pub fn environment(&self, name: &str) -> Result<Environment> {
		let mut env = self.environments.get(name).cloned().ok_or_else(|| {
			let known: Vec<&str> = self.environments.keys().map(String::as_str).collect();
			Error::Environment(format!("unknown environment '{name}' (configured: {})", known.join(", ")))
		})?;
		if env.name.is_empty() {
			env.name = name.to_string();
		}
		Ok(env)
	}

	/// The environment selected by [`active_environment_name`](Self::active_environment_name).
	pub fn active_environment(&self, explicit: Option<&str>) -> Result<Environment> {
		self.environment(&self.active_environment_name(explicit))
	}

	pub fn user(&self, name: &str) -> Option<&User> {
		self.users.get(name)
	}
}

enum Resolved {
	Unchanged,
	Replaced(String),
	Missing(String),
}

fn resolve_str<F>(input: &str, lookup: &F) -> Resolved
where
	F: Fn(&str) -> Option<String>,
{
	if !input.contains("${") {
		return Resolved::Unchanged;
	}
	let mut missing = None;
	let replaced = PLACEHOLDER.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match lookup(name).or_else(|| caps.get(2).map(|m| m.as_str().to_string())) {
			Some(value) => value,
			None => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			}
		}
	});
	match missing {
		Some(name) => Resolved::Missing(name),
		None => Resolved::Replaced(replaced.into_owned()),
	}
}

/// Substitutes placeholders in every string of `value`, dropping object
/// entries and array items whose placeholders are unresolved.
pub fn resolve_placeholders<F>(value: &mut Value, lookup: &F, path: &str)
where
	F: Fn(&str) -> Option<String>,
{
	match value {
		Value::Object(map) => {
			let mut dropped = Vec::new();
			for (key, child) in map.iter_mut() {
				let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
				if let Value::String(s) = child {
					match resolve_str(s, lookup) {
						Resolved::Unchanged => {}
						Resolved::Replaced(new) => *s = new,
						Resolved::Missing(var) => {
							warn!(target = "drover.config", key = %child_path, variable = %var, "unresolved placeholder; skipping entry");
							dropped.push(key.clone());
						}
					}
				} else {
					resolve_placeholders(child, lookup, &child_path);
				}
			}
			for key in dropped {
				map.remove(&key);
			}
		}
		Value::Array(items) => {
			let mut index = 0;
			items.retain_mut(|item| {
				let item_path = format!("{path}[{index}]");
				index += 1;
				if let Value::String(s) = item {
					match resolve_str(s, lookup) {
						Resolved::Unchanged => true,
						Resolved::Replaced(new) => {
							*s = new;
							true
						}
						Resolved::Missing(var) => {
							warn!(target = "drover.config", key = %item_path, variable = %var, "unresolved placeholder; skipping entry");
							false
						}
					}
				} else {
					resolve_placeholders(item, lookup, &item_path);
					true
				}
			});
		}
		_ => {}
	}
}
