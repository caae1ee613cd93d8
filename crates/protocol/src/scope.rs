//! Driver lifetime scopes.

use serde::{Deserialize, Serialize};

/// Lifecycle boundary at which a driver is quit and evicted.
///
/// Scopes are ordered by lifetime, not by value: an `Execution` driver
/// outlives every suite, a `Method` driver lives for a single test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverScope {
	/// Lives until the whole run finishes.
	#[default]
	Execution,
	/// Released when the owning suite finishes.
	Suite,
	/// Released when the owning test class finishes.
	Class,
	/// Released after every test method.
	Method,
}

impl DriverScope {
	/// All scopes from the longest lifetime to the shortest.
	pub const ALL: [DriverScope; 4] = [
		DriverScope::Execution,
		DriverScope::Suite,
		DriverScope::Class,
		DriverScope::Method,
	];

	fn lifetime_rank(self) -> u8 {
		match self {
			DriverScope::Execution => 3,
			DriverScope::Suite => 2,
			DriverScope::Class => 1,
			DriverScope::Method => 0,
		}
	}

	/// Returns true if a driver in this scope survives the boundary of `other`.
	pub fn outlives(self, other: DriverScope) -> bool {
		self.lifetime_rank() > other.lifetime_rank()
	}

	pub fn as_str(self) -> &'static str {
		match self {
			DriverScope::Execution => "execution",
			DriverScope::Suite => "suite",
			DriverScope::Class => "class",
			DriverScope::Method => "method",
		}
	}
}

impl std::fmt::Display for DriverScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for DriverScope {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"execution" => Ok(DriverScope::Execution),
			"suite" => Ok(DriverScope::Suite),
			"class" => Ok(DriverScope::Class),
			"method" => Ok(DriverScope::Method),
			other => Err(format!("unknown driver scope '{other}' (expected execution, suite, class or method)")),
		}
	}
}
