//! Settings consumed by the interception core.
//!
//! The administration surface that edits these values lives elsewhere; this
//! crate only defines their shape and how they are read.
//!
//! ```toml
//! # Let AUTOMATIC interceptors use the precomputed dispatch chain.
//! fast_mode = true
//! # Report repeated conflicts instead of only the first one.
//! verbose = false
//! # Install wrappers as non-configurable; unwrapping then fails.
//! lock_definitions = false
//!
//! [priorities]
//! "my-package" = 10
//! "other-package" = -5
//! ```

mod error;

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::debug;

pub use error::{ConfigError, Result};

/// Settings read by the interception core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	/// Global fast-mode switch for interceptors registered with the AUTOMATIC hint.
	pub fast_mode: bool,
	/// Surface every conflict occurrence instead of only the first per interceptor.
	pub verbose: bool,
	/// Install redefinitions permanently; unwrapping a target becomes an error.
	pub lock_definitions: bool,
	/// Per-package priority overrides (higher dispatches first within a category).
	pub priorities: FxHashMap<String, i32>,
}

impl Settings {
	/// Parses settings from a TOML document.
	pub fn from_toml(src: &str) -> Result<Self> {
		let settings: Self = toml::from_str(src)?;
		if settings.priorities.keys().any(String::is_empty) {
			return Err(ConfigError::EmptyPackageId);
		}
		Ok(settings)
	}

	/// Reads and parses a settings file.
	pub fn load(path: &Path) -> Result<Self> {
		let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let settings = Self::from_toml(&src)?;
		debug!(
			path = %path.display(),
			priorities = settings.priorities.len(),
			fast_mode = settings.fast_mode,
			"loaded settings"
		);
		Ok(settings)
	}

	/// Configured priority override for `package`.
	pub fn priority(&self, package: &str) -> Option<i32> {
		self.priorities.get(package).copied()
	}

	/// Builder-style priority override.
	pub fn with_priority(mut self, package: &str, priority: i32) -> Self {
		self.priorities.insert(package.to_string(), priority);
		self
	}
}

#[cfg(test)]
mod tests;
