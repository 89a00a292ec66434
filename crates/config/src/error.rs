//! Error types for settings parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unexpected field.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a settings file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A priority override names an empty package id.
	#[error("priority override with an empty package id")]
	EmptyPackageId,
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
