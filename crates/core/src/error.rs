//! Error taxonomy of the interception layer.
//!
//! | Class | Variants | Surfaced to |
//! |-------|----------|-------------|
//! | caller usage | target syntax/resolution, duplicates, options, readiness | the registering caller |
//! | ownership conflict | [`WrapError::AlreadyOverridden`] | the registering caller |
//! | chain integrity | [`WrapError::ChainIntegrity`] | whoever reused the continuation |
//! | contract violation | never raised; handled inside dispatch | conflict sink |
//! | internal invariant | [`WrapError::Internal`] | logged and reported |

use interpose_host::HostError;
use strum_macros::Display;
use thiserror::Error;

use crate::package::PackageId;

/// Why a continuation refused to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IntegrityFault {
	/// The interceptor owning the continuation already returned (or settled).
	#[strum(to_string = "was invoked after its interceptor completed")]
	Completed,
	/// The chain was structurally modified after the continuation was created.
	#[strum(to_string = "was invoked after the chain was modified")]
	Modified,
	/// The continuation was already invoked once.
	#[strum(to_string = "was invoked twice")]
	CalledTwice,
}

/// Errors raised by registration, resolution and dispatch.
#[derive(Debug, Clone, Error)]
pub enum WrapError {
	/// The target string does not follow the path grammar.
	#[error("invalid target {target:?}: {message} (at byte {position})")]
	InvalidTarget {
		target: String,
		message: String,
		position: usize,
	},

	/// The target lies inside the interception layer's own namespace.
	#[error("cannot target the reserved namespace `{0}`")]
	ReservedNamespace(String),

	/// The first path segment does not resolve.
	#[error("could not find root `{root}` of target {target:?}")]
	RootNotFound { target: String, root: String },

	/// A later path segment does not resolve.
	#[error("could not find `{segment}` while resolving target {target:?}")]
	SegmentNotFound { target: String, segment: String },

	/// A path segment resolved to a primitive, so the walk cannot continue.
	#[error("`{segment}` in target {target:?} is not an object")]
	NotAnObject { target: String, segment: String },

	/// A numeric target that was never issued, or whose wrapper is gone.
	#[error("no wrapper with id {0}")]
	UnknownId(u64),

	/// Neither the owner nor any ancestor defines the member.
	#[error("target {target:?} does not exist")]
	TargetMissing { target: String },

	/// The member exists but forbids redefinition.
	#[error("package `{package}` cannot wrap {target:?}: the member is not configurable")]
	NotConfigurable { package: PackageId, target: String },

	/// A write-path registration on a member that is not a property.
	#[error("{target:?} is not a property, it has no write path")]
	NotAProperty { target: String },

	/// The package already has an interceptor on this target path.
	#[error("package `{package}` already registered an interceptor on {target:?}")]
	AlreadyRegistered { package: PackageId, target: String },

	#[error("invalid category `{0}`")]
	InvalidCategory(String),

	#[error("invalid registration options: {0}")]
	InvalidOptions(String),

	#[error("invalid package id {0:?}")]
	InvalidPackage(String),

	#[error("interceptor from package `{package}` is not callable")]
	NotCallable { package: PackageId },

	/// Registration attempted before the host signalled readiness.
	#[error("package `{package}` tried to register before the ready signal")]
	NotReady { package: PackageId },

	#[error("package `{package}` is not active")]
	InactivePackage { package: PackageId },

	#[error("package `{package}` has no interceptor on {target:?}")]
	NotRegistered { package: PackageId, target: String },

	/// A second NEVER_CONTINUES registration without strictly higher priority.
	#[error(
		"{target:?} is already overridden by `{incumbent}`; package `{package}` cannot override it"
	)]
	AlreadyOverridden {
		package: PackageId,
		incumbent: PackageId,
		target: String,
	},

	/// A continuation was reused illegally.
	#[error("continuation for {target:?} {fault}")]
	ChainIntegrity { target: String, fault: IntegrityFault },

	/// Definitions are locked, so the original member cannot be restored.
	#[error("cannot unwrap {target:?}: member definitions are locked")]
	UnwrapLocked { target: String },

	/// A core invariant does not hold. Indicates a defect, not a caller mistake.
	#[error("internal invariant failure: {0}")]
	Internal(String),

	/// An error raised by host code or an interceptor.
	#[error(transparent)]
	Host(HostError),
}

impl WrapError {
	pub fn is_already_overridden(&self) -> bool {
		matches!(self, Self::AlreadyOverridden { .. })
	}

	pub fn integrity_fault(&self) -> Option<IntegrityFault> {
		match self {
			Self::ChainIntegrity { fault, .. } => Some(*fault),
			_ => None,
		}
	}
}

impl From<HostError> for WrapError {
	fn from(error: HostError) -> Self {
		match error.downcast_ref::<WrapError>() {
			Some(inner) => inner.clone(),
			None => Self::Host(error),
		}
	}
}

impl From<WrapError> for HostError {
	fn from(error: WrapError) -> Self {
		match error {
			WrapError::Host(inner) => inner,
			other => HostError::foreign(other),
		}
	}
}

/// Result type for interception operations.
pub type Result<T, E = WrapError> = std::result::Result<T, E>;
