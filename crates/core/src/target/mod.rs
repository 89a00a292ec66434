//! Target resolution: from a textual path (or an issued id) to the object and
//! member an interceptor applies to.

mod parser;

use std::rc::Rc;

use interpose_host::{Object, Realm, Value};

pub use self::parser::{ParseError, TargetPath, is_ident, parse};
use crate::error::{Result, WrapError};
use crate::package::INTERNAL_NAMESPACE;
use crate::registry::TargetId;


/// How a caller names a target: a path string or a previously issued id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
	Path(String),
	Id(TargetId),
}

impl From<&str> for TargetRef {
	fn from(path: &str) -> Self {
		Self::Path(path.to_string())
	}
}

impl From<String> for TargetRef {
	fn from(path: String) -> Self {
		Self::Path(path)
	}
}

impl From<&String> for TargetRef {
	fn from(path: &String) -> Self {
		Self::Path(path.clone())
	}
}

impl From<TargetId> for TargetRef {
	fn from(id: TargetId) -> Self {
		Self::Id(id)
	}
}

impl std::fmt::Display for TargetRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Path(path) => f.write_str(path),
			Self::Id(id) => write!(f, "{id}"),
		}
	}
}

/// A resolved target.
#[derive(Debug, Clone)]
pub struct Target {
	/// Object whose own member gets redefined.
	pub owner: Object,
	pub member: Rc<str>,
	/// Canonical path, without marker.
	pub path: String,
	/// Whether the write path was addressed.
	pub setter: bool,
}

/// Parses `text` and resolves it against `realm`.
///
/// # Errors
///
/// Fails with [`WrapError::InvalidTarget`] on syntax errors, and with the
/// resolution errors of [`resolve`].
pub fn resolve_str(realm: &Realm, text: &str) -> Result<Target> {
	let path = parse(text).map_err(|err| WrapError::InvalidTarget {
		target: text.to_string(),
		message: err.message,
		position: err.position,
	})?;
	resolve(realm, &path)
}

/// Resolves a parsed path.
///
/// A one-segment path names a member of the global object. Longer paths
/// resolve the root as an identifier reference (lexical bindings included)
/// and walk the remaining segments by member access; the last segment is the
/// member, the value before it is the owner.
///
/// # Errors
///
/// - [`WrapError::ReservedNamespace`] for paths rooted in the interception namespace.
/// - [`WrapError::RootNotFound`] when the root does not resolve.
/// - [`WrapError::SegmentNotFound`] naming the first segment that does not resolve.
/// - [`WrapError::NotAnObject`] when a segment resolves to a primitive.
pub fn resolve(realm: &Realm, path: &TargetPath) -> Result<Target> {
	if path.root == INTERNAL_NAMESPACE {
		return Err(WrapError::ReservedNamespace(path.canonical()));
	}
	let display = path.canonical();

	let Some((member, parents)) = path.segments.split_last() else {
		return Ok(Target {
			owner: realm.global().clone(),
			member: Rc::from(path.root.as_str()),
			path: display,
			setter: path.setter,
		});
	};

	let mut value = realm
		.lookup(&path.root)?
		.ok_or_else(|| WrapError::RootNotFound {
			target: display.clone(),
			root: path.root.clone(),
		})?;
	let mut name = path.root.as_str();

	for segment in parents {
		let owner = as_owner(&value, &display, name)?;
		if owner.find_property(segment).is_none() {
			return Err(WrapError::SegmentNotFound {
				target: display,
				segment: segment.clone(),
			});
		}
		value = owner.get(segment)?;
		name = segment;
	}

	let owner = as_owner(&value, &display, name)?;
	Ok(Target {
		owner,
		member: Rc::from(member.as_str()),
		path: display,
		setter: path.setter,
	})
}

fn as_owner(value: &Value, target: &str, segment: &str) -> Result<Object> {
	value
		.as_object()
		.cloned()
		.ok_or_else(|| WrapError::NotAnObject {
			target: target.to_string(),
			segment: segment.to_string(),
		})
}
