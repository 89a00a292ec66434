//! Error types raised by host objects and native functions.

use std::error::Error;
use std::rc::Rc;

use thiserror::Error;

use crate::object::Object;
use crate::value::Value;

/// Errors that can occur while reading, writing, defining or calling host members.
#[derive(Debug, Clone, Error)]
pub enum HostError {
	/// A value without call behavior was invoked.
	#[error("{0} is not a function")]
	NotCallable(String),

	/// Generic type error (assigning to a read-only member, missing setter, ...).
	#[error("type error: {0}")]
	Type(String),

	/// The member exists and forbids redefinition.
	#[error("cannot redefine non-configurable member `{0}`")]
	NotConfigurable(Rc<str>),

	/// A new member was added to a sealed object.
	#[error("cannot add member `{0}` to a sealed object")]
	NotExtensible(Rc<str>),

	/// A prototype assignment would have created a cycle.
	#[error("cyclic prototype chain")]
	CyclicPrototype,

	/// A value raised by host code, as opposed to an engine error.
	#[error("uncaught {0}")]
	Thrown(Value),

	/// An error from a layer built on top of the host (for example an interception
	/// layer) travelling through host call frames.
	#[error("{0}")]
	Foreign(Rc<dyn Error>),
}

impl HostError {
	/// Wraps a foreign error so it can cross host call boundaries.
	pub fn foreign<E: Error + 'static>(error: E) -> Self {
		Self::Foreign(Rc::new(error))
	}

	/// Recovers a foreign error of type `E`, if that is what this error carries.
	pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
		match self {
			Self::Foreign(inner) => inner.downcast_ref::<E>(),
			_ => None,
		}
	}

	/// Converts this error into a value that host callbacks can receive.
	///
	/// Thrown values are returned as-is; every other error is boxed into an error
	/// object that [`HostError::from_value`] turns back into the same error.
	pub fn to_value(&self) -> Value {
		match self {
			Self::Thrown(value) => value.clone(),
			other => Value::Object(Object::error(other.clone())),
		}
	}

	/// Inverse of [`HostError::to_value`].
	pub fn from_value(value: Value) -> Self {
		if let Value::Object(obj) = &value {
			if let Some(error) = obj.error_payload() {
				return error;
			}
		}
		Self::Thrown(value)
	}
}

/// Result type for host operations.
pub type Result<T, E = HostError> = std::result::Result<T, E>;
