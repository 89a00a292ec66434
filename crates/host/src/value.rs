use std::fmt;
use std::rc::Rc;

use crate::error::{HostError, Result};
use crate::object::Object;

/// A dynamically typed host value.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	Str(Rc<str>),
	Object(Object),
}

impl Value {
	/// Creates a string value.
	pub fn str(s: &str) -> Self {
		Self::Str(Rc::from(s))
	}

	pub fn as_object(&self) -> Option<&Object> {
		match self {
			Self::Object(obj) => Some(obj),
			_ => None,
		}
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Self::Undefined)
	}

	/// Returns `true` for objects that carry a native call behavior.
	pub fn is_callable(&self) -> bool {
		self.as_object().is_some_and(Object::is_callable)
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Undefined => "undefined",
			Self::Null => "null",
			Self::Bool(_) => "boolean",
			Self::Number(_) => "number",
			Self::Str(_) => "string",
			Self::Object(obj) if obj.is_callable() => "function",
			Self::Object(_) => "object",
		}
	}

	/// Identity comparison: primitives by value (NaN equals NaN), objects by pointer.
	pub fn same_value(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
			_ => false,
		}
	}

	/// Invokes this value as a function with the given receiver.
	///
	/// # Errors
	///
	/// Returns [`HostError::NotCallable`] when the value has no call behavior, or
	/// whatever the callee itself fails with.
	pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
		match self {
			Self::Object(obj) if obj.is_callable() => obj.call(this, args),
			other => Err(HostError::NotCallable(other.to_string())),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.same_value(other)
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Undefined => f.write_str("undefined"),
			Self::Null => f.write_str("null"),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Number(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{}", *n as i64),
			Self::Number(n) => write!(f, "{n}"),
			Self::Str(s) => f.write_str(s),
			Self::Object(obj) => write!(f, "{obj}"),
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Str(s) => write!(f, "{s:?}"),
			Self::Object(obj) => write!(f, "{obj:?}"),
			other => write!(f, "{other}"),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(f64::from(n))
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::str(s)
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(Rc::from(s))
	}
}

impl From<Object> for Value {
	fn from(obj: Object) -> Self {
		Self::Object(obj)
	}
}
