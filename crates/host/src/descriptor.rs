use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::object::Object;
use crate::value::Value;

/// Definition of one named member of an object.
#[derive(Clone)]
pub enum Descriptor {
	/// A stored value.
	Data {
		value: Value,
		writable: bool,
		enumerable: bool,
		configurable: bool,
	},
	/// A read/write accessor pair.
	Accessor(Accessor),
}

/// Accessor half of a [`Descriptor`].
#[derive(Clone, Default)]
pub struct Accessor {
	pub get: Option<Object>,
	pub set: Option<Object>,
	pub enumerable: bool,
	pub configurable: bool,
	/// Opaque token left by whoever installed the accessor, so that layer can
	/// recognise its own definitions later.
	pub tag: Option<Rc<dyn Any>>,
}

impl Descriptor {
	/// A writable, enumerable, configurable data member.
	pub fn data(value: impl Into<Value>) -> Self {
		Self::Data {
			value: value.into(),
			writable: true,
			enumerable: true,
			configurable: true,
		}
	}

	/// A read-only, non-configurable data member.
	pub fn frozen(value: impl Into<Value>) -> Self {
		Self::Data {
			value: value.into(),
			writable: false,
			enumerable: true,
			configurable: false,
		}
	}

	/// A configurable accessor pair without a tag.
	pub fn accessor(get: Option<Object>, set: Option<Object>) -> Self {
		Self::Accessor(Accessor {
			get,
			set,
			enumerable: true,
			configurable: true,
			tag: None,
		})
	}

	pub fn is_configurable(&self) -> bool {
		match self {
			Self::Data { configurable, .. } => *configurable,
			Self::Accessor(acc) => acc.configurable,
		}
	}

	pub fn is_enumerable(&self) -> bool {
		match self {
			Self::Data { enumerable, .. } => *enumerable,
			Self::Accessor(acc) => acc.enumerable,
		}
	}

	pub fn is_accessor(&self) -> bool {
		matches!(self, Self::Accessor(_))
	}

	pub fn value(&self) -> Option<&Value> {
		match self {
			Self::Data { value, .. } => Some(value),
			Self::Accessor(_) => None,
		}
	}

	pub fn getter(&self) -> Option<&Object> {
		match self {
			Self::Accessor(acc) => acc.get.as_ref(),
			Self::Data { .. } => None,
		}
	}

	pub fn setter(&self) -> Option<&Object> {
		match self {
			Self::Accessor(acc) => acc.set.as_ref(),
			Self::Data { .. } => None,
		}
	}

	pub fn tag(&self) -> Option<&Rc<dyn Any>> {
		match self {
			Self::Accessor(acc) => acc.tag.as_ref(),
			Self::Data { .. } => None,
		}
	}

	/// Structural equality: same kind, same flags, identical values and accessors.
	pub fn same_as(&self, other: &Self) -> bool {
		match (self, other) {
			(
				Self::Data {
					value: a,
					writable: aw,
					enumerable: ae,
					configurable: ac,
				},
				Self::Data {
					value: b,
					writable: bw,
					enumerable: be,
					configurable: bc,
				},
			) => a.same_value(b) && aw == bw && ae == be && ac == bc,
			(Self::Accessor(a), Self::Accessor(b)) => {
				same_object(a.get.as_ref(), b.get.as_ref())
					&& same_object(a.set.as_ref(), b.set.as_ref())
					&& a.enumerable == b.enumerable
					&& a.configurable == b.configurable
			}
			_ => false,
		}
	}
}

fn same_object(a: Option<&Object>, b: Option<&Object>) -> bool {
	match (a, b) {
		(Some(a), Some(b)) => a.ptr_eq(b),
		(None, None) => true,
		_ => false,
	}
}

impl fmt::Debug for Descriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Data {
				value,
				writable,
				enumerable,
				configurable,
			} => f
				.debug_struct("Data")
				.field("value", value)
				.field("writable", writable)
				.field("enumerable", enumerable)
				.field("configurable", configurable)
				.finish(),
			Self::Accessor(acc) => f
				.debug_struct("Accessor")
				.field("get", &acc.get)
				.field("set", &acc.set)
				.field("enumerable", &acc.enumerable)
				.field("configurable", &acc.configurable)
				.field("tagged", &acc.tag.is_some())
				.finish(),
		}
	}
}
