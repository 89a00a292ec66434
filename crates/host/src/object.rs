//! Reference-counted host objects.
//!
//! An [`Object`] owns an insertion-ordered table of [`Descriptor`]s, an optional
//! prototype and an optional native call behavior. Member reads and writes walk
//! the prototype chain and run accessors with an explicit receiver, so a member
//! defined on an ancestor can observe which derived object it was accessed
//! through.
//!
//! Objects are single-threaded (`Rc<RefCell<..>>`). No borrow is held while
//! user code (accessors, native functions) runs, so any callback may freely
//! re-enter the object it was invoked on.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::descriptor::Descriptor;
use crate::error::{HostError, Result};
use crate::value::Value;

/// Native call behavior: `(receiver, arguments) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value>;

#[derive(Default)]
struct ObjectData {
	members: IndexMap<Rc<str>, Descriptor>,
	proto: Option<Object>,
	call: Option<Rc<NativeFn>>,
	name: Option<Rc<str>>,
	error: Option<HostError>,
	sealed: bool,
}

/// Shared handle to a host object.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<ObjectData>>);

/// Non-owning handle to a host object.
#[derive(Clone, Default)]
pub struct WeakObject(Weak<RefCell<ObjectData>>);

impl Object {
	/// Creates an empty object without prototype.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty object inheriting from `proto`.
	pub fn with_proto(proto: &Object) -> Self {
		let obj = Self::new();
		obj.0.borrow_mut().proto = Some(proto.clone());
		obj
	}

	/// Creates a callable object.
	pub fn function(name: &str, f: impl Fn(&Value, &[Value]) -> Result<Value> + 'static) -> Self {
		let obj = Self::new();
		{
			let mut data = obj.0.borrow_mut();
			data.call = Some(Rc::new(f));
			data.name = Some(Rc::from(name));
		}
		obj
	}

	/// Creates an error object carrying `error`, recoverable with [`Object::error_payload`].
	pub fn error(error: HostError) -> Self {
		let obj = Self::new();
		{
			let mut data = obj.0.borrow_mut();
			data.members
				.insert(Rc::from("message"), Descriptor::data(error.to_string()));
			data.error = Some(error);
		}
		obj
	}

	pub fn error_payload(&self) -> Option<HostError> {
		self.0.borrow().error.clone()
	}

	/// Stable identity for the lifetime of the object.
	pub fn id(&self) -> usize {
		Rc::as_ptr(&self.0) as usize
	}

	pub fn ptr_eq(&self, other: &Object) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub fn downgrade(&self) -> WeakObject {
		WeakObject(Rc::downgrade(&self.0))
	}

	pub fn is_callable(&self) -> bool {
		self.0.borrow().call.is_some()
	}

	pub fn name(&self) -> Option<Rc<str>> {
		self.0.borrow().name.clone()
	}

	pub fn prototype(&self) -> Option<Object> {
		self.0.borrow().proto.clone()
	}

	/// Replaces the prototype.
	///
	/// # Errors
	///
	/// Returns [`HostError::CyclicPrototype`] if `proto` inherits from `self`.
	pub fn set_prototype(&self, proto: Option<&Object>) -> Result<()> {
		let mut cursor = proto.cloned();
		while let Some(obj) = cursor {
			if obj.ptr_eq(self) {
				return Err(HostError::CyclicPrototype);
			}
			cursor = obj.prototype();
		}
		self.0.borrow_mut().proto = proto.cloned();
		Ok(())
	}

	/// Returns a copy of the member defined directly on this object.
	pub fn own_property(&self, key: &str) -> Option<Descriptor> {
		self.0.borrow().members.get(key).cloned()
	}

	pub fn has_own_property(&self, key: &str) -> bool {
		self.0.borrow().members.contains_key(key)
	}

	/// Names of the members defined directly on this object, in definition order.
	pub fn own_keys(&self) -> Vec<Rc<str>> {
		self.0.borrow().members.keys().cloned().collect()
	}

	/// Names of the enumerable members defined directly on this object.
	pub fn enumerable_keys(&self) -> Vec<Rc<str>> {
		self.0
			.borrow()
			.members
			.iter()
			.filter(|(_, desc)| desc.is_enumerable())
			.map(|(key, _)| key.clone())
			.collect()
	}

	/// Finds `key` on this object or the nearest ancestor defining it.
	///
	/// Returns the holder together with a copy of its descriptor.
	pub fn find_property(&self, key: &str) -> Option<(Object, Descriptor)> {
		let mut cursor = Some(self.clone());
		while let Some(obj) = cursor {
			if let Some(desc) = obj.own_property(key) {
				return Some((obj, desc));
			}
			cursor = obj.prototype();
		}
		None
	}

	/// Defines or replaces the member `key` on this object.
	///
	/// # Errors
	///
	/// Fails when an existing member is not configurable, or when adding a new
	/// member to a sealed object.
	pub fn define_property(&self, key: &str, desc: Descriptor) -> Result<()> {
		let mut data = self.0.borrow_mut();
		let configurable = data.members.get(key).map(Descriptor::is_configurable);
		match configurable {
			Some(false) => Err(HostError::NotConfigurable(Rc::from(key))),
			None if data.sealed => Err(HostError::NotExtensible(Rc::from(key))),
			Some(true) | None => {
				data.members.insert(Rc::from(key), desc);
				Ok(())
			}
		}
	}

	/// Removes the own member `key`. Returns whether something was removed.
	///
	/// # Errors
	///
	/// Returns [`HostError::NotConfigurable`] if the member forbids removal.
	pub fn delete_property(&self, key: &str) -> Result<bool> {
		let mut data = self.0.borrow_mut();
		match data.members.get(key).map(Descriptor::is_configurable) {
			Some(false) => Err(HostError::NotConfigurable(Rc::from(key))),
			Some(true) => Ok(data.members.shift_remove(key).is_some()),
			None => Ok(false),
		}
	}

	/// Makes every member non-configurable (and data members read-only) and
	/// forbids new members.
	pub fn freeze(&self) {
		let mut data = self.0.borrow_mut();
		data.sealed = true;
		for desc in data.members.values_mut() {
			match desc {
				Descriptor::Data {
					writable,
					configurable,
					..
				} => {
					*writable = false;
					*configurable = false;
				}
				Descriptor::Accessor(acc) => acc.configurable = false,
			}
		}
	}

	/// Reads `key` with this object as receiver.
	pub fn get(&self, key: &str) -> Result<Value> {
		self.get_with(key, &Value::Object(self.clone()))
	}

	/// Reads `key`, running an accessor found anywhere on the chain against `receiver`.
	pub fn get_with(&self, key: &str, receiver: &Value) -> Result<Value> {
		match self.find_property(key) {
			None => Ok(Value::Undefined),
			Some((_, Descriptor::Data { value, .. })) => Ok(value),
			Some((_, Descriptor::Accessor(acc))) => match acc.get {
				Some(getter) => getter.call(receiver, &[]),
				None => Ok(Value::Undefined),
			},
		}
	}

	/// Writes `key` with this object as receiver.
	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
		self.set_with(key, value.into(), &Value::Object(self.clone()))
	}

	/// Writes `key`, running an inherited setter against `receiver` or storing a
	/// data member on `receiver`.
	pub fn set_with(&self, key: &str, value: Value, receiver: &Value) -> Result<()> {
		match self.find_property(key) {
			Some((_, Descriptor::Accessor(acc))) => match acc.set {
				Some(setter) => setter.call(receiver, &[value]).map(drop),
				None => Err(HostError::Type(format!(
					"cannot assign to `{key}`, it has no setter"
				))),
			},
			Some((_, Descriptor::Data {
				writable: false, ..
			})) => Err(HostError::Type(format!("`{key}` is read-only"))),
			_ => match receiver {
				Value::Object(target) => target.write_own(key, value),
				other => Err(HostError::Type(format!(
					"cannot assign `{key}` on {}",
					other.type_name()
				))),
			},
		}
	}

	fn write_own(&self, key: &str, value: Value) -> Result<()> {
		{
			let mut data = self.0.borrow_mut();
			if let Some(Descriptor::Data {
				value: slot,
				writable: true,
				..
			}) = data.members.get_mut(key)
			{
				*slot = value;
				return Ok(());
			}
		}
		self.define_property(key, Descriptor::data(value))
	}

	/// Invokes this object's call behavior.
	pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
		let call = self.0.borrow().call.clone();
		match call {
			Some(f) => f(this, args),
			None => Err(HostError::NotCallable(self.to_string())),
		}
	}

	/// Reads `key` and calls the result with this object as receiver.
	pub fn call_method(&self, key: &str, args: &[Value]) -> Result<Value> {
		let this = Value::Object(self.clone());
		match self.get_with(key, &this)? {
			Value::Object(callee) if callee.is_callable() => callee.call(&this, args),
			other => Err(HostError::NotCallable(format!("member `{key}` ({other})"))),
		}
	}
}

impl WeakObject {
	pub fn upgrade(&self) -> Option<Object> {
		self.0.upgrade().map(Object)
	}

	pub fn is_alive(&self) -> bool {
		self.0.strong_count() > 0
	}

	/// Identity matching [`Object::id`] while the object is alive.
	pub fn id(&self) -> usize {
		Weak::as_ptr(&self.0) as usize
	}
}

impl fmt::Display for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let data = self.0.borrow();
		match (&data.call, &data.name) {
			(Some(_), Some(name)) if !name.is_empty() => write!(f, "[function {name}]"),
			(Some(_), _) => f.write_str("[function]"),
			(None, _) => f.write_str("[object]"),
		}
	}
}

impl fmt::Debug for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{self}@{:#x}", self.id())
	}
}

impl fmt::Debug for WeakObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "(weak)@{:#x}", self.id())
	}
}
