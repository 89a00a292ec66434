use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::object::Object;
use crate::value::Value;

struct RealmData {
	global: Object,
	lexical: RefCell<IndexMap<Rc<str>, Value>>,
}

/// A global scope: the enumerable global object plus lexical bindings that a
/// listing of the global object never shows.
#[derive(Clone)]
pub struct Realm(Rc<RealmData>);

impl Default for Realm {
	fn default() -> Self {
		Self::new()
	}
}

impl Realm {
	pub fn new() -> Self {
		Self(Rc::new(RealmData {
			global: Object::new(),
			lexical: RefCell::new(IndexMap::new()),
		}))
	}

	pub fn global(&self) -> &Object {
		&self.0.global
	}

	/// Declares an enumerable member of the global object.
	pub fn declare_global(&self, name: &str, value: impl Into<Value>) -> Result<()> {
		self.0.global.define_property(name, Descriptor::data(value))
	}

	/// Declares a binding that resolves by name but is not a member of the global object.
	pub fn declare_lexical(&self, name: &str, value: impl Into<Value>) {
		self.0
			.lexical
			.borrow_mut()
			.insert(Rc::from(name), value.into());
	}

	/// Resolves `name` the way an identifier reference would: lexical bindings
	/// first, then members of the global object (own or inherited).
	pub fn lookup(&self, name: &str) -> Result<Option<Value>> {
		if let Some(value) = self.0.lexical.borrow().get(name) {
			return Ok(Some(value.clone()));
		}
		if self.0.global.find_property(name).is_none() {
			return Ok(None);
		}
		self.0.global.get(name).map(Some)
	}

	/// Enumerable global names. Lexical bindings are deliberately absent.
	pub fn global_names(&self) -> Vec<Rc<str>> {
		self.0.global.enumerable_keys()
	}

	pub fn ptr_eq(&self, other: &Realm) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
