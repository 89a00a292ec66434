#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use interpose_config::Settings;
use interpose_core::{Category, ConflictLog, Interpose, RegisterOptions, Result, TargetId};
use interpose_host::{Descriptor, HostError, Object, Realm, Value};

/// Call journal shared between interceptors and the original members.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
	pub fn push(&self, entry: impl Into<String>) {
		self.0.borrow_mut().push(entry.into());
	}

	pub fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.0.borrow_mut())
	}
}

/// A realm with a global `A` holding:
///
/// - `x(...)`: records `original` and returns `"original"`,
/// - `prop`: read/write accessor over `_prop` (initially 1), recording `get`/`set`.
pub struct Fixture {
	pub realm: Realm,
	pub interpose: Interpose,
	pub log: Rc<ConflictLog>,
	pub journal: Journal,
	pub a: Object,
}

impl Fixture {
	pub fn new() -> Self {
		Self::with_settings(Settings::default())
	}

	pub fn with_settings(settings: Settings) -> Self {
		init_tracing();
		let realm = Realm::new();
		let journal = Journal::default();
		let a = Object::new();

		let j = journal.clone();
		a.set(
			"x",
			Object::function("x", move |_, _| {
				j.push("original");
				Ok(Value::str("original"))
			}),
		)
		.unwrap();

		a.define_property(
			"_prop",
			Descriptor::Data {
				value: 1.into(),
				writable: true,
				enumerable: false,
				configurable: true,
			},
		)
		.unwrap();
		let (jg, js) = (journal.clone(), journal.clone());
		let get = Object::function("get prop", move |this, _| {
			jg.push("get");
			this.as_object().map_or(Ok(Value::Undefined), |obj| obj.get("_prop"))
		});
		let set = Object::function("set prop", move |this, args| {
			js.push("set");
			let obj = this.as_object().ok_or_else(|| HostError::Type("no receiver".into()))?;
			obj.set("_prop", args.first().cloned().unwrap_or_default())?;
			Ok(Value::Undefined)
		});
		a.define_property("prop", Descriptor::accessor(Some(get), Some(set))).unwrap();

		realm.declare_global("A", a.clone()).unwrap();

		let log = Rc::new(ConflictLog::new());
		let interpose = Interpose::builder(realm.clone())
			.settings(settings)
			.sink(log.clone())
			.ready()
			.build();

		Self {
			realm,
			interpose,
			log,
			journal,
			a,
		}
	}

	/// Interceptor that records `name`, then continues with its own arguments.
	pub fn passthrough(&self, name: &str) -> Object {
		let journal = self.journal.clone();
		let name = name.to_string();
		Object::function(&name.clone(), move |this, args| {
			journal.push(name.clone());
			let (next, rest) = split(args);
			next.call(this, rest)
		})
	}

	/// Interceptor that records `name` and returns `result` without continuing.
	pub fn stopper(&self, name: &str, result: &str) -> Object {
		let journal = self.journal.clone();
		let name = name.to_string();
		let result = Value::str(result);
		Object::function(&name.clone(), move |_, _| {
			journal.push(name.clone());
			Ok(result.clone())
		})
	}

	pub fn register(&self, package: &str, target: &str, function: Object, category: Category) -> Result<TargetId> {
		self.interpose
			.register(package, target, function, category, RegisterOptions::default())
	}

	pub fn call_x(&self) -> interpose_host::Result<Value> {
		self.a.call_method("x", &[])
	}
}

/// Routes `tracing` output through the test harness's captured writer.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_max_level(tracing::Level::DEBUG)
		.with_test_writer()
		.try_init();
}

/// Splits interceptor arguments into the continuation and the rest.
pub fn split(args: &[Value]) -> (Value, &[Value]) {
	match args.split_first() {
		Some((next, rest)) => (next.clone(), rest),
		None => (Value::Undefined, args),
	}
}

pub fn strings(items: &[&str]) -> Vec<String> {
	items.iter().map(|item| item.to_string()).collect()
}
