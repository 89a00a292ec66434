//! Deferred values and the host job queue.
//!
//! A deferred value is any object exposing a callable `then` member. The
//! [`Deferred`] type is the host's own implementation; foreign thenables are
//! adopted when a [`Resolver`] is resolved with one. Reactions never run
//! synchronously: they are queued and executed by [`run_jobs`].
//!
//! Detection is structural ([`is_thenable`]). Any object with a callable `then`
//! member qualifies, including objects that merely happen to use that name.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::descriptor::Descriptor;
use crate::error::{HostError, Result};
use crate::object::Object;
use crate::value::Value;

type Job = Box<dyn FnOnce()>;

thread_local! {
	static JOBS: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
}

/// Queues a job for the next [`run_jobs`] drain.
pub fn enqueue_job(job: impl FnOnce() + 'static) {
	JOBS.with(|jobs| jobs.borrow_mut().push_back(Box::new(job)));
}

/// Runs queued jobs, including jobs queued while draining, until the queue is
/// empty. Returns the number of jobs executed.
pub fn run_jobs() -> usize {
	let mut ran = 0;
	loop {
		let Some(job) = JOBS.with(|jobs| jobs.borrow_mut().pop_front()) else {
			break;
		};
		job();
		ran += 1;
	}
	if ran > 0 {
		trace!(ran, "drained host job queue");
	}
	ran
}

/// Returns the `then` function of a thenable, if `value` is one.
pub fn thenable_then(value: &Value) -> Option<Object> {
	let obj = value.as_object()?;
	match obj.get("then") {
		Ok(Value::Object(then)) if then.is_callable() => Some(then),
		_ => None,
	}
}

/// Structural check for deferred values: an object with a callable `then`.
pub fn is_thenable(value: &Value) -> bool {
	thenable_then(value).is_some()
}

enum State {
	Pending(Vec<Reaction>),
	Fulfilled(Value),
	Rejected(HostError),
}

struct Reaction {
	on_fulfilled: Option<Object>,
	on_rejected: Option<Object>,
	derived: Resolver,
}

impl Reaction {
	fn run(self, outcome: Result<Value>) {
		let Self {
			on_fulfilled,
			on_rejected,
			derived,
		} = self;
		let handled = match (&outcome, on_fulfilled, on_rejected) {
			(Ok(value), Some(f), _) => Some(f.call(&Value::Undefined, &[value.clone()])),
			(Err(error), _, Some(f)) => Some(f.call(&Value::Undefined, &[error.to_value()])),
			_ => None,
		};
		match handled.unwrap_or(outcome) {
			Ok(value) => derived.resolve_inner(value),
			Err(error) => derived.settle(State::Rejected(error)),
		}
	}
}

struct Shared {
	state: State,
	resolved: bool,
}

/// Settles one deferred value.
#[derive(Clone)]
pub struct Resolver(Rc<RefCell<Shared>>);

impl Resolver {
	fn new() -> Self {
		Self(Rc::new(RefCell::new(Shared {
			state: State::Pending(Vec::new()),
			resolved: false,
		})))
	}

	/// Fulfils with `value`, or follows it if `value` is itself a thenable.
	/// Ignored once resolved or rejected.
	pub fn resolve(&self, value: impl Into<Value>) {
		{
			let mut shared = self.0.borrow_mut();
			if shared.resolved {
				return;
			}
			shared.resolved = true;
		}
		self.resolve_inner(value.into());
	}

	/// Rejects with `error`. Ignored once resolved or rejected.
	pub fn reject(&self, error: HostError) {
		{
			let mut shared = self.0.borrow_mut();
			if shared.resolved {
				return;
			}
			shared.resolved = true;
		}
		self.settle(State::Rejected(error));
	}

	fn resolve_inner(&self, value: Value) {
		match thenable_then(&value) {
			Some(then) => {
				let resolver = self.clone();
				enqueue_job(move || resolver.adopt(value, then));
			}
			None => self.settle(State::Fulfilled(value)),
		}
	}

	fn adopt(&self, thenable: Value, then: Object) {
		let once = Rc::new(Cell::new(false));
		let on_fulfilled = {
			let (resolver, once) = (self.clone(), once.clone());
			Object::function("", move |_, args| {
				if !once.replace(true) {
					resolver.resolve_inner(args.first().cloned().unwrap_or_default());
				}
				Ok(Value::Undefined)
			})
		};
		let on_rejected = {
			let (resolver, once) = (self.clone(), once.clone());
			Object::function("", move |_, args| {
				if !once.replace(true) {
					let reason = args.first().cloned().unwrap_or_default();
					resolver.settle(State::Rejected(HostError::from_value(reason)));
				}
				Ok(Value::Undefined)
			})
		};
		let result = then.call(
			&thenable,
			&[Value::Object(on_fulfilled), Value::Object(on_rejected)],
		);
		if let Err(error) = result {
			if !once.replace(true) {
				self.settle(State::Rejected(error));
			}
		}
	}

	fn settle(&self, outcome: State) {
		let reactions = {
			let mut shared = self.0.borrow_mut();
			match std::mem::replace(&mut shared.state, outcome) {
				State::Pending(reactions) => reactions,
				previous => {
					shared.state = previous;
					return;
				}
			}
		};
		let Some(outcome) = self.outcome() else {
			return;
		};
		for reaction in reactions {
			let outcome = outcome.clone();
			enqueue_job(move || reaction.run(outcome));
		}
	}

	/// The settled outcome, or `None` while pending.
	pub fn outcome(&self) -> Option<Result<Value>> {
		match &self.0.borrow().state {
			State::Pending(_) => None,
			State::Fulfilled(value) => Some(Ok(value.clone())),
			State::Rejected(error) => Some(Err(error.clone())),
		}
	}

	fn then(&self, on_fulfilled: Option<Object>, on_rejected: Option<Object>) -> Value {
		let derived = Deferred::new();
		let reaction = Reaction {
			on_fulfilled,
			on_rejected,
			derived: derived.resolver(),
		};
		let settled = {
			let mut shared = self.0.borrow_mut();
			match &mut shared.state {
				State::Pending(reactions) => {
					reactions.push(reaction);
					None
				}
				_ => Some(reaction),
			}
		};
		if let Some(reaction) = settled {
			if let Some(outcome) = self.outcome() {
				enqueue_job(move || reaction.run(outcome));
			}
		}
		derived.promise()
	}
}

/// A host-native deferred value.
pub struct Deferred {
	promise: Object,
	resolver: Resolver,
}

impl Default for Deferred {
	fn default() -> Self {
		Self::new()
	}
}

impl Deferred {
	/// Creates a pending deferred value.
	pub fn new() -> Self {
		let resolver = Resolver::new();
		let promise = Object::new();
		let then = {
			let resolver = resolver.clone();
			Object::function("then", move |_, args| {
				let callback = |i: usize| {
					args.get(i)
						.and_then(Value::as_object)
						.filter(|f| f.is_callable())
						.cloned()
				};
				Ok(resolver.then(callback(0), callback(1)))
			})
		};
		let _ = promise.define_property(
			"then",
			Descriptor::Data {
				value: Value::Object(then),
				writable: true,
				enumerable: false,
				configurable: true,
			},
		);
		Self { promise, resolver }
	}

	/// A deferred value already fulfilled with `value`.
	pub fn resolved(value: impl Into<Value>) -> Value {
		let deferred = Self::new();
		deferred.resolve(value);
		deferred.promise()
	}

	/// A deferred value already rejected with `error`.
	pub fn rejected(error: HostError) -> Value {
		let deferred = Self::new();
		deferred.reject(error);
		deferred.promise()
	}

	/// The observable deferred value.
	pub fn promise(&self) -> Value {
		Value::Object(self.promise.clone())
	}

	pub fn resolver(&self) -> Resolver {
		self.resolver.clone()
	}

	pub fn resolve(&self, value: impl Into<Value>) {
		self.resolver.resolve(value);
	}

	pub fn reject(&self, error: HostError) {
		self.resolver.reject(error);
	}
}

/// Drains the job queue and reports how `value` settled.
///
/// Plain values count as already fulfilled. Returns `None` if `value` is a
/// thenable that is still pending after the queue ran dry.
pub fn settled(value: &Value) -> Option<Result<Value>> {
	let Some(then) = thenable_then(value) else {
		return Some(Ok(value.clone()));
	};
	let slot: Rc<RefCell<Option<Result<Value>>>> = Rc::new(RefCell::new(None));
	let on_fulfilled = {
		let slot = slot.clone();
		Object::function("", move |_, args| {
			*slot.borrow_mut() = Some(Ok(args.first().cloned().unwrap_or_default()));
			Ok(Value::Undefined)
		})
	};
	let on_rejected = {
		let slot = slot.clone();
		Object::function("", move |_, args| {
			let reason = args.first().cloned().unwrap_or_default();
			*slot.borrow_mut() = Some(Err(HostError::from_value(reason)));
			Ok(Value::Undefined)
		})
	};
	if let Err(error) = then.call(
		value,
		&[Value::Object(on_fulfilled), Value::Object(on_rejected)],
	) {
		return Some(Err(error));
	}
	run_jobs();
	slot.borrow_mut().take()
}
