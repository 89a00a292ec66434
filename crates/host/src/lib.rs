//! Host object model.
//!
//! This crate is the object graph that the interception layer operates on: the
//! externally owned objects whose members packages want to intercept. It offers
//! exactly the capabilities an interception layer needs from a host:
//!
//! - inspect the member descriptor an object defines itself ([`Object::own_property`]),
//! - search the prototype chain for inherited members ([`Object::find_property`]),
//! - redefine a member as an accessor pair carrying an opaque tag ([`Object::define_property`], [`Accessor::tag`]),
//! - read, write and call members against an explicit receiver ([`Object::get_with`], [`Object::set_with`], [`Object::call`]),
//! - resolve root names, including non-enumerable lexical bindings ([`Realm::lookup`]),
//! - produce and observe deferred results ([`Deferred`], [`is_thenable`], [`run_jobs`]).
//!
//! # Invariants
//!
//! - A non-configurable member can never be redefined or removed.
//!   - Enforced in: [`Object::define_property`], [`Object::delete_property`].
//!   - Failure symptom: an interception layer silently replaces a frozen member.
//!
//! - No `RefCell` borrow is held while user code runs.
//!   - Enforced in: [`Object::call`], [`Object::get_with`], [`Object::set_with`] (descriptors are copied out first).
//!   - Failure symptom: `BorrowMutError` panics when an accessor re-enters its object.
//!
//! - Deferred reactions never run synchronously.
//!   - Enforced in: [`deferred`] (every reaction goes through [`enqueue_job`]).
//!   - Failure symptom: post-processing observes a half-finished caller frame.

pub mod deferred;
mod descriptor;
mod error;
mod object;
mod realm;
mod value;

pub use deferred::{Deferred, Resolver, enqueue_job, is_thenable, run_jobs, settled, thenable_then};
pub use descriptor::{Accessor, Descriptor};
pub use error::{HostError, Result};
pub use object::{NativeFn, Object, WeakObject};
pub use realm::Realm;
pub use value::Value;
