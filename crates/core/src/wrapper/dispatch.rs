//! The chain state machine.
//!
//! Dispatch walks a snapshot of one chain. Each step hands its interceptor a
//! single-use continuation bound to a [`DispatchState`]; invoking it validates
//! the state and recurses into the next step. When the interceptor returns (or
//! its deferred result settles) the state is invalidated and, if the
//! continuation was never called while other packages were still queued, the
//! conflict policy of the interceptor's category applies.

use std::cell::Cell;
use std::rc::Rc;

use interpose_host::{HostError, Object, Value, thenable_then};
use tracing::{debug, trace};

use super::{Chain, Entry, Wrapper, other_packages};
use crate::category::Category;
use crate::conflicts::ConflictReport;
use crate::error::{IntegrityFault, Result, WrapError};
use crate::registry::Access;

/// Bookkeeping for the continuation handed to one interceptor.
pub(super) struct DispatchState {
	/// Index the continuation resumes at.
	index: usize,
	generation: u64,
	called: Cell<bool>,
	valid: Cell<bool>,
	/// Interceptor the continuation belongs to.
	entry: Rc<Entry>,
	/// Snapshot the chain was dispatched against.
	entries: Chain,
	access: Access,
}

impl Wrapper {
	/// Runs one access path of this member for `receiver`.
	pub(crate) fn dispatch(self: &Rc<Self>, access: Access, receiver: &Value, args: &[Value]) -> Result<Value> {
		let entries = self.entries(access);
		if entries.is_empty() {
			return self.terminal(access, receiver, args);
		}
		if access == Access::Read {
			if let Some(chain) = self.fast_chain(&entries, receiver) {
				trace!(name = %self.name(), "fast dispatch");
				return Ok(chain.call(receiver, args)?);
			}
		}
		let _guard = self.enter(receiver);
		self.step(access, &entries, 0, receiver, args)
	}

	fn step(
		self: &Rc<Self>,
		access: Access,
		entries: &Chain,
		index: usize,
		receiver: &Value,
		args: &[Value],
	) -> Result<Value> {
		let Some(entry) = entries.get(index).cloned() else {
			return self.terminal(access, receiver, args);
		};
		let state = Rc::new(DispatchState {
			index: index + 1,
			generation: self.generation.get(),
			called: Cell::new(false),
			valid: Cell::new(true),
			entry: entry.clone(),
			entries: entries.clone(),
			access,
		});

		let continuation = entry.chain.then(|| self.continuation(&state, receiver));
		let result = entry.invoke(continuation, receiver, args);

		if entry.category == Category::NeverContinues {
			state.valid.set(false);
			return Ok(result?);
		}
		let value = match result {
			Ok(value) => value,
			Err(err) => {
				state.valid.set(false);
				return Err(err.into());
			}
		};
		match thenable_then(&value) {
			Some(then) => self.finish_later(state, &then, value, receiver, args),
			None => self.finish(&state, receiver, args, value),
		}
	}

	fn continuation(self: &Rc<Self>, state: &Rc<DispatchState>, receiver: &Value) -> Object {
		let wrapper = self.clone();
		let state = state.clone();
		let receiver = receiver.clone();
		Object::function("continue", move |_, args| Ok(wrapper.resume(&state, &receiver, args)?))
	}

	fn resume(self: &Rc<Self>, state: &DispatchState, receiver: &Value, args: &[Value]) -> Result<Value> {
		let fault = if !state.valid.get() {
			Some(IntegrityFault::Completed)
		} else if state.called.get() {
			Some(IntegrityFault::CalledTwice)
		} else if state.generation != self.generation.get() {
			Some(IntegrityFault::Modified)
		} else {
			None
		};
		if let Some(fault) = fault {
			return Err(WrapError::ChainIntegrity {
				target: self.name(),
				fault,
			});
		}
		state.called.set(true);
		self.step(state.access, &state.entries, state.index, receiver, args)
	}

	/// Defers the completion of a step until its deferred result settles.
	fn finish_later(
		self: &Rc<Self>,
		state: Rc<DispatchState>,
		then: &Object,
		value: Value,
		receiver: &Value,
		args: &[Value],
	) -> Result<Value> {
		let on_fulfilled = {
			let wrapper = self.clone();
			let state = state.clone();
			let receiver = receiver.clone();
			let args = args.to_vec();
			Object::function("", move |_, settled| {
				let value = settled.first().cloned().unwrap_or_default();
				Ok(wrapper.finish(&state, &receiver, &args, value)?)
			})
		};
		let on_rejected = Object::function("", move |_, settled| {
			state.valid.set(false);
			Err(HostError::from_value(settled.first().cloned().unwrap_or_default()))
		});
		Ok(then.call(&value, &[Value::Object(on_fulfilled), Value::Object(on_rejected)])?)
	}

	/// Completes one step: invalidates its continuation and applies the
	/// conflict policy if the continuation went unused.
	fn finish(self: &Rc<Self>, state: &DispatchState, receiver: &Value, args: &[Value], value: Value) -> Result<Value> {
		state.valid.set(false);
		if state.called.get() || state.generation != self.generation.get() {
			return Ok(value);
		}
		let entry = &state.entry;
		let later = state.entries.get(state.index..).unwrap_or_default();
		let affected = other_packages(later, &entry.package);
		if affected.is_empty() {
			return Ok(value);
		}

		match entry.category {
			Category::AlwaysContinues => {
				self.report(ConflictReport {
					package: entry.package.clone(),
					affected,
					target: self.name(),
					warning: false,
				});
				if self.remove_entry(state.access, entry) {
					debug!(
						package = %entry.package,
						name = %self.name(),
						"unregistered interceptor that did not continue"
					);
					self.release();
				}
				self.step(state.access, &state.entries, state.index, receiver, args)
			}
			Category::MayContinue => {
				if !entry.warned.replace(true) || self.verbose() {
					self.report(ConflictReport {
						package: entry.package.clone(),
						affected,
						target: self.name(),
						warning: true,
					});
				}
				Ok(value)
			}
			Category::NeverContinues => Ok(value),
		}
	}
}
