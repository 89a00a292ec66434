//! Precomposed read chains.
//!
//! When every read-path interceptor resolves to the fast hint, the chain for a
//! receiver is composed once, innermost first, into nested callables ending at
//! the terminal resolution. Continuations in a composed chain are plain
//! callables: no dispatch state, no integrity checks, no conflict detection.

use std::rc::Rc;

use interpose_host::{HostError, Object, Value, WeakObject};

use super::{Chain, Wrapper, released};
use crate::registry::Access;

pub(super) struct FastChain {
	receiver: WeakObject,
	head: Object,
}

impl Wrapper {
	/// Cached composed chain for `receiver`, or `None` if the call must take
	/// the full dispatch path.
	pub(super) fn fast_chain(self: &Rc<Self>, entries: &Chain, receiver: &Value) -> Option<Object> {
		let Value::Object(obj) = receiver else {
			return None;
		};
		let fast_mode = self.fast_mode();
		if !entries.iter().all(|entry| entry.performance.is_fast(fast_mode)) || self.is_reentered(obj) {
			return None;
		}
		if let Some(chain) = self.fast.borrow().get(&obj.id()) {
			if chain.receiver.upgrade().is_some_and(|bound| bound.ptr_eq(obj)) {
				return Some(chain.head.clone());
			}
		}

		let head = self.compose(entries, obj);
		let mut cache = self.fast.borrow_mut();
		cache.retain(|_, chain| chain.receiver.is_alive());
		cache.insert(
			obj.id(),
			FastChain {
				receiver: obj.downgrade(),
				head: head.clone(),
			},
		);
		Some(head)
	}

	fn compose(self: &Rc<Self>, entries: &Chain, receiver: &Object) -> Object {
		let wrapper = Rc::downgrade(self);
		let bound = receiver.downgrade();
		let member = self.member.clone();
		let mut next = Object::function(&self.member, move |_, args| {
			let wrapper = wrapper.upgrade().ok_or_else(|| released(&member))?;
			let receiver = upgrade(&bound, &member)?;
			Ok(wrapper.terminal(Access::Read, &receiver, args)?)
		});

		for entry in entries.iter().rev() {
			let entry = entry.clone();
			let inner = next;
			let bound = receiver.downgrade();
			let member = self.member.clone();
			next = Object::function(&self.member, move |_, args| {
				let receiver = upgrade(&bound, &member)?;
				entry.invoke(entry.chain.then(|| inner.clone()), &receiver, args)
			});
		}
		next
	}
}

fn upgrade(bound: &WeakObject, member: &str) -> interpose_host::Result<Value> {
	bound
		.upgrade()
		.map(Value::Object)
		.ok_or_else(|| HostError::Type(format!("receiver of `{member}` was dropped")))
}
