//! Weak wrapper storage and paired id allocation.
//!
//! Every wrapper gets two ids: an even read-path id `n` and the write-path id
//! `n + 1`. Storage only holds weak references; the redefined member on the
//! owner is what keeps a wrapper alive. Entries whose wrapper was reclaimed
//! are purged lazily, on the next lookup or listing.

use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use strum_macros::{Display, IntoStaticStr};


/// Which half of an intercepted member a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
	Read,
	Write,
}

/// Identity of one wrapper (its read-path id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
	pub fn read(self) -> TargetId {
		TargetId(self.0)
	}

	pub fn write(self) -> TargetId {
		TargetId(self.0 + 1)
	}

	pub fn target(self, access: Access) -> TargetId {
		match access {
			Access::Read => self.read(),
			Access::Write => self.write(),
		}
	}
}

impl fmt::Display for WrapperId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Id of one access path of one wrapper, as returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn get(self) -> u64 {
		self.0
	}

	pub const fn access(self) -> Access {
		if self.0 % 2 == 0 { Access::Read } else { Access::Write }
	}

	pub const fn wrapper(self) -> WrapperId {
		WrapperId(self.0 - self.0 % 2)
	}
}

impl fmt::Display for TargetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Id-keyed weak map.
pub(crate) struct Storage<T> {
	next: u64,
	slots: FxHashMap<WrapperId, Weak<T>>,
}

impl<T> Default for Storage<T> {
	fn default() -> Self {
		Self {
			next: 0,
			slots: FxHashMap::default(),
		}
	}
}

impl<T> Storage<T> {
	/// Reserves the next id pair. Ids are never reused, even after [`Storage::remove`].
	pub fn allocate(&mut self) -> WrapperId {
		let id = WrapperId(self.next);
		self.next += 2;
		id
	}

	pub fn insert(&mut self, id: WrapperId, value: &Rc<T>) {
		self.slots.insert(id, Rc::downgrade(value));
	}

	/// Looks up a live value, dropping the slot if its value was reclaimed.
	pub fn get(&mut self, id: WrapperId) -> Option<Rc<T>> {
		let value = self.slots.get(&id)?.upgrade();
		if value.is_none() {
			self.slots.remove(&id);
		}
		value
	}

	pub fn remove(&mut self, id: WrapperId) -> bool {
		self.slots.remove(&id).is_some()
	}

	/// All live values in id order. Purges reclaimed slots.
	pub fn live(&mut self) -> Vec<(WrapperId, Rc<T>)> {
		self.slots.retain(|_, slot| slot.strong_count() > 0);
		let mut live: Vec<_> = self
			.slots
			.iter()
			.filter_map(|(id, slot)| Some((*id, slot.upgrade()?)))
			.collect();
		live.sort_by_key(|(id, _)| *id);
		live
	}

	/// Number of slots, including ones not yet purged.
	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.slots.len()
	}
}
