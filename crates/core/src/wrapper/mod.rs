//! Per-member interception state.
//!
//! A [`Wrapper`] owns the interceptor chains of exactly one member of one
//! object. Installing it redefines the member as a tagged accessor pair whose
//! halves dispatch through the chains; the tag lets later registrations (and
//! derived objects) find the wrapper again from the descriptor alone.
//!
//! # Member kinds
//!
//! | Kind | Read path | Write path |
//! |------|-----------|------------|
//! | [`MemberKind::Value`] | returns a handler that runs the read chain when called | assignment replaces the original |
//! | [`MemberKind::ReadOnly`] / [`MemberKind::ReadWrite`] | runs the read chain | runs the write chain |
//!
//! # Invariants
//!
//! - Chains are sorted by category rank, then by descending priority.
//!   - Enforced in: [`Wrapper::modify`].
//!   - Tested by: `tests::test_sequence_order_follows_category_then_priority`.
//!   - Failure symptom: an override runs before a wrapper that should have seen the call.
//!
//! - Every structural change bumps the generation and drops the dispatch caches.
//!   - Enforced in: [`Wrapper::modify`].
//!   - Tested by: `tests::test_fast_chain_rebuilt_after_change`.
//!   - Failure symptom: stale continuations keep running, or a fast chain skips a new interceptor.
//!
//! - The outstanding call counter never goes negative.
//!   - Enforced in: [`CallGuard`]'s `Drop`.
//!   - Failure symptom: an internal invariant failure is logged.

mod dispatch;
mod entry;
mod fast;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use interpose_host::{Accessor, Descriptor, HostError, Object, Value, WeakObject};
use rustc_hash::{FxHashMap, FxHashSet};
use strum_macros::{Display, IntoStaticStr};
use tracing::{debug, error};

pub(crate) use self::entry::{Entry, other_packages, sort};
use self::fast::FastChain;
use crate::conflicts::ConflictReport;
use crate::error::{Result, WrapError};
use crate::interpose::Shared;
use crate::package::PackageId;
use crate::registry::{Access, WrapperId};
use crate::target::Target;


/// How the wrapped member behaves towards readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum MemberKind {
	/// A stored value, usually a method.
	Value,
	/// An accessor without setter.
	ReadOnly,
	/// An accessor pair.
	ReadWrite,
}

impl MemberKind {
	fn of(desc: &Descriptor) -> Self {
		match desc {
			Descriptor::Data { .. } => Self::Value,
			Descriptor::Accessor(acc) if acc.set.is_some() => Self::ReadWrite,
			Descriptor::Accessor(_) => Self::ReadOnly,
		}
	}

	pub fn is_property(self) -> bool {
		!matches!(self, Self::Value)
	}
}

/// What the chains terminate in.
#[derive(Clone)]
enum Original {
	Value(Value),
	Accessor { get: Option<Object>, set: Option<Object> },
	/// Nothing captured: resolve the member on the prototype at each dispatch.
	Inherited,
}

impl Original {
	fn capture(desc: &Descriptor) -> Self {
		match desc {
			Descriptor::Data { value, .. } => Self::Value(value.clone()),
			Descriptor::Accessor(acc) => Self::Accessor {
				get: acc.get.clone(),
				set: acc.set.clone(),
			},
		}
	}
}

type Chain = Rc<Vec<Rc<Entry>>>;

pub(crate) struct Wrapper {
	ctx: Weak<Shared>,
	id: WrapperId,
	owner: WeakObject,
	member: Rc<str>,
	names: RefCell<Vec<String>>,
	kind: MemberKind,
	enumerable: bool,
	original: RefCell<Original>,
	/// Own descriptor replaced by the installation; `None` if the member was inherited.
	saved: Option<Descriptor>,
	active: Cell<bool>,
	generation: Cell<u64>,
	outstanding: Cell<usize>,
	reads: RefCell<Chain>,
	writes: RefCell<Chain>,
	/// Receivers with a slow-path dispatch in flight, by object id.
	reentry: RefCell<FxHashMap<usize, usize>>,
	fast: RefCell<FxHashMap<usize, FastChain>>,
	handlers: RefCell<FxHashMap<usize, (WeakObject, Object)>>,
	assignment_reported: RefCell<FxHashSet<PackageId>>,
}

impl Wrapper {
	/// Returns the wrapper installed on `target`, installing one if needed.
	///
	/// # Errors
	///
	/// - [`WrapError::NotConfigurable`] if the own member forbids redefinition.
	/// - [`WrapError::TargetMissing`] if neither the owner nor an ancestor defines the member.
	pub fn install(ctx: &Rc<Shared>, target: &Target, package: &PackageId) -> Result<Rc<Self>> {
		let owner = &target.owner;
		let own = owner.own_property(&target.member);
		if let Some(existing) = own.as_ref().and_then(Self::from_descriptor) {
			existing.add_alias(&target.path);
			return Ok(existing);
		}

		let not_configurable = || WrapError::NotConfigurable {
			package: package.clone(),
			target: target.path.clone(),
		};
		let (kind, enumerable, original, saved) = match own {
			Some(desc) if !desc.is_configurable() => return Err(not_configurable()),
			Some(desc) => (MemberKind::of(&desc), desc.is_enumerable(), Original::capture(&desc), Some(desc)),
			None => {
				let (_, inherited) =
					owner
						.find_property(&target.member)
						.ok_or_else(|| WrapError::TargetMissing {
							target: target.path.clone(),
						})?;
				let kind = Self::from_descriptor(&inherited).map_or_else(|| MemberKind::of(&inherited), |a| a.kind);
				(kind, inherited.is_enumerable(), Original::Inherited, None)
			}
		};

		let id = ctx.storage.borrow_mut().allocate();
		let wrapper = Rc::new(Self {
			ctx: Rc::downgrade(ctx),
			id,
			owner: owner.downgrade(),
			member: target.member.clone(),
			names: RefCell::new(vec![target.path.clone()]),
			kind,
			enumerable,
			original: RefCell::new(original),
			saved,
			active: Cell::new(true),
			generation: Cell::new(0),
			outstanding: Cell::new(0),
			reads: RefCell::default(),
			writes: RefCell::default(),
			reentry: RefCell::default(),
			fast: RefCell::default(),
			handlers: RefCell::default(),
			assignment_reported: RefCell::default(),
		});

		let locked = ctx.settings.borrow().lock_definitions;
		wrapper.redefine(owner, locked).map_err(|err| match err {
			HostError::NotConfigurable(_) | HostError::NotExtensible(_) => not_configurable(),
			other => other.into(),
		})?;
		ctx.storage.borrow_mut().insert(id, &wrapper);
		debug!(name = %target.path, id = %id, kind = %kind, locked, "wrapped member");
		Ok(wrapper)
	}

	/// Recovers the wrapper that installed `desc`, if any.
	pub fn from_descriptor(desc: &Descriptor) -> Option<Rc<Self>> {
		desc.tag()?.clone().downcast::<Self>().ok()
	}

	fn redefine(self: &Rc<Self>, owner: &Object, locked: bool) -> interpose_host::Result<()> {
		let get = {
			let wrapper = self.clone();
			Object::function(&self.member, move |this, _| wrapper.on_get(this))
		};
		let set = {
			let wrapper = self.clone();
			Object::function(&self.member, move |this, args| {
				let value = args.first().cloned().unwrap_or_default();
				wrapper.on_set(this, value).map(|()| Value::Undefined)
			})
		};
		let tag: Rc<dyn Any> = self.clone();
		owner.define_property(
			&self.member,
			Descriptor::Accessor(Accessor {
				get: Some(get),
				set: Some(set),
				enumerable: self.enumerable,
				configurable: !locked,
				tag: Some(tag),
			}),
		)
	}

	pub fn id(&self) -> WrapperId {
		self.id
	}

	pub fn kind(&self) -> MemberKind {
		self.kind
	}

	/// Primary display name.
	pub fn name(&self) -> String {
		self.names.borrow().first().cloned().unwrap_or_default()
	}

	pub fn names(&self) -> Vec<String> {
		self.names.borrow().clone()
	}

	fn add_alias(&self, name: &str) {
		let mut names = self.names.borrow_mut();
		if !names.iter().any(|known| known == name) {
			names.push(name.to_string());
		}
	}

	pub fn is_active(&self) -> bool {
		self.active.get()
	}

	pub fn generation(&self) -> u64 {
		self.generation.get()
	}

	pub fn outstanding(&self) -> usize {
		self.outstanding.get()
	}

	fn slot(&self, access: Access) -> &RefCell<Chain> {
		match access {
			Access::Read => &self.reads,
			Access::Write => &self.writes,
		}
	}

	/// Snapshot of one chain. Later modifications never affect a snapshot.
	pub fn entries(&self, access: Access) -> Chain {
		self.slot(access).borrow().clone()
	}

	pub fn is_empty(&self) -> bool {
		self.reads.borrow().is_empty() && self.writes.borrow().is_empty()
	}

	/// Applies a structural change to one chain: copy-on-write, re-sort,
	/// generation bump, cache invalidation.
	pub fn modify<R>(&self, access: Access, change: impl FnOnce(&mut Vec<Rc<Entry>>) -> R) -> R {
		let result = {
			let mut slot = self.slot(access).borrow_mut();
			let entries = Rc::make_mut(&mut *slot);
			let result = change(entries);
			sort(entries);
			result
		};
		self.generation.set(self.generation.get() + 1);
		self.fast.borrow_mut().clear();
		self.handlers.borrow_mut().clear();
		result
	}

	/// Removes the entry of `package` from one chain.
	pub fn remove_package(&self, access: Access, package: &PackageId) -> Option<Rc<Entry>> {
		let entry = self
			.entries(access)
			.iter()
			.find(|entry| &entry.package == package)
			.cloned()?;
		self.modify(access, |entries| entries.retain(|e| !Rc::ptr_eq(e, &entry)));
		Some(entry)
	}

	/// Removes one specific entry. Returns `false` if it was already gone.
	pub fn remove_entry(&self, access: Access, entry: &Rc<Entry>) -> bool {
		if !self.entries(access).iter().any(|e| Rc::ptr_eq(e, entry)) {
			return false;
		}
		self.modify(access, |entries| entries.retain(|e| !Rc::ptr_eq(e, entry)));
		true
	}

	/// Unwraps an empty wrapper and drops it from storage.
	///
	/// With locked definitions the redefinition stays in place (chains stay
	/// empty, so it passes straight through) and the failure is logged.
	pub fn release(&self) {
		if let Err(err) = self.try_release() {
			error!(name = %self.name(), error = %err, "wrapper left installed");
		}
	}

	/// [`Wrapper::release`], surfacing unwrap failures.
	pub fn try_release(&self) -> Result<()> {
		if !self.is_empty() || !self.is_active() {
			return Ok(());
		}
		self.unwrap()?;
		self.active.set(false);
		if let Some(ctx) = self.ctx.upgrade() {
			ctx.storage.borrow_mut().remove(self.id);
		}
		debug!(name = %self.name(), id = %self.id, "unwrapped member");
		Ok(())
	}

	/// Restores the member this wrapper replaced.
	///
	/// A plain value assigned through the owner while wrapped is what gets
	/// restored, not the value captured at installation.
	///
	/// # Errors
	///
	/// Returns [`WrapError::UnwrapLocked`] if the redefinition was installed
	/// non-configurable.
	pub fn unwrap(&self) -> Result<()> {
		let Some(owner) = self.owner.upgrade() else {
			return Ok(());
		};
		let Some(installed) = owner.own_property(&self.member) else {
			return Ok(());
		};
		if !Self::from_descriptor(&installed).is_some_and(|w| std::ptr::eq(&*w, self)) {
			return Ok(());
		}
		if !installed.is_configurable() {
			return Err(WrapError::UnwrapLocked { target: self.name() });
		}

		let restored = match (&self.saved, &*self.original.borrow()) {
			(
				Some(Descriptor::Data {
					writable,
					enumerable,
					configurable,
					..
				}),
				Original::Value(value),
			) => Some(Descriptor::Data {
				value: value.clone(),
				writable: *writable,
				enumerable: *enumerable,
				configurable: *configurable,
			}),
			(None, Original::Value(value)) => Some(Descriptor::data(value.clone())),
			(saved, _) => saved.clone(),
		};
		match restored {
			Some(desc) => owner.define_property(&self.member, desc)?,
			None => {
				owner.delete_property(&self.member)?;
			}
		}
		Ok(())
	}

	fn on_get(self: &Rc<Self>, receiver: &Value) -> interpose_host::Result<Value> {
		if self.kind.is_property() {
			return Ok(self.dispatch(Access::Read, receiver, &[])?);
		}
		if self.reads.borrow().is_empty() {
			return self.original_value(receiver);
		}
		Ok(Value::Object(self.handler(receiver)))
	}

	fn on_set(self: &Rc<Self>, receiver: &Value, value: Value) -> interpose_host::Result<()> {
		if self.kind.is_property() {
			return self.dispatch(Access::Write, receiver, &[value]).map(drop).map_err(Into::into);
		}
		self.assign(receiver, value)
	}

	/// Plain-value assignment. Through the owner it replaces the original;
	/// through a derived object it shadows the member on that object.
	fn assign(&self, receiver: &Value, value: Value) -> interpose_host::Result<()> {
		let owner = self.owner.upgrade();
		match receiver {
			Value::Object(obj) if owner.as_ref().is_some_and(|owner| owner.ptr_eq(obj)) => {
				*self.original.borrow_mut() = Original::Value(value);
				self.report_assignment();
				Ok(())
			}
			Value::Object(obj) => obj.define_property(&self.member, Descriptor::data(value)),
			other => Err(HostError::Type(format!(
				"cannot assign `{}` on {}",
				self.member,
				other.type_name()
			))),
		}
	}

	/// Reports each package with an interceptor on a member that was just
	/// replaced by plain assignment. Once per package unless verbose.
	fn report_assignment(&self) {
		let verbose = self.verbose();
		let packages = other_packages(&self.entries(Access::Read), &PackageId::unknown());
		for package in packages {
			if !self.assignment_reported.borrow_mut().insert(package.clone()) && !verbose {
				continue;
			}
			self.report(ConflictReport {
				package: PackageId::unknown(),
				affected: vec![package],
				target: self.name(),
				warning: true,
			});
		}
	}

	/// The member value as seen without interception.
	fn original_value(&self, receiver: &Value) -> interpose_host::Result<Value> {
		let original = self.original.borrow().clone();
		match original {
			Original::Value(value) => Ok(value),
			Original::Accessor { get: Some(get), .. } => get.call(receiver, &[]),
			Original::Accessor { get: None, .. } => Ok(Value::Undefined),
			Original::Inherited => match self.prototype() {
				Some(proto) => proto.get_with(&self.member, receiver),
				None => Ok(Value::Undefined),
			},
		}
	}

	fn prototype(&self) -> Option<Object> {
		self.owner.upgrade()?.prototype()
	}

	/// Per-receiver callable that runs the read chain. Cached for object receivers.
	fn handler(self: &Rc<Self>, receiver: &Value) -> Object {
		let Value::Object(obj) = receiver else {
			return self.make_handler(Bound::Value(receiver.clone()));
		};
		if let Some((bound, handler)) = self.handlers.borrow().get(&obj.id()) {
			if bound.upgrade().is_some_and(|b| b.ptr_eq(obj)) {
				return handler.clone();
			}
		}
		let handler = self.make_handler(Bound::Object(obj.downgrade()));
		let mut handlers = self.handlers.borrow_mut();
		handlers.retain(|_, (bound, _)| bound.is_alive());
		handlers.insert(obj.id(), (obj.downgrade(), handler.clone()));
		handler
	}

	fn make_handler(self: &Rc<Self>, bound: Bound) -> Object {
		let wrapper = Rc::downgrade(self);
		let member = self.member.clone();
		Object::function(&self.member, move |_, args| {
			let wrapper = wrapper.upgrade().ok_or_else(|| released(&member))?;
			let receiver = bound.value(&member)?;
			Ok(wrapper.dispatch(Access::Read, &receiver, args)?)
		})
	}

	/// End of a chain: the captured original, or the nearest ancestor's
	/// interception (resolved now, not at installation).
	fn terminal(&self, access: Access, receiver: &Value, args: &[Value]) -> Result<Value> {
		let original = self.original.borrow().clone();
		match (access, original) {
			(Access::Read, Original::Value(value)) => Ok(value.call(receiver, args)?),
			(Access::Read, Original::Accessor { get, .. }) => match get {
				Some(get) => Ok(get.call(receiver, &[])?),
				None => Ok(Value::Undefined),
			},
			(Access::Write, Original::Accessor { set, .. }) => match set {
				Some(set) => {
					set.call(receiver, args)?;
					Ok(Value::Undefined)
				}
				None => Err(no_setter(&self.member).into()),
			},
			(Access::Write, Original::Value(_)) => Err(self.internal_failure("write chain on a plain value member")),
			(access, Original::Inherited) => self.inherited(access, receiver, args),
		}
	}

	fn inherited(&self, access: Access, receiver: &Value, args: &[Value]) -> Result<Value> {
		let found = self.prototype().and_then(|proto| proto.find_property(&self.member));
		let Some((_, desc)) = found else {
			return Err(WrapError::TargetMissing { target: self.name() });
		};
		if let Some(ancestor) = Self::from_descriptor(&desc) {
			return ancestor.dispatch(access, receiver, args);
		}
		match (access, desc) {
			(Access::Read, Descriptor::Data { value, .. }) if self.kind == MemberKind::Value => {
				Ok(value.call(receiver, args)?)
			}
			(Access::Read, Descriptor::Data { value, .. }) => Ok(value),
			(Access::Read, Descriptor::Accessor(acc)) => match acc.get {
				Some(get) => Ok(get.call(receiver, &[])?),
				None => Ok(Value::Undefined),
			},
			(Access::Write, Descriptor::Accessor(Accessor { set: Some(set), .. })) => {
				set.call(receiver, args)?;
				Ok(Value::Undefined)
			}
			(Access::Write, _) => Err(no_setter(&self.member).into()),
		}
	}

	fn settings<T>(&self, read: impl FnOnce(&interpose_config::Settings) -> T) -> Option<T> {
		self.ctx.upgrade().map(|ctx| read(&ctx.settings.borrow()))
	}

	fn verbose(&self) -> bool {
		self.settings(|s| s.verbose).unwrap_or(false)
	}

	fn fast_mode(&self) -> bool {
		self.settings(|s| s.fast_mode).unwrap_or(false)
	}

	/// Sends a report through the ignore list to the sink.
	fn report(&self, report: ConflictReport) -> bool {
		match self.ctx.upgrade() {
			Some(ctx) => ctx.report(report, &self.names()),
			None => false,
		}
	}

	fn internal_failure(&self, message: &str) -> WrapError {
		error!(name = %self.name(), id = %self.id, "internal invariant failure: {message}");
		WrapError::Internal(format!("{}: {message}", self.name()))
	}

	fn enter(&self, receiver: &Value) -> CallGuard<'_> {
		self.outstanding.set(self.outstanding.get() + 1);
		let receiver = receiver.as_object().map(Object::id);
		if let Some(id) = receiver {
			*self.reentry.borrow_mut().entry(id).or_default() += 1;
		}
		CallGuard {
			wrapper: self,
			receiver,
		}
	}

	fn is_reentered(&self, receiver: &Object) -> bool {
		self.reentry.borrow().get(&receiver.id()).is_some_and(|depth| *depth > 0)
	}
}

/// Tracks one slow-path dispatch in flight.
struct CallGuard<'a> {
	wrapper: &'a Wrapper,
	receiver: Option<usize>,
}

impl Drop for CallGuard<'_> {
	fn drop(&mut self) {
		let outstanding = self.wrapper.outstanding.get();
		if outstanding == 0 {
			let _ = self.wrapper.internal_failure("outstanding call counter would go negative");
		} else {
			self.wrapper.outstanding.set(outstanding - 1);
		}
		if let Some(id) = self.receiver {
			let mut reentry = self.wrapper.reentry.borrow_mut();
			if let Some(depth) = reentry.get_mut(&id) {
				*depth = depth.saturating_sub(1);
				if *depth == 0 {
					reentry.remove(&id);
				}
			}
		}
	}
}

/// Receiver captured by a handler.
enum Bound {
	Object(WeakObject),
	Value(Value),
}

impl Bound {
	fn value(&self, member: &str) -> interpose_host::Result<Value> {
		match self {
			Self::Object(obj) => obj
				.upgrade()
				.map(Value::Object)
				.ok_or_else(|| HostError::Type(format!("receiver of `{member}` was dropped"))),
			Self::Value(value) => Ok(value.clone()),
		}
	}
}

fn released(member: &str) -> HostError {
	HostError::Type(format!("interception of `{member}` was released"))
}

fn no_setter(member: &str) -> HostError {
	HostError::Type(format!("cannot assign to `{member}`, it has no setter"))
}
