//! Registration API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use interpose_config::Settings;
use interpose_host::{Realm, Value};
use tracing::{debug, warn};

use crate::category::{Category, PerformanceMode};
use crate::conflicts::{ConflictLog, ConflictReport, ConflictSink, IgnoreList, IgnoreOptions};
use crate::error::{Result, WrapError};
use crate::package::{AnyPackage, PackageDirectory, PackageId, PriorityTable};
use crate::registry::{Access, Storage, TargetId, WrapperId};
use crate::target::{self, TargetRef};
use crate::wrapper::{Entry, MemberKind, Wrapper};

/// State shared between the registration API and installed wrappers.
pub(crate) struct Shared {
	pub realm: Realm,
	pub settings: RefCell<Settings>,
	pub priorities: Option<Box<dyn PriorityTable>>,
	pub packages: Box<dyn PackageDirectory>,
	pub sink: Rc<dyn ConflictSink>,
	pub storage: RefCell<Storage<Wrapper>>,
	pub ignores: RefCell<IgnoreList>,
	pub ready: Cell<bool>,
}

impl Shared {
	/// Filters `report` through the ignore list and hands what is left to the sink.
	pub fn report(&self, mut report: ConflictReport, names: &[String]) -> bool {
		if !self.ignores.borrow().filter(&mut report, names) {
			return false;
		}
		self.sink.report(&report)
	}
}

/// Options accepted by [`Interpose::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
	/// Whether the interceptor receives a continuation. Defaults to `true`
	/// for every category except NEVER_CONTINUES.
	pub chain: Option<bool>,
	pub performance: PerformanceMode,
	/// Arguments passed after the continuation and before the caller's.
	pub bind: Vec<Value>,
}

impl RegisterOptions {
	pub fn chain(mut self, chain: bool) -> Self {
		self.chain = Some(chain);
		self
	}

	pub fn performance(mut self, performance: PerformanceMode) -> Self {
		self.performance = performance;
		self
	}

	pub fn bind(mut self, args: impl IntoIterator<Item = Value>) -> Self {
		self.bind = args.into_iter().collect();
		self
	}

	fn resolve_chain(&self, category: Category) -> Result<bool> {
		let chain = self.chain.unwrap_or(category != Category::NeverContinues);
		if category == Category::AlwaysContinues && !chain {
			return Err(WrapError::InvalidOptions(
				"ALWAYS_CONTINUES interceptors must receive the continuation".to_string(),
			));
		}
		Ok(chain)
	}
}

/// Diagnostic view of one registered interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
	pub package: PackageId,
	pub category: Category,
	pub priority: i32,
	pub chain: bool,
	pub performance: PerformanceMode,
}

impl EntryInfo {
	fn of(entry: &Entry) -> Self {
		Self {
			package: entry.package.clone(),
			category: entry.category,
			priority: entry.priority,
			chain: entry.chain,
			performance: entry.performance,
		}
	}
}

/// Diagnostic view of one live wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperInfo {
	pub id: WrapperId,
	/// Canonical path it was first wrapped under, then aliases.
	pub names: Vec<String>,
	pub kind: MemberKind,
	pub generation: u64,
	pub outstanding: usize,
	pub reads: Vec<EntryInfo>,
	pub writes: Vec<EntryInfo>,
}

impl WrapperInfo {
	/// Packages of one chain, in dispatch order.
	pub fn packages(&self, access: Access) -> Vec<&str> {
		let entries = match access {
			Access::Read => &self.reads,
			Access::Write => &self.writes,
		};
		entries.iter().map(|entry| entry.package.as_str()).collect()
	}
}

/// Builder for [`Interpose`].
pub struct Builder {
	realm: Realm,
	settings: Settings,
	priorities: Option<Box<dyn PriorityTable>>,
	packages: Box<dyn PackageDirectory>,
	sink: Rc<dyn ConflictSink>,
	ready: bool,
}

impl Builder {
	pub fn settings(mut self, settings: Settings) -> Self {
		self.settings = settings;
		self
	}

	/// Priority source consulted instead of [`Settings::priorities`].
	pub fn priorities(mut self, table: impl PriorityTable + 'static) -> Self {
		self.priorities = Some(Box::new(table));
		self
	}

	pub fn packages(mut self, directory: impl PackageDirectory + 'static) -> Self {
		self.packages = Box::new(directory);
		self
	}

	pub fn sink(mut self, sink: Rc<dyn ConflictSink>) -> Self {
		self.sink = sink;
		self
	}

	/// Starts past the readiness gate.
	pub fn ready(mut self) -> Self {
		self.ready = true;
		self
	}

	pub fn build(self) -> Interpose {
		Interpose {
			shared: Rc::new(Shared {
				realm: self.realm,
				settings: RefCell::new(self.settings),
				priorities: self.priorities,
				packages: self.packages,
				sink: self.sink,
				storage: RefCell::default(),
				ignores: RefCell::default(),
				ready: Cell::new(self.ready),
			}),
		}
	}
}

/// Interceptor registry for one realm.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Interpose {
	shared: Rc<Shared>,
}

thread_local! {
	static GLOBAL: RefCell<Option<Interpose>> = const { RefCell::new(None) };
}

impl Interpose {
	pub fn builder(realm: Realm) -> Builder {
		Builder {
			realm,
			settings: Settings::default(),
			priorities: None,
			packages: Box::new(AnyPackage),
			sink: Rc::new(ConflictLog::new()),
			ready: false,
		}
	}

	/// Registry with default settings, every package active, conflicts logged.
	pub fn new(realm: Realm) -> Self {
		Self::builder(realm).build()
	}

	/// Installs `interpose` as this thread's registry, returning the previous one.
	pub fn init_global(interpose: Interpose) -> Option<Interpose> {
		GLOBAL.with(|global| global.borrow_mut().replace(interpose))
	}

	/// This thread's registry, if one was installed.
	pub fn global() -> Option<Interpose> {
		GLOBAL.with(|global| global.borrow().clone())
	}

	/// Resets and removes this thread's registry.
	pub fn reset_global() -> Result<()> {
		match GLOBAL.with(|global| global.borrow_mut().take()) {
			Some(interpose) => interpose.reset(),
			None => Ok(()),
		}
	}

	pub fn realm(&self) -> &Realm {
		&self.shared.realm
	}

	pub fn settings(&self) -> Settings {
		self.shared.settings.borrow().clone()
	}

	pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
		update(&mut self.shared.settings.borrow_mut());
	}

	pub fn set_fast_mode(&self, enabled: bool) {
		self.update_settings(|settings| settings.fast_mode = enabled);
	}

	/// Opens the readiness gate. Until then only the bootstrap package may register.
	pub fn ready(&self) {
		if !self.shared.ready.replace(true) {
			debug!("interception ready");
		}
	}

	pub fn is_ready(&self) -> bool {
		self.shared.ready.get()
	}

	/// Registers `function` as an interceptor of `target`.
	///
	/// The interceptor is called with the member's receiver and, unless the
	/// chain option is off, a continuation as first argument, followed by any
	/// bound arguments and then the caller's arguments. Returns the id of the
	/// access path the interceptor was registered on.
	///
	/// # Errors
	///
	/// - [`WrapError::InvalidPackage`], [`WrapError::NotReady`],
	///   [`WrapError::InactivePackage`] for callers that may not register.
	/// - [`WrapError::NotCallable`], [`WrapError::InvalidOptions`] for bad arguments.
	/// - Target syntax and resolution errors, [`WrapError::NotConfigurable`],
	///   [`WrapError::NotAProperty`] for `#set` on a plain value.
	/// - [`WrapError::AlreadyRegistered`] if `package` is already on this access path.
	/// - [`WrapError::AlreadyOverridden`] if another NEVER_CONTINUES
	///   interceptor with equal or higher priority is present.
	pub fn register(
		&self,
		package: impl Into<PackageId>,
		target: impl Into<TargetRef>,
		function: impl Into<Value>,
		category: Category,
		options: RegisterOptions,
	) -> Result<TargetId> {
		let package = package.into();
		let target = target.into();
		let function = function.into();
		self.check_caller(&package)?;
		let Value::Object(function) = function else {
			return Err(WrapError::NotCallable { package });
		};
		if !function.is_callable() {
			return Err(WrapError::NotCallable { package });
		}
		let chain = options.resolve_chain(category)?;

		let (wrapper, access) = self.locate(&package, &target)?;
		let result = self.attach(&wrapper, access, Entry {
			package,
			function,
			category,
			priority: 0,
			chain,
			bind: options.bind,
			performance: options.performance,
			warned: Default::default(),
		});
		if result.is_err() {
			wrapper.release();
		}
		result
	}

	fn attach(&self, wrapper: &Rc<Wrapper>, access: Access, mut entry: Entry) -> Result<TargetId> {
		if access == Access::Write && !wrapper.kind().is_property() {
			return Err(WrapError::NotAProperty { target: wrapper.name() });
		}
		let entries = wrapper.entries(access);
		if entries.iter().any(|existing| existing.package == entry.package) {
			return Err(WrapError::AlreadyRegistered {
				package: entry.package,
				target: wrapper.name(),
			});
		}
		entry.priority = self.priority(&entry.package);

		let displaced = if entry.category == Category::NeverContinues {
			entries
				.iter()
				.find(|existing| existing.category == Category::NeverContinues)
				.cloned()
		} else {
			None
		};
		if let Some(incumbent) = &displaced {
			if entry.priority <= incumbent.priority {
				return Err(WrapError::AlreadyOverridden {
					package: entry.package,
					incumbent: incumbent.package.clone(),
					target: wrapper.name(),
				});
			}
		}

		let (package, category, priority) = (entry.package.clone(), entry.category, entry.priority);
		let entry = Rc::new(entry);
		wrapper.modify(access, |entries| {
			if let Some(incumbent) = &displaced {
				entries.retain(|existing| !Rc::ptr_eq(existing, incumbent));
			}
			entries.push(entry);
		});
		if let Some(incumbent) = displaced {
			warn!(
				package = %package,
				incumbent = %incumbent.package,
				name = %wrapper.name(),
				"override replaced by higher priority package"
			);
			self.shared.report(
				ConflictReport {
					package: package.clone(),
					affected: vec![incumbent.package.clone()],
					target: wrapper.name(),
					warning: true,
				},
				&wrapper.names(),
			);
		}

		debug!(
			package = %package,
			name = %wrapper.name(),
			access = %access,
			category = %category,
			priority,
			"registered interceptor"
		);
		Ok(wrapper.id().target(access))
	}

	/// Removes the interceptor `package` registered on `target`.
	///
	/// Returns whether an interceptor was removed. Once both chains of the
	/// member are empty the original member is restored.
	///
	/// # Errors
	///
	/// Target syntax and resolution errors, and [`WrapError::NotRegistered`] if
	/// nothing matched and `fail_if_missing` is set.
	pub fn unregister(
		&self,
		package: impl Into<PackageId>,
		target: impl Into<TargetRef>,
		fail_if_missing: bool,
	) -> Result<bool> {
		let package = package.into();
		let target = target.into();
		let found = self.find(&target)?;
		let removed = found.as_ref().and_then(|(wrapper, access)| {
			let entry = wrapper.remove_package(*access, &package)?;
			debug!(package = %package, name = %wrapper.name(), access = %access, "unregistered interceptor");
			wrapper.release();
			Some(entry)
		});
		match removed {
			Some(_) => Ok(true),
			None if fail_if_missing => Err(WrapError::NotRegistered {
				package,
				target: found.map_or_else(|| target.to_string(), |(wrapper, _)| wrapper.name()),
			}),
			None => Ok(false),
		}
	}

	/// Removes every interceptor of `package`. Returns how many were removed.
	pub fn unregister_all(&self, package: impl Into<PackageId>) -> usize {
		let package = package.into();
		let live = self.shared.storage.borrow_mut().live();
		let mut removed = 0;
		for (_, wrapper) in live {
			for access in [Access::Read, Access::Write] {
				if wrapper.remove_package(access, &package).is_some() {
					removed += 1;
				}
			}
			wrapper.release();
		}
		debug!(package = %package, removed, "unregistered package");
		removed
	}

	/// Stops conflict reports between `package` and `others` on `targets`.
	///
	/// Only warnings are suppressed unless [`IgnoreOptions::ignore_errors`] is
	/// set. Targets are matched by name and need not be wrapped yet.
	pub fn ignore_conflicts<P, T>(
		&self,
		package: impl Into<PackageId>,
		others: impl IntoIterator<Item = P>,
		targets: impl IntoIterator<Item = T>,
		options: IgnoreOptions,
	) -> Result<()>
	where
		P: Into<PackageId>,
		T: Into<TargetRef>,
	{
		let package = package.into();
		self.check_caller(&package)?;
		let others: Vec<PackageId> = others.into_iter().map(Into::into).collect();
		let targets = targets
			.into_iter()
			.map(|target| self.target_name(&target.into()))
			.collect::<Result<Vec<_>>>()?;
		debug!(package = %package, others = others.len(), targets = targets.len(), "ignoring conflicts");
		self.shared.ignores.borrow_mut().add(package, others, targets, options);
		Ok(())
	}

	/// Live wrappers in id order.
	pub fn wrappers(&self) -> Vec<WrapperInfo> {
		let live = self.shared.storage.borrow_mut().live();
		live.into_iter()
			.map(|(id, wrapper)| {
				let info = |access| wrapper.entries(access).iter().map(|e| EntryInfo::of(e)).collect();
				WrapperInfo {
					id,
					names: wrapper.names(),
					kind: wrapper.kind(),
					generation: wrapper.generation(),
					outstanding: wrapper.outstanding(),
					reads: info(Access::Read),
					writes: info(Access::Write),
				}
			})
			.collect()
	}

	/// Diagnostic view of the wrapper behind `target`, if it is wrapped.
	///
	/// # Errors
	///
	/// Target syntax and resolution errors.
	pub fn wrapper(&self, target: impl Into<TargetRef>) -> Result<Option<WrapperInfo>> {
		let Some((wrapper, _)) = self.find(&target.into())? else {
			return Ok(None);
		};
		Ok(self.wrappers().into_iter().find(|info| info.id == wrapper.id()))
	}

	/// Unregisters everything, restores every wrapped member and closes the
	/// readiness gate.
	///
	/// # Errors
	///
	/// Returns the first [`WrapError::UnwrapLocked`] met; the remaining
	/// wrappers are still cleared. Wrappers that could not be restored stay
	/// registered with empty chains.
	pub fn reset(&self) -> Result<()> {
		let live = self.shared.storage.borrow_mut().live();
		let mut first_error = None;
		for (_, wrapper) in live {
			for access in [Access::Read, Access::Write] {
				wrapper.modify(access, Vec::clear);
			}
			if let Err(err) = wrapper.try_release() {
				first_error.get_or_insert(err);
			}
		}
		self.shared.ignores.borrow_mut().clear();
		self.shared.ready.set(false);
		debug!("interception reset");
		first_error.map_or(Ok(()), Err)
	}

	fn check_caller(&self, package: &PackageId) -> Result<()> {
		if !package.is_valid() {
			return Err(WrapError::InvalidPackage(package.to_string()));
		}
		if package.is_bootstrap() {
			return Ok(());
		}
		if !self.is_ready() {
			return Err(WrapError::NotReady {
				package: package.clone(),
			});
		}
		if !self.shared.packages.is_active(package) {
			return Err(WrapError::InactivePackage {
				package: package.clone(),
			});
		}
		Ok(())
	}

	fn priority(&self, package: &PackageId) -> i32 {
		if package.is_bootstrap() {
			return i32::MAX;
		}
		let configured = match &self.shared.priorities {
			Some(table) => table.priority(package),
			None => self.shared.settings.borrow().priority(package.as_str()),
		};
		configured.unwrap_or(0)
	}

	fn stored(&self, id: TargetId) -> Result<Rc<Wrapper>> {
		self.shared
			.storage
			.borrow_mut()
			.get(id.wrapper())
			.ok_or(WrapError::UnknownId(id.get()))
	}

	/// Resolves `target` to a wrapper, installing one if needed.
	fn locate(&self, package: &PackageId, target: &TargetRef) -> Result<(Rc<Wrapper>, Access)> {
		match target {
			TargetRef::Id(id) => Ok((self.stored(*id)?, id.access())),
			TargetRef::Path(text) => {
				let target = target::resolve_str(&self.shared.realm, text)?;
				let access = if target.setter { Access::Write } else { Access::Read };
				Ok((Wrapper::install(&self.shared, &target, package)?, access))
			}
		}
	}

	/// Resolves `target` to an installed wrapper without installing one.
	fn find(&self, target: &TargetRef) -> Result<Option<(Rc<Wrapper>, Access)>> {
		match target {
			TargetRef::Id(id) => Ok(self.shared.storage.borrow_mut().get(id.wrapper()).map(|w| (w, id.access()))),
			TargetRef::Path(text) => {
				let target = target::resolve_str(&self.shared.realm, text)?;
				let access = if target.setter { Access::Write } else { Access::Read };
				let wrapper = target
					.owner
					.own_property(&target.member)
					.as_ref()
					.and_then(Wrapper::from_descriptor);
				Ok(wrapper.map(|wrapper| (wrapper, access)))
			}
		}
	}

	/// Canonical name for ignore rules. Paths are parsed but not resolved.
	fn target_name(&self, target: &TargetRef) -> Result<String> {
		match target {
			TargetRef::Id(id) => Ok(self.stored(*id)?.name()),
			TargetRef::Path(text) => {
				let path = target::parse(text).map_err(|err| WrapError::InvalidTarget {
					target: text.clone(),
					message: err.message,
					position: err.position,
				})?;
				Ok(path.canonical())
			}
		}
	}
}
