//! Package identity and the collaborator traits keyed by it.

use std::fmt;
use std::rc::Rc;

use interpose_config::Settings;
use rustc_hash::FxHashSet;

/// Reserved namespace of the interception layer itself. Targets under it are
/// refused, and the package with this id is the bootstrap package.
pub const INTERNAL_NAMESPACE: &str = "interpose";

/// Identifier of a package registering interceptors.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(Rc<str>);

impl PackageId {
	pub fn new(id: &str) -> Self {
		Self(Rc::from(id))
	}

	/// The interception layer's own package. It bypasses the readiness gate and
	/// always dispatches first within its category.
	pub fn bootstrap() -> Self {
		Self::new(INTERNAL_NAMESPACE)
	}

	/// Stand-in reporter for changes whose author cannot be attributed.
	pub fn unknown() -> Self {
		Self::new("<unknown>")
	}

	pub fn is_bootstrap(&self) -> bool {
		&*self.0 == INTERNAL_NAMESPACE
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Whether the id is usable for registration: non-empty, no whitespace.
	pub fn is_valid(&self) -> bool {
		!self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
	}
}

impl fmt::Display for PackageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for PackageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", &*self.0)
	}
}

impl From<&str> for PackageId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for PackageId {
	fn from(id: String) -> Self {
		Self(Rc::from(id))
	}
}

impl From<&PackageId> for PackageId {
	fn from(id: &PackageId) -> Self {
		id.clone()
	}
}

/// Read-only priority overrides keyed by package.
pub trait PriorityTable {
	/// Priority override for `package`; `None` means the default of 0.
	fn priority(&self, package: &PackageId) -> Option<i32>;
}

impl PriorityTable for Settings {
	fn priority(&self, package: &PackageId) -> Option<i32> {
		Settings::priority(self, package.as_str())
	}
}

/// Knows which packages are currently active.
pub trait PackageDirectory {
	fn is_active(&self, package: &PackageId) -> bool;
}

/// Directory that treats every package as active.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyPackage;

impl PackageDirectory for AnyPackage {
	fn is_active(&self, _package: &PackageId) -> bool {
		true
	}
}

/// Directory backed by an explicit set of active packages.
#[derive(Debug, Default, Clone)]
pub struct KnownPackages(FxHashSet<PackageId>);

impl KnownPackages {
	pub fn new<I, P>(packages: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PackageId>,
	{
		Self(packages.into_iter().map(Into::into).collect())
	}
}

impl PackageDirectory for KnownPackages {
	fn is_active(&self, package: &PackageId) -> bool {
		self.0.contains(package)
	}
}
