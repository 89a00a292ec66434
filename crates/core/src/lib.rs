//! Cooperative interception of host-owned members.
//!
//! Packages register interceptors on a member of an object they do not own
//! (`Token.prototype.draw`, `CONFIG["x"].value#set`). The first registration
//! redefines the member; from then on every access runs a priority-ordered
//! chain of interceptors that each receive a continuation to the next one,
//! ending at the original member or at an ancestor's chain.
//!
//! ```text
//! register ─► target::resolve ─► Wrapper::install (once per member) ─► sorted chain
//!
//! host access ─► Wrapper::dispatch ─► interceptor 0 ─► continue ─► interceptor 1 ─► … ─► original
//! ```
//!
//! # Categories
//!
//! | Category | Continuation | Not continuing while others are queued |
//! |----------|--------------|----------------------------------------|
//! | [`Category::AlwaysContinues`] | required | error report, forced unregistration, chain resumed |
//! | [`Category::MayContinue`] | optional | one warning |
//! | [`Category::NeverContinues`] | not offered by default | expected; only one per access path |
//!
//! # Invariants
//!
//! - Chains dispatch ALWAYS_CONTINUES before MAY_CONTINUE before NEVER_CONTINUES,
//!   higher priority first within a category.
//!   - Enforced in: `Wrapper::modify`.
//!   - Tested by: `tests/registration.rs::test_dispatch_order_by_category_and_priority`.
//!   - Failure symptom: an override swallows calls before wrappers see them.
//!
//! - At most one NEVER_CONTINUES interceptor per access path.
//!   - Enforced in: [`Interpose::register`].
//!   - Tested by: `tests/registration.rs::test_second_override_needs_higher_priority`.
//!   - Failure symptom: a second override is silently unreachable.
//!
//! - A continuation runs at most once, only while its interceptor is running
//!   (or its deferred result is pending), and only if the chain is unchanged.
//!   - Enforced in: `Wrapper::resume`.
//!   - Tested by: `tests/dispatch.rs::test_continuation_*`.
//!   - Failure symptom: downstream interceptors run twice or against a stale chain.
//!
//! - In-flight dispatches keep the chain snapshot they started with.
//!   - Enforced in: `Wrapper::modify` (copy-on-write chains).
//!   - Tested by: `tests/dispatch.rs::test_unregister_during_dispatch_keeps_snapshot`.
//!   - Failure symptom: removing an interceptor mid-call skips or repeats others.
//!
//! - Storage never keeps a wrapper alive.
//!   - Enforced in: `registry::Storage` (weak slots, lazy purge).
//!   - Failure symptom: unwrapped members leak their chains.

mod category;
mod conflicts;
mod error;
mod interpose;
mod package;
mod registry;
pub mod target;
mod wrapper;

pub use category::{Category, PerformanceMode};
pub use conflicts::{ConflictLog, ConflictReport, ConflictSink, IgnoreOptions};
pub use error::{IntegrityFault, Result, WrapError};
pub use interpose::{Builder, EntryInfo, Interpose, RegisterOptions, WrapperInfo};
pub use package::{
	AnyPackage, INTERNAL_NAMESPACE, KnownPackages, PackageDirectory, PackageId, PriorityTable,
};
pub use registry::{Access, TargetId, WrapperId};
pub use target::TargetRef;
pub use wrapper::MemberKind;
