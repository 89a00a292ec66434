use std::cell::Cell;
use std::rc::Rc;

use interpose_host::{Object, Value};
use smallvec::SmallVec;

use crate::category::{Category, PerformanceMode};
use crate::package::PackageId;

/// One registered interceptor.
pub(crate) struct Entry {
	pub package: PackageId,
	pub function: Object,
	pub category: Category,
	pub priority: i32,
	/// Whether the interceptor receives a continuation as first argument.
	pub chain: bool,
	/// Fixed arguments passed after the continuation and before the caller's.
	pub bind: Vec<Value>,
	pub performance: PerformanceMode,
	/// Set once a MAY_CONTINUE conflict was reported for this entry.
	pub warned: Cell<bool>,
}

impl Entry {
	/// Calls the interceptor as `function(continuation?, ...bind, ...args)`.
	pub fn invoke(
		&self,
		continuation: Option<Object>,
		receiver: &Value,
		args: &[Value],
	) -> interpose_host::Result<Value> {
		let mut argv: SmallVec<[Value; 8]> = SmallVec::with_capacity(1 + self.bind.len() + args.len());
		argv.extend(continuation.map(Value::Object));
		argv.extend(self.bind.iter().cloned());
		argv.extend(args.iter().cloned());
		self.function.call(receiver, &argv)
	}
}

/// Dispatch order: category rank, then descending priority. Stable, so equal
/// keys keep their registration order.
pub(crate) fn sort(entries: &mut [Rc<Entry>]) {
	entries.sort_by(|a, b| a.category.cmp(&b.category).then(b.priority.cmp(&a.priority)));
}

/// Distinct packages other than `package` among `entries`, in dispatch order.
pub(crate) fn other_packages(entries: &[Rc<Entry>], package: &PackageId) -> Vec<PackageId> {
	let mut others: Vec<PackageId> = Vec::new();
	for entry in entries {
		if &entry.package != package && !others.contains(&entry.package) {
			others.push(entry.package.clone());
		}
	}
	others
}
