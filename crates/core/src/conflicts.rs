//! Conflict reporting seam.
//!
//! The dispatch engine detects conflicts; what happens with them (notifying a
//! user, collecting statistics) belongs to a [`ConflictSink`]. [`ConflictLog`]
//! is the default sink: it logs through `tracing` and counts occurrences.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use tracing::{error, warn};

use crate::package::PackageId;

/// One detected conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
	/// Package whose behavior caused the conflict. [`PackageId::unknown`] when
	/// the member was replaced by code outside the interception layer.
	pub package: PackageId,
	/// Packages whose interceptors were skipped or displaced.
	pub affected: Vec<PackageId>,
	/// Display name of the wrapped member.
	pub target: String,
	/// Warnings are potential conflicts; errors are contract violations.
	pub warning: bool,
}

/// Receives conflict reports.
pub trait ConflictSink {
	/// Records `report`. Returns whether it should be surfaced to the user.
	fn report(&self, report: &ConflictReport) -> bool;
}

/// Default sink: structured log output plus per-(package, target) counters.
#[derive(Debug, Default)]
pub struct ConflictLog {
	reports: RefCell<Vec<ConflictReport>>,
	counts: RefCell<FxHashMap<(PackageId, String), usize>>,
}

impl ConflictLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every report received so far, oldest first.
	pub fn reports(&self) -> Vec<ConflictReport> {
		self.reports.borrow().clone()
	}

	/// How many reports named `package` as the cause on `target`.
	pub fn count(&self, package: &PackageId, target: &str) -> usize {
		self.counts
			.borrow()
			.get(&(package.clone(), target.to_string()))
			.copied()
			.unwrap_or(0)
	}

	pub fn clear(&self) {
		self.reports.borrow_mut().clear();
		self.counts.borrow_mut().clear();
	}
}

impl ConflictSink for ConflictLog {
	fn report(&self, report: &ConflictReport) -> bool {
		let affected = report
			.affected
			.iter()
			.map(PackageId::as_str)
			.collect::<Vec<_>>()
			.join(", ");
		if report.warning {
			warn!(
				package = %report.package,
				wrapper = %report.target,
				affected = %affected,
				"potential conflict"
			);
		} else {
			error!(
				package = %report.package,
				wrapper = %report.target,
				affected = %affected,
				"interceptor did not continue the chain"
			);
		}
		*self
			.counts
			.borrow_mut()
			.entry((report.package.clone(), report.target.clone()))
			.or_default() += 1;
		self.reports.borrow_mut().push(report.clone());
		true
	}
}

/// Options for [`crate::Interpose::ignore_conflicts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreOptions {
	/// Also suppress contract violation errors, not only warnings.
	pub ignore_errors: bool,
}

#[derive(Debug, Clone)]
struct IgnoreRule {
	package: PackageId,
	others: Vec<PackageId>,
	targets: Vec<String>,
	ignore_errors: bool,
}

impl IgnoreRule {
	fn covers(&self, a: &PackageId, b: &PackageId) -> bool {
		(&self.package == a && self.others.contains(b)) || (&self.package == b && self.others.contains(a))
	}
}

/// Conflict pairs packages asked to stop hearing about.
#[derive(Debug, Default)]
pub(crate) struct IgnoreList {
	rules: Vec<IgnoreRule>,
}

impl IgnoreList {
	pub fn add(&mut self, package: PackageId, others: Vec<PackageId>, targets: Vec<String>, options: IgnoreOptions) {
		self.rules.push(IgnoreRule {
			package,
			others,
			targets,
			ignore_errors: options.ignore_errors,
		});
	}

	pub fn clear(&mut self) {
		self.rules.clear();
	}

	/// Removes suppressed packages from `report.affected`. Returns `false` when
	/// nothing is left to report. `names` are every name the target is known by.
	pub fn filter(&self, report: &mut ConflictReport, names: &[String]) -> bool {
		let applicable: Vec<&IgnoreRule> = self
			.rules
			.iter()
			.filter(|rule| report.warning || rule.ignore_errors)
			.filter(|rule| rule.targets.iter().any(|target| names.contains(target)))
			.collect();
		if !applicable.is_empty() {
			let package = report.package.clone();
			report
				.affected
				.retain(|other| !applicable.iter().any(|rule| rule.covers(&package, other)));
		}
		!report.affected.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn report(warning: bool) -> ConflictReport {
		ConflictReport {
			package: "a".into(),
			affected: vec!["b".into(), "c".into()],
			target: "A.x".to_string(),
			warning,
		}
	}

	#[test]
	fn test_ignore_is_symmetric_and_target_scoped() {
		let mut list = IgnoreList::default();
		list.add("b".into(), vec!["a".into()], vec!["A.x".to_string()], IgnoreOptions::default());

		let mut warning = report(true);
		assert!(list.filter(&mut warning, &["A.x".to_string()]));
		assert_eq!(warning.affected, vec![PackageId::from("c")]);

		let mut elsewhere = report(true);
		assert!(list.filter(&mut elsewhere, &["B.y".to_string()]));
		assert_eq!(elsewhere.affected.len(), 2);
	}

	#[test]
	fn test_errors_need_ignore_errors() {
		let mut list = IgnoreList::default();
		let others = vec!["b".into(), "c".into()];
		list.add("a".into(), others.clone(), vec!["A.x".to_string()], IgnoreOptions::default());

		let names = ["A.x".to_string()];
		let mut error = report(false);
		assert!(list.filter(&mut error, &names));

		list.add("a".into(), others, vec!["A.x".to_string()], IgnoreOptions { ignore_errors: true });
		let mut error = report(false);
		assert!(!list.filter(&mut error, &names));
	}

	#[test]
	fn test_log_counts_reports() {
		let log = ConflictLog::new();
		assert!(log.report(&report(true)));
		assert!(log.report(&report(false)));
		assert_eq!(log.count(&"a".into(), "A.x"), 2);
		assert_eq!(log.reports().len(), 2);
		log.clear();
		assert_eq!(log.count(&"a".into(), "A.x"), 0);
	}
}
