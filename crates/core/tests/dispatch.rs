mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{Fixture, split, strings};
use interpose_config::Settings;
use interpose_core::{
	Access, Category, IgnoreOptions, IntegrityFault, PackageId, PerformanceMode, RegisterOptions, WrapError,
};
use interpose_host::{Deferred, HostError, Object, Value, settled};
use pretty_assertions::assert_eq;

fn fault(err: &HostError) -> Option<IntegrityFault> {
	err.downcast_ref::<WrapError>()?.integrity_fault()
}

fn packages(ids: &[&str]) -> Vec<PackageId> {
	ids.iter().map(|id| PackageId::from(*id)).collect()
}

/// Adds `A.echo(value)`, returning its first argument.
fn add_echo(fx: &Fixture) {
	let journal = fx.journal.clone();
	fx.a.set(
		"echo",
		Object::function("echo", move |_, args| {
			journal.push("echo");
			Ok(args.first().cloned().unwrap_or_default())
		}),
	)
	.unwrap();
}

#[test]
fn test_always_violation_unregisters_and_resumes_chain() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();
	fx.register("bad", "A.x", fx.stopper("bad", "bad"), Category::AlwaysContinues)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["bad", "p1", "original"]));

	let reports = fx.log.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].package.as_str(), "bad");
	assert_eq!(reports[0].affected, packages(&["p1"]));
	assert!(!reports[0].warning);

	let info = fx.interpose.wrapper("A.x").unwrap().unwrap();
	assert_eq!(info.packages(Access::Read), vec!["p1"]);

	fx.call_x().unwrap();
	assert_eq!(fx.journal.take(), strings(&["p1", "original"]));
	assert_eq!(fx.log.reports().len(), 1);
}

#[test]
fn test_always_violation_alone_is_not_a_conflict() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::AlwaysContinues)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("p1"));
	assert!(fx.log.reports().is_empty());
	assert!(fx.interpose.wrapper("A.x").unwrap().is_some());
}

#[test]
fn test_may_violation_warns_once() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	for _ in 0..3 {
		assert_eq!(fx.call_x().unwrap(), Value::str("p1"));
	}
	assert_eq!(fx.journal.take(), strings(&["p1", "p1", "p1"]));

	let reports = fx.log.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].affected, packages(&["p2"]));
	assert!(reports[0].warning);
	assert_eq!(fx.interpose.wrapper("A.x").unwrap().unwrap().reads.len(), 2);
}

#[test]
fn test_may_violation_repeats_when_verbose() {
	let fx = Fixture::with_settings(Settings {
		verbose: true,
		..Settings::default()
	});
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	fx.call_x().unwrap();
	fx.call_x().unwrap();
	assert_eq!(fx.log.count(&"p1".into(), "A.x"), 2);
}

#[test]
fn test_override_skipping_later_override_is_reported() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue)
		.unwrap();
	fx.register("over", "A.x", fx.stopper("over", "over"), Category::NeverContinues)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("p1"));
	assert_eq!(fx.log.reports()[0].affected, packages(&["over"]));
}

#[test]
fn test_continuation_called_twice() {
	let fx = Fixture::new();
	let twice = Object::function("twice", |this, args| {
		let (next, rest) = split(args);
		next.call(this, rest)?;
		next.call(this, rest)
	});
	fx.register("p1", "A.x", twice, Category::MayContinue).unwrap();

	let err = fx.call_x().unwrap_err();
	assert_eq!(fault(&err), Some(IntegrityFault::CalledTwice));
	let message = err.downcast_ref::<WrapError>().unwrap().to_string();
	assert!(message.starts_with("continuation for"), "{message}");
	assert!(message.ends_with("was invoked twice"), "{message}");
	assert_eq!(fx.journal.take(), strings(&["original"]));
}

#[test]
fn test_continuation_after_completion() {
	let fx = Fixture::new();
	let stored: Rc<RefCell<Option<Value>>> = Rc::default();
	let slot = stored.clone();
	let keeper = Object::function("keeper", move |_, args| {
		*slot.borrow_mut() = args.first().cloned();
		Ok(Value::str("kept"))
	});
	fx.register("p1", "A.x", keeper, Category::MayContinue).unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("kept"));
	let next = stored.borrow_mut().take().unwrap();
	let err = next.call(&Value::Undefined, &[]).unwrap_err();

	assert_eq!(fault(&err), Some(IntegrityFault::Completed));
	assert!(fx.journal.take().is_empty());
}

#[test]
fn test_continuation_after_modification() {
	let fx = Fixture::new();
	let interpose = fx.interpose.clone();
	let late = fx.passthrough("late");
	let faults: Rc<RefCell<Vec<Option<IntegrityFault>>>> = Rc::default();
	let seen = faults.clone();
	let mutator = Object::function("mutator", move |this, args| {
		interpose
			.register("late", "A.x", late.clone(), Category::MayContinue, RegisterOptions::default())
			.map_err(HostError::from)?;
		let (next, rest) = split(args);
		let err = next.call(this, rest).unwrap_err();
		seen.borrow_mut().push(fault(&err));
		Ok(Value::str("mutated"))
	});
	fx.register("p1", "A.x", mutator, Category::AlwaysContinues)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("mutated"));
	assert_eq!(*faults.borrow(), vec![Some(IntegrityFault::Modified)]);
	assert!(fx.journal.take().is_empty());
	// The chain changed under the call, so no violation is charged to p1.
	assert!(fx.log.reports().is_empty());
	let info = fx.interpose.wrapper("A.x").unwrap().unwrap();
	assert_eq!(info.packages(Access::Read), vec!["p1", "late"]);
}

#[test]
fn test_unregister_during_dispatch_keeps_snapshot() {
	let fx = Fixture::new();
	let interpose = fx.interpose.clone();
	let journal = fx.journal.clone();
	let outstanding = Rc::new(Cell::new(0));
	let observed = outstanding.clone();
	fx.a.set(
		"y",
		Object::function("y", move |_, _| {
			journal.push("y");
			let info = interpose.wrapper("A.y").map_err(HostError::from)?;
			observed.set(info.map_or(0, |info| info.outstanding));
			interpose.unregister_all("p2");
			interpose.unregister_all("p1");
			Ok(Value::str("y"))
		}),
	)
	.unwrap();
	fx.register("p1", "A.y", fx.passthrough("p1"), Category::AlwaysContinues)
		.unwrap();
	fx.register("p2", "A.y", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	assert_eq!(fx.a.call_method("y", &[]).unwrap(), Value::str("y"));
	assert_eq!(fx.journal.take(), strings(&["p1", "p2", "y"]));
	assert_eq!(outstanding.get(), 1);
	assert!(fx.log.reports().is_empty());

	assert!(fx.interpose.wrappers().is_empty());
	assert!(!fx.a.own_property("y").unwrap().is_accessor());
	fx.a.call_method("y", &[]).unwrap();
	assert_eq!(fx.journal.take(), strings(&["y"]));
}

#[test]
fn test_bound_and_rewritten_arguments() {
	let fx = Fixture::new();
	add_echo(&fx);
	let calls: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();
	let recorder = |rewrite: Option<&'static str>| {
		let calls = calls.clone();
		Object::function("recorder", move |this, args| {
			let (next, rest) = split(args);
			calls
				.borrow_mut()
				.push(rest.iter().map(|arg| arg.as_str().unwrap_or("?").to_string()).collect());
			match rewrite {
				Some(value) => next.call(this, &[Value::str(value)]),
				None => next.call(this, rest),
			}
		})
	};

	fx.interpose
		.register(
			"p1",
			"A.echo",
			recorder(Some("rewritten")),
			Category::AlwaysContinues,
			RegisterOptions::default().bind([Value::str("bound")]),
		)
		.unwrap();
	fx.register("p2", "A.echo", recorder(None), Category::MayContinue)
		.unwrap();

	let result = fx.a.call_method("echo", &[Value::str("in")]).unwrap();

	assert_eq!(result, Value::str("rewritten"));
	assert_eq!(
		*calls.borrow(),
		vec![strings(&["bound", "in"]), strings(&["rewritten"])]
	);
}

#[test]
fn test_unchained_interceptor_gets_caller_arguments() {
	let fx = Fixture::new();
	add_echo(&fx);
	let first = Object::function("first", |_, args| Ok(args.first().cloned().unwrap_or_default()));
	fx.interpose
		.register("p1", "A.echo", first, Category::MayContinue, RegisterOptions::default().chain(false))
		.unwrap();
	fx.register("p2", "A.echo", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	let result = fx.a.call_method("echo", &[Value::str("in")]).unwrap();

	assert_eq!(result, Value::str("in"));
	assert!(fx.journal.take().is_empty());
	assert_eq!(fx.log.reports().len(), 1);
}

#[test]
fn test_chained_override_reaches_original() {
	let fx = Fixture::new();
	fx.interpose
		.register(
			"over",
			"A.x",
			fx.passthrough("over"),
			Category::NeverContinues,
			RegisterOptions::default().chain(true),
		)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["over", "original"]));
}

#[test]
fn test_interceptor_error_propagates_unchanged() {
	let fx = Fixture::new();
	let failing = Object::function("failing", |_, _| Err(HostError::Thrown(Value::str("boom"))));
	fx.register("p1", "A.x", failing, Category::AlwaysContinues)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	let err = fx.call_x().unwrap_err();

	assert!(matches!(err, HostError::Thrown(ref value) if *value == Value::str("boom")));
	assert!(fx.journal.take().is_empty());
	assert!(fx.log.reports().is_empty());
	assert_eq!(fx.interpose.wrapper("A.x").unwrap().unwrap().reads.len(), 2);
}

#[test]
fn test_deferred_result_defers_conflict_check() {
	let fx = Fixture::new();
	let deferred = Deferred::new();
	let promise = deferred.promise();
	let journal = fx.journal.clone();
	let waiting = Object::function("waiting", move |_, _| {
		journal.push("p1");
		Ok(promise.clone())
	});
	fx.register("p1", "A.x", waiting, Category::MayContinue).unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	let result = fx.call_x().unwrap();
	assert!(fx.log.reports().is_empty());

	deferred.resolve("later");
	assert_eq!(settled(&result).unwrap().unwrap(), Value::str("later"));
	assert_eq!(fx.journal.take(), strings(&["p1"]));
	assert_eq!(fx.log.reports().len(), 1);
}

#[test]
fn test_deferred_always_violation_resumes_on_settle() {
	let fx = Fixture::new();
	let deferred = Deferred::new();
	let promise = deferred.promise();
	let journal = fx.journal.clone();
	let waiting = Object::function("bad", move |_, _| {
		journal.push("bad");
		Ok(promise.clone())
	});
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();
	fx.register("bad", "A.x", waiting, Category::AlwaysContinues)
		.unwrap();

	let result = fx.call_x().unwrap();
	assert_eq!(fx.journal.take(), strings(&["bad"]));
	assert!(fx.log.reports().is_empty());
	let info = fx.interpose.wrapper("A.x").unwrap().unwrap();
	assert_eq!(info.packages(Access::Read), vec!["bad", "p1"]);

	deferred.resolve("ignored");
	assert_eq!(settled(&result).unwrap().unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["p1", "original"]));

	let reports = fx.log.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].package.as_str(), "bad");
	assert!(!reports[0].warning);
	let info = fx.interpose.wrapper("A.x").unwrap().unwrap();
	assert_eq!(info.packages(Access::Read), vec!["p1"]);
}

#[test]
fn test_continuation_valid_until_settled() {
	let fx = Fixture::new();
	let deferred = Deferred::new();
	let promise = deferred.promise();
	let stored: Rc<RefCell<Option<Value>>> = Rc::default();
	let slot = stored.clone();
	let waiting = Object::function("waiting", move |_, args| {
		*slot.borrow_mut() = args.first().cloned();
		Ok(promise.clone())
	});
	fx.register("p1", "A.x", waiting, Category::MayContinue).unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	let result = fx.call_x().unwrap();
	let next = stored.borrow().clone().unwrap();
	assert_eq!(next.call(&Value::Object(fx.a.clone()), &[]).unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["p2", "original"]));

	deferred.resolve("done");
	assert_eq!(settled(&result).unwrap().unwrap(), Value::str("done"));
	assert!(fx.log.reports().is_empty());

	let err = next.call(&Value::Object(fx.a.clone()), &[]).unwrap_err();
	assert_eq!(fault(&err), Some(IntegrityFault::Completed));
}

#[test]
fn test_rejected_deferred_result_propagates() {
	let fx = Fixture::new();
	let deferred = Deferred::new();
	let promise = deferred.promise();
	fx.register(
		"p1",
		"A.x",
		Object::function("waiting", move |_, _| Ok(promise.clone())),
		Category::MayContinue,
	)
	.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	let result = fx.call_x().unwrap();
	deferred.reject(HostError::Type("nope".into()));

	assert!(matches!(settled(&result), Some(Err(HostError::Type(ref message))) if message == "nope"));
	assert!(fx.log.reports().is_empty());
}

#[test]
fn test_object_with_then_member_is_treated_as_deferred() {
	let fx = Fixture::new();
	let journal = fx.journal.clone();
	let lookalike = Object::new();
	lookalike
		.set(
			"then",
			Object::function("then", move |_, _| {
				journal.push("then");
				Ok(Value::str("from then"))
			}),
		)
		.unwrap();
	let returns_lookalike = Object::function("lookalike", move |_, _| Ok(Value::Object(lookalike.clone())));
	fx.register("p1", "A.x", returns_lookalike, Category::MayContinue)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("from then"));
	assert_eq!(fx.journal.take(), strings(&["then"]));
	assert!(fx.log.reports().is_empty());
}

#[test]
fn test_reentrant_call_gets_its_own_chain() {
	let fx = Fixture::new();
	let journal = fx.journal.clone();
	let depth = Rc::new(Cell::new(0));
	let reentrant = Object::function("reentrant", move |this, args| {
		journal.push(format!("p1@{}", depth.get()));
		if depth.get() == 0 {
			depth.set(1);
			let obj = this.as_object().cloned().ok_or_else(|| HostError::Type("receiver".into()))?;
			obj.call_method("x", &[])?;
		}
		let (next, rest) = split(args);
		next.call(this, rest)
	});
	fx.register("p1", "A.x", reentrant, Category::AlwaysContinues)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("original"));
	assert_eq!(
		fx.journal.take(),
		strings(&["p1@0", "p1@1", "p2", "original", "p2", "original"])
	);
	assert!(fx.log.reports().is_empty());
	assert_eq!(fx.interpose.wrapper("A.x").unwrap().unwrap().outstanding, 0);
}

#[test]
fn test_derived_chain_delegates_to_ancestor_chain() {
	let fx = Fixture::new();
	let derived = Object::with_proto(&fx.a);
	fx.realm.declare_global("B", derived.clone()).unwrap();

	// Wrapping the derived member first: the ancestor is looked up per call.
	fx.register("p2", "B.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();

	assert_eq!(derived.call_method("x", &[]).unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["p2", "p1", "original"]));

	fx.call_x().unwrap();
	assert_eq!(fx.journal.take(), strings(&["p1", "original"]));

	fx.interpose.unregister("p1", "A.x", true).unwrap();
	derived.call_method("x", &[]).unwrap();
	assert_eq!(fx.journal.take(), strings(&["p2", "original"]));
}

#[test]
fn test_plain_assignment_replaces_original_and_reports_once() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();
	let replacement = fx.stopper("replacement", "replacement");

	fx.a.set("x", replacement.clone()).unwrap();
	fx.a.set("x", replacement.clone()).unwrap();

	let reports = fx.log.reports();
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].package, PackageId::unknown());
	assert_eq!(reports[0].affected, packages(&["p1"]));

	assert_eq!(fx.call_x().unwrap(), Value::str("replacement"));
	assert_eq!(fx.journal.take(), strings(&["p1", "replacement"]));

	fx.interpose.unregister("p1", "A.x", true).unwrap();
	let restored = fx.a.own_property("x").unwrap();
	assert!(restored.value().and_then(Value::as_object).is_some_and(|f| f.ptr_eq(&replacement)));
}

#[test]
fn test_assignment_through_derived_object_shadows() {
	let fx = Fixture::new();
	let derived = Object::with_proto(&fx.a);
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();

	derived.set("x", fx.stopper("own", "own")).unwrap();

	assert!(derived.has_own_property("x"));
	assert_eq!(derived.call_method("x", &[]).unwrap(), Value::str("own"));
	assert_eq!(fx.call_x().unwrap(), Value::str("original"));
	assert_eq!(fx.journal.take(), strings(&["own", "p1", "original"]));
	assert!(fx.log.reports().is_empty());
}

#[test]
fn test_fast_mode_skips_conflict_detection() {
	let fx = Fixture::with_settings(Settings {
		fast_mode: true,
		..Settings::default()
	});
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();

	assert_eq!(fx.call_x().unwrap(), Value::str("p1"));
	assert!(fx.log.reports().is_empty());

	fx.interpose.set_fast_mode(false);
	fx.call_x().unwrap();
	assert_eq!(fx.log.reports().len(), 1);
}

#[test]
fn test_explicit_fast_hint_needs_every_entry() {
	let fx = Fixture::new();
	let fast = RegisterOptions::default().performance(PerformanceMode::Fast);
	fx.interpose
		.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue, fast.clone())
		.unwrap();
	fx.interpose
		.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue, fast)
		.unwrap();
	fx.call_x().unwrap();
	assert!(fx.log.reports().is_empty());

	fx.register("p3", "A.x", fx.passthrough("p3"), Category::MayContinue)
		.unwrap();
	fx.call_x().unwrap();
	assert_eq!(fx.log.reports()[0].affected, packages(&["p2", "p3"]));
}

#[test]
fn test_ignored_conflicts_are_not_reported() {
	let fx = Fixture::new();
	fx.register("p1", "A.x", fx.stopper("p1", "p1"), Category::MayContinue)
		.unwrap();
	fx.register("p2", "A.x", fx.passthrough("p2"), Category::MayContinue)
		.unwrap();
	fx.interpose
		.ignore_conflicts("p2", ["p1"], ["A['x']"], IgnoreOptions::default())
		.unwrap();

	fx.call_x().unwrap();
	assert!(fx.log.reports().is_empty());
}

#[test]
fn test_ignored_errors_still_unregister_violator() {
	let fx = Fixture::new();
	fx.register("bad", "A.x", fx.stopper("bad", "bad"), Category::AlwaysContinues)
		.unwrap();
	fx.register("p1", "A.x", fx.passthrough("p1"), Category::MayContinue)
		.unwrap();

	fx.interpose
		.ignore_conflicts("bad", ["p1"], ["A.x"], IgnoreOptions::default())
		.unwrap();
	fx.call_x().unwrap();
	assert_eq!(fx.log.reports().len(), 1);

	fx.register("bad", "A.x", fx.stopper("bad", "bad"), Category::AlwaysContinues)
		.unwrap();
	fx.interpose
		.ignore_conflicts("bad", ["p1"], ["A.x"], IgnoreOptions { ignore_errors: true })
		.unwrap();
	fx.call_x().unwrap();
	assert_eq!(fx.log.reports().len(), 1);
	assert_eq!(
		fx.interpose.wrapper("A.x").unwrap().unwrap().packages(Access::Read),
		vec!["p1"]
	);
}
