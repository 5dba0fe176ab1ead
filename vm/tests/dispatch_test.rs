mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memory::{ErrorType, Value};
use proptest::prelude::*;
use vm::exception::STACK_OVERFLOW_MESSAGE;
use vm::executable::Entry;
use vm::{native_fn, FrameId, RealmId, StackOps, VmOptions, VM};

use common::{count_args, interpreted};

proptest! {
    #[test]
    fn bound_chains_unwrap_in_one_dispatcher_step(
        depth in 2usize..8,
        bound in proptest::collection::vec(-100i64..100, 0..3),
    ) {
        let mut vm = VM::new();
        let target = count_args(&mut vm);
        let bound_values: Vec<Value> = bound.iter().map(|n| Value::int(*n)).collect();
        let mut function = target;
        for _ in 0..depth {
            function = vm.bind(function, Value::undefined(), &bound_values).unwrap();
        }

        let steps = vm.stats.dispatcher_steps;
        let unwraps = vm.stats.bound_unwraps;
        let result = vm.call(function, Value::undefined(), &[Value::int(1)]).unwrap();

        prop_assert_eq!(result, Value::int((depth * bound.len() + 1) as i64));
        prop_assert_eq!(vm.stats.dispatcher_steps - steps, 1);
        prop_assert_eq!(vm.stats.bound_unwraps - unwraps, 1);
    }
}

#[test]
fn bound_this_reaches_the_target() {
    let mut vm = VM::new();
    let this_of = vm.create_native_function(
        RealmId::MAIN,
        "thisOf",
        native_fn(|vm: &mut VM, frame: FrameId| Ok(vm.this_value(frame))),
    );
    let bound = vm.bind(this_of, Value::int(9), &[]).unwrap();
    assert_eq!(vm.call(bound, Value::int(1), &[]), Ok(Value::int(9)));
}

#[test]
fn recursive_construct_overflows_before_entering_another_frame() {
    let options = VmOptions {
        max_entry_depth: 32,
        ..VmOptions::default()
    };
    let mut vm = VM::with_options(options).unwrap();
    let entered = Arc::new(AtomicUsize::new(0));
    let counter = entered.clone();
    let recurse = interpreted(&mut vm, RealmId::MAIN, "Recurse", vec![], move |vm: &mut VM, frame: FrameId, _: Entry| {
        counter.fetch_add(1, Ordering::SeqCst);
        let callee = vm.frames[frame.0].callee.value().unwrap_or_else(Value::undefined);
        vm.construct(callee, &[])
    });

    assert!(vm.construct(recurse, &[]).is_err());
    let (ty, message) = vm.error_info(vm.exception_value().unwrap()).unwrap();
    assert_eq!(ty, ErrorType::RangeError);
    assert_eq!(message, STACK_OVERFLOW_MESSAGE);
    assert_eq!(entered.load(Ordering::SeqCst), 32);
    assert!(vm.frames.is_empty());
    assert!(vm.entries.is_empty());
    assert_eq!(vm.host_recursion_depth, 0);
}

#[test]
fn interpreted_constructors_get_a_fresh_this() {
    let mut vm = VM::new();
    let point = interpreted(&mut vm, RealmId::MAIN, "Point", vec![], |vm: &mut VM, frame: FrameId, _: Entry| {
        let this = vm.this_value(frame);
        vm.put(this, "x", Value::int(3))?;
        Ok(Value::undefined())
    });
    let instance = vm.construct(point, &[]).unwrap();
    assert!(instance.is_object());
    assert_ne!(instance, point);
    assert_eq!(vm.get(instance, "x"), Ok(Value::int(3)));
}

#[test]
fn native_constructors_must_return_objects() {
    let mut vm = VM::new();
    let call = native_fn(|_: &mut VM, _: FrameId| Ok(Value::undefined()));
    let bad = vm.create_native_constructor(
        RealmId::MAIN,
        "Bad",
        call.clone(),
        native_fn(|_: &mut VM, _: FrameId| Ok(Value::int(1))),
    );
    let good = vm.create_native_constructor(
        RealmId::MAIN,
        "Good",
        call,
        native_fn(|vm: &mut VM, _: FrameId| Ok(vm.create_object(RealmId::MAIN))),
    );

    assert!(vm.construct(bad, &[]).is_err());
    assert_eq!(vm.error_info(vm.exception_value().unwrap()).unwrap().0, ErrorType::TypeError);
    vm.clear_exception();
    assert!(vm.construct(good, &[]).unwrap().is_object());
}

#[test]
fn non_constructors_are_rejected() {
    let mut vm = VM::new();
    let f = count_args(&mut vm);
    assert!(vm.construct(f, &[]).is_err());
    let (ty, message) = vm.error_info(vm.exception_value().unwrap()).unwrap();
    assert_eq!(ty, ErrorType::TypeError);
    assert_eq!(message, "not a constructor");
}

#[test]
fn calling_a_non_function_throws() {
    let mut vm = VM::new();
    assert!(vm.call(Value::int(3), Value::undefined(), &[]).is_err());
    let (ty, _) = vm.error_info(vm.exception_value().unwrap()).unwrap();
    assert_eq!(ty, ErrorType::TypeError);
}

#[test]
fn argument_ceiling_is_a_stack_overflow() {
    let options = VmOptions {
        max_arguments: 4,
        ..VmOptions::default()
    };
    let mut vm = VM::with_options(options).unwrap();
    let f = count_args(&mut vm);
    assert_eq!(vm.call(f, Value::undefined(), &[Value::int(0); 4]), Ok(Value::int(4)));
    assert!(vm.call(f, Value::undefined(), &[Value::int(0); 5]).is_err());
    let (ty, _) = vm.error_info(vm.exception_value().unwrap()).unwrap();
    assert_eq!(ty, ErrorType::RangeError);
}

#[test]
fn disallowed_entry_is_ignored_without_running_the_callee() {
    let mut vm = VM::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let f = vm.create_native_function(
        RealmId::MAIN,
        "f",
        native_fn(move |_: &mut VM, _: FrameId| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::int(1))
        }),
    );
    let (called, constructed) = vm.with_vm_entry_disallowed(|vm| {
        let called = vm.call(f, Value::undefined(), &[]);
        let constructed = vm.construct(f, &[]);
        (called, constructed)
    });
    assert_eq!(called, Ok(Value::undefined()));
    assert_eq!(constructed, Ok(vm.global_this(RealmId::MAIN)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(vm.disallow_vm_entry_count, 0);
}

#[test]
#[should_panic(expected = "VM entry while VM entry is disallowed")]
fn disallowed_entry_can_crash() {
    let options = VmOptions {
        crash_on_disallowed_vm_entry: true,
        ..VmOptions::default()
    };
    let mut vm = VM::with_options(options).unwrap();
    let f = count_args(&mut vm);
    let _ = vm.with_vm_entry_disallowed(|vm| vm.call(f, Value::undefined(), &[]));
}

#[test]
fn remote_functions_forward_calls() {
    let mut vm = VM::new();
    let inner_realm = vm.create_realm(Arc::new(vm::compiler::NoCompiler), Arc::new(vm::host::DefaultHost));
    let target = vm.create_native_function(
        inner_realm,
        "target",
        native_fn(|vm: &mut VM, frame: FrameId| Ok(Value::int(vm.argument(frame, 0).as_int().unwrap_or(0) * 2))),
    );
    let proxy = vm.create_remote_function(RealmId::MAIN, target);
    assert_eq!(vm.call(proxy, Value::undefined(), &[Value::int(21)]), Ok(Value::int(42)));
}
