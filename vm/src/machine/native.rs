use std::sync::Arc;

use memory::{ArgumentsFlavor, Object, ObjectKind, Property, Value};

use crate::code_block::ImplementationVisibility;
use crate::exception::Completion;
use crate::executable::{Entry, FunctionExecutable};
use crate::foreign::ForeignCallee;
use crate::function::{function_index, FunctionKind, FunctionRecord};
use crate::native::{native_fn, NativeFn};
use crate::realm::RealmId;

use super::frame::FrameId;
use super::stack::StackOps;
use super::vm::VM;

impl VM {
    fn alloc_function(&mut self, record: FunctionRecord) -> Value {
        let realm = record.realm;
        let index = self.functions.len() as u32;
        self.functions.push(record);
        Value::object(self.heap.alloc_object(Object::new(ObjectKind::Function(index), realm.0)))
    }

    pub fn create_native_function(&mut self, realm: RealmId, name: &str, call: NativeFn) -> Value {
        self.alloc_function(FunctionRecord {
            kind: FunctionKind::Native { call, construct: None },
            realm,
            name: name.to_string(),
            visibility: ImplementationVisibility::Public,
        })
    }

    pub fn create_native_constructor(&mut self, realm: RealmId, name: &str, call: NativeFn, construct: NativeFn) -> Value {
        self.alloc_function(FunctionRecord {
            kind: FunctionKind::Native {
                call,
                construct: Some(construct),
            },
            realm,
            name: name.to_string(),
            visibility: ImplementationVisibility::Public,
        })
    }

    /// Closure over `scope` for an interpreted function.
    pub fn create_function(&mut self, executable: Arc<FunctionExecutable>, scope: u32, realm: RealmId) -> Value {
        let name = executable.name.clone();
        let visibility = executable.visibility;
        self.alloc_function(FunctionRecord {
            kind: FunctionKind::Interpreted { executable, scope },
            realm,
            name,
            visibility,
        })
    }

    /// Marshalling proxy living in `realm` that forwards calls to `target`.
    pub fn create_remote_function(&mut self, realm: RealmId, target: Value) -> Value {
        let name = self.function_record(target).map(|r| r.name.clone()).unwrap_or_default();
        self.alloc_function(FunctionRecord {
            kind: FunctionKind::Remote { target },
            realm,
            name,
            visibility: ImplementationVisibility::Public,
        })
    }

    pub fn create_foreign_function(&mut self, realm: RealmId, callee: Arc<ForeignCallee>) -> Value {
        let name = callee.index_or_name();
        self.alloc_function(FunctionRecord {
            kind: FunctionKind::Foreign { callee },
            realm,
            name,
            visibility: ImplementationVisibility::Public,
        })
    }

    /// `target.bind(bound_this, ...bound_args)`. Binding a bound function
    /// binds its target instead, so chains never nest.
    pub fn bind(&mut self, target: Value, bound_this: Value, bound_args: &[Value]) -> Completion {
        if !self.call_data(target).is_callable() {
            return Err(self.throw_type_error("Function.prototype.bind called on a non-function"));
        }
        let Some(record) = self.function_record(target) else {
            return Err(self.throw_type_error("Function.prototype.bind called on a non-function"));
        };
        let realm = record.realm;
        let name = format!("bound {}", record.name);
        let (target, bound_this, bound_args, tainted) = match &record.kind {
            FunctionKind::Bound {
                target: inner,
                bound_this: inner_this,
                bound_args: inner_args,
                tainted,
            } => {
                let mut args = inner_args.clone();
                args.extend_from_slice(bound_args);
                (*inner, *inner_this, args, *tainted)
            }
            _ => (target, bound_this, bound_args.to_vec(), false),
        };
        let tainted = tainted || self.source_tainted_origin_from_stack().is_tainted();
        Ok(self.alloc_function(FunctionRecord {
            kind: FunctionKind::Bound {
                target,
                bound_this,
                bound_args,
                tainted,
            },
            realm,
            name,
            visibility: ImplementationVisibility::Public,
        }))
    }

    pub fn function_record(&self, value: Value) -> Option<&FunctionRecord> {
        let index = function_index(&self.heap, value)?;
        self.functions.get(index as usize)
    }

    pub fn is_remote_function(&self, value: Value) -> bool {
        self.function_record(value).is_some_and(FunctionRecord::is_remote)
    }

    pub fn create_object(&mut self, realm: RealmId) -> Value {
        Value::object(self.heap.alloc_object(Object::new(ObjectKind::Ordinary, realm.0)))
    }

    pub fn create_array(&mut self, elements: &[Value]) -> Value {
        let realm = self.current_realm();
        Value::object(
            self.heap
                .alloc_object(Object::with_elements(ObjectKind::Array, realm.0, elements.to_vec())),
        )
    }

    /// Fixed-length list, as produced for spread arguments.
    pub fn create_immutable_list(&mut self, elements: &[Value]) -> Value {
        let realm = self.current_realm();
        let mut object = Object::with_elements(ObjectKind::ImmutableList, realm.0, elements.to_vec());
        object.extensible = false;
        Value::object(self.heap.alloc_object(object))
    }

    pub fn create_arguments_object(&mut self, flavor: ArgumentsFlavor, elements: &[Value]) -> Value {
        let realm = self.current_realm();
        let mut object = Object::with_elements(ObjectKind::Arguments(flavor), realm.0, elements.to_vec());
        let mut length = Property::data(Value::int(elements.len() as i64));
        length.attributes.enumerable = false;
        object.properties.insert("length".to_string(), length);
        Value::object(self.heap.alloc_object(object))
    }

    pub fn alloc_str(&mut self, s: &str) -> Value {
        Value::string(self.heap.alloc_string(s.to_string()))
    }

    /// Contents of a string value, flattening ropes. Empty for non-strings.
    pub fn string_value(&mut self, value: Value) -> String {
        value
            .as_handle()
            .filter(|_| value.is_string())
            .and_then(|h| self.heap.resolve_string(h))
            .unwrap_or_default()
    }
}

fn bound_parts(vm: &VM, callee: Value) -> Option<(Value, Value, Vec<Value>)> {
    match &vm.function_record(callee)?.kind {
        FunctionKind::Bound {
            target,
            bound_this,
            bound_args,
            ..
        } => Some((*target, *bound_this, bound_args.clone())),
        _ => None,
    }
}

fn callee_of(vm: &VM, frame: FrameId) -> Value {
    vm.frames[frame.0].callee.value().unwrap_or_else(Value::undefined)
}

/// Body of a bound function entered through a frame rather than the
/// dispatcher's unwrap step.
pub(crate) fn bound_call_thunk() -> NativeFn {
    native_fn(|vm: &mut VM, frame: FrameId| {
        let Some((target, bound_this, mut args)) = bound_parts(vm, callee_of(vm, frame)) else {
            return Err(vm.throw_type_error("not a bound function"));
        };
        args.extend(vm.arguments(frame));
        vm.call(target, bound_this, &args)
    })
}

/// Construct body of a bound function. `new.target` naming the bound
/// function itself is redirected to the target.
pub(crate) fn bound_construct_thunk() -> NativeFn {
    native_fn(|vm: &mut VM, frame: FrameId| {
        let callee = callee_of(vm, frame);
        let Some((target, _, mut args)) = bound_parts(vm, callee) else {
            return Err(vm.throw_type_error("not a bound function"));
        };
        args.extend(vm.arguments(frame));
        let mut new_target = vm.this_value(frame);
        if new_target == callee {
            new_target = target;
        }
        vm.construct_with_new_target(target, &args, new_target)
    })
}

/// Forwards a call through a marshalling proxy.
pub(crate) fn remote_call_thunk() -> NativeFn {
    native_fn(|vm: &mut VM, frame: FrameId| {
        let target = match vm.function_record(callee_of(vm, frame)).map(|r| &r.kind) {
            Some(FunctionKind::Remote { target }) => *target,
            _ => return Err(vm.throw_type_error("not a remote function")),
        };
        let this_value = vm.this_value(frame);
        let args = vm.arguments(frame);
        vm.call(target, this_value, &args)
    })
}

/// Foreign functions are planned onto their own code; this body only runs
/// when a foreign function is invoked as a plain native.
pub(crate) fn foreign_call_thunk(callee: Arc<ForeignCallee>) -> NativeFn {
    native_fn(move |vm: &mut VM, frame: FrameId| callee.code.run(vm, frame, Entry::Start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> NativeFn {
        native_fn(|_: &mut VM, _: FrameId| Ok(Value::undefined()))
    }

    #[test]
    fn bind_flattens_chains_and_concatenates_arguments() {
        let mut vm = VM::new();
        let f = vm.create_native_function(RealmId::MAIN, "f", noop());
        let once = vm.bind(f, Value::int(1), &[Value::int(10)]).unwrap();
        let twice = vm.bind(once, Value::int(2), &[Value::int(20)]).unwrap();

        let record = vm.function_record(twice).unwrap();
        assert_eq!(record.name, "bound bound f");
        match &record.kind {
            FunctionKind::Bound {
                target,
                bound_this,
                bound_args,
                tainted,
            } => {
                assert_eq!(*target, f);
                assert_eq!(*bound_this, Value::int(1));
                assert_eq!(bound_args, &vec![Value::int(10), Value::int(20)]);
                assert!(!tainted);
            }
            _ => panic!("expected a bound function"),
        }
    }

    #[test]
    fn bind_rejects_non_callables() {
        let mut vm = VM::new();
        let object = vm.create_object(RealmId::MAIN);
        assert!(vm.bind(object, Value::undefined(), &[]).is_err());
        assert!(vm.bind(Value::int(3), Value::undefined(), &[]).is_err());
    }

    #[test]
    fn arguments_objects_carry_their_length() {
        let mut vm = VM::new();
        let args = vm.create_arguments_object(ArgumentsFlavor::Direct, &[Value::int(1), Value::int(2)]);
        let object = vm.heap.get_object(args.as_object().unwrap()).unwrap();
        assert_eq!(object.arguments_length(), 2);
    }

    #[test]
    fn remote_functions_are_recognized() {
        let mut vm = VM::new();
        let f = vm.create_native_function(RealmId::MAIN, "f", noop());
        let proxy = vm.create_remote_function(RealmId::MAIN, f);
        assert!(vm.is_remote_function(proxy));
        assert!(!vm.is_remote_function(f));
    }
}
