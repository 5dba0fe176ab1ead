//! Call and construct dispatch: the single choke point through which host
//! code invokes a callable value.

use memory::{Object, ObjectKind, Value};

use crate::exception::Completion;
use crate::executable::Specialization;
use crate::function::{CallData, FunctionKind};
use crate::unwind::registers::EntryRecord;

use super::control::{Body, FramePlan};
use super::frame::{CallStack, CallerLink, EntryFrame, EntryId, FrameId, ProtoCallFrame};
use super::vm::VM;

const NATIVE_CONSTRUCT_RESULT_MESSAGE: &str = "native constructor did not return an object";

impl VM {
    /// How `value` is entered when called.
    pub fn call_data(&self, value: Value) -> CallData {
        let Some(record) = self.function_record(value) else {
            return CallData::None;
        };
        match &record.kind {
            FunctionKind::Interpreted { executable, scope } => CallData::Interpreted {
                scope: *scope,
                executable: executable.clone(),
            },
            FunctionKind::Native { call, .. } => CallData::Native {
                function: call.clone(),
                is_bound_function: false,
                is_foreign: false,
            },
            FunctionKind::Bound { .. } => CallData::Native {
                function: super::native::bound_call_thunk(),
                is_bound_function: true,
                is_foreign: false,
            },
            FunctionKind::Remote { .. } => CallData::Native {
                function: super::native::remote_call_thunk(),
                is_bound_function: false,
                is_foreign: false,
            },
            FunctionKind::Foreign { callee } => CallData::Native {
                function: super::native::foreign_call_thunk(callee.clone()),
                is_bound_function: false,
                is_foreign: true,
            },
        }
    }

    /// How `value` is entered when constructed.
    pub fn construct_data(&self, value: Value) -> CallData {
        let Some(record) = self.function_record(value) else {
            return CallData::None;
        };
        match &record.kind {
            FunctionKind::Interpreted { executable, scope } if executable.constructable => CallData::Interpreted {
                scope: *scope,
                executable: executable.clone(),
            },
            FunctionKind::Native {
                construct: Some(construct),
                ..
            } => CallData::Native {
                function: construct.clone(),
                is_bound_function: false,
                is_foreign: false,
            },
            FunctionKind::Bound { target, .. } if self.construct_data(*target).is_callable() => CallData::Native {
                function: super::native::bound_construct_thunk(),
                is_bound_function: true,
                is_foreign: false,
            },
            _ => CallData::None,
        }
    }

    pub fn call(&mut self, function: Value, this_value: Value, args: &[Value]) -> Completion {
        let data = self.call_data(function);
        self.execute_call(function, &data, this_value, args)
    }

    pub fn construct(&mut self, constructor: Value, args: &[Value]) -> Completion {
        self.construct_with_new_target(constructor, args, constructor)
    }

    pub fn construct_with_new_target(&mut self, constructor: Value, args: &[Value], new_target: Value) -> Completion {
        let data = self.construct_data(constructor);
        self.execute_construct(constructor, &data, args, new_target)
    }

    /// Invokes `callee`. A bound function is unwrapped here in one step;
    /// `bind` guarantees its target is never itself bound.
    pub fn execute_call(&mut self, callee: Value, data: &CallData, this_value: Value, args: &[Value]) -> Completion {
        self.stats.dispatcher_steps += 1;
        if let CallData::Native {
            is_bound_function: true,
            ..
        } = data
        {
            let bound = match self.function_record(callee).map(|r| &r.kind) {
                Some(FunctionKind::Bound {
                    target,
                    bound_this,
                    bound_args,
                    tainted,
                }) => Some((*target, *bound_this, bound_args.clone(), *tainted)),
                _ => None,
            };
            if let Some((target, bound_this, bound_args, tainted)) = bound {
                if tainted {
                    self.might_be_executing_tainted_code = true;
                }
                if bound_args.is_empty() {
                    self.stats.bound_unwraps += 1;
                    let target_data = self.call_data(target);
                    return self.execute_call_impl(target, &target_data, bound_this, args);
                }
                return self.execute_bound_call(target, bound_this, &bound_args, args);
            }
        }
        self.execute_call_impl(callee, data, this_value, args)
    }

    /// Bound call with prepended arguments.
    fn execute_bound_call(&mut self, target: Value, bound_this: Value, bound_args: &[Value], args: &[Value]) -> Completion {
        let total = bound_args.len() + args.len();
        if total > self.options.max_arguments as usize {
            return Err(self.throw_stack_overflow());
        }
        let mut combined = Vec::with_capacity(total);
        combined.extend_from_slice(bound_args);
        combined.extend_from_slice(args);
        self.stats.bound_unwraps += 1;
        let target_data = self.call_data(target);
        self.execute_call_impl(target, &target_data, bound_this, &combined)
    }

    fn execute_call_impl(&mut self, callee: Value, data: &CallData, this_value: Value, args: &[Value]) -> Completion {
        if !self.is_safe_to_recurse_soft() || args.len() > self.options.max_arguments as usize {
            return Err(self.throw_stack_overflow());
        }
        if self.disallow_vm_entry_count > 0 {
            return self.check_vm_entry_permission();
        }
        let plan = self.plan_for(callee, data, Specialization::Call)?;
        let proto = ProtoCallFrame {
            code_block: plan.code_block,
            realm: plan.realm,
            callee: plan.callee,
            this_value,
            args: args.to_vec(),
            scope: plan.scope,
        };
        self.vm_entry(proto, plan.body)
    }

    /// Constructs with `constructor`. Interpreted constructors receive a
    /// fresh `this`; native ones find `new_target` in their `this` register
    /// and must return an object.
    pub fn execute_construct(
        &mut self,
        constructor: Value,
        data: &CallData,
        args: &[Value],
        new_target: Value,
    ) -> Completion {
        self.stats.dispatcher_steps += 1;
        if !self.is_safe_to_recurse_soft() || args.len() > self.options.max_arguments as usize {
            return Err(self.throw_stack_overflow());
        }
        if self.disallow_vm_entry_count > 0 {
            self.check_vm_entry_permission()?;
            let realm = self.current_realm();
            return Ok(self.global_this(realm));
        }
        if !data.is_callable() {
            return Err(self.throw_type_error("not a constructor"));
        }

        let plan = self.plan_for(constructor, data, Specialization::Construct)?;
        let interpreted = matches!(data, CallData::Interpreted { .. });
        let this_value = if interpreted {
            Value::object(self.heap.alloc_object(Object::new(ObjectKind::Ordinary, plan.realm.0)))
        } else {
            new_target
        };
        let proto = ProtoCallFrame {
            code_block: plan.code_block,
            realm: plan.realm,
            callee: plan.callee,
            this_value,
            args: args.to_vec(),
            scope: plan.scope,
        };
        let result = self.vm_entry(proto, plan.body)?;
        if result.is_object() {
            Ok(result)
        } else if interpreted {
            Ok(this_value)
        } else {
            Err(self.throw_type_error(NATIVE_CONSTRUCT_RESULT_MESSAGE))
        }
    }

    /// Outcome of an entry attempt while VM entry is disallowed.
    pub(crate) fn check_vm_entry_permission(&mut self) -> Completion {
        if self.options.crash_on_disallowed_vm_entry {
            panic!("VM entry while VM entry is disallowed");
        }
        tracing::warn!(count = self.disallow_vm_entry_count, "disallowed VM entry ignored");
        Ok(Value::undefined())
    }

    /// Native recursion heuristic: nested frame runs under the configured
    /// ceiling.
    #[inline]
    pub fn is_safe_to_recurse_soft(&self) -> bool {
        self.host_recursion_depth < self.options.max_entry_depth
    }

    /// Entry trampoline: pushes an entry sentinel, lays out `this` and the
    /// arguments past the innermost frame and runs the callee. The entry's
    /// callee-save record is kept in `last_entry_record` once it returns.
    pub fn vm_entry(&mut self, proto: ProtoCallFrame, body: Body) -> Completion {
        let base = self.frames.last().map_or(0, |f| f.end());
        let slot = CallStack::callee_frame_for(base, 0, proto.argument_count_including_this());
        if !self.stack.ensure_capacity_for(&slot, 0) {
            return Err(self.throw_stack_overflow());
        }
        self.stack.set(slot.this_register(), proto.this_value);
        self.stack.write_slice(slot.argument_register(0), &proto.args);

        let entry = EntryId(self.entries.len());
        self.entries.push(EntryFrame {
            caller_top: self.frames.len().checked_sub(1).map(FrameId),
            first_frame: self.frames.len(),
            record: EntryRecord::new(self.runtime.convention().buffer_len()),
        });
        self.stats.vm_entries += 1;
        tracing::debug!(entry = entry.0, args = proto.args.len(), callee = ?proto.callee, "vm entry");

        let plan = FramePlan {
            callee: proto.callee,
            code_block: proto.code_block,
            realm: proto.realm,
            scope: proto.scope,
            body,
        };
        let result = self.enter_frame(slot, plan, CallerLink::Entry(entry));

        // The unwind outcome never outlives its entry.
        self.pending_unwind = None;
        if let Some(exited) = self.entries.pop() {
            self.last_entry_record = Some(exited.record);
        }
        tracing::debug!(entry = entry.0, threw = result.is_err(), "vm exit");
        result
    }
}
