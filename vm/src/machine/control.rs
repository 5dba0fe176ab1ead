use std::sync::Arc;

use memory::Value;

use crate::code_block::CodeBlock;
use crate::exception::{Completion, Thrown};
use crate::executable::{CompiledCode, Entry, Specialization};
use crate::function::{CallData, FunctionKind};
use crate::native::NativeFn;
use crate::realm::RealmId;
use crate::unwind::UnwindOutcome;

use super::frame::{CallFrame, CallStack, Callee, CallerLink, FrameId, FrameSlot};
use super::gc::GarbageCollector;
use super::stack::StackOps;
use super::vm::VM;

/// Code a frame runs.
#[derive(Clone)]
pub enum Body {
    Compiled(Arc<dyn CompiledCode>),
    /// Host functions have no handler table and are only entered at start.
    Native(NativeFn),
}

impl Body {
    fn run(&self, vm: &mut VM, frame: FrameId, entry: Entry) -> Completion {
        match self {
            Body::Compiled(code) => code.run(vm, frame, entry),
            Body::Native(function) => {
                debug_assert!(matches!(entry, Entry::Start), "native frames have no handlers");
                function(vm, frame)
            }
        }
    }
}

/// Everything but the registers of a frame about to be pushed.
#[derive(Clone)]
pub struct FramePlan {
    pub callee: Callee,
    pub code_block: Option<Arc<CodeBlock>>,
    pub realm: RealmId,
    pub scope: Option<u32>,
    pub body: Body,
}

impl VM {
    /// Picks the entry point of `function` for `specialization`, compiling
    /// interpreted code first if needed.
    pub fn plan_for(&mut self, function: Value, data: &CallData, specialization: Specialization) -> Completion<FramePlan> {
        let realm = self
            .function_record(function)
            .map_or_else(|| self.current_realm(), |record| record.realm);
        match data {
            CallData::None => Err(self.throw_type_error("not a function")),
            CallData::Interpreted { scope, executable } => {
                let code_block = executable.unit.prepare_for_execution(self, specialization)?;
                Ok(FramePlan {
                    callee: Callee::Interpreted(function),
                    body: Body::Compiled(code_block.code.clone()),
                    code_block: Some(code_block),
                    realm,
                    scope: Some(*scope),
                })
            }
            CallData::Native {
                function: native,
                is_foreign,
                ..
            } => {
                if *is_foreign {
                    if let Some(FunctionKind::Foreign { callee }) = self.function_record(function).map(|r| &r.kind) {
                        let callee = callee.clone();
                        return Ok(FramePlan {
                            body: Body::Compiled(callee.code.clone()),
                            callee: Callee::Foreign(callee),
                            code_block: None,
                            realm,
                            scope: None,
                        });
                    }
                }
                Ok(FramePlan {
                    callee: Callee::Native(function),
                    code_block: None,
                    realm,
                    scope: None,
                    body: Body::Native(native.clone()),
                })
            }
        }
    }

    /// Pushes a frame over `slot`, whose `this` and arguments are already
    /// written, and runs it to completion. Nothing is pushed when the stack
    /// cannot host the frame's locals.
    pub(crate) fn enter_frame(&mut self, slot: FrameSlot, plan: FramePlan, caller: CallerLink) -> Completion {
        let locals = plan.code_block.as_ref().map_or(0, |cb| cb.num_locals as usize);
        if !self.stack.ensure_capacity_for(&slot, locals) {
            return Err(self.throw_stack_overflow());
        }
        for register in slot.end()..slot.end() + locals {
            self.stack.set(register, Value::undefined());
        }
        let machine_slots = plan
            .code_block
            .as_ref()
            .map_or(0, |cb| cb.callee_saves.slot_count());

        let id = FrameId(self.frames.len());
        self.frames.push(CallFrame {
            callee: plan.callee,
            code_block: plan.code_block,
            argument_count_including_this: slot.argument_count_including_this,
            caller,
            location: 0,
            base: slot.base,
            register_count: slot.argument_count_including_this as usize + locals,
            realm: plan.realm,
            scope: plan.scope,
            machine_slots: vec![0; machine_slots],
        });
        self.collect_if_needed();

        self.host_recursion_depth += 1;
        let result = self.run_frame(id, &plan.body);
        self.host_recursion_depth -= 1;
        self.frames.truncate(id.0);
        result
    }

    /// Runs the frame's body, resuming it at every handler the unwinder
    /// finds inside it.
    fn run_frame(&mut self, frame: FrameId, body: &Body) -> Completion {
        let mut entry = Entry::Start;
        loop {
            let result = match entry {
                Entry::Start => self.check_traps().and_then(|()| body.run(self, frame, entry)),
                Entry::Catch { .. } => body.run(self, frame, entry),
            };
            if result.is_ok() {
                return result;
            }

            let outcome = match self.pending_unwind.take() {
                Some(outcome) => outcome,
                None => self.unwind(frame),
            };
            match outcome {
                UnwindOutcome::HandlerFound { frame: target, catch } if target == frame => {
                    let exception = self
                        .clear_exception()
                        .map_or_else(Value::undefined, |e| e.value);
                    self.set_location(frame, catch.target());
                    tracing::trace!(frame = frame.0, target = catch.target(), "resuming at handler");
                    entry = Entry::Catch { catch, exception };
                }
                outcome => {
                    self.pending_unwind = Some(outcome);
                    return Err(Thrown);
                }
            }
        }
    }

    /// Calls `function` from compiled code running in `caller`, placing the
    /// callee frame past `used_stack_slots` of the caller's registers.
    pub fn call_from(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        function: Value,
        this_value: Value,
        args: &[Value],
    ) -> Completion {
        if args.len() > self.options.max_arguments as usize {
            return Err(self.throw_stack_overflow());
        }
        let slot = CallStack::callee_frame_for(self.frames[caller.0].base, used_stack_slots, args.len() as u32 + 1);
        if !self.stack.ensure_capacity_for(&slot, 0) {
            return Err(self.throw_stack_overflow());
        }
        self.set_reg(slot.this_register(), 0, this_value);
        self.stack.write_slice(slot.argument_register(0), args);
        self.enter_planned(caller, slot, function)
    }

    /// `function.apply(this_value, arguments)` from compiled code, skipping
    /// the first `first_var_arg_offset` values of `arguments`.
    pub fn call_varargs_from(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        function: Value,
        this_value: Value,
        arguments: Value,
        first_var_arg_offset: u32,
    ) -> Completion {
        let length = self.size_frame_for_varargs(caller, arguments, used_stack_slots, first_var_arg_offset)?;
        let slot = self.setup_varargs_frame_and_set_this(
            caller,
            used_stack_slots,
            this_value,
            arguments,
            first_var_arg_offset,
            length,
        )?;
        self.enter_planned(caller, slot, function)
    }

    /// Calls `function` with the caller's own arguments.
    pub fn call_forward_arguments_from(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        function: Value,
        this_value: Value,
    ) -> Completion {
        let length = self.size_frame_for_forward_arguments(caller, used_stack_slots)?;
        let slot = self.setup_forward_arguments_frame_and_set_this(caller, used_stack_slots, this_value, length);
        self.enter_planned(caller, slot, function)
    }

    fn enter_planned(&mut self, caller: FrameId, slot: FrameSlot, function: Value) -> Completion {
        if !self.is_safe_to_recurse_soft() {
            return Err(self.throw_stack_overflow());
        }
        self.stats.dispatcher_steps += 1;
        let data = self.call_data(function);
        let plan = self.plan_for(function, &data, Specialization::Call)?;
        self.enter_frame(slot, plan, CallerLink::Frame(caller))
    }
}
