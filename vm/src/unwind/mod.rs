//! Stack unwinder and exception dispatcher.
//!
//! Walks machine frames outward from the throw site until a handler is
//! found or the frame called by the VM entry has been departed. The walk
//! never allocates frames and runs under `AssertNoGc`; the only heap work
//! happens after the walk (sanitizing, foreign wrapping).

pub mod registers;
pub mod visitor;

use memory::{Object, ObjectKind, Value};

use crate::code_block::{HandlerInfo, HandlerKind, RequiredHandler};
use crate::exception::{sanitized_message, DEFAULT_TYPE_ERROR_MESSAGE};
use crate::foreign::{CompilationMode, ForeignCallee, ForeignHandlerInfo, TagId};
use crate::machine::{Callee, FrameId, VM};
use crate::traps::DeferTermination;
use memory::ErrorType;

use registers::copy_callee_saves;

/// Where the resuming tier continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeLocator {
    /// Bytecode target of an interpreted or baseline frame.
    Interpreter { target: u32 },
    /// Optimizing code resumes through its own catch entry; the bytecode
    /// target may belong to an inlined callee.
    Machine { target: u32 },
    Foreign {
        mode: CompilationMode,
        target: u32,
        metadata: u32,
        try_depth: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatchDescriptor {
    pub kind: HandlerKind,
    pub resume: ResumeLocator,
}

impl CatchDescriptor {
    fn for_handler(handler: &HandlerInfo, optimizing: bool) -> Self {
        let resume = if optimizing {
            ResumeLocator::Machine {
                target: handler.target,
            }
        } else {
            ResumeLocator::Interpreter {
                target: handler.target,
            }
        };
        Self {
            kind: handler.kind,
            resume,
        }
    }

    fn for_foreign(handler: &ForeignHandlerInfo, callee: &ForeignCallee) -> Self {
        Self {
            kind: HandlerKind::ForeignBoundaryCatch,
            resume: ResumeLocator::Foreign {
                mode: callee.mode,
                target: handler.target,
                metadata: handler.target_metadata,
                try_depth: handler.try_depth,
            },
        }
    }

    /// Bytecode-level target, whatever the tier.
    pub fn target(&self) -> u32 {
        match self.resume {
            ResumeLocator::Interpreter { target }
            | ResumeLocator::Machine { target }
            | ResumeLocator::Foreign { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindOutcome {
    HandlerFound {
        frame: FrameId,
        catch: CatchDescriptor,
    },
    /// The walk reached the entry frame; the exception leaves this VM entry.
    NoHandler,
}

/// Accumulator threaded through the walk. Frames are visited innermost
/// first, so the last proxy recorded is the outermost one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarshallingState {
    outermost_proxy: Option<Value>,
}

impl MarshallingState {
    pub fn cross(self, proxy: Value) -> Self {
        Self {
            outermost_proxy: Some(proxy),
        }
    }

    pub fn outermost_proxy(&self) -> Option<Value> {
        self.outermost_proxy
    }
}

/// How the thrown value looks to foreign handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ForeignCatchability {
    catchable: bool,
    tag: TagId,
}

impl VM {
    /// Locates the handler for the pending exception, starting at `frame`.
    pub fn unwind(&mut self, frame: FrameId) -> UnwindOutcome {
        let termination = self.is_termination_exception();
        let _defer = (!termination).then(|| DeferTermination::new(&self.traps));
        let Some(exception_value) = self.exception_value() else {
            debug_assert!(false, "unwind without a pending exception");
            return UnwindOutcome::NoHandler;
        };

        if !termination {
            self.notify_debugger_of_exception_to_be_thrown(frame);
        }

        let foreign = (!termination).then(|| self.foreign_catchability(exception_value));
        let mut state = MarshallingState::default();
        let mut outcome = UnwindOutcome::NoHandler;
        let mut cursor = self.machine_frame(self.innermost_logical_frame(frame));
        let mut wrap_for_host_tag = false;

        {
            let _no_gc = self.gc.assert_no_gc();
            loop {
                let current = cursor.frame;
                let (callee, code_block, location, caller_is_entry) = {
                    let f = &self.frames[current.0];
                    (f.callee.clone(), f.code_block.clone(), f.location, f.caller_is_entry_frame())
                };
                tracing::trace!(frame = current.0, location, termination, "unwind step");

                if let (Some(code_block), false) = (&code_block, termination) {
                    if let Some(handler) = code_block
                        .handlers
                        .handler_for_index(location, RequiredHandler::AnyHandler)
                    {
                        outcome = UnwindOutcome::HandlerFound {
                            frame: current,
                            catch: CatchDescriptor::for_handler(handler, code_block.is_optimizing()),
                        };
                        break;
                    }
                }

                if let (Callee::Foreign(foreign_callee), Some(thrown)) = (&callee, foreign) {
                    if thrown.catchable && foreign_callee.has_exception_handlers() {
                        if let Some(handler) = foreign_callee.handler_for_index(location, thrown.tag) {
                            wrap_for_host_tag = thrown.tag == self.runtime.host_exception_tag();
                            outcome = UnwindOutcome::HandlerFound {
                                frame: current,
                                catch: CatchDescriptor::for_foreign(handler, foreign_callee),
                            };
                            break;
                        }
                    }
                }

                if !termination {
                    if let Some(proxy) = callee.value().filter(|v| self.is_remote_function(*v)) {
                        state = state.cross(proxy);
                    }
                }

                self.notify_debugger_of_unwinding(current);
                self.copy_callee_saves_to_entry_record(current);

                if caller_is_entry {
                    break;
                }
                match self.next_machine_frame(cursor) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        let last = cursor.frame;

        if wrap_for_host_tag {
            self.wrap_exception_for_host_tag(last);
        }
        if let Some(proxy) = state.outermost_proxy() {
            debug_assert!(!termination);
            self.sanitize_remote_function_exception(proxy);
        }
        if !self.checkpoint_side_state.is_empty() {
            self.pop_checkpoint_side_state_until(last);
        }

        self.stats.unwinds += 1;
        tracing::debug!(?outcome, termination, "unwind finished");
        outcome
    }

    /// Catch-only handler search over the whole stack, for diagnostics.
    pub fn has_catch_handler(&self, frame: FrameId) -> bool {
        let _no_gc = self.gc.assert_no_gc();
        let mut cursor = Some(frame);
        while let Some(current) = cursor {
            let f = &self.frames[current.0];
            if let Some(code_block) = &f.code_block {
                if code_block
                    .handlers
                    .handler_for_index(f.location, RequiredHandler::CatchHandler)
                    .is_some()
                {
                    return true;
                }
            }
            cursor = self.physical_caller(current);
        }
        false
    }

    fn foreign_catchability(&self, value: Value) -> ForeignCatchability {
        let host_tag = self.runtime.host_exception_tag();
        let object = value.as_object().and_then(|h| self.heap.get_object(h));
        match object.map(|o| &o.kind) {
            Some(ObjectKind::ForeignException { tag, .. }) => ForeignCatchability {
                catchable: true,
                tag: TagId(*tag),
            },
            Some(ObjectKind::Error(data)) => ForeignCatchability {
                catchable: data.catchable_from_foreign,
                tag: host_tag,
            },
            _ => ForeignCatchability {
                catchable: true,
                tag: host_tag,
            },
        }
    }

    /// Boxes the exception value for a foreign handler catching the host
    /// exception tag.
    fn wrap_exception_for_host_tag(&mut self, frame: FrameId) {
        let Some(value) = self.exception_value() else {
            return;
        };
        let realm = self.frames[frame.0].realm;
        let tag = self.runtime.host_exception_tag();
        let wrapped = Value::object(self.heap.alloc_object(Object::new(
            ObjectKind::ForeignException {
                tag: tag.0,
                payload: value,
            },
            realm.0,
        )));
        if let Some(exception) = self.exception.as_mut() {
            exception.value = wrapped;
        }
    }

    /// Replaces the exception with a `TypeError` of the proxy's realm that
    /// carries at most a string rendering of the original.
    fn sanitize_remote_function_exception(&mut self, proxy: Value) {
        debug_assert!(self.traps.is_deferring_termination());
        let Some(value) = self.exception_value() else {
            return;
        };
        let realm = self
            .function_record(proxy)
            .map_or_else(|| self.current_realm(), |record| record.realm);

        let message = if value.is_primitive() {
            self.to_display_string(value)
        } else {
            value
                .as_object()
                .and_then(|h| self.heap.get_object(h))
                .and_then(sanitized_message)
                .map(str::to_string)
                .unwrap_or_default()
        };
        self.clear_exception();
        tracing::debug!(realm = realm.0, "sanitizing exception crossing a marshalling boundary");

        let message = if message.is_empty() {
            DEFAULT_TYPE_ERROR_MESSAGE
        } else {
            message.as_str()
        };
        let _ = self.throw_error_in_realm(realm, ErrorType::TypeError, message);
    }

    fn notify_debugger_of_unwinding(&mut self, frame: FrameId) {
        let realm = self.frames[frame.0].realm;
        if self.realm(realm).debugger.is_none() {
            return;
        }
        let _defer = DeferTermination::new(&self.traps);
        let is_function_frame = match &self.frames[frame.0].callee {
            Callee::Native(_) | Callee::Foreign(_) => true,
            Callee::Interpreted(v) => self.function_record(*v).is_some(),
        };
        self.with_suspended_exception(|vm| {
            vm.with_debugger(realm, |debugger, vm| {
                if is_function_frame {
                    debugger.unwind_event(vm, frame);
                } else {
                    debugger.did_execute_program(vm, frame);
                }
            });
        });
    }

    fn notify_debugger_of_exception_to_be_thrown(&mut self, frame: FrameId) {
        let Some(exception) = self.exception.as_ref() else {
            return;
        };
        debug_assert!(!exception.termination);
        let (value, notified) = (exception.value, exception.did_notify_inspector_of_throw);
        let realm = self.frames[frame.0].realm;
        let wants = self
            .realm(realm)
            .debugger
            .as_ref()
            .is_some_and(|d| d.needs_exception_callbacks());

        if wants && !notified {
            let has_catch_handler = self.has_catch_handler(frame);
            self.with_suspended_exception(|vm| {
                vm.with_debugger(realm, |debugger, vm| {
                    debugger.exception(vm, realm, Some(frame), value, has_catch_handler);
                });
            });
        }
        if let Some(exception) = self.exception.as_mut() {
            exception.did_notify_inspector_of_throw = true;
        }
    }

    fn copy_callee_saves_to_entry_record(&mut self, frame: FrameId) {
        let f = &self.frames[frame.0];
        let Some(code_block) = f.code_block.as_ref() else {
            return;
        };
        if code_block.callee_saves.is_empty() {
            return;
        }
        let Some(entry) = self.entries.last_mut() else {
            return;
        };
        let copied = copy_callee_saves(
            self.runtime.convention(),
            &code_block.callee_saves,
            &f.machine_slots,
            &mut entry.record,
        );
        tracing::trace!(frame = frame.0, copied, "restored callee saves into entry record");
    }
}
