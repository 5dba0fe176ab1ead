use memory::{ErrorData, ErrorType, Object, ObjectKind, Property, Value};

use crate::error::RuntimeError;
use crate::machine::VM;
use crate::realm::RealmId;
use crate::trace::{render_trace, StackFrame, TraceBound, TraceRequest};

pub const STACK_OVERFLOW_MESSAGE: &str = "Maximum call stack size exceeded.";
pub const DEFAULT_TYPE_ERROR_MESSAGE: &str = "Type error";

/// Proof that an exception is parked on the VM. Carries no data; the
/// exception itself is read through `VM::exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown;

pub type Completion<T = Value> = Result<T, Thrown>;

#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    /// Never `Value::empty()`.
    pub value: Value,
    pub termination: bool,
    pub did_notify_inspector_of_throw: bool,
    /// Captured at creation; empty for terminations.
    pub trace: Vec<StackFrame>,
}

impl VM {
    /// Parks `value` as the current exception.
    pub fn throw_value(&mut self, value: Value) -> Thrown {
        debug_assert!(!value.is_empty(), "thrown value must be initialized");
        let value = if value.is_empty() { Value::null() } else { value };
        let termination = value == self.termination_sentinel;
        let trace = if termination {
            Vec::new()
        } else {
            let request = TraceRequest {
                skip: 0,
                max: self.options.stack_trace_limit,
                bound: TraceBound::None,
            };
            self.build_trace(None, &request)
        };
        self.exception = Some(Exception {
            value,
            termination,
            did_notify_inspector_of_throw: false,
            trace,
        });
        self.pending_unwind = None;
        Thrown
    }

    pub fn throw_error(&mut self, error_type: ErrorType, message: &str) -> Thrown {
        let realm = self.current_realm();
        self.throw_error_in_realm(realm, error_type, message)
    }

    pub fn throw_error_in_realm(&mut self, realm: RealmId, error_type: ErrorType, message: &str) -> Thrown {
        let error = self.create_error(realm, error_type, message);
        self.throw_value(error)
    }

    pub fn throw_type_error(&mut self, message: &str) -> Thrown {
        self.throw_error(ErrorType::TypeError, message)
    }

    pub fn throw_stack_overflow(&mut self) -> Thrown {
        tracing::debug!(depth = self.host_recursion_depth, "stack overflow");
        self.throw_error(ErrorType::RangeError, STACK_OVERFLOW_MESSAGE)
    }

    /// Throws the uncatchable termination exception.
    pub fn throw_termination(&mut self) -> Thrown {
        tracing::debug!("termination exception thrown");
        let sentinel = self.termination_sentinel;
        self.throw_value(sentinel)
    }

    pub fn create_error(&mut self, realm: RealmId, error_type: ErrorType, message: &str) -> Value {
        let mut object = Object::new(
            ObjectKind::Error(ErrorData {
                error_type,
                message: message.to_string(),
                catchable_from_foreign: true,
            }),
            realm.0,
        );
        let message_value = self.alloc_str(message);
        object.properties.insert("message".to_string(), Property::data(message_value));
        Value::object(self.heap.alloc_object(object))
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    pub fn exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    pub fn exception_value(&self) -> Option<Value> {
        self.exception.as_ref().map(|e| e.value)
    }

    pub fn is_termination_exception(&self) -> bool {
        self.exception.as_ref().is_some_and(|e| e.termination)
    }

    pub fn clear_exception(&mut self) -> Option<Exception> {
        self.pending_unwind = None;
        self.exception.take()
    }

    /// Class and message of an error object.
    pub fn error_info(&self, value: Value) -> Option<(ErrorType, String)> {
        let object = self.heap.get_object(value.as_object()?)?;
        match &object.kind {
            ObjectKind::Error(data) => Some((data.error_type, data.message.clone())),
            _ => None,
        }
    }

    /// Converts the pending exception into an embedder-facing failure.
    pub fn take_uncaught(&mut self) -> Option<RuntimeError> {
        let exception = self.clear_exception()?;
        if exception.termination {
            return Some(RuntimeError::Terminated);
        }
        let message = match self.error_info(exception.value) {
            Some((error_type, message)) => format!("{}: {}", error_type.name(), message),
            None => self.to_display_string(exception.value),
        };
        Some(RuntimeError::Uncaught {
            message,
            trace: render_trace(&exception.trace),
        })
    }

    /// Runs `f` with the current exception set aside.
    pub(crate) fn with_suspended_exception<R>(&mut self, f: impl FnOnce(&mut VM) -> R) -> R {
        let saved = self.exception.take();
        let pending = self.pending_unwind.take();
        let result = f(self);
        debug_assert!(self.exception.is_none(), "callback left an exception behind");
        self.exception = saved;
        self.pending_unwind = pending;
        result
    }
}

/// Message recorded when the error was created. Never runs script, so a
/// `message` property overwritten later is not observed.
pub(crate) fn sanitized_message(object: &Object) -> Option<&str> {
    match &object.kind {
        ObjectKind::Error(data) => Some(data.message.as_str()),
        _ => None,
    }
}
