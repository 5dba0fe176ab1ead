use std::sync::Arc;

use memory::{ObjectKind, Value};

use crate::code_block::ImplementationVisibility;
use crate::executable::FunctionExecutable;
use crate::foreign::ForeignCallee;
use crate::native::NativeFn;
use crate::realm::RealmId;

/// Backing record of a callable object.
#[derive(Clone)]
pub enum FunctionKind {
    Interpreted {
        executable: Arc<FunctionExecutable>,
        scope: u32,
    },
    Native {
        call: NativeFn,
        construct: Option<NativeFn>,
    },
    /// Never wraps another bound function; `bind` flattens chains.
    Bound {
        target: Value,
        bound_this: Value,
        bound_args: Vec<Value>,
        tainted: bool,
    },
    /// Marshalling proxy forwarding to a function of another realm.
    Remote { target: Value },
    Foreign { callee: Arc<ForeignCallee> },
}

#[derive(Clone)]
pub struct FunctionRecord {
    pub kind: FunctionKind,
    pub realm: RealmId,
    pub name: String,
    pub visibility: ImplementationVisibility,
}

impl FunctionRecord {
    pub fn is_bound(&self) -> bool {
        matches!(self.kind, FunctionKind::Bound { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, FunctionKind::Remote { .. })
    }

    /// Values kept alive by this record.
    pub fn children(&self) -> Vec<Value> {
        match &self.kind {
            FunctionKind::Bound {
                target,
                bound_this,
                bound_args,
                ..
            } => {
                let mut out = Vec::with_capacity(bound_args.len() + 2);
                out.push(*target);
                out.push(*bound_this);
                out.extend_from_slice(bound_args);
                out
            }
            FunctionKind::Remote { target } => vec![*target],
            _ => Vec::new(),
        }
    }

    pub fn scope(&self) -> Option<u32> {
        match self.kind {
            FunctionKind::Interpreted { scope, .. } => Some(scope),
            _ => None,
        }
    }
}

/// How a callable is entered.
#[derive(Clone)]
pub enum CallData {
    None,
    Interpreted {
        scope: u32,
        executable: Arc<FunctionExecutable>,
    },
    Native {
        function: NativeFn,
        is_bound_function: bool,
        is_foreign: bool,
    },
}

impl CallData {
    pub fn is_callable(&self) -> bool {
        !matches!(self, CallData::None)
    }
}

impl std::fmt::Debug for CallData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallData::None => write!(f, "None"),
            CallData::Interpreted { scope, executable } => f
                .debug_struct("Interpreted")
                .field("scope", scope)
                .field("executable", &executable.name)
                .finish(),
            CallData::Native {
                is_bound_function,
                is_foreign,
                ..
            } => f
                .debug_struct("Native")
                .field("is_bound_function", is_bound_function)
                .field("is_foreign", is_foreign)
                .finish_non_exhaustive(),
        }
    }
}

/// Function record index of a function object.
pub(crate) fn function_index(heap: &memory::Heap, value: Value) -> Option<u32> {
    let handle = value.as_object()?;
    match heap.get_object(handle)?.kind {
        ObjectKind::Function(index) => Some(index),
        _ => None,
    }
}
