use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Value;

/// Script-visible error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    EvalError,
    ReferenceError,
}

impl ErrorType {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorType::Error => "Error",
            ErrorType::TypeError => "TypeError",
            ErrorType::RangeError => "RangeError",
            ErrorType::SyntaxError => "SyntaxError",
            ErrorType::EvalError => "EvalError",
            ErrorType::ReferenceError => "ReferenceError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentsFlavor {
    Direct,
    Scoped,
    Cloned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    pub error_type: ErrorType,
    pub message: String,
    /// Foreign handlers may intercept this error unless cleared.
    pub catchable_from_foreign: bool,
}

/// Object shapes the engine distinguishes. Indexed values of arrays,
/// arguments objects and immutable lists live in `Object::elements`.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Ordinary,
    /// The realm's global object; named properties live in the global scope.
    Global { scope: u32 },
    Array,
    Arguments(ArgumentsFlavor),
    ImmutableList,
    /// Index into the VM's function record table.
    Function(u32),
    Error(ErrorData),
    /// A value wrapped by the foreign runtime, identified by its tag.
    ForeignException { tag: u32, payload: Value },
    TrustedScript(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Data(Value),
    Accessor { getter: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Attributes {
    pub const DEFAULT: Attributes = Attributes {
        writable: true,
        enumerable: true,
        configurable: true,
    };

    pub const FROZEN: Attributes = Attributes {
        writable: false,
        enumerable: true,
        configurable: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Property {
    pub value: PropertyValue,
    pub attributes: Attributes,
}

impl Property {
    pub fn data(value: Value) -> Self {
        Self {
            value: PropertyValue::Data(value),
            attributes: Attributes::DEFAULT,
        }
    }

    pub fn accessor(getter: Value) -> Self {
        Self {
            value: PropertyValue::Accessor { getter },
            attributes: Attributes::DEFAULT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectKind,
    /// Indexed storage; holes are `Value::empty()`.
    pub elements: Vec<Value>,
    pub properties: IndexMap<String, Property>,
    /// Realm that created the object.
    pub realm: u32,
    pub extensible: bool,
}

impl Object {
    pub fn new(kind: ObjectKind, realm: u32) -> Self {
        Self {
            kind,
            elements: Vec::new(),
            properties: IndexMap::new(),
            realm,
            extensible: true,
        }
    }

    pub fn with_elements(kind: ObjectKind, realm: u32, elements: Vec<Value>) -> Self {
        Self {
            elements,
            ..Self::new(kind, realm)
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Present, non-hole element at `index`.
    #[inline]
    pub fn element(&self, index: usize) -> Option<Value> {
        self.elements.get(index).copied().filter(|v| !v.is_empty())
    }

    pub fn own_data(&self, key: &str) -> Option<Value> {
        match self.properties.get(key)?.value {
            PropertyValue::Data(v) => Some(v),
            PropertyValue::Accessor { .. } => None,
        }
    }

    /// Length of an arguments object: an overwritten `length` wins over
    /// the captured argument count.
    pub fn arguments_length(&self) -> usize {
        match self.own_data("length").and_then(|v| v.as_int()) {
            Some(n) if n >= 0 => n as usize,
            _ => self.elements.len(),
        }
    }

    /// Scope kept alive by this object.
    pub fn scope_child(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::Global { scope } => Some(scope),
            _ => None,
        }
    }

    /// Every value this object keeps alive.
    pub fn children(&self) -> impl Iterator<Item = Value> + '_ {
        let payload = match &self.kind {
            ObjectKind::ForeignException { payload, .. } => Some(*payload),
            _ => None,
        };
        self.elements
            .iter()
            .copied()
            .chain(self.properties.values().map(|p| match p.value {
                PropertyValue::Data(v) => v,
                PropertyValue::Accessor { getter } => getter,
            }))
            .chain(payload)
    }
}
