use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// The realm's global environment (global object plus global lexicals).
    Global,
    /// Var scope of a sloppy or strict function.
    Function,
    /// Block scope holding let/const/class bindings.
    Lexical,
    /// Class body scope; carries private names.
    Class,
    /// Var scope created for strict eval code.
    StrictEvalActivation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    Var,
    Function,
    Parameter,
    Let,
    Const,
}

impl BindingKind {
    #[inline]
    pub fn is_lexical(&self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding {
    /// `Value::empty()` while a lexical binding is in its TDZ.
    pub value: Value,
    pub kind: BindingKind,
    pub configurable: bool,
    pub writable: bool,
    pub enumerable: bool,
}

impl Binding {
    pub fn new(kind: BindingKind, value: Value) -> Self {
        Self {
            value,
            kind,
            configurable: true,
            writable: kind != BindingKind::Const,
            enumerable: true,
        }
    }

    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub bindings: IndexMap<String, Binding>,
    pub private_names: Vec<String>,
    /// Enclosing scope, `None` only for the global scope.
    pub next: Option<u32>,
    pub realm: u32,
    pub extensible: bool,
    /// Set after many dynamic additions; flattened before hoisting into it.
    pub dictionary: bool,
}

impl Scope {
    pub fn new(kind: ScopeKind, next: Option<u32>, realm: u32) -> Self {
        Self {
            kind,
            bindings: IndexMap::new(),
            private_names: Vec::new(),
            next,
            realm,
            extensible: true,
            dictionary: false,
        }
    }

    /// Scopes that receive hoisted `var` and function declarations.
    #[inline]
    pub fn is_var_scope(&self) -> bool {
        matches!(
            self.kind,
            ScopeKind::Global | ScopeKind::Function | ScopeKind::StrictEvalActivation
        )
    }

    pub fn declare(&mut self, name: &str, kind: BindingKind, value: Value) {
        self.bindings
            .insert(name.to_string(), Binding::new(kind, value));
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Rebuilds the binding table compactly and clears the dictionary flag.
    pub fn flatten(&mut self) {
        if !self.dictionary {
            return;
        }
        let flat: IndexMap<String, Binding> = self.bindings.drain(..).collect();
        self.bindings = flat;
        self.dictionary = false;
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.bindings.values().map(|b| b.value)
    }
}
