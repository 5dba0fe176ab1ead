use std::sync::Arc;

use memory::{Object, ObjectKind, Scope, ScopeKind, Value};

use crate::compiler::SourceCompiler;
use crate::debugger::Debugger;
use crate::host::HostHooks;
use crate::machine::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealmId(pub u32);

impl RealmId {
    pub const MAIN: RealmId = RealmId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustedTypesEnforcement {
    #[default]
    None,
    /// String compilation is gated but eval stays usable when disabled.
    EnforcedWithEvalEnabled,
    Enforced,
}

/// A global object with its environment and embedder collaborators.
pub struct Realm {
    pub id: RealmId,
    pub global_scope: u32,
    pub global_this: Value,
    /// The designated `eval`; direct eval only happens through this value.
    pub eval_function: Value,
    /// Callee slot of program frames.
    pub program_callee: Value,
    /// Callee slot of eval frames.
    pub eval_callee: Value,
    pub eval_enabled: bool,
    pub eval_disabled_message: String,
    pub trusted_types_enforcement: TrustedTypesEnforcement,
    pub host: Arc<dyn HostHooks>,
    pub compiler: Arc<dyn SourceCompiler>,
    pub debugger: Option<Box<dyn Debugger>>,
}

impl VM {
    /// Creates a realm with a fresh global environment.
    pub fn create_realm(&mut self, compiler: Arc<dyn SourceCompiler>, host: Arc<dyn HostHooks>) -> RealmId {
        let id = RealmId(self.realms.len() as u32);
        let global_scope = self.heap.alloc_scope(Scope::new(ScopeKind::Global, None, id.0));
        let global_this = Value::object(
            self.heap
                .alloc_object(Object::new(ObjectKind::Global { scope: global_scope }, id.0)),
        );
        let program_callee = Value::object(self.heap.alloc_object(Object::new(ObjectKind::Ordinary, id.0)));
        let eval_callee = Value::object(self.heap.alloc_object(Object::new(ObjectKind::Ordinary, id.0)));

        // Registered before the eval function so the function record can
        // name its realm.
        self.realms.push(Realm {
            id,
            global_scope,
            global_this,
            eval_function: Value::undefined(),
            program_callee,
            eval_callee,
            eval_enabled: true,
            eval_disabled_message: "Refused to evaluate a string as JavaScript".to_string(),
            trusted_types_enforcement: TrustedTypesEnforcement::None,
            host,
            compiler,
            debugger: None,
        });
        let eval_function = self.create_native_function(id, "eval", crate::eval::indirect_eval_fn());
        if let Some(realm) = self.realms.get_mut(id.0 as usize) {
            realm.eval_function = eval_function;
        }
        tracing::debug!(realm = id.0, "created realm");
        id
    }

    pub fn realm(&self, id: RealmId) -> &Realm {
        &self.realms[id.0 as usize]
    }

    pub fn realm_mut(&mut self, id: RealmId) -> &mut Realm {
        &mut self.realms[id.0 as usize]
    }

    pub fn set_compiler(&mut self, id: RealmId, compiler: Arc<dyn SourceCompiler>) {
        self.realm_mut(id).compiler = compiler;
    }

    pub fn set_host(&mut self, id: RealmId, host: Arc<dyn HostHooks>) {
        self.realm_mut(id).host = host;
    }

    pub fn attach_debugger(&mut self, id: RealmId, debugger: Box<dyn Debugger>) {
        self.realm_mut(id).debugger = Some(debugger);
    }

    pub fn detach_debugger(&mut self, id: RealmId) -> Option<Box<dyn Debugger>> {
        self.realm_mut(id).debugger.take()
    }

    pub fn global_this(&self, id: RealmId) -> Value {
        self.realm(id).global_this
    }

    /// Realm of the innermost frame, or the main realm outside any frame.
    pub fn current_realm(&self) -> RealmId {
        self.frames.last().map_or(RealmId::MAIN, |f| f.realm)
    }
}
