use memory::{BindingKind, ErrorType, Scope, ScopeKind, Value};

use crate::exception::Completion;
use crate::executable::{EvalExecutable, Specialization};
use crate::machine::{Body, Callee, ProtoCallFrame, VM};
use crate::realm::RealmId;

/// Where eval code puts its `var` and function declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableObject {
    /// The realm's global object.
    Global(RealmId),
    /// A function var scope or a strict eval activation.
    Scope(u32),
}

impl VM {
    /// Hoists the declarations of `eval` and runs it with `scope` as its
    /// scope chain.
    pub fn execute_eval(&mut self, eval: &EvalExecutable, this_value: Value, scope: u32) -> Completion {
        let realm = RealmId(self.heap.get_scope(scope).map_or(0, |s| s.realm));
        if !self.is_safe_to_recurse_soft() {
            return Err(self.throw_stack_overflow());
        }
        if self.disallow_vm_entry_count > 0 {
            return self.check_vm_entry_permission();
        }

        let mut scope = scope;
        if eval.has_declarations() {
            let variable_object = if (!eval.variables.is_empty() || !eval.function_decls.is_empty()) && eval.strict {
                scope = self
                    .heap
                    .alloc_scope(Scope::new(ScopeKind::StrictEvalActivation, Some(scope), realm.0));
                VariableObject::Scope(scope)
            } else {
                self.find_variable_object(scope, realm)
            };

            eval.unit.prepare_for_execution(self, Specialization::Call)?;
            self.hoist_eval_declarations(eval, variable_object, scope, realm)?;
        }

        // Hoisting may have jettisoned the code; reload it.
        let code_block = eval.unit.prepare_for_execution(self, Specialization::Call)?;
        let proto = ProtoCallFrame {
            code_block: Some(code_block.clone()),
            realm,
            callee: Callee::Interpreted(self.realm(realm).eval_callee),
            this_value,
            args: Vec::new(),
            scope: Some(scope),
        };
        self.vm_entry(proto, Body::Compiled(code_block.code.clone()))
    }

    /// Innermost var scope on the chain, flattened.
    fn find_variable_object(&mut self, scope: u32, realm: RealmId) -> VariableObject {
        let mut cursor = Some(scope);
        while let Some(handle) = cursor {
            let Some(node) = self.heap.get_scope_mut(handle) else {
                break;
            };
            match node.kind {
                ScopeKind::Global => {
                    node.flatten();
                    return VariableObject::Global(realm);
                }
                ScopeKind::Function | ScopeKind::StrictEvalActivation => {
                    node.flatten();
                    return VariableObject::Scope(handle);
                }
                ScopeKind::Lexical | ScopeKind::Class => cursor = node.next,
            }
        }
        debug_assert!(false, "scope chain without a global scope");
        VariableObject::Global(realm)
    }

    fn hoist_eval_declarations(
        &mut self,
        eval: &EvalExecutable,
        variable_object: VariableObject,
        scope: u32,
        realm: RealmId,
    ) -> Completion<()> {
        if !eval.strict {
            let names = eval
                .variables
                .iter()
                .map(String::as_str)
                .chain(eval.function_decls.iter().map(|f| f.name.as_str()));
            for name in names {
                if !self.can_hoist_in_eval(scope, name) {
                    let message = format!("Can't create duplicate variable in eval: '{name}'");
                    return Err(self.throw_error(ErrorType::SyntaxError, &message));
                }
            }
        }

        if let VariableObject::Global(realm) = variable_object {
            for function in &eval.function_decls {
                if !self.can_declare_global_function(realm, &function.name) {
                    let message = format!("Can't declare global function: {}", function.name);
                    return Err(self.throw_error(ErrorType::TypeError, &message));
                }
            }
            if !self.is_global_object_extensible(realm) {
                for name in &eval.variables {
                    if !self.can_declare_global_var(realm, name) {
                        let message = format!("Can't declare global variable: {name}");
                        return Err(self.throw_error(ErrorType::TypeError, &message));
                    }
                }
            }
        }

        if !eval.strict {
            for name in &eval.function_hoisting_candidates {
                if !self.can_hoist_in_eval(scope, name) {
                    continue;
                }
                match variable_object {
                    VariableObject::Global(realm) => {
                        if self.can_declare_global_var(realm, name) {
                            self.create_global_var_binding(realm, name, true);
                        }
                    }
                    VariableObject::Scope(target) => self.ensure_binding_exists(target, name, BindingKind::Var),
                }
            }
        }

        for function in &eval.function_decls {
            let value = self.create_function(function.clone(), scope, realm);
            match variable_object {
                VariableObject::Global(realm) => self.create_global_function_binding(realm, &function.name, value, true),
                VariableObject::Scope(target) => {
                    self.ensure_binding_exists(target, &function.name, BindingKind::Function);
                    if let Some(binding) = self
                        .heap
                        .get_scope_mut(target)
                        .and_then(|s| s.bindings.get_mut(&function.name))
                    {
                        binding.value = value;
                    }
                }
            }
        }

        for name in &eval.variables {
            match variable_object {
                VariableObject::Global(realm) => self.create_global_var_binding(realm, name, true),
                VariableObject::Scope(target) => self.ensure_binding_exists(target, name, BindingKind::Var),
            }
        }
        Ok(())
    }

    /// Whether a sloppy eval may hoist `name` out of `scope`: no block or
    /// class scope between it and the var scope binds the name, and the
    /// var scope does not hold it as a lexical binding.
    pub fn can_hoist_in_eval(&self, scope: u32, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(handle) = cursor {
            let Some(node) = self.heap.get_scope(handle) else {
                return false;
            };
            let binding = node.lookup(name);
            match node.kind {
                ScopeKind::Lexical | ScopeKind::Class if binding.is_some() => return false,
                ScopeKind::Lexical | ScopeKind::Class => {}
                _ if binding.is_some_and(|b| b.kind.is_lexical()) => return false,
                _ if node.is_var_scope() => return true,
                _ => {}
            }
            cursor = node.next;
        }
        false
    }

    fn ensure_binding_exists(&mut self, scope: u32, name: &str, kind: BindingKind) {
        if let Some(node) = self.heap.get_scope_mut(scope) {
            if node.lookup(name).is_none() {
                node.declare(name, kind, Value::undefined());
            }
        }
    }
}
