//! Top-level program execution: the JSONP fast path, global declaration
//! instantiation and the program frame.

use memory::{Binding, BindingKind, ErrorType, Value};

use crate::compiler::{ProgramCode, SourceTaintedOrigin};
use crate::eval::literal::{JsonpPathEntry, JsonpStatement, LiteralParser};
use crate::exception::Completion;
use crate::executable::{CompiledUnit, ProgramExecutable, Specialization};
use crate::machine::{Body, Callee, ProtoCallFrame, VM};
use crate::realm::RealmId;

const TDZ_MESSAGE: &str = "Cannot access uninitialized variable.";

impl VM {
    /// Runs `source` as a program of `realm`.
    pub fn execute_program(&mut self, realm: RealmId, source: &str, tainted: SourceTaintedOrigin) -> Completion {
        if !self.is_safe_to_recurse_soft() {
            return Err(self.throw_stack_overflow());
        }
        if self.disallow_vm_entry_count > 0 {
            return self.check_vm_entry_permission();
        }
        if !tainted.is_tainted() {
            if let Some(statements) = LiteralParser::try_jsonp_parse(source) {
                if let Some(result) = self.execute_jsonp(realm, &statements)? {
                    tracing::debug!(statements = statements.len(), "program ran on the JSONP path");
                    return Ok(result);
                }
            }
        }

        let compiler = self.realm(realm).compiler.clone();
        let ProgramCode {
            variables,
            function_decls,
            lexical,
            generator,
        } = match compiler.compile_program(source) {
            Ok(code) => code,
            Err(err) => return Err(self.throw_error(err.error_type, &err.message)),
        };
        let program = ProgramExecutable {
            unit: CompiledUnit::new(generator),
            variables,
            function_decls,
            lexical,
        };
        self.initialize_global_properties(realm, &program)?;

        let (global_this, global_scope, program_callee) = {
            let r = self.realm(realm);
            (r.global_this, r.global_scope, r.program_callee)
        };
        if let Some(scope) = self.heap.get_scope_mut(global_scope) {
            scope.flatten();
        }
        let code_block = program.unit.prepare_for_execution(self, Specialization::Call)?;
        let proto = ProtoCallFrame {
            code_block: Some(code_block.clone()),
            realm,
            callee: Callee::Interpreted(program_callee),
            this_value: global_this,
            args: Vec::new(),
            scope: Some(global_scope),
        };
        self.vm_entry(proto, Body::Compiled(code_block.code.clone()))
    }

    /// Runs JSONP statements against the global object. `Ok(None)` means
    /// the program needs the full compiler instead; that is only decided
    /// before any statement has had an effect.
    fn execute_jsonp(&mut self, realm: RealmId, statements: &[JsonpStatement]) -> Completion<Option<Value>> {
        let declared: Vec<&str> = statements
            .iter()
            .filter_map(|s| match s.path.as_slice() {
                [JsonpPathEntry::DeclareVar(name)] => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if !declared.is_empty() && !self.is_global_object_extensible(realm) {
            return Ok(None);
        }
        if declared.iter().any(|name| self.global_lexical(realm, name).is_some()) {
            return Ok(None);
        }

        let global_this = self.global_this(realm);
        let mut result = Value::undefined();
        for (index, statement) in statements.iter().enumerate() {
            let path = statement.path.as_slice();
            if let [JsonpPathEntry::DeclareVar(name)] = path {
                let value = self.materialize_literal(&statement.value, realm);
                self.create_global_var_binding(realm, name, false);
                self.put(global_this, name, value)?;
                result = Value::undefined();
                continue;
            }
            let Some((last, prefix)) = path.split_last() else {
                return Ok(None);
            };

            let mut base = global_this;
            for (i, entry) in prefix.iter().enumerate() {
                base = match entry {
                    JsonpPathEntry::Dot(name) if i == 0 => match self.global_lexical(realm, name) {
                        Some(binding) if binding.value.is_empty() => {
                            return Err(self.throw_error(ErrorType::ReferenceError, TDZ_MESSAGE));
                        }
                        Some(binding) => binding.value,
                        None if self.has_global_property(realm, name) => self.get(global_this, name)?,
                        None if index > 0 => {
                            let message = format!("Can't find variable: {name}");
                            return Err(self.throw_error(ErrorType::ReferenceError, &message));
                        }
                        None => return Ok(None),
                    },
                    JsonpPathEntry::Dot(name) => self.get(base, name)?,
                    JsonpPathEntry::Lookup(i) => self.get_index(base, *i as usize)?,
                    JsonpPathEntry::DeclareVar(_) | JsonpPathEntry::Call(_) => return Ok(None),
                };
            }

            // A lone name resolves against global lexicals before the
            // global object.
            let lexical = match (prefix.is_empty(), last.name()) {
                (true, Some(name)) => self.global_lexical(realm, name),
                _ => None,
            };
            if lexical.is_some_and(|b| b.value.is_empty()) {
                return Err(self.throw_error(ErrorType::ReferenceError, TDZ_MESSAGE));
            }

            let value = self.materialize_literal(&statement.value, realm);
            result = match last {
                JsonpPathEntry::Call(name) => {
                    let function = match lexical {
                        Some(binding) => binding.value,
                        None => self.get(base, name)?,
                    };
                    if !self.call_data(function).is_callable() {
                        let message = format!("{} is not a function", self.to_display_string(function));
                        return Err(self.throw_type_error(&message));
                    }
                    let this_value = if prefix.is_empty() { Value::undefined() } else { base };
                    self.call(function, this_value, &[value])?
                }
                JsonpPathEntry::Dot(name) => {
                    match lexical {
                        Some(binding) => self.assign_global_lexical(realm, name, binding, value)?,
                        None => self.put(base, name, value)?,
                    }
                    value
                }
                JsonpPathEntry::Lookup(i) => {
                    self.put_index(base, *i as usize, value)?;
                    value
                }
                JsonpPathEntry::DeclareVar(_) => return Ok(None),
            };
        }
        Ok(Some(result))
    }

    fn global_lexical(&self, realm: RealmId, name: &str) -> Option<Binding> {
        let scope = self.realm(realm).global_scope;
        self.heap
            .get_scope(scope)?
            .lookup(name)
            .filter(|b| b.kind.is_lexical())
            .copied()
    }

    fn global_property(&self, realm: RealmId, name: &str) -> Option<Binding> {
        let scope = self.realm(realm).global_scope;
        self.heap
            .get_scope(scope)?
            .lookup(name)
            .filter(|b| !b.kind.is_lexical())
            .copied()
    }

    pub fn has_global_property(&self, realm: RealmId, name: &str) -> bool {
        self.global_property(realm, name).is_some()
    }

    fn assign_global_lexical(&mut self, realm: RealmId, name: &str, binding: Binding, value: Value) -> Completion<()> {
        if !binding.writable {
            return Err(self.throw_type_error("Attempted to assign to readonly property."));
        }
        let scope = self.realm(realm).global_scope;
        if let Some(slot) = self.heap.get_scope_mut(scope).and_then(|s| s.bindings.get_mut(name)) {
            slot.value = value;
        }
        Ok(())
    }

    pub fn is_global_object_extensible(&self, realm: RealmId) -> bool {
        self.global_this(realm)
            .as_object()
            .and_then(|h| self.heap.get_object(h))
            .is_some_and(|o| o.extensible)
    }

    /// A function declaration may replace a configurable property, or a
    /// writable and enumerable one.
    pub fn can_declare_global_function(&self, realm: RealmId, name: &str) -> bool {
        match self.global_property(realm, name) {
            None => self.is_global_object_extensible(realm),
            Some(binding) => binding.configurable || (binding.writable && binding.enumerable),
        }
    }

    pub fn can_declare_global_var(&self, realm: RealmId, name: &str) -> bool {
        self.has_global_property(realm, name) || self.is_global_object_extensible(realm)
    }

    /// Adds an undefined global property unless one exists. Bindings created
    /// by eval stay deletable.
    pub fn create_global_var_binding(&mut self, realm: RealmId, name: &str, from_eval: bool) {
        if self.has_global_property(realm, name) || !self.is_global_object_extensible(realm) {
            return;
        }
        let scope = self.realm(realm).global_scope;
        if let Some(scope) = self.heap.get_scope_mut(scope) {
            let mut binding = Binding::new(BindingKind::Var, Value::undefined());
            binding.configurable = from_eval;
            scope.bindings.insert(name.to_string(), binding);
        }
    }

    pub fn create_global_function_binding(&mut self, realm: RealmId, name: &str, value: Value, from_eval: bool) {
        let existing = self.global_property(realm, name);
        let scope = self.realm(realm).global_scope;
        let Some(scope) = self.heap.get_scope_mut(scope) else {
            return;
        };
        match existing {
            Some(binding) if !binding.configurable => {
                if let Some(slot) = scope.bindings.get_mut(name) {
                    slot.value = value;
                }
            }
            _ => {
                let mut binding = Binding::new(BindingKind::Function, value);
                binding.configurable = from_eval;
                scope.bindings.insert(name.to_string(), binding);
            }
        }
    }

    /// Validates the program's global declarations against the existing
    /// global environment, then instantiates them.
    fn initialize_global_properties(&mut self, realm: RealmId, program: &ProgramExecutable) -> Completion<()> {
        for (name, _) in &program.lexical {
            if self.global_lexical(realm, name).is_some() {
                let message = format!("Can't create duplicate variable: '{name}'");
                return Err(self.throw_error(ErrorType::SyntaxError, &message));
            }
            if self.global_property(realm, name).is_some_and(|b| !b.configurable) {
                let message = format!("Can't create duplicate variable that shadows a global property: '{name}'");
                return Err(self.throw_error(ErrorType::SyntaxError, &message));
            }
        }
        for function in &program.function_decls {
            if self.global_lexical(realm, &function.name).is_some() {
                let message = format!("Can't create duplicate variable: '{}'", function.name);
                return Err(self.throw_error(ErrorType::SyntaxError, &message));
            }
            if !self.can_declare_global_function(realm, &function.name) {
                let message = format!("Can't declare global function: {}", function.name);
                return Err(self.throw_error(ErrorType::TypeError, &message));
            }
        }
        for name in &program.variables {
            if self.global_lexical(realm, name).is_some() {
                let message = format!("Can't create duplicate variable: '{name}'");
                return Err(self.throw_error(ErrorType::SyntaxError, &message));
            }
            if !self.can_declare_global_var(realm, name) {
                let message = format!("Can't declare global variable: {name}");
                return Err(self.throw_error(ErrorType::TypeError, &message));
            }
        }

        let global_scope = self.realm(realm).global_scope;
        if let Some(scope) = self.heap.get_scope_mut(global_scope) {
            for (name, kind) in &program.lexical {
                // Configurable shadowed properties give way to the lexical.
                scope
                    .bindings
                    .insert(name.clone(), Binding::new(*kind, Value::empty()).non_configurable());
            }
        }
        for function in &program.function_decls {
            let value = self.create_function(function.clone(), global_scope, realm);
            self.create_global_function_binding(realm, &function.name, value, false);
        }
        for name in &program.variables {
            self.create_global_var_binding(realm, name, false);
        }
        tracing::debug!(
            lexical = program.lexical.len(),
            functions = program.function_decls.len(),
            variables = program.variables.len(),
            "global declarations instantiated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_declarations_need_a_replaceable_property() {
        let mut vm = VM::new();
        let scope = vm.realm(RealmId::MAIN).global_scope;
        let frozen = Binding {
            writable: false,
            ..Binding::new(BindingKind::Var, Value::int(1)).non_configurable()
        };
        vm.heap
            .get_scope_mut(scope)
            .unwrap()
            .bindings
            .insert("locked".into(), frozen);
        assert!(!vm.can_declare_global_function(RealmId::MAIN, "locked"));
        assert!(vm.can_declare_global_function(RealmId::MAIN, "fresh"));
        assert!(vm.can_declare_global_var(RealmId::MAIN, "locked"));
    }

    #[test]
    fn non_extensible_globals_refuse_new_vars() {
        let mut vm = VM::new();
        let global = vm.global_this(RealmId::MAIN).as_object().unwrap();
        vm.heap.get_object_mut(global).unwrap().extensible = false;
        assert!(!vm.can_declare_global_var(RealmId::MAIN, "x"));
        vm.create_global_var_binding(RealmId::MAIN, "x", true);
        assert!(!vm.has_global_property(RealmId::MAIN, "x"));
    }

    #[test]
    fn eval_bindings_stay_configurable() {
        let mut vm = VM::new();
        vm.create_global_var_binding(RealmId::MAIN, "a", true);
        vm.create_global_var_binding(RealmId::MAIN, "b", false);
        assert!(vm.global_property(RealmId::MAIN, "a").unwrap().configurable);
        assert!(!vm.global_property(RealmId::MAIN, "b").unwrap().configurable);
    }

    #[test]
    fn jsonp_declares_globals() {
        let mut vm = VM::new();
        let result = vm
            .execute_program(RealmId::MAIN, "var data = [1, 2];", SourceTaintedOrigin::Untainted)
            .unwrap();
        assert!(result.is_undefined());
        let global = vm.global_this(RealmId::MAIN);
        let data = vm.get(global, "data").unwrap();
        assert_eq!(vm.get_index(data, 1), Ok(Value::int(2)));
    }

    #[test]
    fn jsonp_unknown_root_falls_back_to_the_compiler() {
        let mut vm = VM::new();
        let err = vm.execute_program(RealmId::MAIN, "missing.x = 1;", SourceTaintedOrigin::Untainted);
        assert!(err.is_err());
        let (ty, message) = vm.error_info(vm.exception_value().unwrap()).unwrap();
        assert_eq!(ty, ErrorType::SyntaxError, "no compiler is attached");
        assert_eq!(message, "no source compiler attached");
    }

    #[test]
    fn jsonp_unknown_root_after_first_statement_is_a_reference_error() {
        let mut vm = VM::new();
        let err = vm.execute_program(RealmId::MAIN, "var a = 1; missing.x = 1;", SourceTaintedOrigin::Untainted);
        assert!(err.is_err());
        let (ty, message) = vm.error_info(vm.exception_value().unwrap()).unwrap();
        assert_eq!(ty, ErrorType::ReferenceError);
        assert_eq!(message, "Can't find variable: missing");
    }
}
