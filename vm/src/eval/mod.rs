//! Direct and indirect eval.
//!
//! A direct eval runs in the caller's scope and caches compilations on the
//! caller's code block, keyed by source text and call site. Indirect eval
//! goes through the realm's `eval` function like any native call and runs
//! in the global scope.

pub mod cache;
mod execute;
pub mod literal;

pub use execute::VariableObject;

use std::sync::Arc;

use memory::{ErrorType, ObjectKind, ScopeKind, Value};

use crate::code_block::{CodeBlock, CodeType, ParseMode};
use crate::compiler::{DerivedContextType, EvalCode, EvalCompileRequest, EvalContext, EvalContextType, SourceTaintedOrigin};
use crate::exception::Completion;
use crate::executable::{CompiledUnit, EvalExecutable};
use crate::host::CompilationType;
use crate::machine::{FrameId, StackOps, VM};
use crate::native::{native_fn, NativeFn};
use crate::realm::{RealmId, TrustedTypesEnforcement};

use cache::{CacheKey, RopeSuffix};
use literal::LiteralParser;

pub const TRUSTED_TYPES_EVAL_MESSAGE: &str =
    "Refused to evaluate a string as JavaScript because this document requires a 'Trusted Type' assignment.";

/// Source of an eval argument, once it is known to be evaluable.
#[derive(Debug, Clone, Copy)]
struct EvalSource {
    string: u32,
    trusted: bool,
}

impl VM {
    /// Direct eval from the code running in `caller`. Returns `Ok(None)`
    /// when `callee` is not the realm's `eval`, in which case the call site
    /// performs an ordinary call instead.
    pub fn direct_eval(
        &mut self,
        caller: FrameId,
        callee: Value,
        args: &[Value],
        this_value: Value,
        scope: u32,
        bytecode_index: u32,
    ) -> Completion<Option<Value>> {
        let realm = self.frames[caller.0].realm;
        let Some(code_block) = self.frames[caller.0].code_block.clone() else {
            return Ok(None);
        };
        if callee != self.realm(realm).eval_function {
            return Ok(None);
        }
        let Some(&program) = args.first() else {
            return Ok(Some(Value::undefined()));
        };
        let Some(source) = self.eval_source(realm, program)? else {
            return Ok(Some(program));
        };
        self.check_eval_policy(realm, source, CompilationType::DirectEval)?;

        let key = self.direct_eval_cache_key(source.string, bytecode_index);
        if let Some(executable) = code_block.eval_cache().get(&key) {
            self.stats.eval_cache_hits += 1;
            tracing::debug!(bytecode_index, "direct eval cache hit");
            return self.execute_eval(&executable, this_value, scope).map(Some);
        }
        self.stats.eval_cache_misses += 1;

        let text = key.source();
        if !code_block.is_strict() {
            if let Some(literal) = LiteralParser::try_eval(&text) {
                self.stats.literal_fast_path_hits += 1;
                return Ok(Some(self.materialize_literal(&literal, realm)));
            }
        }

        let (variables_under_tdz, private_names) = self.collect_closure_variables_under_tdz(scope);
        let tainted = self.source_tainted_origin_from_stack();
        let context = eval_context_for(&code_block);
        let request = EvalCompileRequest {
            source: &text,
            context: &context,
            variables_under_tdz: &variables_under_tdz,
            private_names: &private_names,
            tainted,
        };
        let executable = Arc::new(self.compile_eval(realm, &request)?);
        if !tainted.is_tainted() {
            code_block.eval_cache().set(key, executable.clone());
        }
        tracing::debug!(bytecode_index, ?tainted, "direct eval compiled");
        self.execute_eval(&executable, this_value, scope).map(Some)
    }

    /// Body of a realm's `eval` function when it is called indirectly.
    fn indirect_eval(&mut self, frame: FrameId) -> Completion {
        let realm = self.frames[frame.0].realm;
        if self.argument_count(frame) == 0 {
            return Ok(Value::undefined());
        }
        let program = self.argument(frame, 0);
        let Some(source) = self.eval_source(realm, program)? else {
            return Ok(program);
        };
        self.check_eval_policy(realm, source, CompilationType::IndirectEval)?;

        let text = self.string_value(Value::string(source.string));
        if let Some(literal) = LiteralParser::try_eval(&text) {
            self.stats.literal_fast_path_hits += 1;
            return Ok(self.materialize_literal(&literal, realm));
        }

        let context = EvalContext::default();
        let request = EvalCompileRequest {
            source: &text,
            context: &context,
            variables_under_tdz: &[],
            private_names: &[],
            tainted: self.source_tainted_origin_from_stack(),
        };
        let executable = self.compile_eval(realm, &request)?;
        let (global_this, global_scope) = {
            let r = self.realm(realm);
            (r.global_this, r.global_scope)
        };
        self.execute_eval(&executable, global_this, global_scope)
    }

    /// Resolves the program argument to a string. `None` means eval returns
    /// the argument unchanged.
    fn eval_source(&mut self, realm: RealmId, program: Value) -> Completion<Option<EvalSource>> {
        if let Some(string) = program.as_handle().filter(|_| program.is_string()) {
            return Ok(Some(EvalSource { string, trusted: false }));
        }
        if !self.options.use_trusted_types {
            return Ok(None);
        }
        let Some(handle) = program.as_object() else {
            return Ok(None);
        };
        let trusted_script = match self.heap.get_object(handle).map(|o| &o.kind) {
            Some(ObjectKind::TrustedScript(script)) => Some(script.clone()),
            _ => None,
        };
        let code = match trusted_script {
            Some(script) => Some(script),
            None => {
                let host = self.realm(realm).host.clone();
                host.code_for_eval(self, program)?
            }
        };
        Ok(code.map(|code| {
            let string = self.alloc_str(&code);
            EvalSource {
                string: string.as_handle().unwrap_or_default(),
                trusted: true,
            }
        }))
    }

    fn check_eval_policy(&mut self, realm: RealmId, source: EvalSource, kind: CompilationType) -> Completion<()> {
        let (enforcement, eval_enabled, host) = {
            let r = self.realm(realm);
            (r.trusted_types_enforcement, r.eval_enabled, r.host.clone())
        };
        if enforcement != TrustedTypesEnforcement::None && !source.trusted {
            let text = self.string_value(Value::string(source.string));
            if !host.can_compile_strings(self, kind, &text)? {
                return Err(self.throw_error(ErrorType::EvalError, TRUSTED_TYPES_EVAL_MESSAGE));
            }
        }
        if !eval_enabled && enforcement != TrustedTypesEnforcement::EnforcedWithEvalEnabled {
            let text = self.string_value(Value::string(source.string));
            host.report_violation_for_unsafe_eval(&text);
            let message = self.realm(realm).eval_disabled_message.clone();
            return Err(self.throw_error(ErrorType::EvalError, &message));
        }
        Ok(())
    }

    /// A rope ending in a `"()"` fiber is keyed on its left fiber without
    /// being resolved.
    fn direct_eval_cache_key(&mut self, string: u32, bytecode_index: u32) -> CacheKey {
        if self.heap.is_rope(string) {
            if let Some(lhs) = self.heap.rope_lhs_before_suffix(string, "()") {
                return CacheKey::new(lhs, bytecode_index, RopeSuffix::FunctionCall);
            }
        }
        let text = self.string_value(Value::string(string));
        CacheKey::new(text, bytecode_index, RopeSuffix::None)
    }

    /// Lexical names of enclosing block and class scopes, plus the private
    /// names visible from `scope`.
    pub fn collect_closure_variables_under_tdz(&self, scope: u32) -> (Vec<String>, Vec<String>) {
        let mut variables = Vec::new();
        let mut private_names = Vec::new();
        let mut cursor = Some(scope);
        while let Some(handle) = cursor {
            let Some(node) = self.heap.get_scope(handle) else {
                break;
            };
            if matches!(node.kind, ScopeKind::Lexical | ScopeKind::Class) {
                variables.extend(node.bindings.keys().cloned());
            }
            private_names.extend(node.private_names.iter().cloned());
            cursor = node.next;
        }
        (variables, private_names)
    }

    /// Eval source compiled while possibly tainted code is on the stack is
    /// itself indirectly tainted.
    pub fn source_tainted_origin_from_stack(&self) -> SourceTaintedOrigin {
        if !self.might_be_executing_tainted_code {
            return SourceTaintedOrigin::Untainted;
        }
        let tainted = self
            .frames
            .iter()
            .filter_map(|f| f.code_block.as_ref())
            .any(|cb| cb.source.tainted.is_tainted());
        if tainted {
            SourceTaintedOrigin::IndirectlyTainted
        } else {
            SourceTaintedOrigin::Untainted
        }
    }

    fn compile_eval(&mut self, realm: RealmId, request: &EvalCompileRequest<'_>) -> Completion<EvalExecutable> {
        let compiler = self.realm(realm).compiler.clone();
        let strict_context = request.context.strict;
        let tainted = request.tainted;
        match compiler.compile_eval(request) {
            Ok(EvalCode {
                variables,
                function_decls,
                function_hoisting_candidates,
                strict,
                generator,
            }) => Ok(EvalExecutable {
                unit: CompiledUnit::new(generator),
                variables,
                function_decls,
                function_hoisting_candidates,
                strict: strict || strict_context,
                tainted,
            }),
            Err(err) => {
                tracing::debug!(%err, "eval compilation failed");
                Err(self.throw_error(err.error_type, &err.message))
            }
        }
    }
}

/// Contextual flags the caller's code block passes on to eval code.
pub fn eval_context_for(code_block: &CodeBlock) -> EvalContext {
    let unlinked = &code_block.unlinked;
    let is_arrow_function_context = unlinked.is_arrow_function || unlinked.is_arrow_function_context;

    let mut derived_context_type = unlinked.derived_context_type;
    if !is_arrow_function_context && unlinked.is_class_context {
        derived_context_type = if unlinked.is_constructor {
            DerivedContextType::DerivedConstructorContext
        } else {
            DerivedContextType::DerivedMethodContext
        };
    }

    let eval_context_type = if unlinked.parse_mode == ParseMode::ClassFieldInitializer {
        EvalContextType::InstanceFieldEvalContext
    } else if unlinked.parse_mode.is_function() {
        EvalContextType::FunctionEvalContext
    } else if code_block.code_type == CodeType::Eval {
        unlinked.eval_context_type
    } else {
        EvalContextType::None
    };

    EvalContext {
        strict: code_block.is_strict(),
        is_arrow_function_context,
        derived_context_type,
        eval_context_type,
        needs_class_field_initializer: unlinked.needs_class_field_initializer,
        private_brand_requirement: unlinked.private_brand_requirement,
    }
}

pub(crate) fn indirect_eval_fn() -> NativeFn {
    native_fn(|vm: &mut VM, frame: FrameId| vm.indirect_eval(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_block::UnlinkedInfo;
    use crate::executable::Entry;

    fn code_block(unlinked: UnlinkedInfo, code_type: CodeType) -> CodeBlock {
        let code = Arc::new(|_: &mut VM, _: FrameId, _: Entry| -> Completion { Ok(Value::undefined()) });
        CodeBlock::new("caller", code)
            .with_code_type(code_type)
            .with_unlinked(unlinked)
    }

    #[test]
    fn class_methods_become_derived_method_contexts() {
        let cb = code_block(
            UnlinkedInfo {
                is_class_context: true,
                parse_mode: ParseMode::Method,
                ..UnlinkedInfo::default()
            },
            CodeType::Function,
        );
        let ctx = eval_context_for(&cb);
        assert_eq!(ctx.derived_context_type, DerivedContextType::DerivedMethodContext);
        assert_eq!(ctx.eval_context_type, EvalContextType::FunctionEvalContext);
    }

    #[test]
    fn arrow_functions_keep_their_derived_context() {
        let cb = code_block(
            UnlinkedInfo {
                is_arrow_function: true,
                is_class_context: true,
                is_constructor: true,
                parse_mode: ParseMode::ArrowFunction,
                ..UnlinkedInfo::default()
            },
            CodeType::Function,
        );
        let ctx = eval_context_for(&cb);
        assert!(ctx.is_arrow_function_context);
        assert_eq!(ctx.derived_context_type, DerivedContextType::None);
    }

    #[test]
    fn nested_eval_inherits_eval_context_type() {
        let cb = code_block(
            UnlinkedInfo {
                strict: true,
                parse_mode: ParseMode::Eval,
                eval_context_type: EvalContextType::InstanceFieldEvalContext,
                ..UnlinkedInfo::default()
            },
            CodeType::Eval,
        );
        let ctx = eval_context_for(&cb);
        assert!(ctx.strict);
        assert_eq!(ctx.eval_context_type, EvalContextType::InstanceFieldEvalContext);
    }

    #[test]
    fn field_initializers_use_instance_field_context() {
        let cb = code_block(
            UnlinkedInfo {
                parse_mode: ParseMode::ClassFieldInitializer,
                ..UnlinkedInfo::default()
            },
            CodeType::Function,
        );
        assert_eq!(eval_context_for(&cb).eval_context_type, EvalContextType::InstanceFieldEvalContext);
    }
}
