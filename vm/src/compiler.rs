//! Interface to the source compiler. Parsing and bytecode generation live
//! outside this crate; the engine only hands over source text plus the
//! context of the call site and receives declarations and a code generator.

use std::sync::Arc;

use memory::BindingKind;

use crate::error::CompileError;
use crate::executable::{CodeGenerator, FunctionExecutable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DerivedContextType {
    #[default]
    None,
    DerivedConstructorContext,
    DerivedMethodContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvalContextType {
    #[default]
    None,
    FunctionEvalContext,
    InstanceFieldEvalContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceTaintedOrigin {
    #[default]
    Untainted,
    IndirectlyTainted,
    KnownTainted,
}

impl SourceTaintedOrigin {
    pub fn is_tainted(&self) -> bool {
        *self != SourceTaintedOrigin::Untainted
    }
}

/// Call-site context that decides `this`, `super` and private-name rules
/// of freshly compiled eval code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalContext {
    pub strict: bool,
    pub is_arrow_function_context: bool,
    pub derived_context_type: DerivedContextType,
    pub eval_context_type: EvalContextType,
    pub needs_class_field_initializer: bool,
    pub private_brand_requirement: bool,
}

#[derive(Debug)]
pub struct EvalCompileRequest<'a> {
    pub source: &'a str,
    pub context: &'a EvalContext,
    /// Lexical names of enclosing scopes that may still be in their TDZ.
    pub variables_under_tdz: &'a [String],
    pub private_names: &'a [String],
    pub tainted: SourceTaintedOrigin,
}

pub struct EvalCode {
    pub variables: Vec<String>,
    pub function_decls: Vec<Arc<FunctionExecutable>>,
    /// Block-level functions that may be hoisted to the var scope.
    pub function_hoisting_candidates: Vec<String>,
    /// The source itself opts into strict mode.
    pub strict: bool,
    pub generator: Arc<dyn CodeGenerator>,
}

pub struct ProgramCode {
    pub variables: Vec<String>,
    pub function_decls: Vec<Arc<FunctionExecutable>>,
    pub lexical: Vec<(String, BindingKind)>,
    pub generator: Arc<dyn CodeGenerator>,
}

pub trait SourceCompiler: Send + Sync {
    fn compile_eval(&self, request: &EvalCompileRequest<'_>) -> Result<EvalCode, CompileError>;
    fn compile_program(&self, source: &str) -> Result<ProgramCode, CompileError>;
}

/// Realm default when no compiler is attached: every compile fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompiler;

impl SourceCompiler for NoCompiler {
    fn compile_eval(&self, _request: &EvalCompileRequest<'_>) -> Result<EvalCode, CompileError> {
        Err(CompileError::syntax("no source compiler attached"))
    }

    fn compile_program(&self, _source: &str) -> Result<ProgramCode, CompileError> {
        Err(CompileError::syntax("no source compiler attached"))
    }
}
