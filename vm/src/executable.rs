//! Compiled units handed over by the compiler tiers. An executable owns the
//! code blocks of its call and construct specializations and regenerates
//! them when they were jettisoned.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use memory::{BindingKind, Value};
use parking_lot::Mutex;

use crate::code_block::{CodeBlock, ImplementationVisibility};
use crate::compiler::SourceTaintedOrigin;
use crate::error::CompileError;
use crate::exception::Completion;
use crate::machine::{FrameId, VM};
use crate::unwind::CatchDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specialization {
    Call,
    Construct,
}

/// How control enters compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Start,
    /// Resumption at a handler found by the unwinder; `exception` is the
    /// value the handler observes.
    Catch {
        catch: CatchDescriptor,
        exception: Value,
    },
}

/// Machine code of one tier, entered through the VM entry trampoline.
pub trait CompiledCode: Send + Sync {
    fn run(&self, vm: &mut VM, frame: FrameId, entry: Entry) -> Completion;
}

impl<F> CompiledCode for F
where
    F: Fn(&mut VM, FrameId, Entry) -> Completion + Send + Sync,
{
    fn run(&self, vm: &mut VM, frame: FrameId, entry: Entry) -> Completion {
        self(vm, frame, entry)
    }
}

/// Produces code blocks for a specialization on demand.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, specialization: Specialization) -> Result<CodeBlock, CompileError>;
}

impl<F> CodeGenerator for F
where
    F: Fn(Specialization) -> Result<CodeBlock, CompileError> + Send + Sync,
{
    fn generate(&self, specialization: Specialization) -> Result<CodeBlock, CompileError> {
        self(specialization)
    }
}

pub struct CompiledUnit {
    generator: Arc<dyn CodeGenerator>,
    for_call: Mutex<Option<Arc<CodeBlock>>>,
    for_construct: Mutex<Option<Arc<CodeBlock>>>,
    compile_count: AtomicU32,
}

impl CompiledUnit {
    pub fn new(generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            generator,
            for_call: Mutex::new(None),
            for_construct: Mutex::new(None),
            compile_count: AtomicU32::new(0),
        }
    }

    fn slot(&self, specialization: Specialization) -> &Mutex<Option<Arc<CodeBlock>>> {
        match specialization {
            Specialization::Call => &self.for_call,
            Specialization::Construct => &self.for_construct,
        }
    }

    /// Code block for `specialization`, compiling synchronously if it is
    /// missing or was jettisoned. Compile failures are thrown as script
    /// errors.
    pub fn prepare_for_execution(&self, vm: &mut VM, specialization: Specialization) -> Completion<Arc<CodeBlock>> {
        let mut slot = self.slot(specialization).lock();
        if let Some(code_block) = slot.as_ref().filter(|cb| !cb.is_jettisoned()) {
            return Ok(code_block.clone());
        }

        let generated = self.generator.generate(specialization);
        self.compile_count.fetch_add(1, Ordering::Relaxed);
        vm.stats.compilations += 1;
        match generated {
            Ok(code_block) => {
                tracing::debug!(name = %code_block.name, ?specialization, "compiled code block");
                let code_block = Arc::new(code_block);
                *slot = Some(code_block.clone());
                Ok(code_block)
            }
            Err(err) => {
                drop(slot);
                Err(vm.throw_error(err.error_type, &err.message))
            }
        }
    }

    pub fn generated_code(&self, specialization: Specialization) -> Option<Arc<CodeBlock>> {
        self.slot(specialization).lock().clone()
    }

    pub fn compile_count(&self) -> u32 {
        self.compile_count.load(Ordering::Relaxed)
    }
}

pub struct FunctionExecutable {
    pub name: String,
    pub unit: CompiledUnit,
    pub constructable: bool,
    pub visibility: ImplementationVisibility,
}

impl FunctionExecutable {
    pub fn new(name: impl Into<String>, generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            name: name.into(),
            unit: CompiledUnit::new(generator),
            constructable: true,
            visibility: ImplementationVisibility::Public,
        }
    }

    pub fn non_constructable(mut self) -> Self {
        self.constructable = false;
        self
    }

    pub fn with_visibility(mut self, visibility: ImplementationVisibility) -> Self {
        self.visibility = visibility;
        self
    }
}

pub struct EvalExecutable {
    pub unit: CompiledUnit,
    pub variables: Vec<String>,
    pub function_decls: Vec<Arc<FunctionExecutable>>,
    pub function_hoisting_candidates: Vec<String>,
    pub strict: bool,
    pub tainted: SourceTaintedOrigin,
}

impl EvalExecutable {
    pub fn has_declarations(&self) -> bool {
        !self.variables.is_empty()
            || !self.function_decls.is_empty()
            || !self.function_hoisting_candidates.is_empty()
    }
}

pub struct ProgramExecutable {
    pub unit: CompiledUnit,
    pub variables: Vec<String>,
    pub function_decls: Vec<Arc<FunctionExecutable>>,
    pub lexical: Vec<(String, BindingKind)>,
}
