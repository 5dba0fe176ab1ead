use memory::Value;

use crate::exception::Completion;
use crate::machine::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationType {
    DirectEval,
    IndirectEval,
    Function,
}

/// Embedder policy hooks consulted by eval and program execution.
pub trait HostHooks: Send + Sync {
    /// Source text for a non-string eval argument, if the embedder vouches
    /// for it (a trusted-script wrapper of its own).
    fn code_for_eval(&self, _vm: &mut VM, _value: Value) -> Completion<Option<String>> {
        Ok(None)
    }

    /// Compile gate used while trusted-types enforcement is active.
    fn can_compile_strings(&self, _vm: &mut VM, _kind: CompilationType, _source: &str) -> Completion<bool> {
        Ok(true)
    }

    fn report_violation_for_unsafe_eval(&self, _source: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHost;

impl HostHooks for DefaultHost {}
