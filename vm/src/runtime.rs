//! Process-wide state shared by every VM: options, the register convention
//! of the host platform and the foreign runtime's tag allocator. Built once
//! by the embedder before any VM exists.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::foreign::TagId;
use crate::machine::VM;
use crate::options::VmOptions;
use crate::unwind::registers::RegisterConvention;

#[derive(Debug)]
pub struct Runtime {
    options: VmOptions,
    convention: RegisterConvention,
    host_exception_tag: TagId,
    next_tag: AtomicU32,
}

impl Runtime {
    pub fn initialize(options: VmOptions) -> Result<Arc<Runtime>, RuntimeError> {
        Self::with_convention(options, RegisterConvention::for_host())
    }

    /// Runtime with an explicit register convention, for embedders that
    /// emulate another platform.
    pub fn with_convention(options: VmOptions, convention: RegisterConvention) -> Result<Arc<Runtime>, RuntimeError> {
        options.validate()?;
        tracing::debug!(
            max_arguments = options.max_arguments,
            callee_saves = convention.vm_callee_saves.len(),
            "runtime initialized"
        );
        Ok(Arc::new(Runtime {
            options,
            convention,
            host_exception_tag: TagId(0),
            next_tag: AtomicU32::new(1),
        }))
    }

    pub(crate) fn with_defaults() -> Arc<Runtime> {
        Arc::new(Runtime {
            options: VmOptions::default(),
            convention: RegisterConvention::for_host(),
            host_exception_tag: TagId(0),
            next_tag: AtomicU32::new(1),
        })
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Fresh foreign exception tag.
    pub fn allocate_tag(&self) -> TagId {
        TagId(self.next_tag.fetch_add(1, Ordering::Relaxed))
    }

    /// Tag under which the foreign runtime sees exceptions thrown by script.
    pub fn host_exception_tag(&self) -> TagId {
        self.host_exception_tag
    }

    pub fn convention(&self) -> &RegisterConvention {
        &self.convention
    }

    pub fn create_vm(self: &Arc<Self>) -> VM {
        VM::with_runtime(self.clone(), self.options.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_from_the_host_tag() {
        let runtime = Runtime::initialize(VmOptions::default()).unwrap();
        let a = runtime.allocate_tag();
        let b = runtime.allocate_tag();
        assert_ne!(a, b);
        assert_ne!(a, runtime.host_exception_tag());
        assert_ne!(b, runtime.host_exception_tag());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = VmOptions {
            stack_commit_granularity: 0,
            ..VmOptions::default()
        };
        assert!(matches!(
            Runtime::initialize(options),
            Err(RuntimeError::InvalidOptions(_))
        ));
    }

    #[test]
    fn vms_share_the_runtime_options() {
        let options = VmOptions {
            max_entry_depth: 7,
            ..VmOptions::default()
        };
        let runtime = Runtime::initialize(options).unwrap();
        let vm = runtime.create_vm();
        assert_eq!(vm.options.max_entry_depth, 7);
    }
}
