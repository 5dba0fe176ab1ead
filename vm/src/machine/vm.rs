use std::sync::Arc;

use memory::{Heap, Object, ObjectKind, Value};

use crate::compiler::NoCompiler;
use crate::error::RuntimeError;
use crate::exception::Exception;
use crate::function::FunctionRecord;
use crate::host::DefaultHost;
use crate::options::VmOptions;
use crate::realm::{Realm, RealmId};
use crate::runtime::Runtime;
use crate::traps::VmTraps;
use crate::unwind::registers::EntryRecord;
use crate::unwind::UnwindOutcome;

use super::frame::{CallFrame, CallStack, EntryFrame, FrameId};
use super::gc::GcGuards;

/// Counters read by tests and embedders. Never consulted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instrumentation {
    /// Calls and constructs that went through the dispatcher's entry point.
    pub dispatcher_steps: u64,
    pub bound_unwraps: u64,
    pub quick_index_gets: u64,
    pub slow_index_gets: u64,
    pub eval_cache_hits: u64,
    pub eval_cache_misses: u64,
    pub literal_fast_path_hits: u64,
    pub compilations: u64,
    pub unwinds: u64,
    pub vm_entries: u64,
}

/// Resume state optimized code parks for a frame while it runs a
/// checkpoint; dropped when the unwinder departs the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSideState {
    pub frame: FrameId,
    pub bytecode_index: u32,
    pub tmps: Vec<Value>,
}

/// The Virtual Machine struct
pub struct VM {
    pub heap: Heap,
    pub stack: CallStack,
    pub frames: Vec<CallFrame>,
    /// One sentinel per active VM entry, innermost last.
    pub entries: Vec<EntryFrame>,
    pub functions: Vec<FunctionRecord>,
    pub realms: Vec<Realm>,
    pub options: VmOptions,
    pub runtime: Arc<Runtime>,
    pub stats: Instrumentation,

    pub(crate) exception: Option<Exception>,
    /// Outcome of the unwind already performed for the in-flight exception,
    /// consumed by the frames it passes through.
    pub(crate) pending_unwind: Option<UnwindOutcome>,
    pub(crate) checkpoint_side_state: Vec<CheckpointSideState>,
    pub(crate) traps: Arc<VmTraps>,
    pub gc: GcGuards,

    /// Non-zero while the runtime must not run script.
    pub disallow_vm_entry_count: u32,
    pub might_be_executing_tainted_code: bool,
    /// Entry record of the most recently exited VM entry, as restored by the
    /// trampoline.
    pub last_entry_record: Option<EntryRecord>,
    pub host_recursion_depth: usize,
    /// Identity of the termination exception.
    pub termination_sentinel: Value,

    /// If true, GC will run at every frame entry (for testing)
    pub stress_mode: bool,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// Create a new VM instance with a private default runtime and a main
    /// realm without a source compiler.
    pub fn new() -> Self {
        Self::with_runtime(Runtime::with_defaults(), VmOptions::default())
    }

    /// VM over the default runtime. Fails on options `VmOptions::validate`
    /// rejects.
    pub fn with_options(options: VmOptions) -> Result<Self, RuntimeError> {
        options.validate()?;
        Ok(Self::with_runtime(Runtime::with_defaults(), options))
    }

    pub(crate) fn with_runtime(runtime: Arc<Runtime>, options: VmOptions) -> Self {
        let stack = CallStack::new(options.stack_reserved_slots, options.stack_commit_granularity);
        let mut heap = Heap::new();
        let termination_sentinel = Value::object(heap.alloc_object(Object::new(ObjectKind::Ordinary, 0)));

        let mut vm = Self {
            heap,
            stack,
            frames: Vec::with_capacity(64),
            entries: Vec::with_capacity(8),
            functions: Vec::new(),
            realms: Vec::new(),
            options,
            runtime,
            stats: Instrumentation::default(),
            exception: None,
            pending_unwind: None,
            checkpoint_side_state: Vec::new(),
            traps: Arc::new(VmTraps::default()),
            gc: GcGuards::default(),
            disallow_vm_entry_count: 0,
            might_be_executing_tainted_code: false,
            last_entry_record: None,
            host_recursion_depth: 0,
            termination_sentinel,
            stress_mode: false,
        };

        let main = vm.create_realm(Arc::new(NoCompiler), Arc::new(DefaultHost));
        debug_assert_eq!(main, RealmId::MAIN);
        vm
    }

    /// Innermost frame, if any script is running.
    pub fn top_frame(&self) -> Option<FrameId> {
        self.frames.len().checked_sub(1).map(FrameId)
    }

    /// Runs `f` with VM entry disallowed.
    pub fn with_vm_entry_disallowed<R>(&mut self, f: impl FnOnce(&mut VM) -> R) -> R {
        self.disallow_vm_entry_count += 1;
        let result = f(self);
        self.disallow_vm_entry_count -= 1;
        result
    }

    pub fn push_checkpoint_side_state(&mut self, state: CheckpointSideState) {
        debug_assert!(
            self.checkpoint_side_state
                .last()
                .map_or(true, |last| last.frame <= state.frame),
            "side state must be pushed innermost last"
        );
        self.checkpoint_side_state.push(state);
    }

    pub fn has_checkpoint_side_state(&self, frame: FrameId) -> bool {
        self.checkpoint_side_state.iter().any(|s| s.frame == frame)
    }

    /// Drops the side state of `outermost` and every frame inside it.
    pub(crate) fn pop_checkpoint_side_state_until(&mut self, outermost: FrameId) {
        while self
            .checkpoint_side_state
            .last()
            .is_some_and(|state| state.frame >= outermost)
        {
            self.checkpoint_side_state.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_validated() {
        let options = VmOptions {
            stack_commit_granularity: 0,
            ..VmOptions::default()
        };
        assert!(matches!(VM::with_options(options), Err(RuntimeError::InvalidOptions(_))));
        let options = VmOptions {
            max_arguments: 64,
            stack_reserved_slots: 32,
            ..VmOptions::default()
        };
        assert!(VM::with_options(options).is_err());
        assert!(VM::with_options(VmOptions::default()).is_ok());
    }

    #[test]
    fn new_vm_has_a_main_realm() {
        let vm = VM::new();
        assert_eq!(vm.realms.len(), 1);
        assert!(vm.realm(RealmId::MAIN).eval_function.is_object());
        assert!(vm.top_frame().is_none());
    }

    #[test]
    fn side_state_pops_down_to_the_departed_frame() {
        let mut vm = VM::new();
        for frame in [0, 2, 3] {
            vm.push_checkpoint_side_state(CheckpointSideState {
                frame: FrameId(frame),
                bytecode_index: 0,
                tmps: Vec::new(),
            });
        }
        vm.pop_checkpoint_side_state_until(FrameId(2));
        assert!(vm.has_checkpoint_side_state(FrameId(0)));
        assert!(!vm.has_checkpoint_side_state(FrameId(2)));
        assert!(!vm.has_checkpoint_side_state(FrameId(3)));
    }
}
