use memory::Value;

use crate::machine::{FrameId, VM};
use crate::realm::RealmId;
use crate::traps::DeferTermination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugHookType {
    WillExecuteProgram,
    DidExecuteProgram,
    DidEnterCallFrame,
    WillLeaveCallFrame,
    WillExecuteStatement,
    WillExecuteExpression,
    WillAwait,
    DidAwait,
    DidReachDebuggerStatement,
}

/// Debugger attached to a realm. Callbacks run with the pending exception
/// set aside and must not leave a new one behind.
pub trait Debugger: Send {
    fn needs_exception_callbacks(&self) -> bool {
        true
    }

    /// A function frame is being departed by an unwind.
    fn unwind_event(&mut self, _vm: &mut VM, _frame: FrameId) {}

    /// A program or eval frame finished, normally or by an unwind.
    fn did_execute_program(&mut self, _vm: &mut VM, _frame: FrameId) {}

    fn exception(
        &mut self,
        _vm: &mut VM,
        _realm: RealmId,
        _frame: Option<FrameId>,
        _value: Value,
        _has_catch_handler: bool,
    ) {
    }

    fn debug_hook(&mut self, _vm: &mut VM, _frame: FrameId, _hook: DebugHookType, _data: Value) {}
}

impl VM {
    /// Runs `f` against the debugger of `realm`, if one is attached.
    pub(crate) fn with_debugger<R>(
        &mut self,
        realm: RealmId,
        f: impl FnOnce(&mut dyn Debugger, &mut VM) -> R,
    ) -> Option<R> {
        let mut debugger = self.realms.get_mut(realm.0 as usize)?.debugger.take()?;
        let result = f(debugger.as_mut(), self);
        if let Some(slot) = self.realms.get_mut(realm.0 as usize) {
            slot.debugger.get_or_insert(debugger);
        }
        Some(result)
    }

    /// Forwards a debug hook emitted by compiled code.
    pub fn debug(&mut self, frame: FrameId, hook: DebugHookType, data: Value) {
        let _defer = DeferTermination::new(&self.traps);
        let realm = self.frames[frame.0].realm;
        debug_assert!(!self.has_exception(), "debug hook with a pending exception");
        self.with_debugger(realm, |debugger, vm| {
            debugger.debug_hook(vm, frame, hook, data);
        });
        debug_assert!(!self.has_exception(), "debugger left an exception behind");
    }
}
