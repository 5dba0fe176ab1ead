//! Asynchronous termination requests and the deferral discipline around
//! them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::exception::Completion;
use crate::machine::VM;

#[derive(Debug, Default)]
pub struct VmTraps {
    need_termination: AtomicBool,
    defer_depth: AtomicU32,
    /// A request that arrived (or was pending) while deferred.
    deferred_request: AtomicBool,
}

impl VmTraps {
    pub fn request_termination(&self) {
        if self.defer_depth.load(Ordering::Acquire) > 0 {
            self.deferred_request.store(true, Ordering::Release);
        } else {
            self.need_termination.store(true, Ordering::Release);
        }
    }

    pub fn needs_termination(&self) -> bool {
        self.need_termination.load(Ordering::Acquire)
    }

    pub fn is_deferring_termination(&self) -> bool {
        self.defer_depth.load(Ordering::Acquire) > 0
    }

    fn take_termination_request(&self) -> bool {
        !self.is_deferring_termination() && self.need_termination.swap(false, Ordering::AcqRel)
    }
}

/// While alive, termination requests are parked instead of observed. The
/// last guard to drop restores a parked request.
#[must_use]
pub struct DeferTermination {
    traps: Arc<VmTraps>,
}

impl DeferTermination {
    pub fn new(traps: &Arc<VmTraps>) -> Self {
        if traps.defer_depth.fetch_add(1, Ordering::AcqRel) == 0
            && traps.need_termination.swap(false, Ordering::AcqRel)
        {
            traps.deferred_request.store(true, Ordering::Release);
        }
        Self {
            traps: traps.clone(),
        }
    }
}

impl Drop for DeferTermination {
    fn drop(&mut self) {
        if self.traps.defer_depth.fetch_sub(1, Ordering::AcqRel) == 1
            && self.traps.deferred_request.swap(false, Ordering::AcqRel)
        {
            self.traps.need_termination.store(true, Ordering::Release);
        }
    }
}

/// Cross-thread handle for requesting termination of a VM.
#[derive(Debug, Clone)]
pub struct TerminationHandle(Arc<VmTraps>);

impl TerminationHandle {
    pub fn request_termination(&self) {
        self.0.request_termination();
    }
}

impl VM {
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle(self.traps.clone())
    }

    /// Safepoint: throws the termination exception if one was requested.
    pub fn check_traps(&mut self) -> Completion<()> {
        if self.traps.take_termination_request() {
            return Err(self.throw_termination());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_during_deferral_is_restored_on_exit() {
        let traps = Arc::new(VmTraps::default());
        {
            let _outer = DeferTermination::new(&traps);
            let _inner = DeferTermination::new(&traps);
            traps.request_termination();
            assert!(!traps.needs_termination());
        }
        assert!(traps.needs_termination());
    }

    #[test]
    fn pending_request_is_hidden_while_deferred() {
        let traps = Arc::new(VmTraps::default());
        traps.request_termination();
        let guard = DeferTermination::new(&traps);
        assert!(!traps.needs_termination());
        assert!(!traps.take_termination_request());
        drop(guard);
        assert!(traps.take_termination_request());
        assert!(!traps.needs_termination());
    }
}
