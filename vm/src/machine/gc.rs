use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use memory::Value;

#[derive(Debug, Default)]
struct GcCounters {
    no_gc_depth: AtomicU32,
    defer_depth: AtomicU32,
    /// A collection was requested while deferred.
    postponed: AtomicBool,
}

/// Scoped GC markers. Guards are owned values so they can be held across
/// `&mut VM` calls.
#[derive(Debug, Clone, Default)]
pub struct GcGuards(Arc<GcCounters>);

impl GcGuards {
    /// Collecting while the returned guard lives is a bug.
    pub fn assert_no_gc(&self) -> AssertNoGc {
        self.0.no_gc_depth.fetch_add(1, Ordering::AcqRel);
        AssertNoGc(self.0.clone())
    }

    /// Collections requested while the returned guard lives are postponed.
    pub fn defer_gc(&self) -> DeferGc {
        self.0.defer_depth.fetch_add(1, Ordering::AcqRel);
        DeferGc(self.0.clone())
    }

    pub fn is_gc_forbidden(&self) -> bool {
        self.0.no_gc_depth.load(Ordering::Acquire) > 0
    }

    pub fn is_deferred(&self) -> bool {
        self.0.defer_depth.load(Ordering::Acquire) > 0
    }

    pub fn has_postponed_collection(&self) -> bool {
        self.0.postponed.load(Ordering::Acquire)
    }
}

#[must_use]
pub struct AssertNoGc(Arc<GcCounters>);

impl Drop for AssertNoGc {
    fn drop(&mut self) {
        self.0.no_gc_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

#[must_use]
pub struct DeferGc(Arc<GcCounters>);

impl Drop for DeferGc {
    fn drop(&mut self) {
        self.0.defer_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Trait for garbage collection operations
pub trait GarbageCollector {
    /// Full collection. Returns the number of freed cells.
    fn collect_garbage(&mut self) -> usize;
    /// Value roots and scope roots.
    fn mark_roots(&self) -> (Vec<Value>, Vec<u32>);
    /// Safepoint check: collects when the heap asks for it, in stress mode,
    /// or when an earlier request was postponed.
    fn collect_if_needed(&mut self);
}

impl GarbageCollector for super::vm::VM {
    fn collect_garbage(&mut self) -> usize {
        assert!(!self.gc.is_gc_forbidden(), "garbage collection inside an AssertNoGc scope");
        if self.gc.is_deferred() {
            self.gc.0.postponed.store(true, Ordering::Release);
            tracing::trace!("collection postponed");
            return 0;
        }
        self.gc.0.postponed.store(false, Ordering::Release);

        let before = self.heap.bytes_allocated;
        let (roots, scope_roots) = self.mark_roots();
        self.heap.trace(roots, scope_roots);
        let freed = self.heap.sweep();
        tracing::debug!(before, after = self.heap.bytes_allocated, freed, "garbage collected");
        freed
    }

    fn mark_roots(&self) -> (Vec<Value>, Vec<u32>) {
        let mut roots = Vec::new();
        let mut scopes = Vec::new();

        // 1. Registers
        roots.extend_from_slice(self.stack.live_registers(self.stack.committed()));

        // 2. Frames
        for frame in &self.frames {
            roots.extend(frame.callee.value());
            scopes.extend(frame.scope);
        }

        // 3. Function records
        for record in &self.functions {
            roots.extend(record.children());
            scopes.extend(record.scope());
        }

        // 4. Realms
        for realm in &self.realms {
            roots.extend([
                realm.global_this,
                realm.eval_function,
                realm.program_callee,
                realm.eval_callee,
            ]);
            scopes.push(realm.global_scope);
        }

        // 5. Exception state
        roots.extend(self.exception_value());
        roots.push(self.termination_sentinel);
        for state in &self.checkpoint_side_state {
            roots.extend_from_slice(&state.tmps);
        }

        (roots, scopes)
    }

    fn collect_if_needed(&mut self) {
        if self.gc.is_gc_forbidden() {
            return;
        }
        if self.stress_mode || self.heap.should_collect() || self.gc.has_postponed_collection() {
            self.collect_garbage();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_release() {
        let guards = GcGuards::default();
        {
            let _a = guards.assert_no_gc();
            let _b = guards.assert_no_gc();
            assert!(guards.is_gc_forbidden());
        }
        assert!(!guards.is_gc_forbidden());

        let defer = guards.defer_gc();
        assert!(guards.is_deferred());
        drop(defer);
        assert!(!guards.is_deferred());
    }
}
