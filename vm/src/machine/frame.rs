use std::fmt;
use std::sync::Arc;

use memory::Value;

use crate::code_block::CodeBlock;
use crate::foreign::ForeignCallee;
use crate::realm::RealmId;
use crate::unwind::registers::EntryRecord;

/// Header slots between a caller's used registers and the callee's `this`
/// register: callee, code block, argument count, caller link, return location.
pub const CALL_FRAME_HEADER_SIZE: usize = 5;

/// Index of a pushed frame. Frames are strictly LIFO, so the index stays
/// valid for the lifetime of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

/// What occupies the callee slot of a frame.
#[derive(Clone)]
pub enum Callee {
    /// Function object backed by compiled code (also program/eval callees).
    Interpreted(Value),
    /// Host function object.
    Native(Value),
    /// Foreign-runtime function with its own handler table.
    Foreign(Arc<ForeignCallee>),
}

impl Callee {
    /// The callee cell, if it has one.
    pub fn value(&self) -> Option<Value> {
        match self {
            Callee::Interpreted(v) | Callee::Native(v) => Some(*v),
            Callee::Foreign(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Callee::Native(_))
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Interpreted(v) => write!(f, "Interpreted({v:?})"),
            Callee::Native(v) => write!(f, "Native({v:?})"),
            Callee::Foreign(c) => write!(f, "Foreign({})", c.index_or_name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerLink {
    Frame(FrameId),
    /// The frame was pushed by a VM entry; its caller is the entry sentinel.
    Entry(EntryId),
}

/// A logical activation record. Registers live in the `CallStack`; this is
/// the side table describing them.
///
/// Each frame tracks:
/// - `callee`: what is executing
/// - `code_block`: compiled-unit metadata, `None` for native frames
/// - `location`: bytecode index, or call-site index for optimizing code
/// - `base`: register index of `this`; arguments follow it
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub callee: Callee,
    pub code_block: Option<Arc<CodeBlock>>,
    pub argument_count_including_this: u32,
    pub caller: CallerLink,
    pub location: u32,
    pub base: usize,
    /// Arguments plus locals.
    pub register_count: usize,
    pub realm: RealmId,
    pub scope: Option<u32>,
    /// Spill area for callee-saved machine registers of JIT tiers.
    pub machine_slots: Vec<u64>,
}

impl CallFrame {
    #[inline]
    pub fn argument_count(&self) -> usize {
        self.argument_count_including_this as usize - 1
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.register_count
    }

    #[inline]
    pub fn caller_is_entry_frame(&self) -> bool {
        matches!(self.caller, CallerLink::Entry(_))
    }
}

/// Sentinel frame recorded at every VM entry.
#[derive(Debug, Clone)]
pub struct EntryFrame {
    /// Top frame when the entry began; the walk continues there.
    pub caller_top: Option<FrameId>,
    /// Index of the first frame pushed under this entry.
    pub first_frame: usize,
    pub record: EntryRecord,
}

/// Where a callee frame's registers go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub base: usize,
    pub argument_count_including_this: u32,
}

impl FrameSlot {
    #[inline]
    pub fn this_register(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn argument_register(&self, index: usize) -> usize {
        self.base + 1 + index
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.argument_count_including_this as usize
    }
}

/// Cross-tier descriptor handed to the entry trampoline.
#[derive(Debug, Clone)]
pub struct ProtoCallFrame {
    pub code_block: Option<Arc<CodeBlock>>,
    pub realm: RealmId,
    pub callee: Callee,
    pub this_value: Value,
    pub args: Vec<Value>,
    pub scope: Option<u32>,
}

impl ProtoCallFrame {
    #[inline]
    pub fn argument_count_including_this(&self) -> u32 {
        self.args.len() as u32 + 1
    }
}

/// Per-VM register stack: a committed region that grows on demand up to
/// a reserved ceiling.
#[derive(Debug)]
pub struct CallStack {
    registers: Vec<Value>,
    reserved: usize,
    granularity: usize,
}

impl CallStack {
    pub fn new(reserved: usize, granularity: usize) -> Self {
        Self {
            registers: Vec::new(),
            reserved,
            granularity: granularity.max(1),
        }
    }

    /// Carves a callee frame out past the caller's used slots. Pure.
    #[inline]
    pub fn callee_frame_for(
        caller_base: usize,
        used_stack_slots: usize,
        argument_count_including_this: u32,
    ) -> FrameSlot {
        FrameSlot {
            base: caller_base + used_stack_slots + CALL_FRAME_HEADER_SIZE,
            argument_count_including_this,
        }
    }

    /// Commits enough registers for `slot` plus `locals`. False when the
    /// reserved ceiling would be exceeded.
    pub fn ensure_capacity_for(&mut self, slot: &FrameSlot, locals: usize) -> bool {
        let needed = slot.end() + locals;
        if needed > self.reserved {
            return false;
        }
        if needed > self.registers.len() {
            let rounded = needed.div_ceil(self.granularity) * self.granularity;
            self.registers
                .resize(rounded.min(self.reserved), Value::undefined());
        }
        true
    }

    #[inline]
    pub fn committed(&self) -> usize {
        self.registers.len()
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    #[inline]
    pub fn get(&self, index: usize) -> Value {
        self.registers
            .get(index)
            .copied()
            .unwrap_or_else(Value::undefined)
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: Value) {
        debug_assert!(index < self.registers.len(), "write outside committed stack");
        self.registers[index] = value;
    }

    pub fn slice(&self, start: usize, len: usize) -> &[Value] {
        &self.registers[start..start + len]
    }

    pub fn write_slice(&mut self, start: usize, values: &[Value]) {
        self.registers[start..start + values.len()].copy_from_slice(values);
    }

    /// Bulk copy of `len` registers inside the stack.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.registers.copy_within(src..src + len, dst);
    }

    pub(crate) fn live_registers(&self, end: usize) -> &[Value] {
        &self.registers[..end.min(self.registers.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callee_frame_skips_used_slots_and_header() {
        let slot = CallStack::callee_frame_for(10, 4, 3);
        assert_eq!(slot.base, 10 + 4 + CALL_FRAME_HEADER_SIZE);
        assert_eq!(slot.argument_register(1), slot.base + 2);
        assert_eq!(slot.end(), slot.base + 3);
    }

    #[test]
    fn ensure_capacity_grows_by_granularity() {
        let mut stack = CallStack::new(100, 16);
        let slot = CallStack::callee_frame_for(0, 0, 2);
        assert!(stack.ensure_capacity_for(&slot, 3));
        assert_eq!(stack.committed(), 16);
    }

    #[test]
    fn ensure_capacity_refuses_past_ceiling() {
        let mut stack = CallStack::new(32, 16);
        let slot = CallStack::callee_frame_for(20, 0, 10);
        assert!(!stack.ensure_capacity_for(&slot, 0));
        assert_eq!(stack.committed(), 0, "nothing committed on failure");
    }
}
