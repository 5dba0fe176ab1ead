//! Callee-saved register bookkeeping for frames produced by JIT tiers.
//!
//! A JIT frame spills the callee-saved registers it clobbers into its own
//! spill area. When the unwinder departs such a frame it moves those values
//! into the entry record of the current VM entry, where the entry
//! trampoline restores them on exit.

use std::ptr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAtOffset {
    pub reg: Reg,
    /// Slot index in the spill area (frame) or buffer (entry record).
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterAtOffsetList {
    entries: Vec<RegisterAtOffset>,
}

impl RegisterAtOffsetList {
    pub fn new(entries: Vec<RegisterAtOffset>) -> Self {
        Self { entries }
    }

    /// Registers laid out at consecutive offsets from zero.
    pub fn packed(regs: &[u8]) -> Self {
        Self::new(
            regs.iter()
                .enumerate()
                .map(|(offset, &r)| RegisterAtOffset { reg: Reg(r), offset })
                .collect(),
        )
    }

    pub fn find(&self, reg: Reg) -> Option<&RegisterAtOffset> {
        self.entries.iter().find(|e| e.reg == reg)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterAtOffset> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of slots needed to hold every offset.
    pub fn slot_count(&self) -> usize {
        self.entries.iter().map(|e| e.offset + 1).max().unwrap_or(0)
    }
}

/// What to do with a frame register the VM convention does not preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedRegisterPolicy {
    /// The platform convention preserves more registers than the VM one.
    /// JIT callees only promise the VM subset when called from the VM, so
    /// the extra registers need no restoring.
    Drop,
    /// Every spilled register must be part of the VM convention.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterConvention {
    pub vm_callee_saves: RegisterAtOffsetList,
    /// Never copied; restored by the frame teardown itself.
    pub stack_registers: Vec<Reg>,
    pub unmapped: UnmappedRegisterPolicy,
}

impl RegisterConvention {
    pub fn new(vm_callee_saves: RegisterAtOffsetList, stack_registers: Vec<Reg>, unmapped: UnmappedRegisterPolicy) -> Self {
        Self {
            vm_callee_saves,
            stack_registers,
            unmapped,
        }
    }

    pub fn for_host() -> Self {
        if cfg!(target_arch = "x86_64") {
            // rbx, r12-r15; rsp and rbp belong to the frame.
            Self::new(
                RegisterAtOffsetList::packed(&[3, 12, 13, 14, 15]),
                vec![Reg(4), Reg(5)],
                UnmappedRegisterPolicy::Abort,
            )
        } else if cfg!(target_arch = "aarch64") {
            Self::new(
                RegisterAtOffsetList::packed(&[19, 20, 21, 22, 23, 24, 25, 26, 27, 28]),
                vec![Reg(29), Reg(31)],
                UnmappedRegisterPolicy::Abort,
            )
        } else if cfg!(target_arch = "arm") {
            // The system convention also preserves r4, r5 and r7-r11; the
            // VM only relies on a subset.
            Self::new(
                RegisterAtOffsetList::packed(&[8, 10, 11]),
                vec![Reg(13), Reg(7)],
                UnmappedRegisterPolicy::Drop,
            )
        } else {
            Self::new(RegisterAtOffsetList::default(), Vec::new(), UnmappedRegisterPolicy::Abort)
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.vm_callee_saves.slot_count()
    }
}

/// Per-entry record restored by the trampoline when the entry returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryRecord {
    pub callee_save_buffer: Vec<u64>,
}

impl EntryRecord {
    pub fn new(len: usize) -> Self {
        Self {
            callee_save_buffer: vec![0; len],
        }
    }
}

/// # Safety
/// `src` must be valid for reads and `dst` valid for writes of one `u64`,
/// and they must not overlap.
#[inline]
unsafe fn copy_register_slot(src: *const u64, dst: *mut u64) {
    ptr::copy_nonoverlapping(src, dst, 1);
}

/// Copies the registers `frame_saves` describes from `frame_slots` into
/// `record`, at the offsets the VM convention assigns them. Returns the
/// number of registers copied.
///
/// # Panics
/// Under `UnmappedRegisterPolicy::Abort`, when the frame spilled a register
/// that is not callee-saved in the VM convention.
pub fn copy_callee_saves(
    convention: &RegisterConvention,
    frame_saves: &RegisterAtOffsetList,
    frame_slots: &[u64],
    record: &mut EntryRecord,
) -> usize {
    let mut copied = 0;
    for current in frame_saves.iter() {
        if convention.stack_registers.contains(&current.reg) {
            continue;
        }
        let Some(target) = convention.vm_callee_saves.find(current.reg) else {
            match convention.unmapped {
                UnmappedRegisterPolicy::Drop => continue,
                UnmappedRegisterPolicy::Abort => {
                    panic!("register {:?} is not callee-saved in the VM convention", current.reg)
                }
            }
        };
        let (Some(src), Some(dst)) = (
            frame_slots.get(current.offset),
            record.callee_save_buffer.get_mut(target.offset),
        ) else {
            debug_assert!(false, "callee-save offset outside its buffer");
            continue;
        };
        // SAFETY: both references come from bounds-checked slice accesses
        // into distinct allocations.
        unsafe { copy_register_slot(src, dst) };
        copied += 1;
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convention(policy: UnmappedRegisterPolicy) -> RegisterConvention {
        RegisterConvention::new(RegisterAtOffsetList::packed(&[3, 12, 13]), vec![Reg(5)], policy)
    }

    #[test]
    fn copies_into_vm_offsets() {
        let conv = convention(UnmappedRegisterPolicy::Abort);
        // Frame spilled r13 at 0 and rbx at 1.
        let saves = RegisterAtOffsetList::new(vec![
            RegisterAtOffset { reg: Reg(13), offset: 0 },
            RegisterAtOffset { reg: Reg(3), offset: 1 },
        ]);
        let mut record = EntryRecord::new(conv.buffer_len());
        let copied = copy_callee_saves(&conv, &saves, &[0xAA, 0xBB], &mut record);
        assert_eq!(copied, 2);
        assert_eq!(record.callee_save_buffer, vec![0xBB, 0, 0xAA]);
    }

    #[test]
    fn stack_registers_are_skipped() {
        let conv = convention(UnmappedRegisterPolicy::Abort);
        let saves = RegisterAtOffsetList::new(vec![RegisterAtOffset { reg: Reg(5), offset: 0 }]);
        let mut record = EntryRecord::new(conv.buffer_len());
        assert_eq!(copy_callee_saves(&conv, &saves, &[7], &mut record), 0);
        assert_eq!(record.callee_save_buffer, vec![0, 0, 0]);
    }

    #[test]
    fn drop_policy_ignores_unmapped_registers() {
        let conv = convention(UnmappedRegisterPolicy::Drop);
        let saves = RegisterAtOffsetList::new(vec![
            RegisterAtOffset { reg: Reg(9), offset: 0 },
            RegisterAtOffset { reg: Reg(12), offset: 1 },
        ]);
        let mut record = EntryRecord::new(conv.buffer_len());
        assert_eq!(copy_callee_saves(&conv, &saves, &[1, 2], &mut record), 1);
        assert_eq!(record.callee_save_buffer, vec![0, 2, 0]);
    }

    #[test]
    #[should_panic(expected = "not callee-saved")]
    fn abort_policy_rejects_unmapped_registers() {
        let conv = convention(UnmappedRegisterPolicy::Abort);
        let saves = RegisterAtOffsetList::new(vec![RegisterAtOffset { reg: Reg(9), offset: 0 }]);
        let mut record = EntryRecord::new(conv.buffer_len());
        copy_callee_saves(&conv, &saves, &[1], &mut record);
    }
}
