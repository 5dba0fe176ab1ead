//! Logical frame cursor shared by the unwinder and the trace builder.
//!
//! Optimizing code blocks may have inlined callees that own no physical
//! `CallFrame`. A cursor position names a machine frame plus, optionally,
//! one of its inline call frames; stepping outward visits every inlined
//! callee before moving to the physical caller.

use std::sync::Arc;

use crate::code_block::{CodeBlock, CodeOrigin};
use crate::machine::{CallerLink, FrameId, VM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalFrame {
    pub frame: FrameId,
    /// Inline call frame index inside the machine frame's code block.
    pub inline_frame: Option<u32>,
    pub bytecode_index: u32,
}

impl LogicalFrame {
    pub fn is_inlined(&self) -> bool {
        self.inline_frame.is_some()
    }
}

impl VM {
    /// Innermost logical frame of a physical frame.
    pub fn innermost_logical_frame(&self, frame: FrameId) -> LogicalFrame {
        let call_frame = &self.frames[frame.0];
        let origin = call_frame
            .code_block
            .as_ref()
            .filter(|cb| cb.is_optimizing())
            .and_then(|cb| cb.code_origin(call_frame.location));
        match origin {
            Some(CodeOrigin {
                bytecode_index,
                inline_frame,
            }) => LogicalFrame {
                frame,
                inline_frame,
                bytecode_index,
            },
            None => LogicalFrame {
                frame,
                inline_frame: None,
                bytecode_index: call_frame.location,
            },
        }
    }

    /// Collapses inlined positions onto their machine frame.
    pub fn machine_frame(&self, logical: LogicalFrame) -> LogicalFrame {
        LogicalFrame {
            frame: logical.frame,
            inline_frame: None,
            bytecode_index: self.frames[logical.frame.0].location,
        }
    }

    /// Next frame outward, crossing VM entry boundaries.
    pub fn next_logical_frame(&self, logical: LogicalFrame) -> Option<LogicalFrame> {
        if let Some(index) = logical.inline_frame {
            let code_block = self.frames[logical.frame.0].code_block.as_ref()?;
            let inline = code_block.inline_frame(index)?;
            return Some(LogicalFrame {
                frame: logical.frame,
                inline_frame: inline.caller.inline_frame,
                bytecode_index: inline.caller.bytecode_index,
            });
        }
        let caller = self.physical_caller(logical.frame)?;
        Some(self.innermost_logical_frame(caller))
    }

    /// Machine frame of the physical caller. Inlined callees of the current
    /// frame are skipped along with it.
    pub fn next_machine_frame(&self, logical: LogicalFrame) -> Option<LogicalFrame> {
        let caller = self.physical_caller(logical.frame)?;
        Some(self.machine_frame(self.innermost_logical_frame(caller)))
    }

    /// Physical caller, skipping the entry sentinel if there is one.
    pub fn physical_caller(&self, frame: FrameId) -> Option<FrameId> {
        match self.frames[frame.0].caller {
            CallerLink::Frame(caller) => Some(caller),
            CallerLink::Entry(entry) => self.entries.get(entry.0)?.caller_top,
        }
    }

    /// Code block of the logical position; inlined callees report their own.
    pub fn logical_code_block(&self, logical: LogicalFrame) -> Option<Arc<CodeBlock>> {
        let machine = self.frames[logical.frame.0].code_block.as_ref()?;
        match logical.inline_frame {
            Some(index) => machine.inline_frame(index).map(|f| f.code_block.clone()),
            None => Some(machine.clone()),
        }
    }

    /// Innermost-first list of logical frames starting at `start`.
    pub fn logical_frames(&self, start: FrameId) -> Vec<LogicalFrame> {
        let mut out = Vec::new();
        let mut cursor = Some(self.innermost_logical_frame(start));
        while let Some(logical) = cursor {
            out.push(logical);
            cursor = self.next_logical_frame(logical);
        }
        out
    }
}
