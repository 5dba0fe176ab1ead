//! Compiled-unit metadata consumed by the dispatcher, unwinder and trace
//! builder. Code blocks are produced by the compiler tiers and are
//! immutable once built, so handler tables can be read from any thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::compiler::{DerivedContextType, EvalContextType, SourceTaintedOrigin};
use crate::eval::cache::DirectEvalCodeCache;
use crate::executable::CompiledCode;
use crate::unwind::registers::RegisterAtOffsetList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JitType {
    #[default]
    Interpreter,
    Baseline,
    /// Handler lookups use the call-site index instead of the bytecode index.
    Optimizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeType {
    #[default]
    Global,
    Eval,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImplementationVisibility {
    #[default]
    Public,
    /// Hidden from stack traces.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParseMode {
    #[default]
    Program,
    Eval,
    NormalFunction,
    ArrowFunction,
    Method,
    ClassFieldInitializer,
}

impl ParseMode {
    pub fn is_function(&self) -> bool {
        matches!(
            self,
            ParseMode::NormalFunction
                | ParseMode::ArrowFunction
                | ParseMode::Method
                | ParseMode::ClassFieldInitializer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Catch,
    Finally,
    ForeignBoundaryCatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredHandler {
    /// Only `Catch` entries; used for diagnostics.
    CatchHandler,
    AnyHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerInfo {
    /// Guarded range `[start, end)`.
    pub start: u32,
    pub end: u32,
    pub target: u32,
    pub kind: HandlerKind,
}

impl HandlerInfo {
    pub fn new(start: u32, end: u32, target: u32, kind: HandlerKind) -> Self {
        Self {
            start,
            end,
            target,
            kind,
        }
    }

    #[inline]
    pub fn covers(&self, index: u32) -> bool {
        self.start <= index && index < self.end
    }

    #[inline]
    pub fn is_catch_handler(&self) -> bool {
        self.kind == HandlerKind::Catch
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerTable {
    handlers: Vec<HandlerInfo>,
}

impl HandlerTable {
    pub fn new(handlers: Vec<HandlerInfo>) -> Self {
        Self { handlers }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Innermost enclosing handler for `index`. Among ranges covering the
    /// index the narrowest wins; equal widths resolve to table order.
    pub fn handler_for_index(&self, index: u32, required: RequiredHandler) -> Option<&HandlerInfo> {
        self.handlers
            .iter()
            .filter(|h| h.covers(index))
            .filter(|h| required == RequiredHandler::AnyHandler || h.is_catch_handler())
            .min_by_key(|h| h.end - h.start)
    }
}

/// Position inside an optimizing code block, possibly inside an inlined
/// callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeOrigin {
    pub bytecode_index: u32,
    /// Index into `CodeBlock::inline_frames`; `None` for the machine frame's
    /// own code.
    pub inline_frame: Option<u32>,
}

/// A callee inlined into an optimizing code block. It has no physical
/// frame of its own.
#[derive(Debug, Clone)]
pub struct InlineCallFrame {
    pub code_block: Arc<CodeBlock>,
    pub callee_name: String,
    /// Call site in the enclosing logical frame.
    pub caller: CodeOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePosition {
    pub bytecode_index: u32,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub url: String,
    /// Sorted by bytecode index.
    pub lines: Vec<LinePosition>,
    pub tainted: SourceTaintedOrigin,
}

impl SourceInfo {
    pub fn position_for(&self, bytecode_index: u32) -> (u32, u32) {
        let idx = self
            .lines
            .partition_point(|p| p.bytecode_index <= bytecode_index);
        match idx.checked_sub(1).and_then(|i| self.lines.get(i)) {
            Some(p) => (p.line, p.column),
            None => (1, 1),
        }
    }
}

/// Flags of the unlinked code that eval consults at its call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlinkedInfo {
    pub strict: bool,
    pub is_arrow_function: bool,
    pub is_arrow_function_context: bool,
    pub is_class_context: bool,
    pub is_constructor: bool,
    pub is_builtin: bool,
    pub parse_mode: ParseMode,
    pub derived_context_type: DerivedContextType,
    pub eval_context_type: EvalContextType,
    pub needs_class_field_initializer: bool,
    pub private_brand_requirement: bool,
}

pub struct CodeBlock {
    pub name: String,
    pub jit_type: JitType,
    pub code_type: CodeType,
    pub handlers: HandlerTable,
    pub num_locals: u32,
    /// Indexed by call-site index; only populated for optimizing code.
    pub code_origins: Vec<CodeOrigin>,
    pub inline_frames: Vec<InlineCallFrame>,
    pub source: SourceInfo,
    pub visibility: ImplementationVisibility,
    pub unlinked: UnlinkedInfo,
    /// Callee-saved registers this code spills into its frame.
    pub callee_saves: RegisterAtOffsetList,
    pub code: Arc<dyn CompiledCode>,
    eval_cache: DirectEvalCodeCache,
    jettisoned: AtomicBool,
}

impl CodeBlock {
    pub fn new(name: impl Into<String>, code: Arc<dyn CompiledCode>) -> Self {
        Self {
            name: name.into(),
            jit_type: JitType::Interpreter,
            code_type: CodeType::Function,
            handlers: HandlerTable::default(),
            num_locals: 0,
            code_origins: Vec::new(),
            inline_frames: Vec::new(),
            source: SourceInfo::default(),
            visibility: ImplementationVisibility::Public,
            unlinked: UnlinkedInfo::default(),
            callee_saves: RegisterAtOffsetList::default(),
            code,
            eval_cache: DirectEvalCodeCache::default(),
            jettisoned: AtomicBool::new(false),
        }
    }

    pub fn with_jit_type(mut self, jit_type: JitType) -> Self {
        self.jit_type = jit_type;
        self
    }

    pub fn with_code_type(mut self, code_type: CodeType) -> Self {
        self.code_type = code_type;
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<HandlerInfo>) -> Self {
        self.handlers = HandlerTable::new(handlers);
        self
    }

    pub fn with_locals(mut self, num_locals: u32) -> Self {
        self.num_locals = num_locals;
        self
    }

    pub fn with_inlining(mut self, code_origins: Vec<CodeOrigin>, inline_frames: Vec<InlineCallFrame>) -> Self {
        self.code_origins = code_origins;
        self.inline_frames = inline_frames;
        self
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = source;
        self
    }

    pub fn with_visibility(mut self, visibility: ImplementationVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_unlinked(mut self, unlinked: UnlinkedInfo) -> Self {
        self.unlinked = unlinked;
        self
    }

    pub fn with_callee_saves(mut self, callee_saves: RegisterAtOffsetList) -> Self {
        self.callee_saves = callee_saves;
        self
    }

    #[inline]
    pub fn is_optimizing(&self) -> bool {
        self.jit_type == JitType::Optimizing
    }

    pub fn is_strict(&self) -> bool {
        self.unlinked.strict
    }

    pub fn code_origin(&self, call_site_index: u32) -> Option<CodeOrigin> {
        self.code_origins.get(call_site_index as usize).copied()
    }

    pub fn inline_frame(&self, index: u32) -> Option<&InlineCallFrame> {
        self.inline_frames.get(index as usize)
    }

    pub fn eval_cache(&self) -> &DirectEvalCodeCache {
        &self.eval_cache
    }

    /// Invalidates this compilation; the owning executable recompiles on
    /// the next `prepare_for_execution`.
    pub fn jettison(&self) {
        self.jettisoned.store(true, Ordering::Release);
    }

    pub fn is_jettisoned(&self) -> bool {
        self.jettisoned.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeBlock")
            .field("name", &self.name)
            .field("jit_type", &self.jit_type)
            .field("code_type", &self.code_type)
            .field("handlers", &self.handlers.len())
            .field("num_locals", &self.num_locals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HandlerTable {
        HandlerTable::new(vec![
            HandlerInfo::new(0, 100, 900, HandlerKind::Finally),
            HandlerInfo::new(10, 50, 500, HandlerKind::Catch),
            HandlerInfo::new(20, 30, 300, HandlerKind::Finally),
        ])
    }

    #[test]
    fn innermost_enclosing_range_wins() {
        let t = table();
        assert_eq!(t.handler_for_index(25, RequiredHandler::AnyHandler).map(|h| h.target), Some(300));
        assert_eq!(t.handler_for_index(15, RequiredHandler::AnyHandler).map(|h| h.target), Some(500));
        assert_eq!(t.handler_for_index(60, RequiredHandler::AnyHandler).map(|h| h.target), Some(900));
        assert!(t.handler_for_index(100, RequiredHandler::AnyHandler).is_none());
    }

    #[test]
    fn catch_only_requests_skip_finally() {
        let t = table();
        let h = t.handler_for_index(25, RequiredHandler::CatchHandler).unwrap();
        assert_eq!(h.target, 500);
        assert!(t.handler_for_index(60, RequiredHandler::CatchHandler).is_none());
    }

    #[test]
    fn line_table_picks_preceding_entry() {
        let info = SourceInfo {
            url: "a.js".into(),
            lines: vec![
                LinePosition { bytecode_index: 0, line: 1, column: 1 },
                LinePosition { bytecode_index: 8, line: 3, column: 5 },
            ],
            tainted: SourceTaintedOrigin::Untainted,
        };
        assert_eq!(info.position_for(7), (1, 1));
        assert_eq!(info.position_for(8), (3, 5));
        assert_eq!(info.position_for(99), (3, 5));
    }
}
