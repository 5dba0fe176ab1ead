//! Frames owned by a foreign runtime (a WebAssembly-like tier) that carry
//! their own handler tables keyed by exception tags.

use std::fmt;
use std::sync::Arc;

use crate::executable::CompiledCode;

/// Identity of a foreign exception tag. Allocated by the `Runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationMode {
    /// Resumes at a bytecode target.
    Interpreter,
    /// Resumes at a target plus metadata cursor and try depth.
    InPlaceInterpreter,
    /// Resumes through a catch thunk into native code.
    Optimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignHandlerInfo {
    pub start: u32,
    pub end: u32,
    pub target: u32,
    pub target_metadata: u32,
    pub try_depth: u32,
    /// `None` catches every tag.
    pub tag: Option<TagId>,
}

impl ForeignHandlerInfo {
    pub fn catch_all(start: u32, end: u32, target: u32) -> Self {
        Self {
            start,
            end,
            target,
            target_metadata: 0,
            try_depth: 0,
            tag: None,
        }
    }

    pub fn catching(tag: TagId, start: u32, end: u32, target: u32) -> Self {
        Self {
            tag: Some(tag),
            ..Self::catch_all(start, end, target)
        }
    }

    fn matches(&self, index: u32, tag: TagId) -> bool {
        self.start <= index && index < self.end && self.tag.map_or(true, |t| t == tag)
    }
}

pub struct ForeignCallee {
    pub name: Option<String>,
    pub function_index: u32,
    pub mode: CompilationMode,
    /// Ordered innermost first, as emitted by the foreign compiler.
    pub handlers: Vec<ForeignHandlerInfo>,
    pub code: Arc<dyn CompiledCode>,
}

impl ForeignCallee {
    pub fn new(function_index: u32, mode: CompilationMode, code: Arc<dyn CompiledCode>) -> Self {
        Self {
            name: None,
            function_index,
            mode,
            handlers: Vec::new(),
            code,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<ForeignHandlerInfo>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn has_exception_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    pub fn handler_for_index(&self, index: u32, tag: TagId) -> Option<&ForeignHandlerInfo> {
        self.handlers.iter().find(|h| h.matches(index, tag))
    }

    pub fn index_or_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("wasm-function[{}]", self.function_index),
        }
    }
}

impl fmt::Debug for ForeignCallee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignCallee")
            .field("name", &self.index_or_name())
            .field("mode", &self.mode)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
