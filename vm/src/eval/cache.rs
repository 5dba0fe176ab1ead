//! Per-code-block cache of direct eval compilations.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::executable::EvalExecutable;

pub const MAX_CACHEABLE_SOURCE_LENGTH: usize = 256;
pub const MAX_CACHE_ENTRIES: usize = 64;

/// Suffix that was split off a rope source when building the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RopeSuffix {
    None,
    /// The source was `<key>()`.
    FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: Arc<str>,
    bytecode_index: u32,
    suffix: RopeSuffix,
}

impl CacheKey {
    pub fn new(source: impl Into<Arc<str>>, bytecode_index: u32, suffix: RopeSuffix) -> Self {
        Self {
            source: source.into(),
            bytecode_index,
            suffix,
        }
    }

    /// Length of the full source text the key stands for.
    pub fn source_len(&self) -> usize {
        match self.suffix {
            RopeSuffix::None => self.source.len(),
            RopeSuffix::FunctionCall => self.source.len() + 2,
        }
    }

    /// Full source text the key stands for.
    pub fn source(&self) -> String {
        match self.suffix {
            RopeSuffix::None => self.source.to_string(),
            RopeSuffix::FunctionCall => format!("{}()", self.source),
        }
    }
}

#[derive(Default)]
pub struct DirectEvalCodeCache {
    entries: Mutex<IndexMap<CacheKey, Arc<EvalExecutable>>>,
}

impl DirectEvalCodeCache {
    pub fn get(&self, key: &CacheKey) -> Option<Arc<EvalExecutable>> {
        self.entries.lock().get(key).cloned()
    }

    /// Stores `executable` unless the source is too long or the cache is
    /// full.
    pub fn set(&self, key: CacheKey, executable: Arc<EvalExecutable>) {
        if key.source_len() >= MAX_CACHEABLE_SOURCE_LENGTH {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_CACHE_ENTRIES {
            return;
        }
        entries.insert(key, executable);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SourceTaintedOrigin;
    use crate::error::CompileError;
    use crate::executable::{CompiledUnit, Specialization};
    use crate::code_block::CodeBlock;

    fn executable() -> Arc<EvalExecutable> {
        let generator = Arc::new(|_: Specialization| -> Result<CodeBlock, CompileError> {
            Err(CompileError::syntax("unused"))
        });
        Arc::new(EvalExecutable {
            unit: CompiledUnit::new(generator),
            variables: Vec::new(),
            function_decls: Vec::new(),
            function_hoisting_candidates: Vec::new(),
            strict: false,
            tainted: SourceTaintedOrigin::Untainted,
        })
    }

    #[test]
    fn keys_distinguish_call_site_and_suffix() {
        let cache = DirectEvalCodeCache::default();
        cache.set(CacheKey::new("f", 3, RopeSuffix::FunctionCall), executable());
        assert!(cache.get(&CacheKey::new("f", 3, RopeSuffix::FunctionCall)).is_some());
        assert!(cache.get(&CacheKey::new("f", 4, RopeSuffix::FunctionCall)).is_none());
        assert!(cache.get(&CacheKey::new("f", 3, RopeSuffix::None)).is_none());
        assert_eq!(CacheKey::new("f", 3, RopeSuffix::FunctionCall).source(), "f()");
    }

    #[test]
    fn long_sources_are_not_cached() {
        let cache = DirectEvalCodeCache::default();
        let long = "x".repeat(MAX_CACHEABLE_SOURCE_LENGTH);
        cache.set(CacheKey::new(long, 0, RopeSuffix::None), executable());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = DirectEvalCodeCache::default();
        for i in 0..MAX_CACHE_ENTRIES + 5 {
            cache.set(CacheKey::new(format!("v{i}"), 0, RopeSuffix::None), executable());
        }
        assert_eq!(cache.len(), MAX_CACHE_ENTRIES);
    }
}
