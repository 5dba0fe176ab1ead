use std::collections::HashSet;

use crate::object::Object;
use crate::scope::Scope;
use crate::string::HeapString;
use crate::value::{TAG_BIGINT, TAG_OBJECT, TAG_STRING, TAG_SYMBOL};
use crate::Value;

#[derive(Debug, Clone)]
pub struct Arena<T> {
    pub data: Vec<Option<T>>,
    pub free_indices: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    pub fn alloc(&mut self, value: T) -> u32 {
        if let Some(idx) = self.free_indices.pop() {
            self.data[idx as usize] = Some(value);
            idx
        } else {
            let index = self.data.len() as u32;
            self.data.push(Some(value));
            index
        }
    }

    #[inline]
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.data.get(idx as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.data.get_mut(idx as usize).and_then(Option::as_mut)
    }

    pub fn is_free(&self, idx: u32) -> bool {
        matches!(self.data.get(idx as usize), Some(None))
    }

    pub fn live(&self) -> usize {
        self.data.iter().filter(|slot| slot.is_some()).count()
    }

    fn sweep_unmarked(&mut self, marked: &HashSet<u32>) -> usize {
        let mut freed = 0;
        for (i, slot) in self.data.iter_mut().enumerate() {
            let idx = i as u32;
            if slot.is_some() && !marked.contains(&idx) {
                *slot = None;
                self.free_indices.push(idx);
                freed += 1;
            }
        }
        freed
    }
}

pub struct Heap {
    // Typed Arenas
    pub strings: Arena<HeapString>,
    pub symbols: Arena<String>,
    pub bigints: Arena<String>,
    pub objects: Arena<Object>,
    pub scopes: Arena<Scope>,

    // Mark State (One set per arena type)
    pub marked_strings: HashSet<u32>,
    pub marked_symbols: HashSet<u32>,
    pub marked_bigints: HashSet<u32>,
    pub marked_objects: HashSet<u32>,
    pub marked_scopes: HashSet<u32>,

    // GC Metrics
    pub bytes_allocated: usize,
    pub next_gc_threshold: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            strings: Arena::new(),
            symbols: Arena::new(),
            bigints: Arena::new(),
            objects: Arena::new(),
            scopes: Arena::new(),

            marked_strings: HashSet::new(),
            marked_symbols: HashSet::new(),
            marked_bigints: HashSet::new(),
            marked_objects: HashSet::new(),
            marked_scopes: HashSet::new(),

            bytes_allocated: 0,
            next_gc_threshold: 1024 * 1024, // Start at 1MB
        }
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc_threshold
    }

    // --- Allocation ---

    pub fn alloc_string(&mut self, s: String) -> u32 {
        let cell = HeapString::Flat(s);
        self.bytes_allocated += cell.footprint();
        self.strings.alloc(cell)
    }

    /// Lazily concatenated string `lhs + rhs`.
    pub fn alloc_rope(&mut self, lhs: u32, rhs: u32) -> u32 {
        let cell = HeapString::Rope { lhs, rhs };
        self.bytes_allocated += cell.footprint();
        self.strings.alloc(cell)
    }

    pub fn alloc_symbol(&mut self, description: String) -> u32 {
        self.bytes_allocated += description.capacity();
        self.symbols.alloc(description)
    }

    pub fn alloc_bigint(&mut self, digits: String) -> u32 {
        self.bytes_allocated += digits.capacity();
        self.bigints.alloc(digits)
    }

    pub fn alloc_object(&mut self, object: Object) -> u32 {
        self.bytes_allocated += std::mem::size_of::<Object>()
            + object.elements.capacity() * std::mem::size_of::<Value>();
        self.objects.alloc(object)
    }

    pub fn alloc_scope(&mut self, scope: Scope) -> u32 {
        self.bytes_allocated += std::mem::size_of::<Scope>();
        self.scopes.alloc(scope)
    }

    // --- Access ---

    pub fn get_string_cell(&self, handle: u32) -> Option<&HeapString> {
        self.strings.get(handle)
    }

    /// Contents of a flat string; `None` for ropes that are not resolved yet.
    pub fn get_flat_string(&self, handle: u32) -> Option<&str> {
        self.strings.get(handle).and_then(HeapString::as_flat)
    }

    pub fn is_rope(&self, handle: u32) -> bool {
        self.strings.get(handle).is_some_and(HeapString::is_rope)
    }

    /// For a rope whose right fiber is exactly `suffix` and whose left fiber
    /// is already flat, the left fiber's text. No resolution happens.
    pub fn rope_lhs_before_suffix(&self, handle: u32, suffix: &str) -> Option<&str> {
        let HeapString::Rope { lhs, rhs } = self.strings.get(handle)? else {
            return None;
        };
        if self.get_flat_string(*rhs)? != suffix {
            return None;
        }
        self.get_flat_string(*lhs)
    }

    /// Flattens a rope in place and returns the contents.
    pub fn resolve_string(&mut self, handle: u32) -> Option<String> {
        match self.strings.get(handle)? {
            HeapString::Flat(s) => return Some(s.clone()),
            HeapString::Rope { .. } => {}
        }

        let mut out = String::new();
        let mut pending = vec![handle];
        while let Some(h) = pending.pop() {
            match self.strings.get(h)? {
                HeapString::Flat(s) => out.push_str(s),
                HeapString::Rope { lhs, rhs } => {
                    pending.push(*rhs);
                    pending.push(*lhs);
                }
            }
        }

        if let Some(cell) = self.strings.get_mut(handle) {
            *cell = HeapString::Flat(out.clone());
        }
        Some(out)
    }

    pub fn get_symbol(&self, handle: u32) -> Option<&str> {
        self.symbols.get(handle).map(String::as_str)
    }

    pub fn get_bigint(&self, handle: u32) -> Option<&str> {
        self.bigints.get(handle).map(String::as_str)
    }

    pub fn get_object(&self, handle: u32) -> Option<&Object> {
        self.objects.get(handle)
    }

    pub fn get_object_mut(&mut self, handle: u32) -> Option<&mut Object> {
        self.objects.get_mut(handle)
    }

    pub fn get_scope(&self, handle: u32) -> Option<&Scope> {
        self.scopes.get(handle)
    }

    pub fn get_scope_mut(&mut self, handle: u32) -> Option<&mut Scope> {
        self.scopes.get_mut(handle)
    }

    pub fn is_string_free(&self, handle: u32) -> bool {
        self.strings.is_free(handle)
    }

    pub fn is_object_free(&self, handle: u32) -> bool {
        self.objects.is_free(handle)
    }

    pub fn is_scope_free(&self, handle: u32) -> bool {
        self.scopes.is_free(handle)
    }

    // --- Tracing (Mark Phase) ---

    pub fn trace(&mut self, roots: Vec<Value>, scope_roots: Vec<u32>) {
        let mut worklist = roots;
        let mut scope_worklist = scope_roots;

        loop {
            if let Some(val) = worklist.pop() {
                self.mark_value(val, &mut worklist, &mut scope_worklist);
                continue;
            }
            if let Some(handle) = scope_worklist.pop() {
                if !self.marked_scopes.insert(handle) {
                    continue;
                }
                if let Some(scope) = self.scopes.get(handle) {
                    worklist.extend(scope.values());
                    scope_worklist.extend(scope.next);
                }
                continue;
            }
            break;
        }
    }

    fn mark_value(&mut self, val: Value, worklist: &mut Vec<Value>, scopes: &mut Vec<u32>) {
        let Some(handle) = val.as_handle() else {
            return;
        };
        match val.tag() {
            TAG_STRING => {
                if self.marked_strings.insert(handle) {
                    if let Some(HeapString::Rope { lhs, rhs }) = self.strings.get(handle) {
                        worklist.push(Value::string(*lhs));
                        worklist.push(Value::string(*rhs));
                    }
                }
            }
            TAG_SYMBOL => {
                self.marked_symbols.insert(handle);
            }
            TAG_BIGINT => {
                self.marked_bigints.insert(handle);
            }
            TAG_OBJECT => {
                if self.marked_objects.insert(handle) {
                    if let Some(obj) = self.objects.get(handle) {
                        worklist.extend(obj.children());
                        scopes.extend(obj.scope_child());
                    }
                }
            }
            _ => {}
        }
    }

    /// Frees every unmarked cell and clears the mark sets. Returns the
    /// number of freed cells.
    pub fn sweep(&mut self) -> usize {
        let freed = self.strings.sweep_unmarked(&self.marked_strings)
            + self.symbols.sweep_unmarked(&self.marked_symbols)
            + self.bigints.sweep_unmarked(&self.marked_bigints)
            + self.objects.sweep_unmarked(&self.marked_objects)
            + self.scopes.sweep_unmarked(&self.marked_scopes);

        self.marked_strings.clear();
        self.marked_symbols.clear();
        self.marked_bigints.clear();
        self.marked_objects.clear();
        self.marked_scopes.clear();

        self.bytes_allocated = self.bytes_allocated.saturating_sub(freed * 16);
        self.next_gc_threshold = (self.bytes_allocated * 2).max(1024 * 1024);
        freed
    }
}
