/// String cell payload. Concatenation produces a rope that is resolved to
/// a flat string on first content access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapString {
    Flat(String),
    Rope { lhs: u32, rhs: u32 },
}

impl HeapString {
    #[inline]
    pub fn is_rope(&self) -> bool {
        matches!(self, HeapString::Rope { .. })
    }

    #[inline]
    pub fn as_flat(&self) -> Option<&str> {
        match self {
            HeapString::Flat(s) => Some(s),
            HeapString::Rope { .. } => None,
        }
    }

    pub(crate) fn footprint(&self) -> usize {
        match self {
            HeapString::Flat(s) => s.capacity(),
            HeapString::Rope { .. } => 2 * std::mem::size_of::<u32>(),
        }
    }
}
