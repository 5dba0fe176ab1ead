use std::fmt;

// --- Tagged u64 Constants ---
// Bits 63..60 = tag  (4 bits, 16 possible types)
// Bits 59..0  = payload (60 bits)

const TAG_SHIFT: u32 = 60;
const PAYLOAD_MASK: u64 = (1u64 << 60) - 1; // 0x0FFF_FFFF_FFFF_FFFF

// Immediates first, heap cells from TAG_STRING upward.
pub const TAG_INT: u64 = 0; // i60 inline
pub const TAG_UNDEFINED: u64 = 1;
pub const TAG_NULL: u64 = 2;
pub const TAG_FALSE: u64 = 3;
pub const TAG_TRUE: u64 = 4;
pub const TAG_EMPTY: u64 = 5; // hole / uninitialized slot, never a script value
pub const TAG_STRING: u64 = 6;
pub const TAG_SYMBOL: u64 = 7;
pub const TAG_BIGINT: u64 = 8;
pub const TAG_OBJECT: u64 = 9;
// 10-15 reserved

// i60 range constants
pub const I60_MIN: i64 = -(1i64 << 59);
pub const I60_MAX: i64 = (1i64 << 59) - 1;

// Compile-time guards
const _: () = assert!(TAG_OBJECT < 16, "tag must fit in 4 bits");
const _: () = assert!(TAG_EMPTY < TAG_STRING, "immediates must precede cells");
const _: () = assert!(TAG_STRING < TAG_SYMBOL && TAG_SYMBOL < TAG_BIGINT && TAG_BIGINT < TAG_OBJECT);

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub u64);

impl Value {
    // --- Constructors ---

    #[inline]
    pub fn int(val: i64) -> Self {
        Value((TAG_INT << TAG_SHIFT) | ((val as u64) & PAYLOAD_MASK))
    }

    #[inline]
    pub fn undefined() -> Self {
        Value(TAG_UNDEFINED << TAG_SHIFT)
    }

    #[inline]
    pub fn null() -> Self {
        Value(TAG_NULL << TAG_SHIFT)
    }

    #[inline]
    pub fn empty() -> Self {
        Value(TAG_EMPTY << TAG_SHIFT)
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        if b {
            Value(TAG_TRUE << TAG_SHIFT)
        } else {
            Value(TAG_FALSE << TAG_SHIFT)
        }
    }

    #[inline]
    pub fn string(handle: u32) -> Self {
        Value::make_cell(TAG_STRING, handle)
    }

    #[inline]
    pub fn symbol(handle: u32) -> Self {
        Value::make_cell(TAG_SYMBOL, handle)
    }

    #[inline]
    pub fn bigint(handle: u32) -> Self {
        Value::make_cell(TAG_BIGINT, handle)
    }

    #[inline]
    pub fn object(handle: u32) -> Self {
        Value::make_cell(TAG_OBJECT, handle)
    }

    #[inline]
    fn make_cell(tag: u64, handle: u32) -> Self {
        Value((tag << TAG_SHIFT) | (handle as u64))
    }

    // --- Checkers ---

    #[inline]
    pub fn tag(&self) -> u64 {
        (self.0 >> TAG_SHIFT) & 0xF
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        self.tag() == TAG_INT
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.tag() == TAG_UNDEFINED
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.tag() == TAG_NULL
    }

    #[inline]
    pub fn is_undefined_or_null(&self) -> bool {
        self.is_undefined() || self.is_null()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tag() == TAG_EMPTY
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        let t = self.tag();
        t == TAG_FALSE || t == TAG_TRUE
    }

    /// True for every value that lives in a heap arena.
    #[inline]
    pub fn is_cell(&self) -> bool {
        self.tag() >= TAG_STRING
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        self.tag() == TAG_STRING
    }

    #[inline]
    pub fn is_symbol(&self) -> bool {
        self.tag() == TAG_SYMBOL
    }

    #[inline]
    pub fn is_bigint(&self) -> bool {
        self.tag() == TAG_BIGINT
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        self.tag() == TAG_OBJECT
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    // --- Accessors ---

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        if self.tag() != TAG_INT {
            return None;
        }
        let raw = self.0 & PAYLOAD_MASK;
        // Sign-extend from bit 59
        let extended = if raw & (1u64 << 59) != 0 {
            raw | !PAYLOAD_MASK
        } else {
            raw
        };
        Some(extended as i64)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self.tag() {
            TAG_TRUE => Some(true),
            TAG_FALSE => Some(false),
            _ => None,
        }
    }

    #[inline]
    pub fn as_handle(&self) -> Option<u32> {
        if self.is_cell() {
            Some((self.0 & 0xFFFF_FFFF) as u32)
        } else {
            None
        }
    }

    /// Handle of an object cell, `None` for every other tag.
    #[inline]
    pub fn as_object(&self) -> Option<u32> {
        if self.is_object() {
            self.as_handle()
        } else {
            None
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            TAG_INT => write!(f, "Int({})", self.as_int().unwrap_or_default()),
            TAG_UNDEFINED => write!(f, "Undefined"),
            TAG_NULL => write!(f, "Null"),
            TAG_FALSE => write!(f, "Bool(false)"),
            TAG_TRUE => write!(f, "Bool(true)"),
            TAG_EMPTY => write!(f, "Empty"),
            TAG_STRING => write!(f, "String({})", self.0 as u32),
            TAG_SYMBOL => write!(f, "Symbol({})", self.0 as u32),
            TAG_BIGINT => write!(f, "BigInt({})", self.0 as u32),
            TAG_OBJECT => write!(f, "Object({})", self.0 as u32),
            _ => write!(f, "Unknown(Bits: {:x})", self.0),
        }
    }
}
