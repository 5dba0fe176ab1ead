pub mod heap;
pub mod object;
pub mod scope;
pub mod string;
pub mod value;

#[cfg(test)]
mod value_tests;

pub use heap::{Arena, Heap};
pub use object::{
    ArgumentsFlavor, Attributes, ErrorData, ErrorType, Object, ObjectKind, Property,
    PropertyValue,
};
pub use scope::{Binding, BindingKind, Scope, ScopeKind};
pub use string::HeapString;
pub use value::Value;
