use std::sync::Arc;

use crate::exception::Completion;
use crate::machine::{FrameId, VM};

/// Host function body. Arguments and `this` are read from the frame's
/// registers through `StackOps`; construct bodies find `new.target` in the
/// `this` register.
pub type NativeFn = Arc<dyn Fn(&mut VM, FrameId) -> Completion + Send + Sync>;

pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&mut VM, FrameId) -> Completion + Send + Sync + 'static,
{
    Arc::new(f)
}
