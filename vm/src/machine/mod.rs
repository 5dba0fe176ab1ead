//! Machine module - VM implementation
//!
//! This module contains the Virtual Machine state and the call machinery
//! segmented into focused submodules: frame layout, register access, frame
//! entry, call/construct dispatch, function objects, property access and
//! garbage collection.

mod control;
mod dispatch;
mod frame;
mod gc;
mod native;
mod property;
mod stack;
mod vm;

// Public API
pub use control::{Body, FramePlan};
pub use frame::{
    CallFrame, CallStack, Callee, CallerLink, EntryFrame, EntryId, FrameId, FrameSlot, ProtoCallFrame,
    CALL_FRAME_HEADER_SIZE,
};
pub use gc::{AssertNoGc, DeferGc, GarbageCollector, GcGuards};
pub use stack::StackOps;
pub use vm::{CheckpointSideState, Instrumentation, VM};
