use memory::Value;

use super::frame::FrameId;

/// Trait for stack operations (registers)
pub trait StackOps {
    fn get_reg(&self, base: usize, reg: usize) -> Value;
    fn set_reg(&mut self, base: usize, reg: usize, val: Value);

    fn this_value(&self, frame: FrameId) -> Value;
    fn argument_count(&self, frame: FrameId) -> usize;
    /// Argument `index`, undefined past the supplied count.
    fn argument(&self, frame: FrameId, index: usize) -> Value;
    fn arguments(&self, frame: FrameId) -> Vec<Value>;

    /// Local register `index`, counted from the end of the arguments.
    fn local(&self, frame: FrameId, index: usize) -> Value;
    fn set_local(&mut self, frame: FrameId, index: usize, val: Value);

    /// Records the bytecode or call-site index the frame is executing.
    fn set_location(&mut self, frame: FrameId, location: u32);
}

impl StackOps for super::vm::VM {
    #[inline(always)]
    fn get_reg(&self, base: usize, reg: usize) -> Value {
        self.stack.get(base + reg)
    }

    #[inline(always)]
    fn set_reg(&mut self, base: usize, reg: usize, val: Value) {
        self.stack.set(base + reg, val);
    }

    #[inline]
    fn this_value(&self, frame: FrameId) -> Value {
        self.get_reg(self.frames[frame.0].base, 0)
    }

    #[inline]
    fn argument_count(&self, frame: FrameId) -> usize {
        self.frames[frame.0].argument_count()
    }

    fn argument(&self, frame: FrameId, index: usize) -> Value {
        let f = &self.frames[frame.0];
        if index >= f.argument_count() {
            return Value::undefined();
        }
        self.get_reg(f.base, 1 + index)
    }

    fn arguments(&self, frame: FrameId) -> Vec<Value> {
        let f = &self.frames[frame.0];
        self.stack.slice(f.base + 1, f.argument_count()).to_vec()
    }

    fn local(&self, frame: FrameId, index: usize) -> Value {
        let f = &self.frames[frame.0];
        debug_assert!(f.argument_count_including_this as usize + index < f.register_count);
        self.get_reg(f.base, f.argument_count_including_this as usize + index)
    }

    fn set_local(&mut self, frame: FrameId, index: usize, val: Value) {
        let (base, offset) = {
            let f = &self.frames[frame.0];
            debug_assert!(f.argument_count_including_this as usize + index < f.register_count);
            (f.base, f.argument_count_including_this as usize + index)
        };
        self.set_reg(base, offset, val);
    }

    #[inline]
    fn set_location(&mut self, frame: FrameId, location: u32) {
        self.frames[frame.0].location = location;
    }
}
