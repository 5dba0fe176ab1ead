//! Varargs materialization: turns an array-like value into a flat run of
//! argument registers for a callee frame.

use memory::{ObjectKind, Value};

use crate::exception::Completion;
use crate::machine::{CallStack, FrameId, FrameSlot, StackOps, VM};

pub const INVALID_APPLY_PARAMETER_MESSAGE: &str =
    "second argument to Function.prototype.apply must be an Array-like object";

/// Shapes with a cheap, exact length and a bulk copy primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayLikeShape {
    Arguments,
    ImmutableList,
    Array,
    Generic,
}

impl VM {
    fn array_like_shape(&self, handle: u32) -> ArrayLikeShape {
        match self.heap.get_object(handle).map(|o| &o.kind) {
            Some(ObjectKind::Arguments(_)) => ArrayLikeShape::Arguments,
            Some(ObjectKind::ImmutableList) => ArrayLikeShape::ImmutableList,
            Some(ObjectKind::Array) => ArrayLikeShape::Array,
            _ => ArrayLikeShape::Generic,
        }
    }

    /// Number of arguments `arguments` supplies past `first_var_arg_offset`.
    pub fn size_of_varargs(&mut self, arguments: Value, first_var_arg_offset: u32) -> Completion<u32> {
        let Some(handle) = arguments.as_object() else {
            if arguments.is_undefined_or_null() {
                return Ok(0);
            }
            // Strings, symbols and big integers are not array-like here.
            return Err(self.throw_type_error(INVALID_APPLY_PARAMETER_MESSAGE));
        };

        let length = match self.array_like_shape(handle) {
            ArrayLikeShape::Arguments => self
                .heap
                .get_object(handle)
                .map_or(0, |o| o.arguments_length()),
            ArrayLikeShape::ImmutableList | ArrayLikeShape::Array => {
                self.heap.get_object(handle).map_or(0, |o| o.elements.len())
            }
            ArrayLikeShape::Generic => {
                let length = self.get(arguments, "length")?;
                self.to_length(length)? as usize
            }
        };
        let length = u32::try_from(length).unwrap_or(u32::MAX);

        if length > self.options.max_arguments {
            return Err(self.throw_stack_overflow());
        }
        Ok(length.saturating_sub(first_var_arg_offset))
    }

    fn callee_frame_for_varargs(&self, caller: FrameId, used_stack_slots: usize, argument_count_including_this: u32) -> FrameSlot {
        CallStack::callee_frame_for(self.frames[caller.0].base, used_stack_slots, argument_count_including_this)
    }

    /// Sizes and reserves the callee frame of a varargs call.
    pub fn size_frame_for_varargs(
        &mut self,
        caller: FrameId,
        arguments: Value,
        used_stack_slots: usize,
        first_var_arg_offset: u32,
    ) -> Completion<u32> {
        let length = self.size_of_varargs(arguments, first_var_arg_offset)?;
        let slot = self.callee_frame_for_varargs(caller, used_stack_slots, length + 1);
        if length > self.options.max_arguments || !self.stack.ensure_capacity_for(&slot, 0) {
            return Err(self.throw_stack_overflow());
        }
        Ok(length)
    }

    /// Sizes and reserves a callee frame that forwards the caller's own
    /// arguments.
    pub fn size_frame_for_forward_arguments(&mut self, caller: FrameId, used_stack_slots: usize) -> Completion<u32> {
        let length = self.frames[caller.0].argument_count() as u32;
        let slot = self.callee_frame_for_varargs(caller, used_stack_slots, length + 1);
        if !self.stack.ensure_capacity_for(&slot, 0) {
            return Err(self.throw_stack_overflow());
        }
        Ok(length)
    }

    /// Copies `length` values of `arguments`, starting at `offset`, into the
    /// registers at `dest`. A throwing getter aborts the copy; registers
    /// written so far keep their values.
    pub fn load_varargs(&mut self, dest: usize, arguments: Value, offset: u32, length: u32) -> Completion<()> {
        let Some(handle) = arguments.as_object() else {
            return Ok(());
        };
        if length == 0 {
            return Ok(());
        }
        let (offset, length) = (offset as usize, length as usize);

        match self.array_like_shape(handle) {
            ArrayLikeShape::Arguments | ArrayLikeShape::ImmutableList | ArrayLikeShape::Array => {
                let values = self.copy_indexed_to_arguments(handle, offset, length);
                self.stack.write_slice(dest, &values);
                Ok(())
            }
            ArrayLikeShape::Generic => {
                // Getters may run script that pushes frames over `dest`, so
                // values are staged and written once the loop is done.
                let _defer = self.gc.defer_gc();
                let mut staged = Vec::with_capacity(length);
                let mut i = 0;
                while i < length && self.can_get_index_quickly(arguments, i + offset) {
                    staged.push(self.get_index_quickly(arguments, i + offset));
                    i += 1;
                }
                tracing::trace!(quick = i, slow = length - i, "loading varargs from generic object");
                let mut result = Ok(());
                while i < length {
                    match self.get_index(arguments, i + offset) {
                        Ok(value) => staged.push(value),
                        Err(thrown) => {
                            result = Err(thrown);
                            break;
                        }
                    }
                    i += 1;
                }
                self.stack.write_slice(dest, &staged);
                result
            }
        }
    }

    /// Bulk copy for arguments objects, arrays and immutable lists. Indexes
    /// past the stored elements read as undefined.
    fn copy_indexed_to_arguments(&self, handle: u32, offset: usize, length: usize) -> Vec<Value> {
        let Some(object) = self.heap.get_object(handle) else {
            return vec![Value::undefined(); length];
        };
        (offset..offset + length)
            .map(|index| {
                object
                    .element(index)
                    .or_else(|| object.own_data(&index.to_string()))
                    .unwrap_or_else(Value::undefined)
            })
            .collect()
    }

    /// Loads the varargs of a callee frame and records its argument count.
    /// The frame must have been sized by `size_frame_for_varargs`.
    pub fn setup_varargs_frame(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        arguments: Value,
        offset: u32,
        length: u32,
    ) -> Completion<FrameSlot> {
        let slot = self.callee_frame_for_varargs(caller, used_stack_slots, length + 1);
        self.load_varargs(slot.argument_register(0), arguments, offset, length)?;
        Ok(slot)
    }

    pub fn setup_varargs_frame_and_set_this(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        this_value: Value,
        arguments: Value,
        first_var_arg_offset: u32,
        length: u32,
    ) -> Completion<FrameSlot> {
        let slot = self.setup_varargs_frame(caller, used_stack_slots, arguments, first_var_arg_offset, length)?;
        self.set_reg(slot.this_register(), 0, this_value);
        Ok(slot)
    }

    /// Copies the caller's argument registers into the callee frame.
    pub fn setup_forward_arguments_frame(&mut self, caller: FrameId, used_stack_slots: usize, length: u32) -> FrameSlot {
        let caller_frame = &self.frames[caller.0];
        assert_eq!(
            length as usize,
            caller_frame.argument_count(),
            "forwarded length must match the caller's argument count"
        );
        let src = caller_frame.base + 1;
        let slot = self.callee_frame_for_varargs(caller, used_stack_slots, length + 1);
        self.stack.copy_within(src, slot.argument_register(0), length as usize);
        slot
    }

    pub fn setup_forward_arguments_frame_and_set_this(
        &mut self,
        caller: FrameId,
        used_stack_slots: usize,
        this_value: Value,
        length: u32,
    ) -> FrameSlot {
        let slot = self.setup_forward_arguments_frame(caller, used_stack_slots, length);
        self.set_reg(slot.this_register(), 0, this_value);
        slot
    }
}
