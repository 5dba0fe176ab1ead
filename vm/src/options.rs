use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Global maximum argument count for calls and varargs materialization.
pub const MAX_ARGUMENTS: u32 = 0x10000;

/// Engine tunables. Every field has a default so partial TOML documents
/// are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VmOptions {
    pub max_arguments: u32,
    /// Hard ceiling of the register stack, in slots.
    pub stack_reserved_slots: usize,
    /// Growth step of the committed register region.
    pub stack_commit_granularity: usize,
    /// Nested VM entries allowed before calls report stack overflow.
    pub max_entry_depth: usize,
    pub crash_on_disallowed_vm_entry: bool,
    pub use_trusted_types: bool,
    /// Frames captured with each thrown exception.
    pub stack_trace_limit: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_arguments: MAX_ARGUMENTS,
            stack_reserved_slots: 1 << 20,
            stack_commit_granularity: 4096,
            max_entry_depth: 256,
            crash_on_disallowed_vm_entry: false,
            use_trusted_types: false,
            stack_trace_limit: 100,
        }
    }
}

impl VmOptions {
    pub fn from_toml(source: &str) -> Result<Self, RuntimeError> {
        let options: VmOptions = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.stack_commit_granularity == 0 {
            return Err(RuntimeError::InvalidOptions(
                "stack-commit-granularity must be positive".into(),
            ));
        }
        if self.stack_reserved_slots < self.max_arguments as usize {
            return Err(RuntimeError::InvalidOptions(format!(
                "stack-reserved-slots ({}) cannot host max-arguments ({})",
                self.stack_reserved_slots, self.max_arguments
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let opts = VmOptions::from_toml("max-entry-depth = 8\nuse-trusted-types = true\n").unwrap();
        assert_eq!(opts.max_entry_depth, 8);
        assert!(opts.use_trusted_types);
        assert_eq!(opts.max_arguments, MAX_ARGUMENTS);
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = VmOptions::from_toml("max-arguments = \"lots\"").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidOptions(_)));
    }

    #[test]
    fn zero_granularity_is_invalid() {
        let err = VmOptions::from_toml("stack-commit-granularity = 0").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidOptions(_)));
    }
}
