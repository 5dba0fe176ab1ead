pub mod code_block;
pub mod compiler;
pub mod debugger;
pub mod error;
pub mod eval;
pub mod exception;
pub mod executable;
pub mod foreign;
pub mod function;
pub mod host;
pub mod machine;
pub mod native;
pub mod options;
pub mod program;
pub mod realm;
pub mod runtime;
pub mod trace;
pub mod traps;
pub mod unwind;
pub mod varargs;

pub use code_block::CodeBlock;
pub use compiler::{SourceCompiler, SourceTaintedOrigin};
pub use error::{CompileError, RuntimeError};
pub use exception::{Completion, Thrown};
pub use machine::{CallFrame, FrameId, StackOps, VM};
pub use native::{native_fn, NativeFn};
pub use options::VmOptions;
pub use realm::RealmId;
pub use runtime::Runtime;
