#![allow(dead_code)]

use std::sync::Arc;

use memory::Value;
use vm::code_block::{CodeBlock, HandlerInfo};
use vm::executable::{CodeGenerator, CompiledCode, Entry, FunctionExecutable, Specialization};
use vm::{native_fn, CompileError, Completion, FrameId, RealmId, StackOps, VM};

/// Generator that always produces the same code and handler table.
pub fn generator<F>(name: &str, handlers: Vec<HandlerInfo>, code: F) -> Arc<dyn CodeGenerator>
where
    F: Fn(&mut VM, FrameId, Entry) -> Completion + Send + Sync + 'static,
{
    let code: Arc<dyn CompiledCode> = Arc::new(code);
    let name = name.to_string();
    Arc::new(move |_: Specialization| {
        Ok::<_, CompileError>(CodeBlock::new(name.clone(), code.clone()).with_handlers(handlers.clone()))
    })
}

/// Interpreted function closing over the realm's global scope.
pub fn interpreted<F>(vm: &mut VM, realm: RealmId, name: &str, handlers: Vec<HandlerInfo>, code: F) -> Value
where
    F: Fn(&mut VM, FrameId, Entry) -> Completion + Send + Sync + 'static,
{
    let executable = FunctionExecutable::new(name, generator(name, handlers, code));
    let scope = vm.realm(realm).global_scope;
    vm.create_function(Arc::new(executable), scope, realm)
}

/// Native function that throws a plain `Error` with `message`.
pub fn thrower(vm: &mut VM, realm: RealmId, message: &'static str) -> Value {
    vm.create_native_function(
        realm,
        "thrower",
        native_fn(move |vm: &mut VM, _: FrameId| Err(vm.throw_error(memory::ErrorType::Error, message))),
    )
}

/// Native function returning its argument count.
pub fn count_args(vm: &mut VM) -> Value {
    vm.create_native_function(
        RealmId::MAIN,
        "countArgs",
        native_fn(|vm: &mut VM, frame: FrameId| Ok(Value::int(vm.argument_count(frame) as i64))),
    )
}

/// Registers of `frame` in use, i.e. where a callee frame may start.
pub fn used_slots(vm: &VM, frame: FrameId) -> usize {
    vm.frames[frame.0].register_count
}
