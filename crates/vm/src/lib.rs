// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! verge-vm: the embedded stack-based bytecode virtual machine (§4.5,
//! C6) — module loader, two-pass assembler, interpreter loop, value
//! model, and disassembler. May call into the event bus (§4.2) via
//! dedicated opcodes when attached to one.

pub mod assembler;
pub mod disassembler;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod module;
pub mod opcode;
pub mod value;

pub use assembler::{MethodBuilder, ModuleBuilder};
pub use disassembler::disassemble;
pub use error::{ExecError, VmError};
pub use interpreter::{Vm, VmConfig, DEFAULT_CALL_STACK_LIMIT};
pub use module::{Constant, Instruction, Method, Module, MODULE_MAGIC, MODULE_VERSION};
pub use opcode::Opcode;
pub use value::{ArrayValue, ObjectValue, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn arithmetic_module() -> Module {
        let mut mb = ModuleBuilder::new("arith");
        let mut m = MethodBuilder::new("main", 8, 0);
        m.op_imm(Opcode::LoadInt, 5)
            .op_imm(Opcode::LoadInt, 3)
            .op(Opcode::Add)
            .op_imm(Opcode::LoadInt, 2)
            .op(Opcode::Mul)
            .op(Opcode::Halt);
        mb.add_method(m.build().unwrap());
        mb.build()
    }

    #[tokio::test]
    async fn arithmetic_program_computes_expected_value() {
        let vm = Vm::new(VmConfig::default());
        vm.load_module(arithmetic_module()).unwrap();
        let cancel = CancellationToken::new();
        let result = vm.run("arith", "main", vec![], &cancel).await.unwrap();
        assert_eq!(result, Value::Int(16));
    }

    #[tokio::test]
    async fn fibonacci_loop_computes_fib_10() {
        let mut mb = ModuleBuilder::new("fib");
        // locals: 0=n, 1=a, 2=b, 3=tmp
        let mut m = MethodBuilder::new("main", 8, 4);
        m.op_imm(Opcode::LoadInt, 10)
            .op_imm(Opcode::Store, 0)
            .op_imm(Opcode::LoadInt, 0)
            .op_imm(Opcode::Store, 1)
            .op_imm(Opcode::LoadInt, 1)
            .op_imm(Opcode::Store, 2)
            .label("top")
            .op_imm(Opcode::Load, 0)
            .jump(Opcode::Jz, "done")
            .op_imm(Opcode::Load, 1)
            .op_imm(Opcode::Load, 2)
            .op(Opcode::Add)
            .op_imm(Opcode::Store, 3)
            .op_imm(Opcode::Load, 2)
            .op_imm(Opcode::Store, 1)
            .op_imm(Opcode::Load, 3)
            .op_imm(Opcode::Store, 2)
            .op_imm(Opcode::Load, 0)
            .op_imm(Opcode::LoadInt, 1)
            .op(Opcode::Sub)
            .op_imm(Opcode::Store, 0)
            .jump(Opcode::Jmp, "top")
            .label("done")
            .op_imm(Opcode::Load, 1)
            .op(Opcode::Halt);
        mb.add_method(m.build().unwrap());
        let module = mb.build();

        let vm = Vm::new(VmConfig::default());
        vm.load_module(module).unwrap();
        let cancel = CancellationToken::new();
        let result = vm.run("fib", "main", vec![], &cancel).await.unwrap();
        assert_eq!(result, Value::Int(55));
    }

    #[tokio::test]
    async fn call_invokes_another_method_with_args() {
        let mut mb = ModuleBuilder::new("calls");
        let mut square = MethodBuilder::new("square", 4, 1);
        square
            .op_imm(Opcode::Load, 0)
            .op_imm(Opcode::Load, 0)
            .op(Opcode::Mul)
            .op(Opcode::RetVal);
        let square_index = mb.add_method(square.build().unwrap());

        let mut main = MethodBuilder::new("main", 4, 0);
        main.op_imm(Opcode::LoadInt, 7)
            .call(square_index, 1)
            .op(Opcode::Halt);
        mb.add_method(main.build().unwrap());
        let module = mb.build();

        let vm = Vm::new(VmConfig::default());
        vm.load_module(module).unwrap();
        let cancel = CancellationToken::new();
        let result = vm.run("calls", "main", vec![], &cancel).await.unwrap();
        assert_eq!(result, Value::Int(49));
    }

    #[tokio::test]
    async fn reloading_a_module_name_is_rejected() {
        let vm = Vm::new(VmConfig::default());
        vm.load_module(arithmetic_module()).unwrap();
        assert!(vm.load_module(arithmetic_module()).is_err());
    }

    #[tokio::test]
    async fn division_by_zero_fails_with_div_by_zero() {
        let mut mb = ModuleBuilder::new("divzero");
        let mut m = MethodBuilder::new("main", 4, 0);
        m.op_imm(Opcode::LoadInt, 1).op_imm(Opcode::LoadInt, 0).op(Opcode::Div).op(Opcode::Halt);
        mb.add_method(m.build().unwrap());

        let vm = Vm::new(VmConfig::default());
        vm.load_module(mb.build()).unwrap();
        let cancel = CancellationToken::new();
        let result = vm.run("divzero", "main", vec![], &cancel).await;
        assert!(matches!(result, Err(ExecError { source: VmError::DivByZero, .. })));
    }

    #[tokio::test]
    async fn call_stack_overflow_is_detected() {
        let mut mb = ModuleBuilder::new("recurse");
        let mut m = MethodBuilder::new("loop", 4, 0);
        let self_index = 0u32;
        m.call(self_index, 0).op(Opcode::Halt);
        mb.add_method(m.build().unwrap());

        let vm = Vm::new(VmConfig {
            call_stack_limit: 16,
            ..VmConfig::default()
        });
        vm.load_module(mb.build()).unwrap();
        let cancel = CancellationToken::new();
        let result = vm.run("recurse", "loop", vec![], &cancel).await;
        assert!(matches!(
            result,
            Err(ExecError { source: VmError::CallStackOverflow(_), .. })
        ));
    }
}
