//! Assembles a small `fib(n)` module using `CALL`, runs it, disassembles
//! it, and writes the compiled module to disk so it can be replayed with
//! `verge run`/`verge disasm`.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use verge_vm::{disassemble, MethodBuilder, ModuleBuilder, Opcode, Value, Vm, VmConfig};

fn fib_module() -> verge_vm::Module {
    let mut mb = ModuleBuilder::new("fib_demo");

    // fib(n): recursive via CALL, locals: 0=n
    let mut fib = MethodBuilder::new("fib", 8, 1);
    fib.op_imm(Opcode::Load, 0)
        .op_imm(Opcode::LoadInt, 2)
        .op(Opcode::Lt)
        .jump(Opcode::Jz, "recurse")
        .op_imm(Opcode::Load, 0)
        .op(Opcode::RetVal)
        .label("recurse")
        .op_imm(Opcode::Load, 0)
        .op_imm(Opcode::LoadInt, 1)
        .op(Opcode::Sub)
        .op_imm(Opcode::Call, pack(0, 1))
        .op_imm(Opcode::Load, 0)
        .op_imm(Opcode::LoadInt, 2)
        .op(Opcode::Sub)
        .op_imm(Opcode::Call, pack(0, 1))
        .op(Opcode::Add)
        .op(Opcode::RetVal);
    mb.add_method(fib.build().expect("fib method assembles"));

    let mut main = MethodBuilder::new("main", 4, 0);
    main.op_imm(Opcode::LoadInt, 10).op_imm(Opcode::Call, pack(0, 1)).op(Opcode::RetVal);
    mb.add_method(main.build().expect("main method assembles"));

    mb.build()
}

fn pack(method_index: u32, argc: u32) -> i64 {
    verge_vm::opcode::pack_call(method_index, argc)
}

#[tokio::main]
async fn main() {
    verge_runtime::init_logging("info");

    let module = fib_module();
    println!("{}", disassemble(&module));

    let vm = Vm::new(VmConfig::default());
    vm.load_module(module.clone()).expect("module loads");
    let cancel = CancellationToken::new();
    let result = vm.run("fib_demo", "main", vec![], &cancel).await.expect("fib(10) runs");
    assert_eq!(result, Value::Int(55));
    println!("fib(10) = {result}");

    let out = PathBuf::from("fib_demo.vmod");
    std::fs::write(&out, module.encode()).expect("write module file");
    println!("wrote {}", out.display());
}
