//! A textual disassembler: one line per program counter, mnemonic and
//! operand (§4.5).

use crate::module::Module;

pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    out.push_str(&format!("; module {} (version {})\n", module.name, module.version));
    for (index, constant) in module.constants.iter().enumerate() {
        out.push_str(&format!("; const[{index}] = {constant:?}\n"));
    }
    for method in &module.methods {
        out.push_str(&format!(
            "method {} (max_stack={}, max_locals={})\n",
            method.name, method.max_stack, method.max_locals
        ));
        for (pc, instr) in method.code.iter().enumerate() {
            if instr.opcode.takes_operand() {
                out.push_str(&format!("  {pc:4}: {:<10} {}\n", instr.opcode.mnemonic(), instr.operand));
            } else {
                out.push_str(&format!("  {pc:4}: {}\n", instr.opcode.mnemonic()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ModuleBuilder;
    use crate::opcode::Opcode;

    #[test]
    fn disassembly_lists_every_instruction() {
        let mut mb = ModuleBuilder::new("demo");
        let mut method = crate::assembler::MethodBuilder::new("main", 4, 0);
        method.op_imm(Opcode::LoadInt, 5).op(Opcode::Halt);
        mb.add_method(method.build().unwrap());
        let module = mb.build();

        let text = disassemble(&module);
        assert!(text.contains("LOADINT    5"));
        assert!(text.contains("HALT"));
    }
}
