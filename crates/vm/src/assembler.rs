//! Two-pass assembler (§4.5, §9 REDESIGN): a first pass appends
//! instructions and records label offsets as they're defined; a second
//! pass, in [`MethodBuilder::build`], patches every label-referencing
//! operand — so both forward and backward jumps resolve correctly,
//! unlike a single-pass, backward-only design.

use crate::error::VmError;
use crate::module::{Constant, Method, Module, MODULE_VERSION};
use crate::opcode::{pack_call, Opcode};
use std::collections::HashMap;

enum PendingOperand {
    Immediate(i64),
    Label(String),
}

/// Builds one method's instruction stream, resolving label references in
/// a second pass at [`Self::build`] time.
pub struct MethodBuilder {
    name: String,
    max_stack: u32,
    max_locals: u32,
    ops: Vec<(Opcode, PendingOperand)>,
    labels: HashMap<String, usize>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>, max_stack: u32, max_locals: u32) -> Self {
        Self {
            name: name.into(),
            max_stack,
            max_locals,
            ops: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Binds `name` to the next instruction's offset. May be called
    /// before or after the jumps that reference it.
    pub fn label(&mut self, name: impl Into<String>) -> &mut Self {
        self.labels.insert(name.into(), self.ops.len());
        self
    }

    /// An opcode with no operand (e.g. `ADD`, `POP`, `RET`).
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.ops.push((opcode, PendingOperand::Immediate(0)));
        self
    }

    /// An opcode carrying an immediate `i64` operand (locals, constants,
    /// `NEWARRAY`, field/type constant indices).
    pub fn op_imm(&mut self, opcode: Opcode, operand: i64) -> &mut Self {
        self.ops.push((opcode, PendingOperand::Immediate(operand)));
        self
    }

    /// A `JMP`/`JZ`/`JNZ` whose target is resolved from `label` at build
    /// time.
    pub fn jump(&mut self, opcode: Opcode, label: impl Into<String>) -> &mut Self {
        self.ops.push((opcode, PendingOperand::Label(label.into())));
        self
    }

    /// `CALL method_index, argc` (§4.5).
    pub fn call(&mut self, method_index: u32, argc: u32) -> &mut Self {
        self.op_imm(Opcode::Call, pack_call(method_index, argc))
    }

    pub fn build(self) -> Result<Method, VmError> {
        let mut code = Vec::with_capacity(self.ops.len());
        for (opcode, operand) in self.ops {
            let resolved = match operand {
                PendingOperand::Immediate(v) => v,
                PendingOperand::Label(name) => *self
                    .labels
                    .get(&name)
                    .ok_or_else(|| VmError::InvalidData(format!("unresolved label {name:?}")))?
                    as i64,
            };
            code.push(crate::module::Instruction {
                opcode,
                operand: resolved,
            });
        }
        Ok(Method {
            name: self.name,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
        })
    }
}

/// Builds a module's constant pool and method table.
pub struct ModuleBuilder {
    name: String,
    constants: Vec<Constant>,
    methods: Vec<Method>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Appends `constant` and returns its pool index.
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Appends `method` and returns its method-table index, for use as a
    /// `CALL` target.
    pub fn add_method(&mut self, method: Method) -> u32 {
        self.methods.push(method);
        (self.methods.len() - 1) as u32
    }

    pub fn build(self) -> Module {
        Module {
            name: self.name,
            version: MODULE_VERSION,
            constants: self.constants,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_jump_label_resolves() {
        let mut m = MethodBuilder::new("loop", 4, 1);
        m.op_imm(Opcode::LoadInt, 0)
            .op_imm(Opcode::Store, 0)
            .label("top")
            .op_imm(Opcode::Load, 0)
            .op_imm(Opcode::LoadInt, 1)
            .op(Opcode::Add)
            .op_imm(Opcode::Store, 0)
            .jump(Opcode::Jmp, "top");
        let method = m.build().unwrap();
        let jmp = method.code.last().unwrap();
        assert_eq!(jmp.opcode, Opcode::Jmp);
        assert_eq!(jmp.operand, 2);
    }

    #[test]
    fn forward_jump_label_resolves() {
        let mut m = MethodBuilder::new("skip", 4, 0);
        m.jump(Opcode::Jmp, "end")
            .op(Opcode::Nop)
            .label("end")
            .op(Opcode::Halt);
        let method = m.build().unwrap();
        assert_eq!(method.code[0].operand, 2);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let mut m = MethodBuilder::new("bad", 4, 0);
        m.jump(Opcode::Jmp, "nowhere");
        assert!(matches!(m.build(), Err(VmError::InvalidData(_))));
    }
}
