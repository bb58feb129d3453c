//! VM module binary format (§4.5, §9) and its in-memory representation.
//!
//! ```text
//! u32 magic=0x46564D31 | u32 version | u32 name_len | bytes name
//! u32 pool_count | pool_count x { u8 tag; payload }
//!   tag=1 int64, tag=2 float64, tag=3 {u32 len; bytes utf8}
//! u32 method_count | method_count x {
//!   u32 name_len; bytes name; u32 max_stack; u32 max_locals;
//!   u32 code_len; code_len x { u8 opcode; [i64 operand if opcode takes one] }
//! }
//! ```

use crate::error::VmError;
use crate::opcode::Opcode;

pub const MODULE_MAGIC: u32 = 0x4656_4D31;
pub const MODULE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: i64,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub max_stack: u32,
    pub max_locals: u32,
    pub code: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub version: u32,
    pub constants: Vec<Constant>,
    pub methods: Vec<Method>,
}

impl Module {
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn constant(&self, index: usize) -> Result<&Constant, VmError> {
        self.constants
            .get(index)
            .ok_or_else(|| VmError::InvalidReadArg(format!("constant pool index {index} out of bounds")))
    }

    pub fn constant_str(&self, index: usize) -> Result<&str, VmError> {
        match self.constant(index)? {
            Constant::Str(s) => Ok(s.as_str()),
            other => Err(VmError::TypeMismatch {
                expected: "string constant",
                found: constant_kind(other),
            }),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MODULE_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        write_str(&mut out, &self.name);

        out.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for constant in &self.constants {
            match constant {
                Constant::Int(v) => {
                    out.push(1);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Constant::Float(v) => {
                    out.push(2);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Constant::Str(s) => {
                    out.push(3);
                    write_str(&mut out, s);
                }
            }
        }

        out.extend_from_slice(&(self.methods.len() as u32).to_le_bytes());
        for method in &self.methods {
            write_str(&mut out, &method.name);
            out.extend_from_slice(&method.max_stack.to_le_bytes());
            out.extend_from_slice(&method.max_locals.to_le_bytes());
            out.extend_from_slice(&(method.code.len() as u32).to_le_bytes());
            for instr in &method.code {
                out.push(instr.opcode.to_u8());
                if instr.opcode.takes_operand() {
                    out.extend_from_slice(&instr.operand.to_le_bytes());
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Module, VmError> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MODULE_MAGIC {
            return Err(VmError::InvalidData(format!("bad module magic {magic:#x}")));
        }
        let version = r.u32()?;
        if version != MODULE_VERSION {
            return Err(VmError::InvalidData(format!("unsupported module version {version}")));
        }
        let name = r.string()?;

        let pool_count = r.u32()?;
        let mut constants = Vec::with_capacity(pool_count as usize);
        for _ in 0..pool_count {
            let tag = r.u8()?;
            let constant = match tag {
                1 => Constant::Int(r.i64()?),
                2 => Constant::Float(r.f64()?),
                3 => Constant::Str(r.string()?),
                other => return Err(VmError::InvalidData(format!("unknown constant tag {other}"))),
            };
            constants.push(constant);
        }

        let method_count = r.u32()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let name = r.string()?;
            let max_stack = r.u32()?;
            let max_locals = r.u32()?;
            let code_len = r.u32()?;
            let mut code = Vec::with_capacity(code_len as usize);
            for _ in 0..code_len {
                let tag = r.u8()?;
                let opcode = Opcode::from_u8(tag)
                    .ok_or_else(|| VmError::InvalidData(format!("unknown opcode tag {tag}")))?;
                let operand = if opcode.takes_operand() { r.i64()? } else { 0 };
                code.push(Instruction { opcode, operand });
            }
            methods.push(Method {
                name,
                max_stack,
                max_locals,
                code,
            });
        }

        Ok(Module {
            name,
            version,
            constants,
            methods,
        })
    }
}

fn constant_kind(constant: &Constant) -> &'static str {
    match constant {
        Constant::Int(_) => "int64 constant",
        Constant::Float(_) => "float64 constant",
        Constant::Str(_) => "string constant",
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VmError> {
        if self.pos + n > self.buf.len() {
            return Err(VmError::InvalidData("unexpected end of module data".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VmError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, VmError> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| VmError::InvalidData("malformed u32 field in module data".into()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> Result<i64, VmError> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| VmError::InvalidData("malformed i64 field in module data".into()))?;
        Ok(i64::from_le_bytes(bytes))
    }

    fn f64(&mut self) -> Result<f64, VmError> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| VmError::InvalidData("malformed f64 field in module data".into()))?;
        Ok(f64::from_le_bytes(bytes))
    }

    fn string(&mut self) -> Result<String, VmError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| VmError::InvalidData("non-utf8 string in module data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_roundtrips() {
        let module = Module {
            name: "arith".into(),
            version: MODULE_VERSION,
            constants: vec![Constant::Str("hello".into()), Constant::Int(7)],
            methods: vec![Method {
                name: "main".into(),
                max_stack: 4,
                max_locals: 0,
                code: vec![
                    Instruction {
                        opcode: Opcode::LoadInt,
                        operand: 5,
                    },
                    Instruction {
                        opcode: Opcode::Halt,
                        operand: 0,
                    },
                ],
            }],
        };

        let bytes = module.encode();
        let decoded = Module::decode(&bytes).unwrap();
        assert_eq!(decoded.name, "arith");
        assert_eq!(decoded.constants, module.constants);
        assert_eq!(decoded.methods.len(), 1);
        assert_eq!(decoded.methods[0].code.len(), 2);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let bytes = 0u32.to_le_bytes().to_vec();
        assert!(matches!(Module::decode(&bytes), Err(VmError::InvalidData(_))));
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let bytes = MODULE_MAGIC.to_le_bytes().to_vec();
        assert!(matches!(Module::decode(&bytes), Err(VmError::InvalidData(_))));
    }
}
