//! Fixed-width instruction opcodes (§4.5). `CALL` packs a method index
//! and an argument count into a single `i64` operand since the module
//! format carries at most one operand per instruction.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Halt = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Mod = 6,
    Neg = 7,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Le = 11,
    Gt = 12,
    Ge = 13,
    And = 14,
    Or = 15,
    Not = 16,
    Pop = 17,
    Dup = 18,
    Swap = 19,
    Load = 20,
    Store = 21,
    Jmp = 22,
    Jz = 23,
    Jnz = 24,
    Call = 25,
    Ret = 26,
    RetVal = 27,
    LoadInt = 28,
    LoadBool = 29,
    LoadNull = 30,
    LoadString = 31,
    New = 32,
    GetField = 33,
    SetField = 34,
    NewArray = 35,
    ArrayLen = 36,
    ALoad = 37,
    AStore = 38,
    EbSend = 39,
    EbPublish = 40,
    EbRequest = 41,
    Print = 42,
}

impl Opcode {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(tag: u8) -> Option<Opcode> {
        Some(match tag {
            0 => Opcode::Nop,
            1 => Opcode::Halt,
            2 => Opcode::Add,
            3 => Opcode::Sub,
            4 => Opcode::Mul,
            5 => Opcode::Div,
            6 => Opcode::Mod,
            7 => Opcode::Neg,
            8 => Opcode::Eq,
            9 => Opcode::Ne,
            10 => Opcode::Lt,
            11 => Opcode::Le,
            12 => Opcode::Gt,
            13 => Opcode::Ge,
            14 => Opcode::And,
            15 => Opcode::Or,
            16 => Opcode::Not,
            17 => Opcode::Pop,
            18 => Opcode::Dup,
            19 => Opcode::Swap,
            20 => Opcode::Load,
            21 => Opcode::Store,
            22 => Opcode::Jmp,
            23 => Opcode::Jz,
            24 => Opcode::Jnz,
            25 => Opcode::Call,
            26 => Opcode::Ret,
            27 => Opcode::RetVal,
            28 => Opcode::LoadInt,
            29 => Opcode::LoadBool,
            30 => Opcode::LoadNull,
            31 => Opcode::LoadString,
            32 => Opcode::New,
            33 => Opcode::GetField,
            34 => Opcode::SetField,
            35 => Opcode::NewArray,
            36 => Opcode::ArrayLen,
            37 => Opcode::ALoad,
            38 => Opcode::AStore,
            39 => Opcode::EbSend,
            40 => Opcode::EbPublish,
            41 => Opcode::EbRequest,
            42 => Opcode::Print,
            _ => return None,
        })
    }

    /// Whether this opcode carries an `i64` operand in the module's code
    /// stream (§4.5 module format).
    pub const fn takes_operand(self) -> bool {
        !matches!(
            self,
            Opcode::Nop
                | Opcode::Halt
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Neg
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Lt
                | Opcode::Le
                | Opcode::Gt
                | Opcode::Ge
                | Opcode::And
                | Opcode::Or
                | Opcode::Not
                | Opcode::Pop
                | Opcode::Dup
                | Opcode::Swap
                | Opcode::Ret
                | Opcode::RetVal
                | Opcode::LoadNull
                | Opcode::ArrayLen
                | Opcode::ALoad
                | Opcode::AStore
                | Opcode::EbSend
                | Opcode::EbPublish
                | Opcode::EbRequest
                | Opcode::Print
        )
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Neg => "NEG",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::RetVal => "RETVAL",
            Opcode::LoadInt => "LOADINT",
            Opcode::LoadBool => "LOADBOOL",
            Opcode::LoadNull => "LOADNULL",
            Opcode::LoadString => "LOADSTRING",
            Opcode::New => "NEW",
            Opcode::GetField => "GETFIELD",
            Opcode::SetField => "SETFIELD",
            Opcode::NewArray => "NEWARRAY",
            Opcode::ArrayLen => "ARRAYLEN",
            Opcode::ALoad => "ALOAD",
            Opcode::AStore => "ASTORE",
            Opcode::EbSend => "EBSEND",
            Opcode::EbPublish => "EBPUBLISH",
            Opcode::EbRequest => "EBREQUEST",
            Opcode::Print => "PRINT",
        }
    }
}

/// Packs a `CALL` instruction's method index and argument count into the
/// single `i64` operand the module format allows.
pub fn pack_call(method_index: u32, argc: u32) -> i64 {
    ((method_index as i64) << 32) | (argc as i64)
}

pub fn unpack_call(operand: i64) -> (u32, u32) {
    let method_index = (operand >> 32) as u32;
    let argc = operand as u32;
    (method_index, argc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_operand_roundtrips() {
        let packed = pack_call(7, 3);
        assert_eq!(unpack_call(packed), (7, 3));
    }

    #[test]
    fn every_tag_roundtrips_through_u8() {
        for tag in 0..=42u8 {
            let opcode = Opcode::from_u8(tag).expect("tag in range");
            assert_eq!(opcode.to_u8(), tag);
        }
        assert!(Opcode::from_u8(43).is_none());
    }
}
