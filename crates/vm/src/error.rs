//! VM error kinds (§7) and the structured, `pc`-carrying execution error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("invalid module data: {0}")]
    InvalidData(String),
    #[error("invalid argument to a read instruction: {0}")]
    InvalidReadArg(String),
    #[error("operand stack overflow (max_stack={0})")]
    StackOverflow(usize),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("call stack overflow (depth > {0})")]
    CallStackOverflow(usize),
    #[error("division by zero")]
    DivByZero,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("local {0} read before being initialized")]
    UninitLocal(usize),
    #[error("no bus attached to this VM instance")]
    NoBus,
    #[error("execution cancelled")]
    Cancelled,
    #[error(transparent)]
    Bus(#[from] verge_bus::BusError),
}

/// An interpreter failure, always tagged with the failing method and
/// program counter so callers can locate the fault (§4.5).
#[derive(Debug, Error)]
#[error("{source} (method={method:?}, pc={pc})")]
pub struct ExecError {
    pub method: String,
    pub pc: usize,
    #[source]
    pub source: VmError,
}

impl ExecError {
    pub(crate) fn new(method: impl Into<String>, pc: usize, source: VmError) -> Self {
        Self {
            method: method.into(),
            pc,
            source,
        }
    }
}
