//! One activation record: method index, program counter, operand stack,
//! and locals (§3 Glossary: "Frame").

use crate::error::VmError;
use crate::value::Value;

pub struct Frame {
    pub method_index: usize,
    pub pc: usize,
    pub operand_stack: Vec<Value>,
    pub locals: Vec<Option<Value>>,
    pub max_stack: usize,
}

impl Frame {
    pub fn new(method_index: usize, max_stack: usize, max_locals: usize) -> Self {
        Self {
            method_index,
            pc: 0,
            operand_stack: Vec::with_capacity(max_stack.min(64)),
            locals: vec![None; max_locals],
            max_stack,
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.operand_stack.len() >= self.max_stack {
            return Err(VmError::StackOverflow(self.max_stack));
        }
        self.operand_stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.operand_stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn local(&self, index: usize) -> Result<Value, VmError> {
        match self.locals.get(index) {
            None => Err(VmError::InvalidReadArg(format!(
                "local index {index} out of bounds (max_locals={})",
                self.locals.len()
            ))),
            Some(None) => Err(VmError::UninitLocal(index)),
            Some(Some(v)) => Ok(v.clone()),
        }
    }

    pub fn store_local(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        match self.locals.get_mut(index) {
            None => Err(VmError::InvalidReadArg(format!(
                "local index {index} out of bounds (max_locals={})",
                self.locals.len()
            ))),
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
        }
    }
}
