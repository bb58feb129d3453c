//! The stack-based interpreter loop (§4.5, C6): fetch, dispatch, repeat,
//! with a bounded call stack and ambient cancellation checked on every
//! step.

use crate::error::{ExecError, VmError};
use crate::frame::Frame;
use crate::module::{Instruction, Module};
use crate::opcode::{unpack_call, Opcode};
use crate::value::{ArrayValue, ObjectValue, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use verge_bus::Bus;
use verge_core::Body;

/// Default call-stack depth bound (§4.5).
pub const DEFAULT_CALL_STACK_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub call_stack_limit: usize,
    pub request_timeout: Duration,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            call_stack_limit: DEFAULT_CALL_STACK_LIMIT,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns loaded modules (insertion-only, names unique) and an optional
/// bus attachment for the `EB*` opcodes. Single-threaded per invocation;
/// multiple `Vm` instances may run concurrently (§4.9).
pub struct Vm {
    modules: RwLock<IndexMap<String, Arc<Module>>>,
    bus: Option<Arc<Bus>>,
    config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            modules: RwLock::new(IndexMap::new()),
            bus: None,
            config,
        }
    }

    pub fn with_bus(config: VmConfig, bus: Arc<Bus>) -> Self {
        Self {
            modules: RwLock::new(IndexMap::new()),
            bus: Some(bus),
            config,
        }
    }

    /// Inserts `module`. Module names are unique and insertion-only —
    /// loading a name twice is rejected rather than replacing the
    /// original (§3: "the VM owns modules (insertion-only, names
    /// unique)").
    pub fn load_module(&self, module: Module) -> Result<(), VmError> {
        let mut guard = self.modules.write();
        if guard.contains_key(&module.name) {
            return Err(VmError::InvalidData(format!(
                "module {:?} is already loaded",
                module.name
            )));
        }
        guard.insert(module.name.clone(), Arc::new(module));
        Ok(())
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    /// Runs `method_name` in `module_name` with `args` as its initial
    /// locals, under `cancel`. Returns the method's return value (or
    /// `Value::Void` for `RET`/fallthrough with an empty stack).
    pub async fn run(
        &self,
        module_name: &str,
        method_name: &str,
        args: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, ExecError> {
        let module = self
            .modules
            .read()
            .get(module_name)
            .cloned()
            .ok_or_else(|| ExecError::new(method_name, 0, VmError::InvalidData(format!("no such module {module_name:?}"))))?;
        let method_index = module.method_index(method_name).ok_or_else(|| {
            ExecError::new(method_name, 0, VmError::InvalidData(format!("no such method {method_name:?}")))
        })?;
        self.run_method(&module, method_index, args, cancel).await
    }

    async fn run_method(
        &self,
        module: &Arc<Module>,
        method_index: usize,
        args: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, ExecError> {
        let entry_method = &module.methods[method_index];
        let mut frame = Frame::new(method_index, entry_method.max_stack as usize, entry_method.max_locals as usize);
        for (i, v) in args.into_iter().enumerate() {
            if i < frame.locals.len() {
                frame.locals[i] = Some(v);
            }
        }
        let mut call_stack: Vec<Frame> = vec![frame];

        loop {
            if cancel.is_cancelled() {
                let pc = call_stack.last().map(|f| f.pc).unwrap_or(0);
                let name = call_stack
                    .last()
                    .map(|f| module.methods[f.method_index].name.as_str())
                    .unwrap_or("?");
                return Err(ExecError::new(name, pc, VmError::Cancelled));
            }

            let top = call_stack.len() - 1;
            let method_index_here = call_stack[top].method_index;
            let method = &module.methods[method_index_here];
            let pc = call_stack[top].pc;

            if pc >= method.code.len() {
                let ret = call_stack[top].operand_stack.pop().unwrap_or(Value::Void);
                call_stack.pop();
                match call_stack.last_mut() {
                    None => return Ok(ret),
                    Some(caller) => {
                        caller
                            .push(ret)
                            .map_err(|e| ExecError::new(method.name.as_str(), pc, e))?;
                        continue;
                    }
                }
            }

            let instr = method.code[pc];
            call_stack[top].pc += 1;

            match instr.opcode {
                Opcode::Halt => {
                    let ret = call_stack[top].operand_stack.pop().unwrap_or(Value::Void);
                    return Ok(ret);
                }
                Opcode::Ret => {
                    call_stack.pop();
                    match call_stack.last_mut() {
                        None => return Ok(Value::Void),
                        Some(caller) => caller
                            .push(Value::Void)
                            .map_err(|e| ExecError::new(method.name.as_str(), pc, e))?,
                    }
                }
                Opcode::RetVal => {
                    let ret = call_stack[top]
                        .pop()
                        .map_err(|e| ExecError::new(method.name.as_str(), pc, e))?;
                    call_stack.pop();
                    match call_stack.last_mut() {
                        None => return Ok(ret),
                        Some(caller) => caller
                            .push(ret)
                            .map_err(|e| ExecError::new(method.name.as_str(), pc, e))?,
                    }
                }
                Opcode::Call => {
                    self.exec_call(module, &mut call_stack, instr, pc, &method.name)?;
                }
                other => {
                    self.exec_simple(module, &mut call_stack[top], other, instr.operand, pc, &method.name)
                        .await?;
                }
            }
        }
    }

    fn exec_call(
        &self,
        module: &Arc<Module>,
        call_stack: &mut Vec<Frame>,
        instr: Instruction,
        pc: usize,
        caller_name: &str,
    ) -> Result<(), ExecError> {
        let (callee_index, argc) = unpack_call(instr.operand);
        let callee = module
            .methods
            .get(callee_index as usize)
            .ok_or_else(|| {
                ExecError::new(
                    caller_name,
                    pc,
                    VmError::InvalidReadArg(format!("call target {callee_index} out of bounds")),
                )
            })?;

        if call_stack.len() >= self.config.call_stack_limit {
            return Err(ExecError::new(
                caller_name,
                pc,
                VmError::CallStackOverflow(self.config.call_stack_limit),
            ));
        }

        let argc = argc as usize;
        let top = call_stack.len() - 1;
        let caller = &mut call_stack[top];
        if caller.operand_stack.len() < argc {
            return Err(ExecError::new(caller_name, pc, VmError::StackUnderflow));
        }
        let args = caller.operand_stack.split_off(caller.operand_stack.len() - argc);

        let mut callee_frame = Frame::new(callee_index as usize, callee.max_stack as usize, callee.max_locals as usize);
        for (i, v) in args.into_iter().enumerate() {
            if i < callee_frame.locals.len() {
                callee_frame.locals[i] = Some(v);
            }
        }
        call_stack.push(callee_frame);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    async fn exec_simple(
        &self,
        module: &Arc<Module>,
        frame: &mut Frame,
        opcode: Opcode,
        operand: i64,
        pc: usize,
        method_name: &str,
    ) -> Result<(), ExecError> {
        let err = |e: VmError| ExecError::new(method_name, pc, e);

        match opcode {
            Opcode::Nop => {}
            Opcode::Add => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(numeric_or_concat(a, b).map_err(err)?).map_err(err)?;
            }
            Opcode::Sub => binary_numeric(frame, |a, b| a - b, |a, b| a - b).map_err(err)?,
            Opcode::Mul => binary_numeric(frame, |a, b| a * b, |a, b| a * b).map_err(err)?,
            Opcode::Div => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(checked_div(a, b).map_err(err)?).map_err(err)?;
            }
            Opcode::Mod => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(checked_mod(a, b).map_err(err)?).map_err(err)?;
            }
            Opcode::Neg => {
                let a = frame.pop().map_err(err)?;
                let negated = match a {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "int64 or float64",
                            found: other.type_name(),
                        }))
                    }
                };
                frame.push(negated).map_err(err)?;
            }
            Opcode::Eq => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(Value::Bool(a == b)).map_err(err)?;
            }
            Opcode::Ne => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(Value::Bool(a != b)).map_err(err)?;
            }
            Opcode::Lt => compare(frame, |o| o.is_lt()).map_err(err)?,
            Opcode::Le => compare(frame, |o| o.is_le()).map_err(err)?,
            Opcode::Gt => compare(frame, |o| o.is_gt()).map_err(err)?,
            Opcode::Ge => compare(frame, |o| o.is_ge()).map_err(err)?,
            Opcode::And => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(Value::Bool(a.is_truthy() && b.is_truthy())).map_err(err)?;
            }
            Opcode::Or => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(Value::Bool(a.is_truthy() || b.is_truthy())).map_err(err)?;
            }
            Opcode::Not => {
                let a = frame.pop().map_err(err)?;
                frame.push(Value::Bool(!a.is_truthy())).map_err(err)?;
            }
            Opcode::Pop => {
                frame.pop().map_err(err)?;
            }
            Opcode::Dup => {
                let top = frame.operand_stack.last().cloned().ok_or(VmError::StackUnderflow).map_err(err)?;
                frame.push(top).map_err(err)?;
            }
            Opcode::Swap => {
                let b = frame.pop().map_err(err)?;
                let a = frame.pop().map_err(err)?;
                frame.push(b).map_err(err)?;
                frame.push(a).map_err(err)?;
            }
            Opcode::Load => {
                let value = frame.local(operand as usize).map_err(err)?;
                frame.push(value).map_err(err)?;
            }
            Opcode::Store => {
                let value = frame.pop().map_err(err)?;
                frame.store_local(operand as usize, value).map_err(err)?;
            }
            Opcode::Jmp => frame.pc = operand as usize,
            Opcode::Jz => {
                let cond = frame.pop().map_err(err)?;
                if !cond.is_truthy() {
                    frame.pc = operand as usize;
                }
            }
            Opcode::Jnz => {
                let cond = frame.pop().map_err(err)?;
                if cond.is_truthy() {
                    frame.pc = operand as usize;
                }
            }
            Opcode::LoadInt => frame.push(Value::Int(operand)).map_err(err)?,
            Opcode::LoadBool => frame.push(Value::Bool(operand != 0)).map_err(err)?,
            Opcode::LoadNull => frame.push(Value::Null).map_err(err)?,
            Opcode::LoadString => {
                let s = module.constant_str(operand as usize).map_err(err)?;
                frame.push(Value::Str(Arc::from(s))).map_err(err)?;
            }
            Opcode::New => {
                let type_name = module.constant_str(operand as usize).map_err(err)?;
                frame.push(Value::Object(Arc::new(ObjectValue::new(type_name)))).map_err(err)?;
            }
            Opcode::GetField => {
                let field = module.constant_str(operand as usize).map_err(err)?.to_string();
                let object = frame.pop().map_err(err)?;
                match object {
                    Value::Object(o) => frame.push(o.get(&field)).map_err(err)?,
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "object",
                            found: other.type_name(),
                        }))
                    }
                }
            }
            Opcode::SetField => {
                let field = module.constant_str(operand as usize).map_err(err)?.to_string();
                let value = frame.pop().map_err(err)?;
                let object = frame.pop().map_err(err)?;
                match object {
                    Value::Object(o) => o.set(field, value),
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "object",
                            found: other.type_name(),
                        }))
                    }
                }
            }
            Opcode::NewArray => {
                frame
                    .push(Value::Array(Arc::new(ArrayValue::new(operand.max(0) as usize))))
                    .map_err(err)?;
            }
            Opcode::ArrayLen => {
                let array = frame.pop().map_err(err)?;
                match array {
                    Value::Array(a) => frame.push(Value::Int(a.len() as i64)).map_err(err)?,
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "array",
                            found: other.type_name(),
                        }))
                    }
                }
            }
            Opcode::ALoad => {
                let index = frame.pop().map_err(err)?;
                let array = frame.pop().map_err(err)?;
                let index = expect_int(index).map_err(err)?;
                match array {
                    Value::Array(a) => {
                        let value = a
                            .get(index as usize)
                            .ok_or_else(|| VmError::InvalidReadArg(format!("array index {index} out of bounds (len={})", a.len())))
                            .map_err(err)?;
                        frame.push(value).map_err(err)?;
                    }
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "array",
                            found: other.type_name(),
                        }))
                    }
                }
            }
            Opcode::AStore => {
                let value = frame.pop().map_err(err)?;
                let index = frame.pop().map_err(err)?;
                let array = frame.pop().map_err(err)?;
                let index = expect_int(index).map_err(err)?;
                match array {
                    Value::Array(a) => {
                        if !a.set(index as usize, value) {
                            return Err(err(VmError::InvalidReadArg(format!(
                                "array index {index} out of bounds (len={})",
                                a.len()
                            ))));
                        }
                    }
                    other => {
                        return Err(err(VmError::TypeMismatch {
                            expected: "array",
                            found: other.type_name(),
                        }))
                    }
                }
            }
            Opcode::EbSend | Opcode::EbPublish => {
                let body_value = frame.pop().map_err(err)?;
                let address_value = frame.pop().map_err(err)?;
                let address = expect_str(address_value).map_err(err)?;
                let bus = self.bus.as_ref().ok_or(VmError::NoBus).map_err(err)?;
                let body = Body::encode(&body_value.to_json()).map_err(|e| err(VmError::Bus(e.into())))?;
                let result = if opcode == Opcode::EbSend {
                    bus.send(address.as_ref(), body)
                } else {
                    bus.publish(address.as_ref(), body)
                };
                result.map_err(|e| err(VmError::Bus(e)))?;
            }
            Opcode::EbRequest => {
                let body_value = frame.pop().map_err(err)?;
                let address_value = frame.pop().map_err(err)?;
                let address = expect_str(address_value).map_err(err)?;
                let bus = self.bus.as_ref().ok_or(VmError::NoBus).map_err(err)?;
                let body = Body::encode(&body_value.to_json()).map_err(|e| err(VmError::Bus(e.into())))?;
                let reply = bus
                    .request(address.as_ref(), body, self.config.request_timeout)
                    .await
                    .map_err(|e| err(VmError::Bus(e)))?;
                let decoded: serde_json::Value = reply.body.decode().map_err(|e| err(VmError::Bus(e.into())))?;
                frame.push(Value::from_json(decoded)).map_err(err)?;
            }
            Opcode::Print => {
                let value = frame.pop().map_err(err)?;
                info!(target: "verge_vm::print", "{value}");
            }
            Opcode::Ret | Opcode::RetVal | Opcode::Halt | Opcode::Call => {
                unreachable!("handled by the caller before dispatching to exec_simple")
            }
        }
        Ok(())
    }
}

fn expect_int(value: Value) -> Result<i64, VmError> {
    match value {
        Value::Int(i) => Ok(i),
        other => Err(VmError::TypeMismatch {
            expected: "int64",
            found: other.type_name(),
        }),
    }
}

fn expect_str(value: Value) -> Result<Arc<str>, VmError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(VmError::TypeMismatch {
            expected: "string",
            found: other.type_name(),
        }),
    }
}

fn numeric_or_concat(a: Value, b: Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(Arc::from(format!("{a}{b}")))),
        (a, b) => Err(VmError::TypeMismatch {
            expected: "matching int64/float64/string",
            found: mismatch_label(a.type_name(), b.type_name()),
        }),
    }
}

fn binary_numeric(frame: &mut Frame, int_op: impl Fn(i64, i64) -> i64, float_op: impl Fn(f64, f64) -> f64) -> Result<(), VmError> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    let result = match (a, b) {
        (Value::Int(a), Value::Int(b)) => Value::Int(int_op(a, b)),
        (Value::Float(a), Value::Float(b)) => Value::Float(float_op(a, b)),
        (a, b) => {
            return Err(VmError::TypeMismatch {
                expected: "matching int64/float64",
                found: mismatch_label(a.type_name(), b.type_name()),
            })
        }
    };
    frame.push(result)
}

fn checked_div(a: Value, b: Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(VmError::DivByZero),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (a, b) => Err(VmError::TypeMismatch {
            expected: "matching int64/float64",
            found: mismatch_label(a.type_name(), b.type_name()),
        }),
    }
}

fn checked_mod(a: Value, b: Value) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(VmError::DivByZero),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
        (a, b) => Err(VmError::TypeMismatch {
            expected: "matching int64/float64",
            found: mismatch_label(a.type_name(), b.type_name()),
        }),
    }
}

fn compare(frame: &mut Frame, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), VmError> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    let ordering = match (&a, &b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).ok_or(VmError::TypeMismatch {
            expected: "comparable float64",
            found: "NaN",
        })?,
        _ => {
            return Err(VmError::TypeMismatch {
                expected: "matching int64/float64",
                found: mismatch_label(a.type_name(), b.type_name()),
            })
        }
    };
    frame.push(Value::Bool(accept(ordering)))
}

fn mismatch_label(a: &'static str, b: &'static str) -> &'static str {
    if a == b {
        a
    } else {
        "mixed types"
    }
}
