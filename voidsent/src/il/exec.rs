//! Stack evaluator for instruction streams
//!
//! Runs a stream against a caller-supplied [`Runtime`]. It is meant for
//! checking what a patched method does, not for speed: every call goes
//! through the runtime and execution is capped by a step limit.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::il::core::{FieldRef, InstructionStream, LabelId, MethodRef, Opcode, Operand};

pub const DEFAULT_STEP_LIMIT: usize = 10_000;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(value) => *value != 0,
            Value::Str(_) | Value::Object(_) => true,
        }
    }

    pub fn bool(value: bool) -> Self {
        Value::Int(i64::from(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ExecError {
    #[error("stack underflow at instruction {index}")]
    StackUnderflow { index: usize },

    #[error("instruction {index} expected {expected}")]
    TypeMismatch { index: usize, expected: &'static str },

    #[error("jump to {0}, which no instruction carries")]
    DanglingLabel(LabelId),

    #[error("instruction {index} reads unset slot {slot}")]
    UnknownSlot { index: usize, slot: u16 },

    #[error("instruction {index} has no {field} to read")]
    UnknownField { index: usize, field: FieldRef },

    #[error("gave up after {0} steps")]
    StepLimit(usize),

    #[error("execution ran past the last instruction")]
    FellOffEnd,

    #[error("{method} failed: {reason}")]
    Call { method: MethodRef, reason: String },
}

/// What the evaluated code can reach outside its own frame.
pub trait Runtime {
    fn load_static(&mut self, field: &FieldRef) -> Option<Value>;

    /// Invoke `method`. Must return `Some` exactly when the method returns a value.
    fn invoke(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>, ExecError>;
}

/// One activation of a stream.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub args: Vec<Value>,
    pub locals: Vec<Value>,
}

impl Frame {
    pub fn with_locals(locals: Vec<Value>) -> Self {
        Self {
            args: Vec::new(),
            locals,
        }
    }
}

/// Execute `stream` until `ret`; returns the value on top of the stack, if any.
pub fn execute(
    stream: &InstructionStream,
    frame: &mut Frame,
    runtime: &mut dyn Runtime,
    step_limit: usize,
) -> Result<Option<Value>, ExecError> {
    let landing: HashMap<LabelId, usize> = stream
        .iter()
        .enumerate()
        .flat_map(|(idx, ix)| ix.labels.iter().map(move |label| (*label, idx)))
        .collect();
    let jump = |label: &LabelId| landing.get(label).copied().ok_or(ExecError::DanglingLabel(*label));

    let mut stack: Vec<Value> = Vec::new();
    let mut pc = 0;
    let mut steps = 0;

    loop {
        steps += 1;
        if steps > step_limit {
            return Err(ExecError::StepLimit(step_limit));
        }
        let ix = stream.get(pc).ok_or(ExecError::FellOffEnd)?;
        let index = pc;
        pc += 1;

        let pop = |stack: &mut Vec<Value>| stack.pop().ok_or(ExecError::StackUnderflow { index });

        match (ix.opcode, &ix.operand) {
            (Opcode::Nop, _) => {}
            (Opcode::LdStr, Operand::Str(text)) => stack.push(Value::Str(text.clone())),
            (Opcode::LdcI4, Operand::Int(value)) => stack.push(Value::Int(*value)),
            (Opcode::LdLoc, Operand::Local(slot)) => {
                let value = frame
                    .locals
                    .get(*slot as usize)
                    .ok_or(ExecError::UnknownSlot { index, slot: *slot })?;
                stack.push(value.clone());
            }
            (Opcode::LdArg, Operand::Local(slot)) => {
                let value = frame
                    .args
                    .get(*slot as usize)
                    .ok_or(ExecError::UnknownSlot { index, slot: *slot })?;
                stack.push(value.clone());
            }
            (Opcode::StLoc, Operand::Local(slot)) => {
                let value = pop(&mut stack)?;
                let slot = *slot as usize;
                if frame.locals.len() <= slot {
                    frame.locals.resize(slot + 1, Value::Null);
                }
                frame.locals[slot] = value;
            }
            (Opcode::LdFld, Operand::Field(field)) => {
                let object = pop(&mut stack)?;
                let value = object.field(&field.name).ok_or_else(|| ExecError::UnknownField {
                    index,
                    field: field.clone(),
                })?;
                stack.push(value.clone());
            }
            (Opcode::LdsFld, Operand::Field(field)) => {
                let value = runtime.load_static(field).ok_or_else(|| ExecError::UnknownField {
                    index,
                    field: field.clone(),
                })?;
                stack.push(value);
            }
            (Opcode::Call | Opcode::CallVirt, Operand::Method(method)) => {
                let mut argc = method.arity as usize;
                if ix.opcode == Opcode::CallVirt {
                    argc += 1;
                }
                if stack.len() < argc {
                    return Err(ExecError::StackUnderflow { index });
                }
                let args = stack.split_off(stack.len() - argc);
                match (runtime.invoke(method, args)?, method.returns_value) {
                    (Some(value), true) => stack.push(value),
                    (None, false) => {}
                    _ => {
                        return Err(ExecError::Call {
                            method: method.clone(),
                            reason: "return value does not match signature".into(),
                        })
                    }
                }
            }
            (Opcode::Br, Operand::Label(label)) => pc = jump(label)?,
            (Opcode::BrTrue, Operand::Label(label)) => {
                if pop(&mut stack)?.is_truthy() {
                    pc = jump(label)?;
                }
            }
            (Opcode::BrFalse, Operand::Label(label)) => {
                if !pop(&mut stack)?.is_truthy() {
                    pc = jump(label)?;
                }
            }
            (Opcode::Beq | Opcode::Bne, Operand::Label(label)) => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                if (a == b) == (ix.opcode == Opcode::Beq) {
                    pc = jump(label)?;
                }
            }
            (Opcode::Ret, _) => return Ok(stack.pop()),
            (Opcode::Pop, _) => {
                pop(&mut stack)?;
            }
            (Opcode::Dup, _) => {
                let top = pop(&mut stack)?;
                stack.push(top.clone());
                stack.push(top);
            }
            (opcode, _) => {
                return Err(ExecError::TypeMismatch {
                    index,
                    expected: operand_description(opcode),
                })
            }
        }
    }
}

fn operand_description(opcode: Opcode) -> &'static str {
    use crate::il::core::OperandKind;
    match opcode.operand_kind() {
        OperandKind::None => "no operand",
        OperandKind::Str => "a string operand",
        OperandKind::Int => "an integer operand",
        OperandKind::Local => "a slot operand",
        OperandKind::Label => "a label operand",
        OperandKind::Field => "a field operand",
        OperandKind::Method => "a method operand",
    }
}
