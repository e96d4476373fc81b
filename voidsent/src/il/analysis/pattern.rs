use std::fmt;

use serde::{Deserialize, Serialize};

use crate::il::core::{Instruction, LabelId, Opcode, Operand};

/// A predicate over a single instruction.
///
/// Matches are meant to be specific: an opcode alone is fine for a branch
/// whose operand gets captured, but anything used to anchor a search should
/// pin the operand literal too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum CodeMatch {
    /// Any instruction with this opcode.
    Opcode { opcode: Opcode },
    /// Opcode plus an exact operand.
    Exact { opcode: Opcode, operand: Operand },
    /// The instruction a label lands on.
    Carries { label: LabelId },
}

impl CodeMatch {
    pub fn opcode(opcode: Opcode) -> Self {
        Self::Opcode { opcode }
    }

    pub fn exact(opcode: Opcode, operand: Operand) -> Self {
        Self::Exact { opcode, operand }
    }

    pub fn ldstr(text: impl Into<String>) -> Self {
        Self::exact(Opcode::LdStr, Operand::Str(text.into()))
    }

    pub fn ldc_i4(value: i64) -> Self {
        Self::exact(Opcode::LdcI4, Operand::Int(value))
    }

    pub fn ldloc(slot: u16) -> Self {
        Self::exact(Opcode::LdLoc, Operand::Local(slot))
    }

    pub fn carries(label: LabelId) -> Self {
        Self::Carries { label }
    }

    pub fn matches(&self, ix: &Instruction) -> bool {
        match self {
            CodeMatch::Opcode { opcode } => ix.opcode == *opcode,
            CodeMatch::Exact { opcode, operand } => ix.opcode == *opcode && ix.operand == *operand,
            CodeMatch::Carries { label } => ix.carries(*label),
        }
    }
}

impl fmt::Display for CodeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeMatch::Opcode { opcode } => write!(f, "{opcode} *"),
            CodeMatch::Exact { opcode, operand } => write!(f, "{opcode} {operand}"),
            CodeMatch::Carries { label } => write!(f, "{label}:"),
        }
    }
}
