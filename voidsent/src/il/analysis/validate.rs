use std::collections::BTreeMap;

use thiserror::Error;

use crate::il::core::{InstructionStream, LabelId, Opcode, OperandKind};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LabelViolation {
    #[error("instruction {index} jumps to {label}, which no instruction carries")]
    Dangling { index: usize, label: LabelId },

    #[error("{label} is carried by more than one instruction: {owners:?}")]
    Duplicate { label: LabelId, owners: Vec<usize> },

    #[error("instruction {index} ({opcode}) has a {found} operand, expected {expected}")]
    OperandMismatch {
        index: usize,
        opcode: Opcode,
        expected: OperandKind,
        found: OperandKind,
    },
}

/// Check that every jump has exactly one landing instruction.
///
/// Returns all violations found, in stream order.
pub fn validate(stream: &InstructionStream) -> Vec<LabelViolation> {
    let owners: BTreeMap<LabelId, Vec<usize>> = stream.label_owners();
    let mut violations = Vec::new();

    for (index, ix) in stream.iter().enumerate() {
        if !ix.operand_fits() {
            violations.push(LabelViolation::OperandMismatch {
                index,
                opcode: ix.opcode,
                expected: ix.opcode.operand_kind(),
                found: ix.operand.kind(),
            });
            continue;
        }
        if let Some(label) = ix.branch_target() {
            if !owners.contains_key(&label) {
                violations.push(LabelViolation::Dangling { index, label });
            }
        }
    }

    for (label, carriers) in owners {
        if carriers.len() > 1 {
            violations.push(LabelViolation::Duplicate {
                label,
                owners: carriers,
            });
        }
    }

    violations
}
