use thiserror::Error;

use crate::il::core::instruction::OperandKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Direction {
    #[strum(serialize = "forward")]
    Forward,
    #[strum(serialize = "backward")]
    Backward,
}

/// Why a single patch operation could not be carried out.
///
/// None of these leave a partially edited stream behind.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PatchError {
    #[error("no `{pattern}` found scanning {direction} from {}", describe_position(.from))]
    PatternNotFound {
        pattern: String,
        direction: Direction,
        from: Option<usize>,
    },

    #[error("operand at {} is {found}, expected {expected}", describe_position(.index))]
    OperandTypeMismatch {
        index: Option<usize>,
        expected: OperandKind,
        found: OperandKind,
    },

    #[error("insertion point {insertion_point} is not after the previous patch at {floor}")]
    PatchConflict { insertion_point: usize, floor: usize },

    #[error("index {index} is out of bounds for a stream of {len} instructions")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("instruction {index} carries labels and has no successor to hand them to")]
    StrandedLabels { index: usize },

    #[error("every label id is already in use")]
    LabelsExhausted,
}

fn describe_position(position: &Option<usize>) -> String {
    match position {
        Some(index) => format!("instruction {index}"),
        None => "stream start".to_string(),
    }
}
