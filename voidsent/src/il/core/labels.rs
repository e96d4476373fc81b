use std::fmt;

use serde::{Deserialize, Serialize};

use crate::il::{core::instruction::Instruction, error::PatchError};

/// Opaque jump target. Printed as `L<n>` in listings.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Issues labels that never collide with anything already present in a stream.
///
/// The allocator keeps a high-water mark, so a label handed out once is
/// never handed out again even if the stream later stops referencing it.
/// The mark is wider than a label so that reserving `L4294967295` leaves
/// nothing to issue instead of wrapping around.
#[derive(Clone, Debug, Default)]
pub struct LabelAllocator {
    next: u64,
}

impl LabelAllocator {
    /// Build an allocator that starts above every label carried by or
    /// branched to from `instructions`.
    pub fn for_instructions(instructions: &[Instruction]) -> Self {
        let mut allocator = Self::default();
        for ix in instructions {
            for label in &ix.labels {
                allocator.reserve(*label);
            }
            if let Some(target) = ix.branch_target() {
                allocator.reserve(target);
            }
        }
        allocator
    }

    pub fn new_label(&mut self) -> Result<LabelId, PatchError> {
        let id = u32::try_from(self.next).map_err(|_| PatchError::LabelsExhausted)?;
        self.next += 1;
        Ok(LabelId(id))
    }

    /// Make sure `label` (and everything below it) is never issued.
    pub fn reserve(&mut self, label: LabelId) {
        self.next = self.next.max(u64::from(label.0) + 1);
    }
}
