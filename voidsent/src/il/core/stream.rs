use std::{collections::BTreeMap, ops::Range};

use crate::il::{
    core::{
        instruction::Instruction,
        labels::{LabelAllocator, LabelId},
    },
    error::PatchError,
};

/// An editable method body.
///
/// Every edit keeps the landing rule intact: a label that was carried by
/// some instruction before the edit is carried by exactly one instruction
/// after it.
///
/// The stream also remembers where the last patch applied to it ended, so
/// any later patch has to land past that point.
#[derive(Clone, Debug, Default)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    labels: LabelAllocator,
    patch_floor: Option<usize>,
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let labels = LabelAllocator::for_instructions(&instructions);
        Self {
            instructions,
            labels,
            patch_floor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// A label guaranteed distinct from every label this stream has seen.
    pub fn new_label(&mut self) -> Result<LabelId, PatchError> {
        self.labels.new_label()
    }

    /// Index of the instruction the most recent patch was spliced in front of.
    pub fn patch_floor(&self) -> Option<usize> {
        self.patch_floor
    }

    pub(crate) fn set_patch_floor(&mut self, floor: usize) {
        self.patch_floor = Some(floor);
    }

    /// Splice `block` in front of the instruction at `index`.
    ///
    /// Labels carried by the displaced instruction move to the first
    /// instruction of `block`, so jumps that used to land on `index` now
    /// land on the start of the block. `index == len()` appends.
    /// Returns the range the block now occupies.
    pub fn insert_before(
        &mut self,
        index: usize,
        mut block: Vec<Instruction>,
    ) -> Result<Range<usize>, PatchError> {
        if index > self.instructions.len() {
            return Err(PatchError::IndexOutOfBounds {
                index,
                len: self.instructions.len(),
            });
        }
        if block.is_empty() {
            return Ok(index..index);
        }

        if let Some(displaced) = self.instructions.get_mut(index) {
            let moved = displaced.take_labels();
            for label in moved {
                block[0].add_label(label);
            }
        }
        for ix in &block {
            for label in &ix.labels {
                self.labels.reserve(*label);
            }
            if let Some(target) = ix.branch_target() {
                self.labels.reserve(target);
            }
        }

        let range = index..index + block.len();
        self.instructions.splice(index..index, block);
        Ok(range)
    }

    /// Remove the instruction at `index`, handing its labels to the
    /// instruction that takes its place.
    pub fn remove(&mut self, index: usize) -> Result<Instruction, PatchError> {
        let len = self.instructions.len();
        if index >= len {
            return Err(PatchError::IndexOutOfBounds { index, len });
        }
        if !self.instructions[index].labels.is_empty() && index + 1 == len {
            return Err(PatchError::StrandedLabels { index });
        }

        let mut removed = self.instructions.remove(index);
        let moved = removed.take_labels();
        if let Some(successor) = self.instructions.get_mut(index) {
            for label in moved {
                successor.add_label(label);
            }
        }
        Ok(removed)
    }

    /// Attach an extra label to the instruction at `index`.
    pub fn attach_label(&mut self, index: usize, label: LabelId) -> Result<(), PatchError> {
        let len = self.instructions.len();
        let ix = self
            .instructions
            .get_mut(index)
            .ok_or(PatchError::IndexOutOfBounds { index, len })?;
        ix.add_label(label);
        self.labels.reserve(label);
        Ok(())
    }

    /// Index of the instruction carrying `label`, if any.
    pub fn landing_index(&self, label: LabelId) -> Option<usize> {
        self.instructions.iter().position(|ix| ix.carries(label))
    }

    /// Every carried label and the instructions that carry it.
    pub fn label_owners(&self) -> BTreeMap<LabelId, Vec<usize>> {
        let mut owners: BTreeMap<LabelId, Vec<usize>> = BTreeMap::new();
        for (idx, ix) in self.instructions.iter().enumerate() {
            for label in &ix.labels {
                owners.entry(*label).or_default().push(idx);
            }
        }
        owners
    }
}

impl PartialEq for InstructionStream {
    fn eq(&self, other: &Self) -> bool {
        self.instructions == other.instructions
    }
}

impl FromIterator<Instruction> for InstructionStream {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
