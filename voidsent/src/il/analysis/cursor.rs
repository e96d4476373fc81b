use crate::il::{
    analysis::pattern::CodeMatch,
    core::{FromOperand, Instruction, InstructionStream, OperandKind},
    error::{Direction, PatchError},
};

/// A position over a stream that moves by pattern search.
///
/// Searches always start strictly after (forward) or strictly before
/// (backward) the current position and stop at the first hit, so a chain
/// of calls is deterministic. A failed search leaves the position alone.
#[derive(Clone, Debug)]
pub struct Cursor<'s> {
    stream: &'s InstructionStream,
    pos: Option<usize>,
}

impl<'s> Cursor<'s> {
    /// Positioned before the first instruction.
    pub fn new(stream: &'s InstructionStream) -> Self {
        Self { stream, pos: None }
    }

    /// Positioned on `index`, or before the start for `None`.
    pub fn at(stream: &'s InstructionStream, index: Option<usize>) -> Self {
        Self { stream, pos: index }
    }

    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    pub fn instruction(&self) -> Option<&'s Instruction> {
        self.stream.get(self.pos?)
    }

    pub fn match_forward(&mut self, pattern: &CodeMatch) -> Result<&mut Self, PatchError> {
        let start = self.pos.map_or(0, |pos| pos + 1);
        let found = self
            .stream
            .instructions()
            .get(start..)
            .and_then(|rest| rest.iter().position(|ix| pattern.matches(ix)))
            .map(|offset| start + offset);

        match found {
            Some(idx) => {
                self.pos = Some(idx);
                Ok(self)
            }
            None => Err(PatchError::PatternNotFound {
                pattern: pattern.to_string(),
                direction: Direction::Forward,
                from: self.pos,
            }),
        }
    }

    pub fn match_backward(&mut self, pattern: &CodeMatch) -> Result<&mut Self, PatchError> {
        let end = self.pos.unwrap_or(0).min(self.stream.len());
        let found = self.stream.instructions()[..end]
            .iter()
            .rposition(|ix| pattern.matches(ix));

        match found {
            Some(idx) => {
                self.pos = Some(idx);
                Ok(self)
            }
            None => Err(PatchError::PatternNotFound {
                pattern: pattern.to_string(),
                direction: Direction::Backward,
                from: self.pos,
            }),
        }
    }

    /// Run a chain of forward matches; each starts where the last stopped.
    pub fn match_forward_all(&mut self, patterns: &[CodeMatch]) -> Result<&mut Self, PatchError> {
        for pattern in patterns {
            self.match_forward(pattern)?;
        }
        Ok(self)
    }

    pub fn match_backward_all(
        &mut self,
        patterns: &[CodeMatch],
    ) -> Result<&mut Self, PatchError> {
        for pattern in patterns {
            self.match_backward(pattern)?;
        }
        Ok(self)
    }

    /// The operand of the current instruction, decoded as `T`.
    pub fn capture<T: FromOperand>(&self) -> Result<T, PatchError> {
        let ix = self.instruction().ok_or(PatchError::OperandTypeMismatch {
            index: self.pos,
            expected: T::KIND,
            found: OperandKind::None,
        })?;
        T::from_operand(&ix.operand).ok_or(PatchError::OperandTypeMismatch {
            index: self.pos,
            expected: T::KIND,
            found: ix.operand.kind(),
        })
    }
}
