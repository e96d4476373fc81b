use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::il::{
    analysis::CodeMatch,
    core::{FieldRef, Instruction, LabelId, MethodRef, Opcode},
};

/// How one call site is patched. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchSpec {
    pub name: String,
    /// Searched forward; the last match must be a branch, its target is captured.
    pub anchor: Vec<CodeMatch>,
    pub insertion: InsertionSearch,
    pub block: OverrideBlock,
}

/// How the insertion point is found once the anchor branch is known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "search", rename_all = "snake_case")]
pub enum InsertionSearch {
    /// Scan backward from the anchor; the last pattern lands on the insertion point.
    Backward { pattern: Vec<CodeMatch> },
    /// Jump to the instruction carrying the captured label, capture the field
    /// of the next `capture` match, then scan forward through `pattern`.
    FollowBranch {
        capture: CodeMatch,
        pattern: Vec<CodeMatch>,
    },
}

/// `base + "_" + <entity in local slot>`, computed by the patched code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExpr {
    pub base: String,
    pub entity_local: u16,
}

impl KeyExpr {
    pub fn new(base: impl Into<String>, entity_local: u16) -> Self {
        Self {
            base: base.into(),
            entity_local,
        }
    }

    /// Pushes the base string and the entity, the two arguments of the callbacks.
    pub fn emit(&self) -> SmallVec<[Instruction; 2]> {
        smallvec![
            Instruction::ldstr(self.base.clone()),
            Instruction::ldloc(self.entity_local),
        ]
    }
}

/// The code spliced in front of the insertion point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum OverrideBlock {
    /// `check(key) ? fetch(key) : <original>`, rejoining at the merge label.
    Value {
        key: KeyExpr,
        check: MethodRef,
        fetch: MethodRef,
    },
    /// `if (check(subject.field)) { notify(); return result; }`
    Guard {
        subject_local: u16,
        check: MethodRef,
        notify: MethodRef,
        result: i64,
    },
}

impl OverrideBlock {
    /// Whether building this block needs a field captured during the search.
    pub fn needs_field(&self) -> bool {
        matches!(self, OverrideBlock::Guard { .. })
    }

    /// Instructions this block adds to a stream.
    pub fn instruction_count(&self) -> usize {
        match self {
            OverrideBlock::Value { key, .. } => 2 * key.emit().len() + 4,
            OverrideBlock::Guard { .. } => 7,
        }
    }

    /// Build the block. `skip` must land on the instruction following it.
    pub fn build(&self, merge: LabelId, field: Option<&FieldRef>, skip: LabelId) -> Vec<Instruction> {
        match self {
            OverrideBlock::Value { key, check, fetch } => {
                let mut block = Vec::with_capacity(self.instruction_count());
                block.extend(key.emit());
                block.push(Instruction::call(check.clone()));
                block.push(Instruction::branch(Opcode::BrFalse, skip));
                block.extend(key.emit());
                block.push(Instruction::call(fetch.clone()));
                block.push(Instruction::branch(Opcode::Br, merge));
                block
            }
            OverrideBlock::Guard {
                subject_local,
                check,
                notify,
                result,
            } => {
                let mut block = Vec::with_capacity(self.instruction_count());
                block.push(Instruction::ldloc(*subject_local));
                if let Some(field) = field {
                    block.push(Instruction::ldfld(field.clone()));
                }
                block.push(Instruction::call(check.clone()));
                block.push(Instruction::branch(Opcode::BrFalse, skip));
                block.push(Instruction::call(notify.clone()));
                block.push(Instruction::ldc_i4(*result));
                block.push(Instruction::simple(Opcode::Ret));
                block
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::il::core::Operand;

    #[test]
    fn value_block_layout() {
        let block = OverrideBlock::Value {
            key: KeyExpr::new("Base", 0),
            check: MethodRef::new("P", "Check", 2),
            fetch: MethodRef::new("P", "Fetch", 2),
        };
        let built = block.build(LabelId(2), None, LabelId(7));

        assert_eq!(built.len(), block.instruction_count());
        assert_eq!(built.len(), 8);
        let opcodes: Vec<Opcode> = built.iter().map(|ix| ix.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::LdStr,
                Opcode::LdLoc,
                Opcode::Call,
                Opcode::BrFalse,
                Opcode::LdStr,
                Opcode::LdLoc,
                Opcode::Call,
                Opcode::Br,
            ]
        );
        assert_eq!(built[3].operand, Operand::Label(LabelId(7)));
        assert_eq!(built[7].operand, Operand::Label(LabelId(2)));
        assert!(built.iter().all(|ix| ix.labels.is_empty()));
    }

    #[test]
    fn guard_block_loads_captured_field() {
        let block = OverrideBlock::Guard {
            subject_local: 0,
            check: MethodRef::new("T", "LocationCheck", 1),
            notify: MethodRef::new("T", "ShowMessage", 0).void(),
            result: 0,
        };
        let field = FieldRef::new("DisplayClass", "location");
        let built = block.build(LabelId(0), Some(&field), LabelId(5));

        assert_eq!(built.len(), block.instruction_count());
        assert_eq!(built[1], Instruction::ldfld(field));
        assert_eq!(built[3], Instruction::branch(Opcode::BrFalse, LabelId(5)));
        assert_eq!(built[6].opcode, Opcode::Ret);
    }
}
