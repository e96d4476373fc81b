use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::il::core::labels::LabelId;

/// Operation kinds understood by the patcher.
///
/// This is a small CIL-like subset: enough to express the call sites we
/// patch and the blocks we splice into them. Names match the listing syntax.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Opcode {
    #[strum(serialize = "nop")]
    #[serde(rename = "nop")]
    Nop,
    #[strum(serialize = "ldstr")]
    #[serde(rename = "ldstr")]
    LdStr,
    #[strum(serialize = "ldc.i4")]
    #[serde(rename = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldloc")]
    #[serde(rename = "ldloc")]
    LdLoc,
    #[strum(serialize = "stloc")]
    #[serde(rename = "stloc")]
    StLoc,
    #[strum(serialize = "ldarg")]
    #[serde(rename = "ldarg")]
    LdArg,
    #[strum(serialize = "ldfld")]
    #[serde(rename = "ldfld")]
    LdFld,
    #[strum(serialize = "ldsfld")]
    #[serde(rename = "ldsfld")]
    LdsFld,
    #[strum(serialize = "call")]
    #[serde(rename = "call")]
    Call,
    #[strum(serialize = "callvirt")]
    #[serde(rename = "callvirt")]
    CallVirt,
    #[strum(serialize = "br")]
    #[serde(rename = "br")]
    Br,
    #[strum(serialize = "brtrue")]
    #[serde(rename = "brtrue")]
    BrTrue,
    #[strum(serialize = "brfalse")]
    #[serde(rename = "brfalse")]
    BrFalse,
    #[strum(serialize = "beq")]
    #[serde(rename = "beq")]
    Beq,
    #[strum(serialize = "bne")]
    #[serde(rename = "bne")]
    Bne,
    #[strum(serialize = "ret")]
    #[serde(rename = "ret")]
    Ret,
    #[strum(serialize = "pop")]
    #[serde(rename = "pop")]
    Pop,
    #[strum(serialize = "dup")]
    #[serde(rename = "dup")]
    Dup,
}

impl Opcode {
    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            Nop | Ret | Pop | Dup => OperandKind::None,
            LdStr => OperandKind::Str,
            LdcI4 => OperandKind::Int,
            LdLoc | StLoc | LdArg => OperandKind::Local,
            LdFld | LdsFld => OperandKind::Field,
            Call | CallVirt => OperandKind::Method,
            Br | BrTrue | BrFalse | Beq | Bne => OperandKind::Label,
        }
    }

    pub fn is_branch(self) -> bool {
        self.operand_kind() == OperandKind::Label
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum OperandKind {
    #[strum(serialize = "nothing")]
    None,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "integer")]
    Int,
    #[strum(serialize = "local slot")]
    Local,
    #[strum(serialize = "label")]
    Label,
    #[strum(serialize = "field reference")]
    Field,
    #[strum(serialize = "method reference")]
    Method,
}

/// `Owner::name`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

/// `[void] Owner::name/arity`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub arity: u8,
    #[serde(default = "default_returns_value")]
    pub returns_value: bool,
}

fn default_returns_value() -> bool {
    true
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, arity: u8) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            arity,
            returns_value: true,
        }
    }

    pub fn void(mut self) -> Self {
        self.returns_value = false;
        self
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.returns_value {
            f.write_str("void ")?;
        }
        write!(f, "{}::{}/{}", self.owner, self.name, self.arity)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    None,
    Str(String),
    Int(i64),
    Local(u16),
    Label(LabelId),
    Field(FieldRef),
    Method(MethodRef),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Str(_) => OperandKind::Str,
            Operand::Int(_) => OperandKind::Int,
            Operand::Local(_) => OperandKind::Local,
            Operand::Label(_) => OperandKind::Label,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            // JSON escaping keeps the listing format unambiguous
            Operand::Str(text) => match serde_json::to_string(text) {
                Ok(quoted) => f.write_str(&quoted),
                Err(_) => Err(fmt::Error),
            },
            Operand::Int(value) => write!(f, "{value}"),
            Operand::Local(slot) => write!(f, "{slot}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Method(method) => write!(f, "{method}"),
        }
    }
}

/// Typed extraction of an operand, used when capturing from a match.
pub trait FromOperand: Sized {
    const KIND: OperandKind;

    fn from_operand(operand: &Operand) -> Option<Self>;
}

impl FromOperand for LabelId {
    const KIND: OperandKind = OperandKind::Label;

    fn from_operand(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Label(label) => Some(*label),
            _ => None,
        }
    }
}

impl FromOperand for FieldRef {
    const KIND: OperandKind = OperandKind::Field;

    fn from_operand(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Field(field) => Some(field.clone()),
            _ => None,
        }
    }
}

impl FromOperand for MethodRef {
    const KIND: OperandKind = OperandKind::Method;

    fn from_operand(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Method(method) => Some(method.clone()),
            _ => None,
        }
    }
}

impl FromOperand for String {
    const KIND: OperandKind = OperandKind::Str;

    fn from_operand(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Str(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl FromOperand for i64 {
    const KIND: OperandKind = OperandKind::Int;

    fn from_operand(operand: &Operand) -> Option<Self> {
        match operand {
            Operand::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// One operation of a method body plus the labels that land on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub labels: SmallVec<[LabelId; 2]>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self {
            opcode,
            operand,
            labels: SmallVec::new(),
        }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    pub fn ldstr(text: impl Into<String>) -> Self {
        Self::new(Opcode::LdStr, Operand::Str(text.into()))
    }

    pub fn ldc_i4(value: i64) -> Self {
        Self::new(Opcode::LdcI4, Operand::Int(value))
    }

    pub fn ldloc(slot: u16) -> Self {
        Self::new(Opcode::LdLoc, Operand::Local(slot))
    }

    pub fn ldfld(field: FieldRef) -> Self {
        Self::new(Opcode::LdFld, Operand::Field(field))
    }

    pub fn call(method: MethodRef) -> Self {
        Self::new(Opcode::Call, Operand::Method(method))
    }

    pub fn branch(opcode: Opcode, target: LabelId) -> Self {
        Self::new(opcode, Operand::Label(target))
    }

    pub fn with_label(mut self, label: LabelId) -> Self {
        self.add_label(label);
        self
    }

    /// Attach `label`; labels have set semantics so duplicates are ignored.
    pub fn add_label(&mut self, label: LabelId) {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }

    pub fn take_labels(&mut self) -> SmallVec<[LabelId; 2]> {
        std::mem::take(&mut self.labels)
    }

    pub fn carries(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }

    pub fn branch_target(&self) -> Option<LabelId> {
        match (self.opcode.is_branch(), &self.operand) {
            (true, Operand::Label(label)) => Some(*label),
            _ => None,
        }
    }

    pub fn operand_fits(&self) -> bool {
        self.opcode.operand_kind() == self.operand.kind()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.opcode)?;
        if !matches!(self.operand, Operand::None) {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn opcode_names_parse_back() {
        use strum::IntoEnumIterator as _;

        for opcode in Opcode::iter() {
            assert_eq!(Opcode::from_str(&opcode.to_string()).ok(), Some(opcode));
        }
        assert_eq!(Opcode::from_str("LDC.I4").ok(), Some(Opcode::LdcI4));
    }

    #[test]
    fn labels_are_a_set() {
        let ix = Instruction::simple(Opcode::Nop)
            .with_label(LabelId(1))
            .with_label(LabelId(1))
            .with_label(LabelId(2));
        assert_eq!(ix.labels.as_slice(), &[LabelId(1), LabelId(2)]);
    }

    #[test]
    fn displays_in_listing_syntax() {
        let call = Instruction::call(MethodRef::new("Patches.Tent", "ShowMessage", 0).void())
            .with_label(LabelId(4));
        assert_eq!(call.to_string(), "L4: call void Patches.Tent::ShowMessage/0");
        assert_eq!(
            Instruction::ldstr("say \"hi\"").to_string(),
            r#"ldstr "say \"hi\"""#
        );
    }

    #[test]
    fn branch_target_only_for_branches() {
        assert_eq!(
            Instruction::branch(Opcode::BrFalse, LabelId(9)).branch_target(),
            Some(LabelId(9))
        );
        assert_eq!(Instruction::ldloc(1).branch_target(), None);
    }
}
