//! Core method-body representation
//!
//! This module contains the instruction model, the editable stream, label
//! allocation and the textual listing format streams are read from and
//! written to.

pub mod assembly;
pub mod instruction;
pub mod labels;
pub mod stream;

// Re-export commonly used core functionality
pub use assembly::{assemble, disassemble, AssemblyError};
pub use instruction::{
    FieldRef, FromOperand, Instruction, MethodRef, Opcode, Operand, OperandKind,
};
pub use labels::{LabelAllocator, LabelId};
pub use stream::InstructionStream;
