//! Analysis modules for locating patch points in a method body
//!
//! This module contains the instruction predicates, the search cursor used
//! to walk a stream, label integrity checks and literal scanning.

pub mod cursor;
pub mod pattern;
pub mod scanner;
pub mod validate;

// Re-export commonly used analysis functionality
pub use cursor::Cursor;
pub use pattern::CodeMatch;
pub use scanner::{has_any_string_in_stream, missing_strings};
pub use validate::{validate, LabelViolation};
