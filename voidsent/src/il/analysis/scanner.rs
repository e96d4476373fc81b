use crate::il::core::{InstructionStream, Operand};

/// Check if any of the given strings is loaded somewhere in the stream
pub fn has_any_string_in_stream<'a>(
    stream: &InstructionStream,
    strings: &[&'a str],
) -> Option<&'a str> {
    for ix in stream {
        if let Operand::Str(text) = &ix.operand {
            if let Some(found) = strings.iter().find(|pattern| **pattern == text.as_str()) {
                return Some(*found);
            }
        }
    }

    None
}

/// The subset of `strings` that the stream never loads
pub fn missing_strings<'a>(stream: &InstructionStream, strings: &[&'a str]) -> Vec<&'a str> {
    strings
        .iter()
        .copied()
        .filter(|needle| has_any_string_in_stream(stream, &[*needle]).is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::core::Instruction;

    #[test]
    fn finds_first_listed_literal_present() {
        let stream = InstructionStream::new(vec![
            Instruction::ldstr("b"),
            Instruction::ldstr("c"),
        ]);
        assert_eq!(has_any_string_in_stream(&stream, &["a", "c"]), Some("c"));
        assert_eq!(has_any_string_in_stream(&stream, &["z"]), None);
        assert_eq!(missing_strings(&stream, &["a", "b", "z"]), vec!["a", "z"]);
    }
}
