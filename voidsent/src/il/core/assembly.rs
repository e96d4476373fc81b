use std::str::FromStr;

use thiserror::Error;

use crate::il::core::{
    instruction::{FieldRef, Instruction, MethodRef, Opcode, Operand, OperandKind},
    labels::LabelId,
    stream::InstructionStream,
};

/// Errors that can occur while reading a method listing.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("unknown opcode '{opcode}' on line {line}")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("{opcode} on line {line} expects a {expected} operand")]
    MissingOperand {
        line: usize,
        opcode: Opcode,
        expected: OperandKind,
    },

    #[error("{opcode} on line {line} takes no operand, got '{token}'")]
    UnexpectedOperand {
        line: usize,
        opcode: Opcode,
        token: String,
    },

    #[error("bad label '{token}' on line {line}")]
    BadLabel { line: usize, token: String },

    #[error("failed to parse integer '{token}' on line {line}")]
    BadInteger {
        line: usize,
        token: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("bad string literal on line {line}")]
    BadString {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("bad member reference '{token}' on line {line}")]
    BadMember { line: usize, token: String },

    #[error("labels on line {line} are not followed by an instruction")]
    DanglingLabels { line: usize },
}

/// Read a textual method listing.
///
/// One instruction per line, optionally prefixed with `L<n>:` labels. A line
/// holding only labels attaches them to the next instruction. Blank lines
/// and lines starting with `;` or `//` are ignored.
///
/// ```text
/// L0: ldloc 1
/// ldc.i4 1
/// beq L1
/// ldstr "Strings\\StringsFromCSFiles:SocialPage_Relationship_Husband"
/// callvirt LocalizedContentManager::LoadString/1
/// br L2
/// ```
pub fn assemble(src: &str) -> Result<InstructionStream, AssemblyError> {
    let mut out = Vec::new();
    let mut pending: Vec<LabelId> = Vec::new();
    let mut pending_line = 0;

    for (idx, raw_line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let mut rest = raw_line.trim();
        if rest.is_empty() || rest.starts_with(';') || rest.starts_with("//") {
            continue;
        }

        while let Some((token, tail)) = split_label_prefix(rest) {
            pending.push(parse_label(line_no, token)?);
            pending_line = line_no;
            rest = tail.trim_start();
        }
        if rest.is_empty() {
            continue;
        }

        let (op_tok, operand_tok) = match rest.split_once(char::is_whitespace) {
            Some((op, tail)) => (op, tail.trim()),
            None => (rest, ""),
        };
        let opcode = Opcode::from_str(op_tok).map_err(|_| AssemblyError::UnknownOpcode {
            line: line_no,
            opcode: op_tok.to_string(),
        })?;
        let operand = parse_operand(line_no, opcode, operand_tok)?;

        let mut ix = Instruction::new(opcode, operand);
        for label in pending.drain(..) {
            ix.add_label(label);
        }
        out.push(ix);
    }

    if !pending.is_empty() {
        return Err(AssemblyError::DanglingLabels { line: pending_line });
    }

    Ok(InstructionStream::new(out))
}

/// Write a stream back out in the form [`assemble`] reads.
pub fn disassemble(stream: &InstructionStream) -> String {
    let mut out = String::new();
    for ix in stream {
        out.push_str(&ix.to_string());
        out.push('\n');
    }
    out
}

fn split_label_prefix(text: &str) -> Option<(&str, &str)> {
    let (token, tail) = text.split_once(':')?;
    // `Owner::name` operands also contain colons; only a bare `L<n>` counts
    let is_label = token.len() > 1
        && token.starts_with('L')
        && token[1..].bytes().all(|b| b.is_ascii_digit())
        && !tail.starts_with(':');
    is_label.then_some((token, tail))
}

fn parse_label(line: usize, token: &str) -> Result<LabelId, AssemblyError> {
    token
        .strip_prefix('L')
        .and_then(|digits| digits.parse::<u32>().ok())
        .map(LabelId)
        .ok_or_else(|| AssemblyError::BadLabel {
            line,
            token: token.to_string(),
        })
}

fn parse_int<T: FromStr<Err = std::num::ParseIntError>>(
    line: usize,
    token: &str,
) -> Result<T, AssemblyError> {
    token.parse::<T>().map_err(|source| AssemblyError::BadInteger {
        line,
        token: token.to_string(),
        source,
    })
}

fn parse_field(line: usize, token: &str) -> Result<FieldRef, AssemblyError> {
    match token.rsplit_once("::") {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !token.contains(char::is_whitespace) =>
        {
            Ok(FieldRef::new(owner, name))
        }
        _ => Err(AssemblyError::BadMember {
            line,
            token: token.to_string(),
        }),
    }
}

fn parse_method(line: usize, token: &str) -> Result<MethodRef, AssemblyError> {
    let (returns_value, body) = match token.strip_prefix("void ") {
        Some(body) => (false, body.trim()),
        None => (true, token),
    };
    let bad = || AssemblyError::BadMember {
        line,
        token: token.to_string(),
    };
    let (path, arity) = body.rsplit_once('/').ok_or_else(bad)?;
    let arity = parse_int::<u8>(line, arity)?;
    let field = parse_field(line, path).map_err(|_| bad())?;

    Ok(MethodRef {
        owner: field.owner,
        name: field.name,
        arity,
        returns_value,
    })
}

fn parse_operand(line: usize, opcode: Opcode, token: &str) -> Result<Operand, AssemblyError> {
    let expected = opcode.operand_kind();
    if expected == OperandKind::None {
        if token.is_empty() {
            return Ok(Operand::None);
        }
        return Err(AssemblyError::UnexpectedOperand {
            line,
            opcode,
            token: token.to_string(),
        });
    }
    if token.is_empty() {
        return Err(AssemblyError::MissingOperand {
            line,
            opcode,
            expected,
        });
    }

    let operand = match expected {
        OperandKind::None => Operand::None,
        OperandKind::Str => Operand::Str(
            serde_json::from_str::<String>(token)
                .map_err(|source| AssemblyError::BadString { line, source })?,
        ),
        OperandKind::Int => Operand::Int(parse_int(line, token)?),
        OperandKind::Local => Operand::Local(parse_int(line, token)?),
        OperandKind::Label => Operand::Label(parse_label(line, token)?),
        OperandKind::Field => Operand::Field(parse_field(line, token)?),
        OperandKind::Method => Operand::Method(parse_method(line, token)?),
    };
    Ok(operand)
}
