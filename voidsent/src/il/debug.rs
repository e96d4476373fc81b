use tracing::debug;

use crate::il::{core::InstructionStream, modification::AppliedPatch};

/// The listing with spliced blocks highlighted, one instruction per line.
///
/// `applied` must describe patches made to `stream` in the order they were
/// applied, so their ranges are in stream order.
pub fn annotated_listing(stream: &InstructionStream, applied: &[AppliedPatch]) -> String {
    use colored::Colorize;

    let mut out = String::new();
    for (idx, ix) in stream.iter().enumerate() {
        let line = format!("{idx:>4}  {ix}");
        let inserted = applied
            .iter()
            .find(|patch| (patch.insertion_point..patch.original_index()).contains(&idx));
        let rendered = match inserted {
            Some(patch) if idx == patch.insertion_point => {
                format!("{}  {}", line.green(), format!("; {}", patch.spec).dimmed())
            }
            Some(_) => line.green().to_string(),
            None if applied.iter().any(|patch| patch.original_index() == idx) => {
                line.yellow().to_string()
            }
            None => line,
        };
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}

pub fn debug_print_patches(target: &str, applied: &[AppliedPatch]) {
    for patch in applied {
        debug!(
            "{target}: {} inserted {} at {}, merge {}, skip {}",
            patch.spec,
            patch.block_len,
            patch.insertion_point,
            patch.merge_label,
            patch.skip_label
        );
    }
}
