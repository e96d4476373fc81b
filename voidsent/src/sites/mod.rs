//! Patch sites: the methods we patch and the specs applied to each
//!
//! A site is patched as a unit. Its specs are applied in order to a working
//! copy of the method, and the copy only replaces the original when every
//! spec succeeded.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::il::{
    analysis::{missing_strings, CodeMatch},
    core::{InstructionStream, Operand},
    modification::{AppliedPatch, PatchFailure, PatchSpec, Patcher},
};

pub mod relationships;
pub mod tent;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchSite {
    pub name: String,
    /// `Owner::method` of the method body this site edits.
    pub target: String,
    pub specs: Vec<PatchSpec>,
}

impl PatchSite {
    /// Apply every spec of this site to a copy of `original`.
    ///
    /// On failure `original` is what should stay installed; the error names
    /// the patch spec and the stage that failed.
    pub fn transpile(
        &self,
        original: &InstructionStream,
    ) -> Result<(InstructionStream, Vec<AppliedPatch>), PatchFailure> {
        let literals = self.anchor_literals();
        let missing = missing_strings(original, &literals);
        if !missing.is_empty() {
            warn!(site = %self.name, ?missing, "anchor literals absent from {}", self.target);
        }

        let mut patcher = Patcher::new(original.clone());
        for spec in &self.specs {
            if let Err(failure) = patcher.apply(spec) {
                error!(
                    site = %self.name,
                    spec = %failure.spec,
                    stage = %failure.stage,
                    "{}; leaving {} unpatched",
                    failure.error,
                    self.target
                );
                return Err(failure);
            }
        }
        debug!(site = %self.name, specs = self.specs.len(), "site transpiled");

        let applied = patcher.applied().to_vec();
        Ok((patcher.into_stream(), applied))
    }

    /// String literals the anchors pin, in spec order.
    pub fn anchor_literals(&self) -> Vec<&str> {
        self.specs
            .iter()
            .flat_map(|spec| &spec.anchor)
            .filter_map(|pattern| match pattern {
                CodeMatch::Exact {
                    operand: Operand::Str(text),
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub fn builtin_sites() -> Vec<PatchSite> {
    vec![
        relationships::profile_menu(),
        relationships::social_page(),
        tent::tent(),
    ]
}

/// Keep only the sites named in `enabled`; an empty list keeps all of them.
pub fn select_sites(sites: Vec<PatchSite>, enabled: &[String]) -> Vec<PatchSite> {
    if enabled.is_empty() {
        return sites;
    }
    sites
        .into_iter()
        .filter(|site| enabled.iter().any(|name| *name == site.name))
        .collect()
}
