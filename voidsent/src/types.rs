use serde::Serialize;

use crate::il::modification::AppliedPatch;

#[derive(Debug)]
pub struct PatchEvent {
    pub stage: Stage,
    pub progress: StageProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadingSites,
    PatchingSites,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadingSites => "Loading Sites",
            Stage::PatchingSites => "Patching Sites",
        }
    }
}

impl From<Stage> for PatchEvent {
    fn from(value: Stage) -> Self {
        PatchEvent {
            stage: value,
            progress: StageProgress::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageProgress {
    Unknown,
    Percentage(f32),
    Done,
}

/// Outcome of one site in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SiteOutcome {
    Patched {
        inserted: usize,
        applied: Vec<AppliedPatch>,
    },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub sites: Vec<(String, SiteOutcome)>,
}

impl PatchReport {
    pub fn patched(&self) -> usize {
        self.count(|outcome| matches!(outcome, SiteOutcome::Patched { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, SiteOutcome::Failed { .. }))
    }

    pub fn outcome(&self, site: &str) -> Option<&SiteOutcome> {
        self.sites
            .iter()
            .find(|(name, _)| name == site)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, pred: impl Fn(&SiteOutcome) -> bool) -> usize {
        self.sites.iter().filter(|(_, outcome)| pred(outcome)).count()
    }
}
