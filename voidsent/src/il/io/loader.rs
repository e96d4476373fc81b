use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    il::{
        analysis::validate,
        core::{assemble, disassemble, AssemblyError, InstructionStream},
    },
    sites::PatchSite,
    types::{PatchEvent, PatchReport, SiteOutcome, Stage, StageProgress},
};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no method body for {0}")]
    MissingMethod(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read listing {}: {source}", .path.display())]
    Assembly {
        path: PathBuf,
        #[source]
        source: AssemblyError,
    },
}

/// Where method bodies come from and where patched ones go.
pub trait HostLoader {
    fn load(&mut self, method: &str) -> Result<InstructionStream, HostError>;

    /// Make `stream` the effective body of `method`.
    fn install(&mut self, method: &str, stream: InstructionStream) -> Result<(), HostError>;
}

/// Method bodies held in memory, keyed by `Owner::method`.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    methods: BTreeMap<String, InstructionStream>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<String>, stream: InstructionStream) -> Self {
        self.methods.insert(method.into(), stream);
        self
    }

    pub fn get(&self, method: &str) -> Option<&InstructionStream> {
        self.methods.get(method)
    }
}

impl HostLoader for MemoryHost {
    fn load(&mut self, method: &str) -> Result<InstructionStream, HostError> {
        self.methods
            .get(method)
            .cloned()
            .ok_or_else(|| HostError::MissingMethod(method.to_string()))
    }

    fn install(&mut self, method: &str, stream: InstructionStream) -> Result<(), HostError> {
        self.methods.insert(method.to_string(), stream);
        Ok(())
    }
}

/// File name of the listing for `Owner::method`.
pub fn listing_file_name(method: &str) -> String {
    format!("{}.il", method.replace("::", "."))
}

/// Reads listings from one directory and writes patched ones to another.
#[derive(Debug, Clone)]
pub struct ListingDirectory {
    input: PathBuf,
    output: PathBuf,
}

impl ListingDirectory {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn input_path(&self, method: &str) -> PathBuf {
        self.input.join(listing_file_name(method))
    }

    pub fn output_path(&self, method: &str) -> PathBuf {
        self.output.join(listing_file_name(method))
    }
}

pub fn read_listing(path: &Path) -> Result<InstructionStream, HostError> {
    let src = fs::read_to_string(path).map_err(|source| HostError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    assemble(&src).map_err(|source| HostError::Assembly {
        path: path.to_path_buf(),
        source,
    })
}

impl HostLoader for ListingDirectory {
    fn load(&mut self, method: &str) -> Result<InstructionStream, HostError> {
        let path = self.input_path(method);
        if !path.exists() {
            return Err(HostError::MissingMethod(method.to_string()));
        }
        read_listing(&path)
    }

    fn install(&mut self, method: &str, stream: InstructionStream) -> Result<(), HostError> {
        fs::create_dir_all(&self.output).map_err(|source| HostError::Io {
            path: self.output.clone(),
            source,
        })?;
        let path = self.output_path(method);
        fs::write(&path, disassemble(&stream)).map_err(|source| HostError::Io {
            path: path.clone(),
            source,
        })?;
        info!("wrote {}", path.display());
        Ok(())
    }
}

/// Patch every site against `host`.
///
/// A site that cannot be loaded is skipped; one that fails to patch is left
/// as it was. Neither stops the remaining sites.
pub fn patch_all(
    host: &mut dyn HostLoader,
    sites: &[PatchSite],
    mut report_progress: impl FnMut(PatchEvent),
) -> PatchReport {
    let mut report = PatchReport::default();
    report_progress(Stage::PatchingSites.into());

    for (idx, site) in sites.iter().enumerate() {
        let outcome = patch_site(host, site);
        report.sites.push((site.name.clone(), outcome));
        report_progress(PatchEvent {
            stage: Stage::PatchingSites,
            progress: StageProgress::Percentage((idx + 1) as f32 / sites.len() as f32),
        });
    }

    report_progress(PatchEvent {
        stage: Stage::PatchingSites,
        progress: StageProgress::Done,
    });
    info!(
        patched = report.patched(),
        failed = report.failed(),
        "patched {} sites",
        sites.len()
    );
    report
}

fn patch_site(host: &mut dyn HostLoader, site: &PatchSite) -> SiteOutcome {
    let original = match host.load(&site.target) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(site = %site.name, "skipping: {err}");
            return SiteOutcome::Skipped {
                reason: err.to_string(),
            };
        }
    };

    let (patched, applied) = match site.transpile(&original) {
        Ok(result) => result,
        Err(failure) => {
            return SiteOutcome::Failed {
                reason: failure.to_string(),
            }
        }
    };

    let violations = validate(&patched);
    if let Some(first) = violations.first() {
        error!(site = %site.name, count = violations.len(), "patched body is malformed: {first}");
        return SiteOutcome::Failed {
            reason: first.to_string(),
        };
    }

    let inserted = patched.len() - original.len();
    if let Err(err) = host.install(&site.target, patched) {
        error!(site = %site.name, "install failed: {err}");
        return SiteOutcome::Failed {
            reason: err.to_string(),
        };
    }

    SiteOutcome::Patched { inserted, applied }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sites::tent;

    const PLACEMENT: &str = r#"
ldstr "(O)TentKit"
brtrue L0
ret
L0: ldloc 0
ldfld DisplayClass::location
brfalse L1
ldloc 0
L1: ret
"#;

    #[test]
    fn listing_names_are_file_safe() {
        assert_eq!(
            listing_file_name("StardewValley.Object::placementAction"),
            "StardewValley.Object.placementAction.il"
        );
    }

    #[test]
    fn memory_host_installs_successes_only() {
        let site = tent::tent();
        let mut broken = site.clone();
        broken.name = "broken".into();
        broken.target = "Other::method".into();

        let original = assemble(PLACEMENT).unwrap();
        let mut host = MemoryHost::new()
            .with_method(site.target.clone(), original.clone())
            .with_method("Other::method", assemble("ret").unwrap());

        let mut events = Vec::new();
        let report = patch_all(&mut host, &[site.clone(), broken], |event| events.push(event));

        assert!(matches!(
            report.outcome("tent"),
            Some(SiteOutcome::Patched { inserted: 7, applied }) if applied.len() == 1
        ));
        assert!(matches!(report.outcome("broken"), Some(SiteOutcome::Failed { .. })));
        assert_eq!(host.get(&site.target).unwrap().len(), original.len() + 7);
        assert_eq!(host.get("Other::method").unwrap().len(), 1);
        assert!(matches!(events.last().map(|e| &e.progress), Some(StageProgress::Done)));
    }

    #[test]
    fn missing_method_is_skipped() {
        let mut host = MemoryHost::new();
        let report = patch_all(&mut host, &[tent::tent()], |_| {});
        assert!(matches!(report.outcome("tent"), Some(SiteOutcome::Skipped { .. })));
        assert_eq!(report.patched(), 0);
    }

    #[test]
    fn directory_host_round_trips_listings() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let site = tent::tent();
        let mut host = ListingDirectory::new(input.path(), output.path().join("patched"));
        fs::write(host.input_path(&site.target), PLACEMENT).unwrap();

        let report = patch_all(&mut host, &[site.clone()], |_| {});
        assert_eq!(report.patched(), 1);

        let written = read_listing(&host.output_path(&site.target)).unwrap();
        assert_eq!(written.len(), assemble(PLACEMENT).unwrap().len() + 7);
        assert!(validate(&written).is_empty());
    }

    #[test]
    fn unreadable_listing_reports_line() {
        let input = tempfile::tempdir().unwrap();
        let mut host = ListingDirectory::new(input.path(), input.path());
        fs::write(host.input_path("A::b"), "ldstr \"ok\"\nfrobnicate 1\n").unwrap();

        let err = host.load("A::b").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
