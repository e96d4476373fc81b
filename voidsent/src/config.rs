use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    overrides::TentGate,
    sites::{builtin_sites, select_sites, PatchSite},
};

pub const DEFAULT_SETTINGS_FILE: &str = "voidsent.json";
pub const DEFAULT_MANIFEST: &str = "Aviroen.Voidsent";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .file.display())]
    Json {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown site '{0}'")]
    UnknownSite(String),

    #[error("Duplicate site '{0}'")]
    DuplicateSite(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherSettings {
    /// Directory holding the original `<method>.il` listings.
    pub input_dir: PathBuf,
    /// Directory patched listings are written to.
    pub output_dir: PathBuf,
    /// Site names to patch; empty means all of them.
    pub enabled_sites: Vec<String>,
    /// JSON file with extra site definitions.
    pub extra_sites: Option<PathBuf>,
    /// Mod id the tent gate field is prefixed with.
    pub manifest: String,
}

impl Default for PatcherSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("listings"),
            output_dir: PathBuf::from("patched"),
            enabled_sites: Vec::new(),
            extra_sites: None,
            manifest: DEFAULT_MANIFEST.to_string(),
        }
    }
}

impl PatcherSettings {
    /// Read settings from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let src = match fs::read_to_string(path) {
            Ok(src) => src,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    file: path.to_path_buf(),
                    source,
                })
            }
        };
        let settings = serde_json::from_str(&src).map_err(|source| ConfigError::Json {
            file: path.to_path_buf(),
            source,
        })?;
        info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn tent_gate(&self) -> TentGate {
        TentGate::new(self.manifest.clone())
    }

    /// Built-in sites plus any extra ones, narrowed to the enabled set.
    pub fn sites(&self) -> ConfigResult<Vec<PatchSite>> {
        let mut sites = builtin_sites();
        if let Some(path) = &self.extra_sites {
            for site in crate::exchange::load_sites(path)? {
                if sites.iter().any(|known| known.name == site.name) {
                    return Err(ConfigError::DuplicateSite(site.name));
                }
                sites.push(site);
            }
        }
        if let Some(unknown) = self
            .enabled_sites
            .iter()
            .find(|name| !sites.iter().any(|site| &site.name == *name))
        {
            return Err(ConfigError::UnknownSite(unknown.clone()));
        }
        Ok(select_sites(sites, &self.enabled_sites))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = PatcherSettings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, PatcherSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        fs::write(&path, r#"{ "enabled_sites": ["tent"], "manifest": "Someone.Else" }"#).unwrap();

        let settings = PatcherSettings::load(&path).unwrap();
        assert_eq!(settings.enabled_sites, vec!["tent"]);
        assert_eq!(settings.manifest, "Someone.Else");
        assert_eq!(settings.output_dir, PathBuf::from("patched"));
        assert_eq!(settings.sites().unwrap().len(), 1);
    }

    #[test]
    fn bad_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();

        let err = PatcherSettings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { ref file, .. } if file == &path));
    }

    #[test]
    fn unknown_enabled_site_is_an_error() {
        let settings = PatcherSettings {
            enabled_sites: vec!["no-such-site".into()],
            ..Default::default()
        };
        assert!(matches!(settings.sites(), Err(ConfigError::UnknownSite(name)) if name == "no-such-site"));
    }
}
