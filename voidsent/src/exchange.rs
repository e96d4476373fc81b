use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{config::ConfigError, sites::PatchSite};

/// On-disk form of a list of site definitions, as written by `voidsent-dump`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SiteFile {
    pub sites: Vec<PatchSite>,
}

pub fn load_sites(path: &Path) -> Result<Vec<PatchSite>, ConfigError> {
    let src = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        file: path.to_path_buf(),
        source,
    })?;
    let file: SiteFile = serde_json::from_str(&src).map_err(|source| ConfigError::Json {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(file.sites)
}
