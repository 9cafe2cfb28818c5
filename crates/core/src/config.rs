//! Import configuration, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::builtin_columns;
use crate::error::{Error, Result};
use crate::gpkg::{FID_COLUMN, GEOMETRY_COLUMN};
use crate::schema::fold;

fn default_prune() -> bool {
    true
}

fn default_extension() -> String {
    "gpkg".to_string()
}

/// Settings for one import run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Directory holding the `.jpg`/`.JPG` photos.
    pub input: PathBuf,
    /// Root under which one store directory per group value is kept.
    pub output: PathBuf,
    /// Description key that routes a photo to its store, matched
    /// case-insensitively.
    pub group_key: String,
    /// When set, every group value must be one of these.
    #[serde(default)]
    pub allowed_groups: Option<Vec<String>>,
    /// Drop store rows whose filename is not in the current batch.
    #[serde(default = "default_prune")]
    pub prune: bool,
    /// Store file extension.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl ImportConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, group_key: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            group_key: group_key.into(),
            allowed_groups: None,
            prune: default_prune(),
            extension: default_extension(),
        }
    }

    pub fn with_allowed_groups(mut self, allowed: Vec<String>) -> Self {
        self.allowed_groups = Some(allowed);
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ImportConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let key = self.group_key.trim();
        if key.is_empty() {
            return Err(Error::InvalidConfig("group key must not be empty".to_string()));
        }
        if key != self.group_key {
            return Err(Error::InvalidConfig(format!(
                "group key '{}' has surrounding whitespace",
                self.group_key
            )));
        }
        // Keys end at the first '-' and pairs at ';', so such a key never parses.
        if key.contains(['-', ';']) {
            return Err(Error::InvalidConfig(format!(
                "group key '{key}' must not contain '-' or ';'"
            )));
        }
        let folded = fold(key);
        if folded == FID_COLUMN
            || folded == GEOMETRY_COLUMN
            || builtin_columns().iter().any(|c| c.name == folded)
        {
            return Err(Error::InvalidConfig(format!(
                "group key '{key}' names a built-in column"
            )));
        }
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(Error::InvalidConfig(format!(
                "invalid store extension '{}'",
                self.extension
            )));
        }
        if matches!(&self.allowed_groups, Some(list) if list.is_empty()) {
            return Err(Error::InvalidConfig(
                "allowed groups list is empty, no photo could be imported".to_string(),
            ));
        }
        Ok(())
    }

    /// Extension without a leading dot.
    pub fn store_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}
