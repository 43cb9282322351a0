//! Runtime configuration.
//!
//! Every field has a default, so an empty or partial YAML file is valid:
//!
//! ```yaml
//! dataset_dir: /srv/sinan/data
//! chunk_size: 20000
//! workers: 8
//! ```
//!
//! Relative folders resolve against the working directory at the time they
//! are used. Nothing is read until [`Config::load`] is called.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::ingest::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_SOURCE_FILE: &str = "sinan_dengue_sample_total.csv";
pub const DEFAULT_LOOKUP_FILE: &str = "ufs.csv";
pub const DEFAULT_MAX_SET_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Folder holding the raw surveillance exports.
    pub dataset_dir: PathBuf,
    /// Folder holding auxiliary files such as the region lookup.
    pub files_dir: PathBuf,
    pub chunk_size: usize,
    /// Filter workers; 0 means one per available core.
    pub workers: usize,
    /// Largest number of symptoms/exams reported together.
    pub max_set_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("data"),
            files_dir: PathBuf::from("files"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            max_set_size: DEFAULT_MAX_SET_SIZE,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Reading config file {path:?}"))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = if raw.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be at least 1"));
        }
        if self.max_set_size == 0 {
            return Err(anyhow!("max_set_size must be at least 1"));
        }
        Ok(())
    }

    pub fn source_path(&self) -> PathBuf {
        self.dataset_dir.join(DEFAULT_SOURCE_FILE)
    }

    pub fn lookup_path(&self) -> PathBuf {
        self.files_dir.join(DEFAULT_LOOKUP_FILE)
    }

    /// File names in the dataset folder, sorted.
    pub fn datasets(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dataset_dir)
            .with_context(|| format!("Listing dataset folder {:?}", self.dataset_dir))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
