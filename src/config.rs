//! Layered configuration: project config overridden by a per-user file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{CapsuleError, DatasetResult};

pub const DEFAULT_RANDOM_SEED: u64 = 1337;

const PROJECT_CONFIG_NAME: &str = "config.json";
const USER_CONFIG_NAME: &str = ".capsule_dataset.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub dataset_root: PathBuf,
    pub random_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data/kvasir-capsule"),
            random_seed: DEFAULT_RANDOM_SEED,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "dataset-root")]
    dataset_root: Option<PathBuf>,
    #[serde(rename = "random-seed")]
    random_seed: Option<u64>,
}

impl Config {
    /// Load configuration from the default hierarchy: `config.json` in the
    /// working directory, then `~/.capsule_dataset.json`. Later files win.
    /// Missing files are skipped; malformed JSON is an error.
    pub fn load() -> DatasetResult<Self> {
        let mut paths = vec![PathBuf::from(PROJECT_CONFIG_NAME)];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(Path::new(&home).join(USER_CONFIG_NAME));
        }
        Self::load_from(&paths)
    }

    /// Load configuration by layering the given files over the defaults, in
    /// order.
    pub fn load_from(paths: &[PathBuf]) -> DatasetResult<Self> {
        let mut config = Config::default();
        for path in paths {
            config.apply_file(path)?;
        }
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> DatasetResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let raw = fs::read(path).map_err(|e| CapsuleError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = serde_json::from_slice(&raw).map_err(|e| CapsuleError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(root) = file.dataset_root {
            self.dataset_root = root;
        }
        if let Some(seed) = file.random_seed {
            self.random_seed = seed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_files_override_earlier_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("base.json");
        let user = tmp.path().join("user.json");
        fs::write(&base, r#"{"dataset-root": "/a", "random-seed": 7}"#).unwrap();
        fs::write(&user, r#"{"random-seed": 42}"#).unwrap();

        let config = Config::load_from(&[base, user]).unwrap();
        assert_eq!(config.dataset_root, PathBuf::from("/a"));
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&[tmp.path().join("nope.json")]).unwrap();
        assert_eq!(config.random_seed, DEFAULT_RANDOM_SEED);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&[path]).is_err());
    }
}
