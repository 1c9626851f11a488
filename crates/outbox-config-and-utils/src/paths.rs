//! On-disk layout of the outbox base directory.
//!
//! ```text
//! ~/.field-outbox/
//! ├── config.json
//! ├── outbox.sqlite
//! └── logs/
//!     └── outbox.jsonl
//! ```

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

const BASE_DIR_NAME: &str = ".field-outbox";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "outbox.sqlite";
const LOGS_DIR: &str = "logs";
const LOG_FILE: &str = "outbox.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.field-outbox`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir().ok_or(CoreError::NoHomeDir)?;
        Ok(Self::with_base_dir(home.join(BASE_DIR_NAME)))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    /// SQLite file backing the durable queue.
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join(LOGS_DIR)
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE)
    }

    /// Create the base and log directories if missing.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_under_base_dir() {
        let base = PathBuf::from("/data/outbox");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), base.as_path());
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.database_file(), base.join("outbox.sqlite"));
        assert_eq!(paths.log_file(), base.join("logs").join("outbox.jsonl"));
    }

    #[test]
    fn default_base_is_in_home() {
        if let Some(home) = dirs::home_dir() {
            let paths = Paths::new().unwrap();
            assert_eq!(paths.base_dir(), home.join(".field-outbox").as_path());
        }
    }

    #[test]
    fn ensure_dirs_creates_nested_layout_once() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("a").join("b"));

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(!paths.database_file().exists());
    }
}
