// ⚙️ Configuration - where the state lives and how much gets logged
//
// lending-catalog.toml:
//
//   [storage]
//   backend = "file"        # or "sqlite"
//   path = "output.bin"
//
//   [logging]
//   filter = "lending_catalog=info"
//   json = false

use crate::store::{FileStore, SqliteStore, Store};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::File,
            path: PathBuf::from("output.bin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, overridden by RUST_LOG
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "lending_catalog=info".to_string(),
            json: false,
        }
    }
}

impl LibraryConfig {
    /// Read a TOML file; a missing file means all defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("TOML parsing error")
    }

    /// Build the configured persistence backend
    pub fn open_store(&self) -> Result<Box<dyn Store>> {
        let path = &self.storage.path;
        let store: Box<dyn Store> = match self.storage.backend {
            StorageBackend::File => Box::new(FileStore::new(path.clone())),
            StorageBackend::Sqlite => Box::new(
                SqliteStore::open_or_recover(path)
                    .with_context(|| format!("Failed to open database {}", path.display()))?,
            ),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LibraryConfig::default();

        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, PathBuf::from("output.bin"));
        assert_eq!(config.logging.filter, "lending_catalog=info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LibraryConfig::from_toml_str(
            r#"
            [storage]
            backend = "sqlite"
            path = "library.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, PathBuf::from("library.db"));
        assert_eq!(config.logging.filter, "lending_catalog=info");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = LibraryConfig::from_toml_str("[storage]\nbackend = \"postgres\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig::load(dir.path().join("nope.toml")).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_open_store_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LibraryConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = dir.path().join("library.db");

        let store = config.open_store().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
