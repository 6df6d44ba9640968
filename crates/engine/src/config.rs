//! Store configuration via `revstore.toml`
//!
//! All settings have defaults, so an empty file (or no file at all) gives a
//! working store. Settings are read once when a repository is created.

use serde::{Deserialize, Serialize};
use std::path::Path;

use revstore_core::{Error, Result};
use revstore_storage::DEFAULT_PAGE_SIZE;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "revstore.toml";

/// Repository configuration loaded from `revstore.toml`.
///
/// # Example
///
/// ```toml
/// # Entities per transaction in a bulk save
/// batch_size = 5000
///
/// # Rows fetched per scan page
/// scan_page_size = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevstoreConfig {
    /// Entities written per transaction by a bulk save.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Rows fetched per page when scanning a log.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
    /// Name of the allocation record revision numbers are drawn from.
    #[serde(default = "default_revision_sequence")]
    pub revision_sequence: String,
    /// First revision number handed out by a new store.
    #[serde(default = "default_first_revision")]
    pub first_revision: u64,
    /// Log every saved entity at `info` level.
    #[serde(default = "default_log_writes")]
    pub log_writes: bool,
}

fn default_batch_size() -> usize {
    5000
}

fn default_scan_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_revision_sequence() -> String {
    "revision".to_string()
}

fn default_first_revision() -> u64 {
    1
}

fn default_log_writes() -> bool {
    true
}

impl Default for RevstoreConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            scan_page_size: default_scan_page_size(),
            revision_sequence: default_revision_sequence(),
            first_revision: default_first_revision(),
            log_writes: default_log_writes(),
        }
    }
}

impl RevstoreConfig {
    /// Set the bulk save batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the scan page size
    pub fn with_scan_page_size(mut self, scan_page_size: usize) -> Self {
        self.scan_page_size = scan_page_size;
        self
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a size is zero or the sequence name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be greater than zero"));
        }
        if self.scan_page_size == 0 {
            return Err(Error::config("scan_page_size must be greater than zero"));
        }
        if self.revision_sequence.trim().is_empty() {
            return Err(Error::config("revision_sequence must not be empty"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# revstore configuration
#
# Entities written per transaction by a bulk save (default: 5000).
# Bounds the memory held by one transaction; all entities of one call still
# share a single revision.
batch_size = 5000

# Rows fetched per page when scanning a log (default: 256).
scan_page_size = 256

# Allocation record revision numbers are drawn from (default: "revision").
revision_sequence = "revision"

# First revision number of a new store (default: 1).
first_revision = 1

# Log every saved entity at info level (default: true).
log_writes = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Config` if it does not
    /// parse or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RevstoreConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = RevstoreConfig::default();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.scan_page_size, 256);
        assert_eq!(config.revision_sequence, "revision");
        assert_eq!(config.first_revision, 1);
        assert!(config.log_writes);
        config.validate().unwrap();
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config: RevstoreConfig = toml::from_str(RevstoreConfig::default_toml()).unwrap();
        assert_eq!(config, RevstoreConfig::default());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = RevstoreConfig::default().with_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn blank_sequence_name_is_rejected() {
        let config: RevstoreConfig = toml::from_str("revision_sequence = \"  \"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        RevstoreConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = RevstoreConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 5000);
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "batch_size = 10\n").unwrap();

        RevstoreConfig::write_default_if_missing(&path).unwrap();

        let config = RevstoreConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn from_file_with_missing_fields_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        let config = RevstoreConfig::from_file(&path).unwrap();
        assert_eq!(config, RevstoreConfig::default());
    }

    #[test]
    fn from_file_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "scan_page_size = 0\n").unwrap();

        let err = RevstoreConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = RevstoreConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = RevstoreConfig {
            batch_size: 100,
            scan_page_size: 16,
            revision_sequence: "rev_seq".to_string(),
            first_revision: 1000,
            log_writes: false,
        };

        config.write_to_file(&path).unwrap();
        let loaded = RevstoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
