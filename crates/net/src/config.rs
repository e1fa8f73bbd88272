//! Tunables for the patch wire codec.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

/// Default bound on entries pre-allocated from a declared header count.
pub const DEFAULT_MAX_PREALLOCATED_ENTRIES: usize = 65536;

/// Wire codec configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WireCodecConfig {
    /// Upper bound on storage reserved up front from a header's declared
    /// entry counts. Only limits allocation; every declared entry is still read.
    pub max_preallocated_entries: usize,
    /// Number of encoded values kept for components flagged
    /// `CACHE_ENCODING`. Zero disables the cache.
    pub encode_cache_capacity: usize,
}

impl Default for WireCodecConfig {
    fn default() -> Self {
        Self {
            max_preallocated_entries: DEFAULT_MAX_PREALLOCATED_ENTRIES,
            encode_cache_capacity: 0,
        }
    }
}

impl WireCodecConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load configuration from `path`, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                warn!("Failed to read {}: {err}. Using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg = WireCodecConfig::from_toml_str("encode_cache_capacity = 32").unwrap();
        assert_eq!(cfg.encode_cache_capacity, 32);
        assert_eq!(cfg.max_preallocated_entries, DEFAULT_MAX_PREALLOCATED_ENTRIES);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_preallocated_entries = 128").unwrap();
        let cfg = WireCodecConfig::load_from_path(file.path());
        assert_eq!(cfg.max_preallocated_entries, 128);
    }

    #[test]
    fn bad_files_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_preallocated_entries = \"lots\"").unwrap();
        assert_eq!(
            WireCodecConfig::load_from_path(file.path()),
            WireCodecConfig::default()
        );
        assert_eq!(
            WireCodecConfig::load_from_path(Path::new("/nonexistent/wire.toml")),
            WireCodecConfig::default()
        );
    }
}
