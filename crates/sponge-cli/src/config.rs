/// Configuration of the `sponge` binary.
///
/// Read from an optional JSON file passed with `--config`; every field is
/// optional and falls back to [`SpongeConfig::default`]. Command-line
/// flags override file values.
///
/// ```json
/// {
///   "cache_file": "/var/cache/sponge/cache.spg",
///   "source_dir": "/srv/files",
///   "exclude_prefixes": ["tmp/", "private/"]
/// }
/// ```
///
/// ```text
/// ┌──────────────────┬──────────────────────┬──────────────────────────────────┐
/// │ Field            │ Default              │ Meaning                          │
/// ├──────────────────┼──────────────────────┼──────────────────────────────────┤
/// │ cache_file       │ sponge-cache.spg     │ snapshot file of the cache       │
/// │ source_dir       │ .                    │ where uncached resources live    │
/// │ exclude_prefixes │ []                   │ keys never cached unless forced  │
/// └──────────────────┴──────────────────────┴──────────────────────────────────┘
/// ```
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpongeConfig {
    pub cache_file: PathBuf,
    pub source_dir: PathBuf,
    pub exclude_prefixes: Vec<String>,
}

impl Default for SpongeConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("sponge-cache.spg"),
            source_dir: PathBuf::from("."),
            exclude_prefixes: Vec::new(),
        }
    }
}

impl SpongeConfig {
    /// Load the configuration file at `path`, or the defaults when no
    /// path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration document.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn apply_overrides(&mut self, cache_file: Option<PathBuf>, source_dir: Option<PathBuf>) {
        if let Some(cache_file) = cache_file {
            self.cache_file = cache_file;
        }
        if let Some(source_dir) = source_dir {
            self.source_dir = source_dir;
        }
    }

    /// Key predicate for the cache: everything except excluded prefixes.
    pub fn should_cache(&self) -> impl Fn(&String) -> bool + Send + Sync + 'static {
        let excluded = self.exclude_prefixes.clone();
        move |key: &String| !excluded.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(SpongeConfig::load(None).unwrap(), SpongeConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sponge.json");
        fs::write(&path, r#"{ "exclude_prefixes": ["tmp/"] }"#).unwrap();

        let config = SpongeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.exclude_prefixes, vec!["tmp/".to_owned()]);
        assert_eq!(config.cache_file, PathBuf::from("sponge-cache.spg"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sponge.json");
        fs::write(&path, r#"{ "cache_fiel": "typo.spg" }"#).unwrap();
        let err = SpongeConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = SpongeConfig::default();
        config.apply_overrides(Some(PathBuf::from("other.spg")), None);
        assert_eq!(config.cache_file, PathBuf::from("other.spg"));
        assert_eq!(config.source_dir, PathBuf::from("."));
    }

    #[test]
    fn excluded_prefixes_are_not_cached() {
        let config = SpongeConfig {
            exclude_prefixes: vec!["tmp/".to_owned(), "private/".to_owned()],
            ..SpongeConfig::default()
        };
        let should_cache = config.should_cache();
        assert!(should_cache(&"docs/readme.md".to_owned()));
        assert!(!should_cache(&"tmp/scratch".to_owned()));
        assert!(!should_cache(&"private/key".to_owned()));
    }
}
