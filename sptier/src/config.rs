//! `KEY=VALUE` configuration.
//!
//! The file format is the one the `sp` tooling has always used:
//!
//! ```text
//! # Atlas API key
//! PUBLIC_KEY=abcdefgh
//! PRIVATE_KEY=${ATLAS_SECRET}
//! PROJECT_ID=0123456789abcdef01234567
//! SP_WORKSPACE_NAME=analytics
//! ```
//!
//! Files are read with `dotenvy`, so quoting, comments and `${VAR}`
//! substitution follow dotenv rules: a placeholder resolves against the
//! process environment first, then keys defined earlier in the file. The
//! process environment is never modified. Environment variables override
//! file values afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AdvisorError;

/// Default Atlas Administration API root.
pub const DEFAULT_API_BASE: &str = "https://cloud.mongodb.com/api/atlas/v2";

const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_PROCESSORS_DIR: &str = "processors";

/// Environment variables that replace a file key.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("ATLAS_PUBLIC_KEY", "PUBLIC_KEY"),
    ("ATLAS_PRIVATE_KEY", "PRIVATE_KEY"),
    ("ATLAS_PROJECT_ID", "PROJECT_ID"),
    ("SP_WORKSPACE_NAME", "SP_WORKSPACE_NAME"),
    ("SP_ATTEMPT_TIMEOUT_SECS", "SP_ATTEMPT_TIMEOUT_SECS"),
    ("SP_POLL_INTERVAL_MS", "SP_POLL_INTERVAL_MS"),
    ("SP_CONCURRENCY", "SP_CONCURRENCY"),
    ("SP_PROCESSORS_DIR", "SP_PROCESSORS_DIR"),
    ("SP_API_BASE", "SP_API_BASE"),
    ("SP_TIERS_FILE", "SP_TIERS_FILE"),
];

/// Parsed configuration values.
#[derive(Clone, Default)]
pub struct SpConfig {
    values: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl SpConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses file content.
    ///
    /// # Errors
    ///
    /// `Config` naming the offending line when the content is not valid
    /// dotenv syntax.
    pub fn parse(text: &str) -> Result<Self, AdvisorError> {
        Self::read_pairs(text.as_bytes(), "configuration")
    }

    /// Loads a config file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// `Config` when the file does not exist or does not parse, `Io` when it
    /// cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AdvisorError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AdvisorError::config(format!(
                "configuration file {} not found",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)?;
        let mut config = Self::read_pairs(file, &path.display().to_string())?;
        config.source = Some(path.to_path_buf());
        config.apply_env(|name| std::env::var(name).ok());
        tracing::debug!(path = %path.display(), keys = config.values.len(), "Configuration loaded");
        Ok(config)
    }

    fn read_pairs<R: Read>(reader: R, origin: &str) -> Result<Self, AdvisorError> {
        let mut values = BTreeMap::new();
        for item in dotenvy::from_read_iter(reader) {
            let (key, value) = item.map_err(|err| match err {
                dotenvy::Error::Io(io) => AdvisorError::from(io),
                other => AdvisorError::config(format!("invalid {origin}: {other}")),
            })?;
            values.insert(key, value);
        }
        Ok(Self { values, source: None })
    }

    /// Like [`SpConfig::load`], but a missing file yields an environment-only
    /// configuration. Advisory on local files needs no credentials.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, AdvisorError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "No configuration file; using environment only");
        let mut config = Self::new();
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies environment overrides.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, key) in ENV_ALIASES {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                self.values.insert((*key).to_string(), value);
            }
        }
    }

    /// Sets a value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// File the values came from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Tier table override path.
    #[must_use]
    pub fn tiers_file(&self) -> Option<PathBuf> {
        self.get("SP_TIERS_FILE").map(PathBuf::from)
    }

    /// Atlas connection settings.
    ///
    /// # Errors
    ///
    /// `Config` naming every missing required key.
    pub fn atlas(&self) -> Result<AtlasSettings, AdvisorError> {
        let missing: Vec<&str> = ["PUBLIC_KEY", "PRIVATE_KEY", "PROJECT_ID"]
            .into_iter()
            .filter(|key| self.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AdvisorError::config(format!(
                "missing required configuration keys: {}",
                missing.join(", ")
            )));
        }

        Ok(AtlasSettings {
            public_key: self.get("PUBLIC_KEY").unwrap_or_default().to_string(),
            private_key: self.get("PRIVATE_KEY").unwrap_or_default().to_string(),
            project_id: self.get("PROJECT_ID").unwrap_or_default().to_string(),
            workspace: self
                .get("SP_WORKSPACE_NAME")
                .or_else(|| self.get("SP_INSTANCE_NAME"))
                .map(str::to_string),
            api_base: self
                .get("SP_API_BASE")
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Runtime tunables.
    ///
    /// # Errors
    ///
    /// `Config` when a tunable is not a positive integer.
    pub fn runtime(&self) -> Result<RuntimeSettings, AdvisorError> {
        Ok(RuntimeSettings {
            attempt_timeout: Duration::from_secs(self.positive("SP_ATTEMPT_TIMEOUT_SECS", DEFAULT_ATTEMPT_TIMEOUT_SECS)?),
            poll_interval: Duration::from_millis(self.positive("SP_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?),
            concurrency: self.positive("SP_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            processors_dir: PathBuf::from(self.get("SP_PROCESSORS_DIR").unwrap_or(DEFAULT_PROCESSORS_DIR)),
        })
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, AdvisorError>
    where
        T: FromStr + PartialEq + Default,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.parse::<T>() {
                Ok(value) if value != T::default() => Ok(value),
                _ => Err(AdvisorError::config(format!("{key} must be a positive integer, got '{raw}'"))),
            },
        }
    }
}

impl fmt::Debug for SpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpConfig")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("source", &self.source)
            .finish()
    }
}

/// Credentials and addressing for the Atlas API.
#[derive(Clone, PartialEq, Eq)]
pub struct AtlasSettings {
    /// API public key (digest username).
    pub public_key: String,
    /// API private key (digest password).
    pub private_key: String,
    /// Atlas project (group) id.
    pub project_id: String,
    /// Stream processing workspace name.
    pub workspace: Option<String>,
    /// API root without trailing slash.
    pub api_base: String,
}

impl AtlasSettings {
    /// Base URL of the workspace's stream endpoints.
    ///
    /// # Errors
    ///
    /// `Config` when no workspace is configured.
    pub fn workspace_url(&self) -> Result<String, AdvisorError> {
        let workspace = self
            .workspace
            .as_deref()
            .ok_or_else(|| AdvisorError::config("SP_WORKSPACE_NAME is required for processor operations"))?;
        Ok(format!("{}/groups/{}/streams/{workspace}", self.api_base, self.project_id))
    }
}

impl fmt::Debug for AtlasSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtlasSettings")
            .field("public_key", &self.public_key)
            .field("private_key", &"***")
            .field("project_id", &self.project_id)
            .field("workspace", &self.workspace)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Timeouts, limits and paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Bound on one start attempt.
    pub attempt_timeout: Duration,
    /// Delay between state polls after a start.
    pub poll_interval: Duration,
    /// Processors handled at once in batch runs.
    pub concurrency: usize,
    /// Local processor definitions.
    pub processors_dir: PathBuf,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            concurrency: DEFAULT_CONCURRENCY,
            processors_dir: PathBuf::from(DEFAULT_PROCESSORS_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_comments_quotes_and_spacing() {
        let config = SpConfig::parse(
            "# comment\n\nPUBLIC_KEY = pub\nPRIVATE_KEY=\"a=b # not a comment\"\nPROJECT_ID='proj'\n",
        )
        .unwrap();
        assert_eq!(config.get("PUBLIC_KEY"), Some("pub"));
        assert_eq!(config.get("PRIVATE_KEY"), Some("a=b # not a comment"));
        assert_eq!(config.get("PROJECT_ID"), Some("proj"));
    }

    #[test]
    fn test_placeholders_resolve_earlier_keys() {
        let config = SpConfig::parse(
            "SPTIER_CONFIG_TEST_PROJECT=file-project\n\
             LABEL=${SPTIER_CONFIG_TEST_PROJECT}-x\n\
             OTHER=${SPTIER_CONFIG_TEST_UNDEFINED}\n",
        )
        .unwrap();
        assert_eq!(config.get("LABEL"), Some("file-project-x"));
        // Unresolved placeholders collapse to empty, which reads as unset.
        assert_eq!(config.get("OTHER"), None);
    }

    #[test]
    fn test_malformed_line_is_config_error() {
        let err = SpConfig::parse("PUBLIC_KEY=pub\nnot a pair\n").unwrap_err();
        assert_eq!(err.error_kind(), "ConfigError");
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SpConfig::parse("PUBLIC_KEY=file\nSP_WORKSPACE_NAME=ws\n").unwrap();
        config.apply_env(|name| match name {
            "ATLAS_PUBLIC_KEY" => Some("env".to_string()),
            "SP_WORKSPACE_NAME" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.get("PUBLIC_KEY"), Some("env"));
        assert_eq!(config.get("SP_WORKSPACE_NAME"), Some("ws"));
    }

    #[test]
    fn test_atlas_settings() {
        let config = SpConfig::parse(
            "PUBLIC_KEY=pub\nPRIVATE_KEY=priv\nPROJECT_ID=proj\nSP_INSTANCE_NAME=legacy\nSP_API_BASE=http://localhost:8080/api/\n",
        )
        .unwrap();
        let atlas = config.atlas().unwrap();
        assert_eq!(atlas.workspace.as_deref(), Some("legacy"));
        assert_eq!(
            atlas.workspace_url().unwrap(),
            "http://localhost:8080/api/groups/proj/streams/legacy"
        );
        assert!(!format!("{atlas:?}").contains("priv\""));
    }

    #[test]
    fn test_atlas_missing_keys() {
        let err = SpConfig::parse("PUBLIC_KEY=pub\n").unwrap().atlas().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PRIVATE_KEY"));
        assert!(message.contains("PROJECT_ID"));
        assert_eq!(err.error_kind(), "ConfigError");
    }

    #[test]
    fn test_workspace_required_for_urls() {
        let atlas = SpConfig::parse("PUBLIC_KEY=a\nPRIVATE_KEY=b\nPROJECT_ID=c\n")
            .unwrap()
            .atlas()
            .unwrap();
        assert!(atlas.workspace_url().is_err());
        assert_eq!(atlas.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_runtime_defaults_and_overrides() {
        assert_eq!(SpConfig::new().runtime().unwrap(), RuntimeSettings::default());

        let config = SpConfig::new()
            .with_value("SP_ATTEMPT_TIMEOUT_SECS", "30")
            .with_value("SP_CONCURRENCY", "8")
            .with_value("SP_PROCESSORS_DIR", "defs");
        let runtime = config.runtime().unwrap();
        assert_eq!(runtime.attempt_timeout, Duration::from_secs(30));
        assert_eq!(runtime.concurrency, 8);
        assert_eq!(runtime.processors_dir, PathBuf::from("defs"));

        let bad = SpConfig::new().with_value("SP_POLL_INTERVAL_MS", "0");
        assert!(bad.runtime().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        std::fs::write(&path, "PUBLIC_KEY=pub\nPRIVATE_KEY=priv\nPROJECT_ID=proj\n").unwrap();
        let broken = dir.path().join("broken.txt");
        std::fs::write(&broken, "PUBLIC_KEY pub\n").unwrap();

        let config = SpConfig::load(&path).unwrap();
        assert_eq!(config.source(), Some(path.as_path()));
        assert!(config.get("PROJECT_ID").is_some());

        let missing = SpConfig::load(dir.path().join("absent.txt")).unwrap_err();
        assert_eq!(missing.error_kind(), "ConfigError");
        assert!(SpConfig::load_or_default(dir.path().join("absent.txt")).is_ok());

        let err = SpConfig::load(&broken).unwrap_err();
        assert_eq!(err.error_kind(), "ConfigError");
        assert!(err.to_string().contains("broken.txt"));
    }
}
