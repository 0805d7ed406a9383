//! Configuration for an appcast run.
//!
//! Two layers feed a run: an optional TOML file (`Config`) carrying the
//! slow-moving knobs like platform rules and the API base URL, and the
//! per-invocation values from the command line. Both are folded into
//! [`Settings`], which is what the pipeline consumes.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as a warning.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::MatchPolicy;

/// Default GitHub REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Number of releases considered when no limit is given.
pub const DEFAULT_LIMIT: usize = 5;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid repository '{0}': expected OWNER/REPO")]
    InvalidRepo(String),

    #[error("Invalid pattern for platform '{platform}': {source}")]
    InvalidPattern {
        platform: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid API URL '{url}': {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// One `[[platforms]]` entry: a platform identifier and the filename regex
/// that selects its assets. Patterns are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformRuleConfig {
    pub name: String,
    pub pattern: String,
}

impl PlatformRuleConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// The platform table used when the config file does not provide one.
pub fn default_platforms() -> Vec<PlatformRuleConfig> {
    vec![PlatformRuleConfig::new("windows-x64", r"^.+-win64\.msi$")]
}

/// Contents of the optional TOML config file.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the GitHub REST API (override for GitHub Enterprise).
    pub api_url: String,

    /// Channel `<language>` tag.
    pub language: String,

    /// Value of `<sparkle:channel>` on prerelease items.
    pub prerelease_channel: String,

    /// How many rules an asset may match.
    pub match_policy: MatchPolicy,

    /// Ordered platform table. Declaration order is evaluation order.
    pub platforms: Vec<PlatformRuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            language: "en".to_string(),
            prerelease_channel: "dev".to_string(),
            match_policy: MatchPolicy::default(),
            platforms: default_platforms(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "api_url",
                "language",
                "prerelease_channel",
                "match_policy",
                "platforms",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            platforms = config.platforms.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Run Settings
// ============================================================================

/// Everything one pipeline run needs.
///
/// `token` is a [`SecretString`], so the derived `Debug` prints
/// `[REDACTED]` instead of the credential.
#[derive(Debug)]
pub struct Settings {
    /// GitHub API token, sent as a bearer credential.
    pub token: SecretString,
    /// Repository in `OWNER/REPO` form.
    pub repo: String,
    /// Maximum number of releases considered.
    pub limit: usize,
    /// Optional PKCS#8 PEM file holding the DSA signing key.
    pub dsa_key: Option<PathBuf>,
    /// Destination of the appcast XML.
    pub output: PathBuf,
    pub api_url: String,
    pub language: String,
    pub prerelease_channel: String,
    pub match_policy: MatchPolicy,
    pub platforms: Vec<PlatformRuleConfig>,
}

impl Settings {
    /// Settings with every file-level knob at its default.
    pub fn new(token: impl Into<String>, repo: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self::from_config(Config::default(), token, repo, output)
    }

    /// Combine a loaded config file with the per-run values.
    pub fn from_config(
        config: Config,
        token: impl Into<String>,
        repo: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            token: SecretString::from(token.into()),
            repo: repo.into(),
            limit: DEFAULT_LIMIT,
            dsa_key: None,
            output: output.into(),
            api_url: config.api_url,
            language: config.language,
            prerelease_channel: config.prerelease_channel,
            match_policy: config.match_policy,
            platforms: config.platforms,
        }
    }

    /// Checks the values that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_repo(&self.repo)?;
        url::Url::parse(&self.api_url).map_err(|source| ConfigError::InvalidApiUrl {
            url: self.api_url.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Accepts exactly `OWNER/REPO` with both halves non-empty.
pub fn validate_repo(repo: &str) -> Result<(), ConfigError> {
    match repo.split_once('/') {
        Some((owner, name))
            if !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !repo.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ConfigError::InvalidRepo(repo.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
