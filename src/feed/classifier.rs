use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::{ConfigError, PlatformRuleConfig};
use crate::github::{Asset, Release};

/// Tag → version: optional leading `v`, then letters, digits and dots up to
/// the end of the tag.
static VERSION_RE: OnceLock<Regex> = OnceLock::new();

fn version_re() -> &'static Regex {
    VERSION_RE.get_or_init(|| {
        RegexBuilder::new(r"^v?([a-z0-9.]+)$")
            .case_insensitive(true)
            .build()
            .expect("version pattern is valid")
    })
}

/// Extracts the version string from a release tag.
///
/// `v2.3.1` and `2.3.1` both give `2.3.1`; tags containing anything other
/// than ASCII letters, digits and dots (after the optional `v`) give `None`.
pub fn extract_version(tag: &str) -> Option<&str> {
    version_re()
        .captures(tag)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// How many platform rules a single asset may match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Every matching rule yields its own feed item.
    #[default]
    EveryMatch,
    /// Rules are tried in order and the first match is the only one taken.
    FirstMatch,
}

/// A platform identifier bound to a case-insensitive filename pattern.
#[derive(Debug, Clone)]
pub struct PlatformRule {
    name: String,
    pattern: Regex,
}

impl PlatformRule {
    pub fn new(name: &str, pattern: &str) -> Result<Self, ConfigError> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                platform: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.pattern.is_match(filename)
    }
}

/// The ordered platform table plus the policy applied when walking it.
#[derive(Debug, Clone)]
pub struct PlatformRules {
    rules: Vec<PlatformRule>,
    policy: MatchPolicy,
}

impl PlatformRules {
    pub fn new(rules: Vec<PlatformRule>, policy: MatchPolicy) -> Self {
        Self { rules, policy }
    }

    /// Compiles configured rules, keeping declaration order.
    pub fn from_config(
        rules: &[PlatformRuleConfig],
        policy: MatchPolicy,
    ) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| PlatformRule::new(&rule.name, &rule.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, policy))
    }

    /// Rules matching `filename`, in declaration order.
    pub fn matching(&self, filename: &str) -> Vec<&PlatformRule> {
        let mut matched = self.rules.iter().filter(|rule| rule.matches(filename));
        match self.policy {
            MatchPolicy::EveryMatch => matched.collect(),
            MatchPolicy::FirstMatch => matched.next().into_iter().collect(),
        }
    }
}

/// Why a release contributes nothing to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Draft,
    UnparseableTag,
}

/// One asset selected for one platform.
#[derive(Debug, Clone)]
pub struct AssetMatch {
    pub asset: Asset,
    pub platform: String,
}

/// A release that made it through classification.
#[derive(Debug, Clone)]
pub struct AcceptedRelease {
    pub version: String,
    pub created_at: DateTime<FixedOffset>,
    pub published_at: DateTime<FixedOffset>,
    /// Asset order first, rule order second. May be empty.
    pub matches: Vec<AssetMatch>,
}

#[derive(Debug, Clone)]
pub enum Classification {
    Skipped(SkipReason),
    Accepted(AcceptedRelease),
}

/// Malformed release data. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Release {tag}: {field} is missing")]
    MissingTimestamp { tag: String, field: &'static str },
    #[error("Release {tag}: {field} '{value}' is not an ISO-8601 date-time: {source}")]
    InvalidTimestamp {
        tag: String,
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Decides which releases and assets end up in the appcast.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: PlatformRules,
}

impl Classifier {
    pub fn new(rules: PlatformRules) -> Self {
        Self { rules }
    }

    /// Classifies one release.
    ///
    /// Drafts and tags without a version are skipped. Otherwise both
    /// timestamps must parse; a bad one is an error, not a skip.
    pub fn classify(&self, release: &Release) -> Result<Classification, ClassifyError> {
        if release.draft {
            return Ok(Classification::Skipped(SkipReason::Draft));
        }

        let Some(version) = extract_version(&release.tag_name) else {
            return Ok(Classification::Skipped(SkipReason::UnparseableTag));
        };

        let created_at = parse_timestamp(release, "created_at", release.created_at.as_deref())?;
        let published_at =
            parse_timestamp(release, "published_at", release.published_at.as_deref())?;

        let matches = release
            .assets
            .iter()
            .flat_map(|asset| {
                self.rules
                    .matching(&asset.name)
                    .into_iter()
                    .map(move |rule| AssetMatch {
                        asset: asset.clone(),
                        platform: rule.name().to_string(),
                    })
            })
            .collect();

        Ok(Classification::Accepted(AcceptedRelease {
            version: version.to_string(),
            created_at,
            published_at,
            matches,
        }))
    }
}

fn parse_timestamp(
    release: &Release,
    field: &'static str,
    value: Option<&str>,
) -> Result<DateTime<FixedOffset>, ClassifyError> {
    let value = value.ok_or_else(|| ClassifyError::MissingTimestamp {
        tag: release.tag_name.clone(),
        field,
    })?;
    parse_iso8601(value).map_err(|source| ClassifyError::InvalidTimestamp {
        tag: release.tag_name.clone(),
        field,
        value: value.to_string(),
        source,
    })
}

/// ISO-8601 layouts carrying an offset (`Z` or `+hh[:mm]`).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
];

/// ISO-8601 layouts without an offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
];

/// Date-only layouts; read as midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Parses an ISO-8601 date or date-time.
///
/// RFC 3339 (what GitHub sends) is tried first. Values without an offset
/// are taken as UTC and bare dates as midnight UTC. On failure the RFC 3339
/// error is returned.
fn parse_iso8601(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let rfc3339_err = match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
    {
        return Ok(parsed);
    }
    if let Some(parsed) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Ok(parsed.and_utc().fixed_offset());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().fixed_offset())
        .ok_or(rfc3339_err)
}
