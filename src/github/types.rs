use serde::Deserialize;

/// The subset of `GET /repos/{owner}/{repo}` the channel header needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A release asset. Does not contain all fields.
///
/// `content_type` from the API is deliberately not read; the enclosure type
/// comes from the downloaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

/// A GitHub release. Does not contain all fields.
///
/// Timestamps stay as raw strings here; drafts carry a `null`
/// `published_at`, and parsing is the classifier's job so that a malformed
/// value is reported against the release that carried it.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    /// Release notes. GFM markdown as fetched, rendered HTML once the
    /// pipeline has processed the release.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    /// Display title: the release name, or the tag for unnamed releases.
    pub fn title(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.tag_name,
        }
    }
}
