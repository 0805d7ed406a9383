//! One appcast generation run, start to finish.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Settings;
use crate::feed::{
    guess_mime_type, Appcast, AppcastItem, Channel, Classification, Classifier, PlatformRules,
};
use crate::github::GitHubClient;
use crate::signing::AppcastSigner;

/// What a run did, for the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Releases returned by the listing, after the limit was applied.
    pub releases: usize,
    /// Releases skipped as drafts or for unparseable tags.
    pub skipped: usize,
    /// `<item>` elements written.
    pub items: usize,
    pub output: PathBuf,
}

/// Builds the appcast described by `settings` and writes it to
/// `settings.output`.
///
/// Configuration (repository, platform patterns, signing key) is checked
/// before any request is made. Requests run one at a time, and the output
/// file is only written once the whole document exists, so a failed run
/// leaves no trace at the destination.
pub async fn run(settings: &Settings) -> Result<RunSummary> {
    settings.validate().context("Invalid configuration")?;
    let rules = PlatformRules::from_config(&settings.platforms, settings.match_policy)
        .context("Invalid platform table")?;
    let classifier = Classifier::new(rules);
    let signer = settings
        .dsa_key
        .as_deref()
        .map(AppcastSigner::from_pem_file)
        .transpose()
        .context("Invalid DSA signing key")?;

    let client = GitHubClient::new(&settings.api_url, &settings.token)?;
    let repo = &settings.repo;

    let repository = client.repository(repo).await?;
    tracing::info!(repo = %repo, "Fetched repository metadata");
    let mut appcast = Appcast::new(Channel::from_repository(&repository, &settings.language));

    let releases = client.releases(repo, settings.limit).await?;
    tracing::info!(repo = %repo, count = releases.len(), "Fetched releases");

    let mut skipped = 0;
    let release_count = releases.len();
    for mut release in releases {
        let accepted = match classifier.classify(&release)? {
            Classification::Skipped(reason) => {
                tracing::debug!(tag = %release.tag_name, ?reason, "Skipping release");
                skipped += 1;
                continue;
            }
            Classification::Accepted(accepted) => accepted,
        };

        let notes = release.body.as_deref().unwrap_or_default();
        let html = client.render_markdown(notes, repo).await?;
        release.body = Some(html);

        if accepted.matches.is_empty() {
            tracing::debug!(tag = %release.tag_name, "No assets match any platform rule");
        }

        for matched in &accepted.matches {
            let mut file = client.download_asset(repo, &matched.asset).await?;
            let mime_type = guess_mime_type(file.path());
            let dsa_signature = match &signer {
                Some(signer) => Some(
                    signer
                        .sign_file(file.as_file_mut())
                        .with_context(|| format!("Failed to sign {}", matched.asset.name))?,
                ),
                None => None,
            };
            drop(file);

            tracing::info!(
                version = %accepted.version,
                platform = %matched.platform,
                asset = %matched.asset.name,
                signed = dsa_signature.is_some(),
                "Added appcast item"
            );
            appcast.push(AppcastItem::build(
                &release,
                &accepted,
                matched,
                &settings.prerelease_channel,
                mime_type,
                dsa_signature,
            ));
        }
    }

    appcast.write_to_file(&settings.output)?;
    tracing::info!(
        path = %settings.output.display(),
        items = appcast.items.len(),
        "Wrote appcast"
    );

    Ok(RunSummary {
        releases: release_count,
        skipped,
        items: appcast.items.len(),
        output: settings.output.clone(),
    })
}
