use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

use super::classifier::{AcceptedRelease, AssetMatch};
use crate::github::{Release, Repository};

/// Namespace of the Sparkle extension elements.
pub const SPARKLE_NS: &str = "http://www.andymatuschak.org/xml-namespaces/sparkle";

/// `pubDate` layout (RFC 822 style, numeric offset).
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Installer arguments for unattended MSI installs.
pub const MSI_INSTALLER_ARGUMENTS: &str = "/passive";

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Installer formats the generic MIME table does not know precisely.
const INSTALLER_MIME_TYPES: &[(&str, &str)] = &[("msi", "application/x-msi-installer")];

/// Resolves the MIME type of a downloaded file from its name.
///
/// Installer types first, then `mime_guess`, then
/// `application/octet-stream`.
pub fn guess_mime_type(path: &Path) -> String {
    let extension = path.extension().and_then(|e| e.to_str());
    if let Some(ext) = extension {
        if let Some((_, mime)) = INSTALLER_MIME_TYPES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        {
            return (*mime).to_string();
        }
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}

/// `sparkle:installerArguments` for an asset file name, if any.
///
/// The extension check ignores case on purpose: `APP-WIN64.MSI` matches the
/// case-insensitive platform rules, so it gets the unattended arguments too.
pub fn installer_arguments(asset_name: &str) -> Option<&'static str> {
    Path::new(asset_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|ext| ext.eq_ignore_ascii_case("msi"))
        .map(|_| MSI_INSTALLER_ARGUMENTS)
}

/// Channel-level metadata, written once before the items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub description: Option<String>,
    pub language: String,
}

impl Channel {
    /// Mirrors the repository's name and description.
    pub fn from_repository(repo: &Repository, language: &str) -> Self {
        Self {
            title: repo.name.clone(),
            description: repo.description.clone(),
            language: language.to_string(),
        }
    }
}

/// The downloadable artifact of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub version: String,
    pub short_version_string: String,
    pub length: u64,
    pub mime_type: String,
    /// Base64 DSA signature; absent when no key is configured.
    pub dsa_signature: Option<String>,
}

/// One `<item>`: one asset of one release for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppcastItem {
    pub title: String,
    /// `sparkle:channel`, set for prereleases only.
    pub channel: Option<String>,
    pub release_notes_link: String,
    pub version: String,
    pub pub_date: String,
    pub os: String,
    pub description: String,
    pub enclosure: Enclosure,
    pub installer_arguments: Option<String>,
}

impl AppcastItem {
    /// Assembles an item from a classified release and one of its matches.
    ///
    /// `release.body` is expected to already hold the rendered notes.
    /// `mime_type` and `dsa_signature` come from the downloaded asset.
    pub fn build(
        release: &Release,
        accepted: &AcceptedRelease,
        matched: &AssetMatch,
        prerelease_channel: &str,
        mime_type: String,
        dsa_signature: Option<String>,
    ) -> Self {
        let asset = &matched.asset;
        Self {
            title: release.title().to_string(),
            channel: release.prerelease.then(|| prerelease_channel.to_string()),
            release_notes_link: release.html_url.clone(),
            version: accepted.version.clone(),
            pub_date: accepted.published_at.format(PUB_DATE_FORMAT).to_string(),
            os: matched.platform.clone(),
            description: release.body.clone().unwrap_or_default(),
            enclosure: Enclosure {
                url: asset.browser_download_url.clone(),
                version: accepted.version.clone(),
                short_version_string: accepted.version.clone(),
                length: asset.size,
                mime_type,
                dsa_signature,
            },
            installer_arguments: installer_arguments(&asset.name).map(str::to_string),
        }
    }
}

/// A complete appcast document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appcast {
    pub channel: Channel,
    pub items: Vec<AppcastItem>,
}

impl Appcast {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: AppcastItem) {
        self.items.push(item);
    }

    /// Serializes the appcast as an RSS 2.0 document with an XML
    /// declaration. Items keep insertion order.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("Failed to write XML declaration")?;

        // <rss version="2.0" xmlns:sparkle="...">
        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:sparkle", SPARKLE_NS));
        writer
            .write_event(Event::Start(rss))
            .context("Failed to write rss element")?;
        writer
            .write_event(Event::Start(BytesStart::new("channel")))
            .context("Failed to write channel element")?;

        write_text_element(&mut writer, "title", &self.channel.title)?;
        write_text_element(
            &mut writer,
            "description",
            self.channel.description.as_deref().unwrap_or_default(),
        )?;
        write_text_element(&mut writer, "language", &self.channel.language)?;

        for item in &self.items {
            write_item(&mut writer, item)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("channel")))
            .context("Failed to write channel end")?;
        writer
            .write_event(Event::End(BytesEnd::new("rss")))
            .context("Failed to write rss end")?;

        let mut bytes = writer.into_inner().into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).context("Generated appcast contains invalid UTF-8")
    }

    /// Writes the document to `path` atomically: a temp file in the same
    /// directory is written, synced and renamed over the destination.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_xml()?;
        crate::util::atomic_write(path, content.as_bytes())
    }
}

fn write_item<W: std::io::Write>(writer: &mut Writer<W>, item: &AppcastItem) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .context("Failed to write item element")?;

    write_text_element(writer, "title", &item.title)?;
    if let Some(channel) = &item.channel {
        write_text_element(writer, "sparkle:channel", channel)?;
    }
    write_text_element(writer, "sparkle:fullReleaseNotesLink", &item.release_notes_link)?;
    write_text_element(writer, "sparkle:version", &item.version)?;
    write_text_element(writer, "pubDate", &item.pub_date)?;
    write_text_element(writer, "sparkle:os", &item.os)?;
    write_text_element(writer, "description", &item.description)?;

    let enclosure = &item.enclosure;
    let length = enclosure.length.to_string();
    let mut element = BytesStart::new("enclosure");
    element.push_attribute(("url", enclosure.url.as_str()));
    element.push_attribute(("sparkle:version", enclosure.version.as_str()));
    element.push_attribute((
        "sparkle:shortVersionString",
        enclosure.short_version_string.as_str(),
    ));
    element.push_attribute(("length", length.as_str()));
    element.push_attribute(("type", enclosure.mime_type.as_str()));
    if let Some(signature) = &enclosure.dsa_signature {
        element.push_attribute(("sparkle:dsaSignature", signature.as_str()));
    }
    writer
        .write_event(Event::Empty(element))
        .context("Failed to write enclosure element")?;

    if let Some(arguments) = &item.installer_arguments {
        write_text_element(writer, "sparkle:installerArguments", arguments)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .context("Failed to write item end")?;
    Ok(())
}

/// `<name>text</name>`, or `<name/>` for empty text.
fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<()> {
    if text.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .with_context(|| format!("Failed to write {name} element"))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write {name} element"))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("Failed to write {name} text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write {name} end"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::Asset;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn sample_release(prerelease: bool) -> Release {
        Release {
            tag_name: "v1.2.0".to_string(),
            name: Some("Widget 1.2.0".to_string()),
            html_url: "https://github.com/octo/widget/releases/tag/v1.2.0".to_string(),
            draft: false,
            prerelease,
            created_at: Some("2024-03-01T10:00:00Z".to_string()),
            published_at: Some("2024-03-02T11:30:05Z".to_string()),
            body: Some("<p>Fixes &amp; features</p>".to_string()),
            assets: vec![],
        }
    }

    fn sample_match(name: &str, size: u64) -> AssetMatch {
        AssetMatch {
            asset: Asset {
                id: 7,
                name: name.to_string(),
                browser_download_url: format!(
                    "https://github.com/octo/widget/releases/download/v1.2.0/{name}"
                ),
                size,
            },
            platform: "windows-x64".to_string(),
        }
    }

    fn sample_accepted() -> AcceptedRelease {
        AcceptedRelease {
            version: "1.2.0".to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap(),
            published_at: DateTime::parse_from_rfc3339("2024-03-02T11:30:05Z").unwrap(),
            matches: vec![],
        }
    }

    fn sample_channel() -> Channel {
        Channel {
            title: "widget".to_string(),
            description: Some("Widgets for everyone".to_string()),
            language: "en".to_string(),
        }
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(
            guess_mime_type(Path::new("/tmp/appcast-asset-x.msi")),
            "application/x-msi-installer"
        );
        assert_eq!(
            guess_mime_type(Path::new("/tmp/widget.ZIP")),
            "application/zip"
        );
        assert_eq!(
            guess_mime_type(Path::new("/tmp/widget.unknownext")),
            "application/octet-stream"
        );
        assert_eq!(
            guess_mime_type(Path::new("/tmp/no-extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_installer_arguments_only_for_msi() {
        assert_eq!(installer_arguments("myapp-1.2.0-win64.msi"), Some("/passive"));
        assert_eq!(installer_arguments("myapp-1.2.0-win64.MSI"), Some("/passive"));
        assert_eq!(installer_arguments("myapp-1.2.0.exe"), None);
        assert_eq!(installer_arguments("msi"), None);
    }

    #[test]
    fn test_build_item_fields() {
        let item = AppcastItem::build(
            &sample_release(false),
            &sample_accepted(),
            &sample_match("myapp-1.2.0-win64.msi", 4096),
            "dev",
            "application/x-msi-installer".to_string(),
            None,
        );
        assert_eq!(item.title, "Widget 1.2.0");
        assert_eq!(item.channel, None);
        assert_eq!(item.version, "1.2.0");
        assert_eq!(item.pub_date, "Sat, 02 Mar 2024 11:30:05 +0000");
        assert_eq!(item.os, "windows-x64");
        assert_eq!(item.enclosure.length, 4096);
        assert_eq!(item.enclosure.short_version_string, "1.2.0");
        assert_eq!(item.installer_arguments.as_deref(), Some("/passive"));
    }

    #[test]
    fn test_prerelease_gets_channel() {
        let item = AppcastItem::build(
            &sample_release(true),
            &sample_accepted(),
            &sample_match("myapp-1.2.0-win64.msi", 1),
            "dev",
            "application/x-msi-installer".to_string(),
            None,
        );
        assert_eq!(item.channel.as_deref(), Some("dev"));
    }

    #[test]
    fn test_to_xml_full_document() {
        let mut appcast = Appcast::new(sample_channel());
        appcast.push(AppcastItem::build(
            &sample_release(true),
            &sample_accepted(),
            &sample_match("myapp-1.2.0-win64.msi", 4096),
            "dev",
            "application/x-msi-installer".to_string(),
            Some("MCwCFA==".to_string()),
        ));

        let expected = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:sparkle="http://www.andymatuschak.org/xml-namespaces/sparkle">
  <channel>
    <title>widget</title>
    <description>Widgets for everyone</description>
    <language>en</language>
    <item>
      <title>Widget 1.2.0</title>
      <sparkle:channel>dev</sparkle:channel>
      <sparkle:fullReleaseNotesLink>https://github.com/octo/widget/releases/tag/v1.2.0</sparkle:fullReleaseNotesLink>
      <sparkle:version>1.2.0</sparkle:version>
      <pubDate>Sat, 02 Mar 2024 11:30:05 +0000</pubDate>
      <sparkle:os>windows-x64</sparkle:os>
      <description>&lt;p&gt;Fixes &amp;amp; features&lt;/p&gt;</description>
      <enclosure url="https://github.com/octo/widget/releases/download/v1.2.0/myapp-1.2.0-win64.msi" sparkle:version="1.2.0" sparkle:shortVersionString="1.2.0" length="4096" type="application/x-msi-installer" sparkle:dsaSignature="MCwCFA=="/>
      <sparkle:installerArguments>/passive</sparkle:installerArguments>
    </item>
  </channel>
</rss>
"#;
        assert_eq!(appcast.to_xml().unwrap(), expected);
    }

    #[test]
    fn test_to_xml_omits_optional_fields() {
        let mut appcast = Appcast::new(Channel {
            description: None,
            ..sample_channel()
        });
        appcast.push(AppcastItem::build(
            &sample_release(false),
            &sample_accepted(),
            &sample_match("myapp-1.2.0.zip", 10),
            "dev",
            "application/zip".to_string(),
            None,
        ));

        let xml = appcast.to_xml().unwrap();
        assert!(xml.contains("<description/>"));
        assert!(!xml.contains("sparkle:channel"));
        assert!(!xml.contains("dsaSignature"));
        assert!(!xml.contains("installerArguments"));
        assert!(xml.contains(r#"type="application/zip""#));
    }

    #[test]
    fn test_to_xml_escapes_attribute_values() {
        let mut appcast = Appcast::new(sample_channel());
        let mut matched = sample_match("a.zip", 1);
        matched.asset.browser_download_url = "https://example.com/a.zip?x=1&y=\"2\"".to_string();
        appcast.push(AppcastItem::build(
            &sample_release(false),
            &sample_accepted(),
            &matched,
            "dev",
            "application/zip".to_string(),
            None,
        ));
        let xml = appcast.to_xml().unwrap();
        assert!(xml.contains(r#"url="https://example.com/a.zip?x=1&amp;y=&quot;2&quot;""#));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appcast.xml");
        let appcast = Appcast::new(sample_channel());

        appcast.write_to_file(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, appcast.to_xml().unwrap());
        // Only the destination remains; the temp file was renamed away.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
