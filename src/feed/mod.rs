//! Appcast construction: which releases and assets qualify, and how they
//! are written out.
//!
//! - [`classifier`] - Draft/tag/timestamp checks and platform rule matching
//! - [`appcast`] - The RSS 2.0 + Sparkle document model and its XML writer
//!
//! # Example
//!
//! ```ignore
//! use appcast::feed::{Appcast, AppcastItem, Channel, Classification, Classifier};
//!
//! let mut appcast = Appcast::new(Channel::from_repository(&repo, "en"));
//! if let Classification::Accepted(accepted) = classifier.classify(&release)? {
//!     for matched in &accepted.matches {
//!         appcast.push(AppcastItem::build(&release, &accepted, matched, "dev", mime, None));
//!     }
//! }
//! let xml = appcast.to_xml()?;
//! ```

mod appcast;
mod classifier;

pub use appcast::{
    guess_mime_type, installer_arguments, Appcast, AppcastItem, Channel, Enclosure,
    MSI_INSTALLER_ARGUMENTS, PUB_DATE_FORMAT, SPARKLE_NS,
};
pub use classifier::{
    extract_version, AcceptedRelease, AssetMatch, Classification, Classifier, ClassifyError,
    MatchPolicy, PlatformRule, PlatformRules, SkipReason,
};
