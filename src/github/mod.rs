//! GitHub REST API access for appcast generation.
//!
//! - [`client`] - Authenticated client: repository lookup, release listing,
//!   markdown rendering and asset download
//! - [`pagination`] - Bounded, cursor-following retrieval of list endpoints
//! - [`types`] - The release, asset and repository records we read
//!
//! Every call is issued sequentially and none is retried; the first failure
//! is returned to the caller as an [`ApiError`].

mod client;
mod pagination;
mod types;

pub use client::{base_headers, derive_headers, ApiError, GitHubClient, API_VERSION};
pub use pagination::{fetch_pages, parse_next_link, LinkHeaderCursor, NextPageCursor};
pub use types::{Asset, Release, Repository};
