//! Generate a Sparkle appcast from the releases of a GitHub repository.
//!
//! A run fetches the repository and its most recent releases, keeps the
//! assets that match a platform rule, optionally signs each one with a DSA
//! key, and writes a single RSS 2.0 document with Sparkle extensions.
//! See [`pipeline::run`].

pub mod config;
pub mod feed;
pub mod github;
pub mod pipeline;
pub mod signing;
pub mod util;
