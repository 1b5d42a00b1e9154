//! Resolves the transitive dependency set of a package by walking a package index website,
//! then downloads and hash-verifies an installable artifact for every package found.
//!
//! # Usage
//! 1. Load a [`Config`] (or use the default).
//! 1. Create a [`Session`] with an [`HttpClient`](fetcher::HttpClient), usually
//! [`ReqwestClient`](fetcher::ReqwestClient), and a [`PageExtractor`](extractor::PageExtractor).
//! 1. [`Session::run()`] for each root package to resolve and download everything into its workspace.
//! 1. Inspect the returned [`SessionReport`] for per-package results.

pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod cancel;
pub use cancel::CancelToken;

pub mod package;
pub use package::PackageName;
pub use package::InstalledSet;

pub mod fetcher;
pub use fetcher::Fetcher;

pub mod extractor;
pub mod resolver;
pub mod download;

pub mod session;
pub use session::Session;
pub use session::SessionReport;

#[cfg(test)]
mod testing;
