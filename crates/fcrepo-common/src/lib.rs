//! fcrepo Common - Shared types and utilities
//!
//! This crate provides the identifier types, configuration, error
//! taxonomy and cached-document helper used by the storage and journal
//! crates.

pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use cache::{CachedDocument, SourceVersion};
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
