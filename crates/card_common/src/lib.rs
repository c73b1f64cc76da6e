//! Shared foundational types used across the card compiler workspace.
//!
//! This crate provides canonical card URLs and their cache-safe encoding,
//! rendering formats, content hashing, and the module descriptors exchanged
//! between the compiler and a module registry.

#![warn(missing_docs)]

pub mod card_url;
pub mod format;
pub mod hash;
pub mod module;

pub use card_url::{encode_card_url, CardUrl, UrlError};
pub use format::{Format, ParseFormatError};
pub use hash::ContentHash;
pub use module::{ContentType, ModuleRef, ModuleSource};
