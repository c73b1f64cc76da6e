//! Card builder.
//!
//! Fronts the compiler with URL-keyed raw and compiled caches, fetches raw
//! cards from realms, coalesces concurrent requests for the same card onto a
//! single fetch or compile, and owns every module its compiles define.

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod realm;

pub use builder::{Builder, BuilderStats, COMPILED_SUBDIR};
pub use error::BuilderError;
pub use realm::{FsRealm, InMemoryRealm, Realm, RealmSet, CARD_DESCRIPTOR};
