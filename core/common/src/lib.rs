//! Common utilities and types shared across WeaveGate crates.
//!
//! This crate provides the error taxonomy, identifier types and the locator
//! classifier that every other crate depends on, so that a locator or an
//! error means the same thing on both the write path and the read path.

pub mod error;
pub mod locator;
pub mod tag;
pub mod types;

pub use error::{BackendErrorKind, Error, Result, RevertReason};
pub use locator::{classify, BackendType, Locator};
pub use tag::{find_tag, Tag};
pub use types::{Address, ResourceId};
