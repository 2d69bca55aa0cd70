//! Arweave permanent-store backend.
//!
//! - ANS-104 data items signed with an Ethereum (secp256k1) key
//! - Uploads through a bundler, reads through a gateway
//! - Ids computed locally and checked against the bundler's answer

pub mod bundle;
pub mod provider;

pub use bundle::{deep_hash, encode_tags, DataItem, DeepHashChunk};
pub use provider::{create_arweave_backend, ArweaveBackend, ArweaveConfig, UploadResponse};
