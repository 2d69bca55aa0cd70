//! Cryptographic primitives for WeaveGate.
//!
//! This module provides:
//! - secp256k1 signing keys with Ethereum-style addresses
//! - Keccak-256, EIP-191 message hashing and signer recovery
//! - Delegated authorization tokens bound to a resource, delegate,
//!   index bound and expiry
//! - Content identifiers for the permanent and pinned stores
//!
//! # Security Guarantees
//! - Secret key material is zeroized on drop and never logged
//! - Signatures are low-S normalized and recoverable
//! - Address comparisons on the verification path are constant-time

pub mod auth;
pub mod content;
pub mod hash;
pub mod keys;

pub use auth::{AuthorizationToken, TokenClaims, TOKEN_VERSION};
pub use content::{content_digest_id, fingerprint, raw_cid_v1, signature_id, verify_raw_cid};
pub use hash::{eip191_hash, keccak256, recover_address};
pub use keys::{EthereumKey, RecoverableSignature};
