//! Signing keys with secure memory handling.
//!
//! The secret scalar lives inside `k256::ecdsa::SigningKey`, which zeroizes
//! itself on drop. Hex exports are returned as `Zeroizing` strings.

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

use weavegate_common::{Address, Error, Result};

use crate::hash::{address_from_verifying_key, eip191_hash};

/// Length of a secret key in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Length of a recoverable signature (`r || s || v`).
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 key used for token issuance and data item signing.
#[derive(Clone)]
pub struct EthereumKey {
    signing_key: SigningKey,
}

impl EthereumKey {
    /// Generate a random key.
    ///
    /// # Errors
    /// - Returns error if the random bytes do not form a valid scalar
    ///   (probability ~2^-128)
    pub fn generate() -> Result<Self> {
        let secret = Zeroizing::new(rand::random::<[u8; SECRET_KEY_LENGTH]>());
        Self::from_bytes(*secret)
    }

    /// Create a key from its 32-byte secret.
    ///
    /// # Errors
    /// - Secret is zero or not below the curve order
    pub fn from_bytes(secret: [u8; SECRET_KEY_LENGTH]) -> Result<Self> {
        let secret = Zeroizing::new(secret);
        let signing_key = SigningKey::from_bytes((&*secret).into())
            .map_err(|_| Error::Crypto("Invalid secret key".to_string()))?;
        Ok(Self { signing_key })
    }

    /// Parse a hex secret, with or without the `0x` prefix.
    ///
    /// # Errors
    /// - Not 64 hex characters
    /// - Invalid scalar
    pub fn from_hex(secret: &str) -> Result<Self> {
        let trimmed = secret.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
        hex::decode_to_slice(hex_part, &mut *bytes)
            .map_err(|_| Error::Crypto("Secret key must be 32 bytes of hex".to_string()))?;
        Self::from_bytes(*bytes)
    }

    /// Export the secret as `0x`-prefixed hex.
    pub fn to_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(<[u8; SECRET_KEY_LENGTH]>::from(self.signing_key.to_bytes()));
        Zeroizing::new(format!("0x{}", hex::encode(*bytes)))
    }

    /// Account address of this key.
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Uncompressed SEC1 public key (65 bytes, `0x04 || x || y`).
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Sign a 32-byte prehash, producing a recoverable signature with `v` in {27, 28}.
    ///
    /// # Errors
    /// - Signing failure (not expected for valid keys)
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<RecoverableSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| Error::Crypto(format!("Signing failed: {}", e)))?;

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = 27 + recovery_id.to_byte();
        Ok(RecoverableSignature(bytes))
    }

    /// EIP-191 personal-sign `message`.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature> {
        self.sign_prehash(&eip191_hash(message))
    }
}

impl fmt::Debug for EthereumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthereumKey({}, [REDACTED])", self.address())
    }
}

/// 65-byte recoverable secp256k1 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Parse `0x`-prefixed hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex_part = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| Error::Crypto("Signature must be 65 bytes of hex".to_string()))?;
        Ok(Self(bytes))
    }

    /// `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", self.to_hex())
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
