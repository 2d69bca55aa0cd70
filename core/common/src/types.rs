//! Common types used throughout WeaveGate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 20-byte account address.
///
/// Parsed from and displayed as `0x`-prefixed hex. Display is always
/// lowercase so that addresses compare equal in logs and tags regardless
/// of the checksum casing they were entered with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a hex address, with or without the `0x` prefix.
    ///
    /// # Errors
    /// - Returns error if the input is not 40 hex characters
    pub fn parse(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.len() != 40 {
            return Err(crate::Error::InvalidInput(format!(
                "Address must be 40 hex characters, got {}",
                hex_part.len()
            )));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid address hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Identifier of a ledger resource (an agent), scoped to a chain.
///
/// Rendered as `<chain_id>:<token_id>`, e.g. `11155111:1676`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    chain_id: u64,
    token_id: u64,
}

impl ResourceId {
    /// Create a new resource id.
    pub fn new(chain_id: u64, token_id: u64) -> Self {
        Self { chain_id, token_id }
    }

    /// Chain the resource lives on.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Token id within the registry.
    pub fn token_id(&self) -> u64 {
        self.token_id
    }

    /// Parse `<chain_id>:<token_id>`.
    ///
    /// # Errors
    /// - Returns error if either component is missing or not a number
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (chain, token) = s.trim().split_once(':').ok_or_else(|| {
            crate::Error::InvalidInput(format!("Resource id must be <chain>:<token>, got '{}'", s))
        })?;
        let chain_id = chain
            .parse()
            .map_err(|_| crate::Error::InvalidInput(format!("Invalid chain id '{}'", chain)))?;
        let token_id = token
            .parse()
            .map_err(|_| crate::Error::InvalidInput(format!("Invalid token id '{}'", token)))?;
        Ok(Self { chain_id, token_id })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.token_id)
    }
}

impl FromStr for ResourceId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}
