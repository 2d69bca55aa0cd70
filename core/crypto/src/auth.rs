//! Delegated authorization tokens.
//!
//! A resource owner signs a [`TokenClaims`] value allowing one delegate to
//! submit operations against one resource, up to an index bound and before
//! an expiry. The claims are encoded as fixed 32-byte big-endian words,
//! hashed with Keccak-256 and signed with EIP-191, so any verifier holding
//! the token can recover the signer without contacting the issuer.
//!
//! # Wire format
//! `hex(words[8] || signature[65])` where the words are, in order:
//! version, chain id, token id, delegate, index bound, expiry, registry,
//! signer. Addresses are left-padded with zeros.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use weavegate_common::{Address, Error, ResourceId, Result, RevertReason};

use crate::hash::{eip191_hash, keccak256, recover_address};
use crate::keys::{EthereumKey, RecoverableSignature, SIGNATURE_LENGTH};

/// Current token format version.
pub const TOKEN_VERSION: u8 = 1;

const WORD: usize = 32;
const CLAIM_WORDS: usize = 8;
const ENCODED_CLAIMS_LENGTH: usize = WORD * CLAIM_WORDS;

/// The signed content of an authorization token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Format version.
    pub version: u8,
    /// Resource the delegate may act on.
    pub resource: ResourceId,
    /// Address allowed to consume the token.
    pub delegate: Address,
    /// Highest per-resource index the token may be used for (inclusive).
    pub index_bound: u64,
    /// Unix timestamp (seconds) after which the token is invalid.
    pub expiry: u64,
    /// Registry contract the resource lives in.
    pub registry: Address,
    /// Address that signed the token.
    pub signer: Address,
}

impl TokenClaims {
    /// Chain the token is scoped to.
    pub fn chain_id(&self) -> u64 {
        self.resource.chain_id()
    }

    /// Fixed-width encoding of the claims.
    pub fn encode(&self) -> [u8; ENCODED_CLAIMS_LENGTH] {
        let mut out = [0u8; ENCODED_CLAIMS_LENGTH];
        put_u64(&mut out, 0, self.version as u64);
        put_u64(&mut out, 1, self.resource.chain_id());
        put_u64(&mut out, 2, self.resource.token_id());
        put_address(&mut out, 3, &self.delegate);
        put_u64(&mut out, 4, self.index_bound);
        put_u64(&mut out, 5, self.expiry);
        put_address(&mut out, 6, &self.registry);
        put_address(&mut out, 7, &self.signer);
        out
    }

    /// Decode claims from their fixed-width encoding.
    ///
    /// # Errors
    /// - Wrong length, or a word has non-zero padding
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENCODED_CLAIMS_LENGTH {
            return Err(Error::InvalidInput(format!(
                "Encoded claims must be {} bytes, got {}",
                ENCODED_CLAIMS_LENGTH,
                bytes.len()
            )));
        }
        let version = get_u64(bytes, 0)?;
        let version = u8::try_from(version)
            .map_err(|_| Error::InvalidInput(format!("Invalid token version {}", version)))?;

        Ok(Self {
            version,
            resource: ResourceId::new(get_u64(bytes, 1)?, get_u64(bytes, 2)?),
            delegate: get_address(bytes, 3)?,
            index_bound: get_u64(bytes, 4)?,
            expiry: get_u64(bytes, 5)?,
            registry: get_address(bytes, 6)?,
            signer: get_address(bytes, 7)?,
        })
    }

    /// Keccak-256 digest of the encoded claims.
    pub fn digest(&self) -> [u8; 32] {
        keccak256(&self.encode())
    }

    /// Check the consumption bounds of these claims.
    ///
    /// Valid iff `delegate` matches, `now < expiry`, and
    /// `index <= index_bound`, where `index` is the per-resource index the
    /// operation would consume.
    pub fn check_bounds(
        &self,
        delegate: &Address,
        index: u64,
        now: u64,
    ) -> std::result::Result<(), RevertReason> {
        if !addresses_equal(&self.delegate, delegate) {
            return Err(RevertReason::DelegateMismatch);
        }
        if now >= self.expiry {
            return Err(RevertReason::AuthorizationExpired);
        }
        if index > self.index_bound {
            return Err(RevertReason::IndexLimitExceeded);
        }
        Ok(())
    }
}

/// A signed authorization token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationToken {
    claims: TokenClaims,
    signature: RecoverableSignature,
}

impl AuthorizationToken {
    /// Sign claims with `key`.
    ///
    /// # Errors
    /// - `claims.signer` is not the address of `key`
    /// - Unsupported version
    pub fn sign(claims: TokenClaims, key: &EthereumKey) -> Result<Self> {
        if claims.version != TOKEN_VERSION {
            return Err(Error::InvalidInput(format!(
                "Unsupported token version {}",
                claims.version
            )));
        }
        if claims.signer != key.address() {
            return Err(Error::InvalidInput(format!(
                "Claims name signer {} but key is {}",
                claims.signer,
                key.address()
            )));
        }
        let signature = key.sign_message(&claims.digest())?;
        Ok(Self { claims, signature })
    }

    /// Assemble a token from parts without verifying it.
    pub fn from_parts(claims: TokenClaims, signature: RecoverableSignature) -> Self {
        Self { claims, signature }
    }

    /// The signed claims.
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// The signature.
    pub fn signature(&self) -> &RecoverableSignature {
        &self.signature
    }

    /// Recover the address that actually produced the signature.
    pub fn recover_signer(&self) -> Result<Address> {
        recover_address(&eip191_hash(&self.claims.digest()), &self.signature)
    }

    /// Full verification as performed by the ledger.
    ///
    /// Checks, in order: version and scope (resource, registry), that the
    /// signature recovers to the claimed signer, that `is_authorized`
    /// accepts the signer, then the consumption bounds.
    pub fn verify<F>(
        &self,
        resource: &ResourceId,
        registry: &Address,
        delegate: &Address,
        index: u64,
        now: u64,
        is_authorized: F,
    ) -> std::result::Result<(), RevertReason>
    where
        F: Fn(&Address) -> bool,
    {
        if self.claims.version != TOKEN_VERSION
            || &self.claims.resource != resource
            || !addresses_equal(&self.claims.registry, registry)
        {
            return Err(RevertReason::ScopeMismatch);
        }

        let recovered = self
            .recover_signer()
            .map_err(|_| RevertReason::SignerNotAuthorized)?;
        if !addresses_equal(&recovered, &self.claims.signer) || !is_authorized(&recovered) {
            return Err(RevertReason::SignerNotAuthorized);
        }

        self.claims.check_bounds(delegate, index, now)
    }

    /// Opaque hex form for passing between processes.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(ENCODED_CLAIMS_LENGTH + SIGNATURE_LENGTH);
        bytes.extend_from_slice(&self.claims.encode());
        bytes.extend_from_slice(self.signature.as_bytes());
        format!("0x{}", hex::encode(bytes))
    }

    /// Parse the opaque hex form.
    ///
    /// # Errors
    /// - Invalid hex or length
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| Error::InvalidInput(format!("Invalid token hex: {}", e)))?;
        if bytes.len() != ENCODED_CLAIMS_LENGTH + SIGNATURE_LENGTH {
            return Err(Error::InvalidInput(format!(
                "Token must be {} bytes, got {}",
                ENCODED_CLAIMS_LENGTH + SIGNATURE_LENGTH,
                bytes.len()
            )));
        }
        let claims = TokenClaims::decode(&bytes[..ENCODED_CLAIMS_LENGTH])?;
        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&bytes[ENCODED_CLAIMS_LENGTH..]);
        Ok(Self {
            claims,
            signature: RecoverableSignature::from_bytes(signature),
        })
    }
}

fn addresses_equal(a: &Address, b: &Address) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn put_u64(out: &mut [u8], word: usize, value: u64) {
    let end = (word + 1) * WORD;
    out[end - 8..end].copy_from_slice(&value.to_be_bytes());
}

fn put_address(out: &mut [u8], word: usize, address: &Address) {
    let end = (word + 1) * WORD;
    out[end - 20..end].copy_from_slice(address.as_bytes());
}

fn get_u64(bytes: &[u8], word: usize) -> Result<u64> {
    let start = word * WORD;
    let end = start + WORD;
    if bytes[start..end - 8].iter().any(|b| *b != 0) {
        return Err(Error::InvalidInput(format!("Claim word {} overflows u64", word)));
    }
    let mut value = [0u8; 8];
    value.copy_from_slice(&bytes[end - 8..end]);
    Ok(u64::from_be_bytes(value))
}

fn get_address(bytes: &[u8], word: usize) -> Result<Address> {
    let start = word * WORD;
    let end = start + WORD;
    if bytes[start..end - 20].iter().any(|b| *b != 0) {
        return Err(Error::InvalidInput(format!(
            "Claim word {} is not an address",
            word
        )));
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes[end - 20..end]);
    Ok(Address::from_bytes(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_760_000_000;

    fn registry() -> Address {
        Address::from_bytes([0x8a; 20])
    }

    fn delegate() -> Address {
        Address::from_bytes([0x42; 20])
    }

    fn claims_for(owner: &EthereumKey) -> TokenClaims {
        TokenClaims {
            version: TOKEN_VERSION,
            resource: ResourceId::new(11155111, 1676),
            delegate: delegate(),
            index_bound: 3,
            expiry: NOW + 24 * 3600,
            registry: registry(),
            signer: owner.address(),
        }
    }

    fn verify(token: &AuthorizationToken, owner: &Address, index: u64, now: u64) -> std::result::Result<(), RevertReason> {
        token.verify(
            &ResourceId::new(11155111, 1676),
            &registry(),
            &delegate(),
            index,
            now,
            |signer| signer == owner,
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        assert_eq!(token.recover_signer().unwrap(), owner.address());
        assert!(verify(&token, &owner.address(), 1, NOW).is_ok());
    }

    #[test]
    fn test_sign_rejects_foreign_signer_field() {
        let owner = EthereumKey::generate().unwrap();
        let other = EthereumKey::generate().unwrap();
        assert!(AuthorizationToken::sign(claims_for(&owner), &other).is_err());
    }

    #[test]
    fn test_index_boundary() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        assert!(verify(&token, &owner.address(), 3, NOW).is_ok());
        assert_eq!(
            verify(&token, &owner.address(), 4, NOW),
            Err(RevertReason::IndexLimitExceeded)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let owner = EthereumKey::generate().unwrap();
        let claims = claims_for(&owner);
        let expiry = claims.expiry;
        let token = AuthorizationToken::sign(claims, &owner).unwrap();
        assert!(verify(&token, &owner.address(), 1, expiry - 1).is_ok());
        assert_eq!(
            verify(&token, &owner.address(), 1, expiry),
            Err(RevertReason::AuthorizationExpired)
        );
    }

    #[test]
    fn test_delegate_mismatch() {
        let owner = EthereumKey::generate().unwrap();
        let claims = claims_for(&owner);
        assert_eq!(
            claims.check_bounds(&Address::from_bytes([0x43; 20]), 1, NOW),
            Err(RevertReason::DelegateMismatch)
        );
        assert!(claims.check_bounds(&delegate(), 1, NOW).is_ok());
    }

    #[test]
    fn test_unauthorized_signer() {
        let owner = EthereumKey::generate().unwrap();
        let stranger = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&stranger), &stranger).unwrap();
        assert_eq!(
            verify(&token, &owner.address(), 1, NOW),
            Err(RevertReason::SignerNotAuthorized)
        );
    }

    #[test]
    fn test_tampered_claims_fail_recovery_check() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        let mut claims = token.claims().clone();
        claims.index_bound = 1_000;
        let forged = AuthorizationToken::from_parts(claims, *token.signature());
        assert_eq!(
            verify(&forged, &owner.address(), 1, NOW),
            Err(RevertReason::SignerNotAuthorized)
        );
    }

    #[test]
    fn test_scope_mismatch() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        let result = token.verify(
            &ResourceId::new(11155111, 1677),
            &registry(),
            &delegate(),
            1,
            NOW,
            |_| true,
        );
        assert_eq!(result, Err(RevertReason::ScopeMismatch));
    }

    #[test]
    fn test_hex_roundtrip() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        let decoded = AuthorizationToken::from_hex(&token.to_hex()).unwrap();
        assert_eq!(decoded, token);
        assert!(AuthorizationToken::from_hex("0x00").is_err());
    }

    #[test]
    fn test_json_shape() {
        let owner = EthereumKey::generate().unwrap();
        let token = AuthorizationToken::sign(claims_for(&owner), &owner).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["claims"]["resource"], "11155111:1676");
        assert_eq!(json["claims"]["indexBound"], 3);
    }
}
