//! Keccak-256 hashing and signer recovery.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use weavegate_common::{Address, Error, Result};

use crate::keys::RecoverableSignature;

/// Keccak-256 hash.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-191 personal-message hash of `message`.
///
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Derive the account address of a public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point prefix.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address::from_bytes(address)
}

/// Recover the signer address from a prehashed message and signature.
///
/// # Errors
/// - Malformed signature or recovery id
/// - Recovery fails (signature does not correspond to any key)
pub fn recover_address(prehash: &[u8; 32], signature: &RecoverableSignature) -> Result<Address> {
    let bytes = signature.as_bytes();
    let sig = Signature::from_slice(&bytes[..64])
        .map_err(|_| Error::Crypto("Invalid signature encoding".to_string()))?;

    let v = match bytes[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        other => {
            return Err(Error::Crypto(format!("Invalid recovery id: {}", other)));
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| Error::Crypto(format!("Invalid recovery id: {}", v)))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|_| Error::Crypto("Signer recovery failed".to_string()))?;

    Ok(address_from_verifying_key(&key))
}
