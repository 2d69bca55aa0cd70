//! Content identifiers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use cid::Cid;
use multihash::Multihash;
use sha2::Sha256;

use weavegate_common::{Error, Result};

/// Multicodec code for raw binary content.
pub const RAW_CODEC: u64 = 0x55;

/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Permanent-store id of a signed item: base64url(sha256(signature)).
pub fn signature_id(signature: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(signature))
}

/// Content-derived id in the permanent-store alphabet: base64url(sha256(data)).
pub fn content_digest_id(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(data))
}

/// CIDv1 (raw codec, sha2-256) of a single-block payload, base32 encoded.
///
/// This matches what a pinning node returns for content added with
/// `cid-version=1` and `raw-leaves=true` when it fits in one chunk.
///
/// # Errors
/// - Multihash construction failure (not expected for 32-byte digests)
pub fn raw_cid_v1(data: &[u8]) -> Result<String> {
    let digest = Sha256::digest(data);
    let hash = Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| Error::Crypto(format!("Multihash failed: {}", e)))?;
    Ok(Cid::new_v1(RAW_CODEC, hash).to_string())
}

/// Check `data` against a CID that addresses a single raw block.
///
/// Returns `None` when the CID cannot be checked locally (another codec or
/// hash function, such as the root of a chunked DAG).
///
/// # Errors
/// - `cid` is not a valid CID string
pub fn verify_raw_cid(cid: &str, data: &[u8]) -> Result<Option<bool>> {
    let cid = Cid::try_from(cid).map_err(|e| Error::InvalidInput(format!("Invalid CID: {}", e)))?;
    if cid.codec() != RAW_CODEC || cid.hash().code() != SHA2_256 {
        return Ok(None);
    }
    Ok(Some(cid.hash().digest() == Sha256::digest(data).as_slice()))
}

/// Blake2b-256 fingerprint of arbitrary bytes.
pub fn fingerprint(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_cid_v1_known_value() {
        // `echo -n hello | ipfs add --cid-version=1 --raw-leaves`
        assert_eq!(
            raw_cid_v1(b"hello").unwrap(),
            "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq"
        );
    }

    #[test]
    fn test_verify_raw_cid() {
        let cid = raw_cid_v1(b"hello").unwrap();
        assert_eq!(verify_raw_cid(&cid, b"hello").unwrap(), Some(true));
        assert_eq!(verify_raw_cid(&cid, b"hellO").unwrap(), Some(false));
        // dag-pb root of a chunked file: not checkable locally
        assert_eq!(
            verify_raw_cid("QmWATWQ7fVPP2EFGu71UkfnqhYXDYH566qy47CnJDgvs8u", b"x").unwrap(),
            None
        );
        assert!(verify_raw_cid("not-a-cid", b"x").is_err());
    }

    #[test]
    fn test_digest_id_shape() {
        let id = content_digest_id(b"{\"score\":85}");
        assert_eq!(id.len(), 43);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_signature_id_differs_from_content_id() {
        let bytes = [7u8; 65];
        assert_ne!(signature_id(&bytes), content_digest_id(b"other"));
        assert_eq!(signature_id(&bytes), signature_id(&bytes));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
    }
}
