//! ANS-104 data items signed with an Ethereum key.
//!
//! Binary layout:
//!
//! | field | size |
//! |---|---|
//! | signature type (LE) | 2 |
//! | signature | 65 |
//! | owner (uncompressed public key) | 65 |
//! | target present | 1 (always 0) |
//! | anchor present | 1 (always 0) |
//! | tag count (LE) | 8 |
//! | tag bytes length (LE) | 8 |
//! | tags (Avro) | n |
//! | data | rest |
//!
//! The signature is an EIP-191 personal signature over the SHA-384 deep
//! hash of the item fields. The item id is base64url(sha256(signature)).

use bytes::Bytes;
use sha2::{Digest, Sha384};

use weavegate_common::{Error, Result, Tag};
use weavegate_crypto::{signature_id, EthereumKey};

/// Signature type for secp256k1 / EIP-191 signers.
pub const ETHEREUM_SIGNATURE_TYPE: u16 = 3;

/// Maximum number of tags on a data item.
pub const MAX_TAGS: usize = 128;
/// Maximum tag name length in bytes.
pub const MAX_TAG_NAME_BYTES: usize = 1024;
/// Maximum tag value length in bytes.
pub const MAX_TAG_VALUE_BYTES: usize = 3072;

const SIGNATURE_LENGTH: usize = 65;
const OWNER_LENGTH: usize = 65;

/// A signed data item ready for upload.
#[derive(Clone)]
pub struct DataItem {
    signature: [u8; SIGNATURE_LENGTH],
    owner: [u8; OWNER_LENGTH],
    tag_count: u64,
    tag_bytes: Vec<u8>,
    data: Bytes,
}

impl DataItem {
    /// Build and sign a data item.
    ///
    /// # Errors
    /// - Tag limits exceeded or empty tag name/value
    /// - Signing failure
    pub fn sign(data: Bytes, tags: &[Tag], key: &EthereumKey) -> Result<Self> {
        let tag_bytes = encode_tags(tags)?;
        let owner = key.public_key_uncompressed();
        let signature_type = ETHEREUM_SIGNATURE_TYPE.to_string();

        let message = deep_hash(&[
            DeepHashChunk::Blob(b"dataitem"),
            DeepHashChunk::Blob(b"1"),
            DeepHashChunk::Blob(signature_type.as_bytes()),
            DeepHashChunk::Blob(&owner),
            DeepHashChunk::Blob(&[]),
            DeepHashChunk::Blob(&[]),
            DeepHashChunk::Blob(&tag_bytes),
            DeepHashChunk::Blob(&data),
        ]);
        let signature = key.sign_message(&message)?;

        Ok(Self {
            signature: *signature.as_bytes(),
            owner,
            tag_count: tags.len() as u64,
            tag_bytes,
            data,
        })
    }

    /// The item id as assigned by the permanent store.
    pub fn id(&self) -> String {
        signature_id(&self.signature)
    }

    /// Serialized item.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 + SIGNATURE_LENGTH + OWNER_LENGTH + 2 + 16 + self.tag_bytes.len() + self.data.len(),
        );
        out.extend_from_slice(&ETHEREUM_SIGNATURE_TYPE.to_le_bytes());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.owner);
        out.push(0); // no target
        out.push(0); // no anchor
        out.extend_from_slice(&self.tag_count.to_le_bytes());
        out.extend_from_slice(&(self.tag_bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.tag_bytes);
        out.extend_from_slice(&self.data);
        out
    }

    /// Size of the payload carried by the item.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}

/// Input to [`deep_hash`].
pub enum DeepHashChunk<'a> {
    Blob(&'a [u8]),
    List(Vec<DeepHashChunk<'a>>),
}

/// Arweave deep hash of a list of chunks.
pub fn deep_hash(chunks: &[DeepHashChunk<'_>]) -> [u8; 48] {
    let tag = format!("list{}", chunks.len());
    let mut acc: [u8; 48] = Sha384::digest(tag.as_bytes()).into();
    for chunk in chunks {
        let child = match chunk {
            DeepHashChunk::Blob(data) => deep_hash_blob(data),
            DeepHashChunk::List(items) => deep_hash(items),
        };
        let mut hasher = Sha384::new();
        hasher.update(acc);
        hasher.update(child);
        acc = hasher.finalize().into();
    }
    acc
}

fn deep_hash_blob(data: &[u8]) -> [u8; 48] {
    let tag = format!("blob{}", data.len());
    let mut hasher = Sha384::new();
    hasher.update(Sha384::digest(tag.as_bytes()));
    hasher.update(Sha384::digest(data));
    hasher.finalize().into()
}

/// Avro-encode tags as `array<record{name: bytes, value: bytes}>`.
///
/// An empty tag list encodes to zero bytes.
pub fn encode_tags(tags: &[Tag]) -> Result<Vec<u8>> {
    if tags.len() > MAX_TAGS {
        return Err(Error::InvalidInput(format!(
            "Too many tags: {} (max {})",
            tags.len(),
            MAX_TAGS
        )));
    }
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    write_long(&mut out, tags.len() as i64);
    for tag in tags {
        if tag.name.is_empty() || tag.value.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Tag name and value must be non-empty (tag '{}')",
                tag.name
            )));
        }
        if tag.name.len() > MAX_TAG_NAME_BYTES || tag.value.len() > MAX_TAG_VALUE_BYTES {
            return Err(Error::InvalidInput(format!(
                "Tag '{}' exceeds size limits",
                tag.name
            )));
        }
        write_bytes(&mut out, tag.name.as_bytes());
        write_bytes(&mut out, tag.value.as_bytes());
    }
    write_long(&mut out, 0);
    Ok(out)
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

fn write_long(out: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavegate_crypto::{eip191_hash, recover_address, RecoverableSignature};

    #[test]
    fn test_avro_tags_encoding() {
        let encoded = encode_tags(&[Tag::new("a", "bc")]).unwrap();
        // count=1 (zigzag 2), len 1 (2) "a", len 2 (4) "bc", terminator 0
        assert_eq!(encoded, vec![2, 2, b'a', 4, b'b', b'c', 0]);
        assert!(encode_tags(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_avro_long_varint() {
        let mut out = Vec::new();
        write_long(&mut out, 64);
        assert_eq!(out, vec![0x80, 0x01]);
    }

    #[test]
    fn test_tag_limits() {
        assert!(encode_tags(&[Tag::new("", "x")]).is_err());
        let many: Vec<Tag> = (0..=MAX_TAGS).map(|i| Tag::new(format!("t{}", i), "v")).collect();
        assert!(encode_tags(&many).is_err());
        assert!(encode_tags(&[Tag::new("n", "v".repeat(MAX_TAG_VALUE_BYTES + 1))]).is_err());
    }

    #[test]
    fn test_layout_and_signature() {
        let key = EthereumKey::generate().unwrap();
        let data = Bytes::from_static(b"{\"score\":85}");
        let tags = vec![Tag::new("Content-Type", "application/json")];
        let item = DataItem::sign(data.clone(), &tags, &key).unwrap();
        let bytes = item.to_bytes();

        assert_eq!(&bytes[..2], &3u16.to_le_bytes());
        assert_eq!(&bytes[67..132], &key.public_key_uncompressed());
        assert_eq!(bytes[132], 0);
        assert_eq!(bytes[133], 0);
        assert_eq!(u64::from_le_bytes(bytes[134..142].try_into().unwrap()), 1);
        assert!(bytes.ends_with(&data));
        assert_eq!(item.id().len(), 43);

        // The signature recovers to the signing key over the deep hash.
        let owner = key.public_key_uncompressed();
        let tag_bytes = encode_tags(&tags).unwrap();
        let message = deep_hash(&[
            DeepHashChunk::Blob(b"dataitem"),
            DeepHashChunk::Blob(b"1"),
            DeepHashChunk::Blob(b"3"),
            DeepHashChunk::Blob(&owner),
            DeepHashChunk::Blob(&[]),
            DeepHashChunk::Blob(&[]),
            DeepHashChunk::Blob(&tag_bytes),
            DeepHashChunk::Blob(&data),
        ]);
        let mut signature = [0u8; 65];
        signature.copy_from_slice(&bytes[2..67]);
        let recovered = recover_address(
            &eip191_hash(&message),
            &RecoverableSignature::from_bytes(signature),
        )
        .unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_deep_hash_distinguishes_structure() {
        let flat = deep_hash(&[DeepHashChunk::Blob(b"a"), DeepHashChunk::Blob(b"b")]);
        let nested = deep_hash(&[DeepHashChunk::List(vec![
            DeepHashChunk::Blob(b"a"),
            DeepHashChunk::Blob(b"b"),
        ])]);
        assert_ne!(flat, nested);
    }
}
