// Cryptographic hashing: SHA-1, SHA-256 and their HMAC variants.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AkeError, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Length of a truncated SHA-256 HMAC as carried in AKE messages.
pub const MAC_LEN: usize = 20;

/// SHA-256 hash of `data`, returning a 32-byte digest.
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// SHA-1 hash of `data`, returning a 20-byte digest.
pub fn sha1_hash(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Sha1::digest(data));
    out
}

/// HMAC-SHA256 of `data` under `key`.
///
/// `out_len == 0` returns the full 32-byte tag; any other value returns the
/// leading `out_len` bytes.
pub fn hmac_sha256(data: &[u8], key: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AkeError::Crypto(format!("hmac-sha256 init: {e}")))?;
    mac.update(data);
    truncate(mac.finalize().into_bytes().to_vec(), out_len)
}

/// HMAC-SHA1 of `data` under `key`, truncated like [`hmac_sha256`].
pub fn hmac_sha1(data: &[u8], key: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| AkeError::Crypto(format!("hmac-sha1 init: {e}")))?;
    mac.update(data);
    truncate(mac.finalize().into_bytes().to_vec(), out_len)
}

/// The 160-bit SHA-256 HMAC used to authenticate encrypted signatures.
pub fn hmac_sha256_160(data: &[u8], key: &[u8]) -> Result<[u8; MAC_LEN]> {
    let tag = hmac_sha256(data, key, MAC_LEN)?;
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Compare two byte strings without leaking the position of the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

fn truncate(mut tag: Vec<u8>, out_len: usize) -> Result<Vec<u8>> {
    if out_len > tag.len() {
        return Err(AkeError::InvalidArgument(format!(
            "requested {out_len} MAC bytes, digest has {}",
            tag.len()
        )));
    }
    if out_len > 0 {
        tag.truncate(out_len);
    }
    Ok(tag)
}
