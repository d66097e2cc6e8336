// AES-128 in counter mode.
//
// The AKE encrypts the committed DH value under the one-shot key `r` and the
// signed payload under `c` / `c'`, always starting from an all-zero counter.
// The 16-byte counter block is incremented as one big-endian integer.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::{AkeError, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// AES key length in bytes.
pub const AES_KEY_LEN: usize = 16;

/// Counter block length in bytes.
pub const CTR_LEN: usize = 16;

const ZERO_CTR: [u8; CTR_LEN] = [0u8; CTR_LEN];

/// Encrypt `plaintext` under `key`, starting at `counter` (all-zero when `None`).
pub fn aes_ctr_encrypt(key: &[u8], counter: Option<&[u8; CTR_LEN]>, plaintext: &[u8]) -> Result<Vec<u8>> {
    apply_keystream(key, counter, plaintext)
}

/// Decrypt `ciphertext`. Counter mode is symmetric, so this is the same
/// keystream XOR as [`aes_ctr_encrypt`].
pub fn aes_ctr_decrypt(key: &[u8], counter: Option<&[u8; CTR_LEN]>, ciphertext: &[u8]) -> Result<Vec<u8>> {
    apply_keystream(key, counter, ciphertext)
}

fn apply_keystream(key: &[u8], counter: Option<&[u8; CTR_LEN]>, input: &[u8]) -> Result<Vec<u8>> {
    if key.len() != AES_KEY_LEN {
        return Err(AkeError::InvalidArgument(format!(
            "AES-128 key must be {AES_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    let iv = counter.unwrap_or(&ZERO_CTR);
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| AkeError::Crypto(format!("aes-ctr init: {e}")))?;
    let mut out = input.to_vec();
    cipher
        .try_apply_keystream(&mut out)
        .map_err(|e| AkeError::Crypto(format!("aes-ctr keystream: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nist_sp800_38a_ctr_vector() {
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let mut ctr = [0u8; CTR_LEN];
        ctr.copy_from_slice(&hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap());
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51").unwrap();
        let ct = aes_ctr_encrypt(&key, Some(&ctr), &pt).unwrap();
        assert_eq!(
            hex::encode(ct),
            "874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff"
        );
    }

    #[test]
    fn implicit_counter_is_zero() {
        let key = [0u8; AES_KEY_LEN];
        let explicit = aes_ctr_encrypt(&key, Some(&[0u8; CTR_LEN]), &[0u8; 16]).unwrap();
        let implicit = aes_ctr_encrypt(&key, None, &[0u8; 16]).unwrap();
        assert_eq!(explicit, implicit);
        assert_eq!(hex::encode(implicit), "66e94bd4ef8a2c3b884cfa59ca342b2e");
    }

    #[test]
    fn empty_input_roundtrip() {
        let key = [0x42u8; AES_KEY_LEN];
        let ct = aes_ctr_encrypt(&key, None, b"").unwrap();
        assert!(ct.is_empty());
        assert!(aes_ctr_decrypt(&key, None, &ct).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_length_rejected() {
        let result = aes_ctr_encrypt(&[0u8; 32], None, b"data");
        assert!(matches!(result, Err(AkeError::InvalidArgument(_))));
    }
}
