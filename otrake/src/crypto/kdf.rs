// AKE key derivation from the DH shared secret.
//
// ```text
// h2(b)  = SHA-256(b || MPI(s))
// ssid   = h2(0x00)[0..8]
// c, c'  = h2(0x01)[0..16], h2(0x01)[16..32]
// m1     = h2(0x02)
// m2     = h2(0x03)
// m1'    = h2(0x04)
// m2'    = h2(0x05)
// ```

use num_bigint::BigUint;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aes_ctr::AES_KEY_LEN;
use crate::crypto::hash::sha256_hash;
use crate::wire::primitives::encode_mpi;

const SSID_PREFIX: u8 = 0x00;
const C_PREFIX: u8 = 0x01;
const M1_PREFIX: u8 = 0x02;
const M2_PREFIX: u8 = 0x03;
const M1P_PREFIX: u8 = 0x04;
const M2P_PREFIX: u8 = 0x05;

/// Symmetric keys for one handshake attempt.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Secure session id shown to users for out-of-band comparison.
    pub ssid: [u8; 8],
    /// Encrypts the initiator's signed payload.
    pub c: [u8; AES_KEY_LEN],
    /// Encrypts the responder's signed payload.
    pub cp: [u8; AES_KEY_LEN],
    /// Keys the MAC that the initiator signs.
    pub m1: [u8; 32],
    /// Authenticates the initiator's encrypted payload.
    pub m2: [u8; 32],
    /// Keys the MAC that the responder signs.
    pub m1p: [u8; 32],
    /// Authenticates the responder's encrypted payload.
    pub m2p: [u8; 32],
}

impl SessionKeys {
    /// Derive every sub-key from the shared secret `s`.
    pub fn derive(shared_secret: &BigUint) -> Self {
        let mut secret = encode_mpi(shared_secret);
        let h2 = |prefix: u8| -> [u8; 32] {
            let mut input = Vec::with_capacity(1 + secret.len());
            input.push(prefix);
            input.extend_from_slice(&secret);
            let digest = sha256_hash(&input);
            input.zeroize();
            digest
        };

        let mut ssid = [0u8; 8];
        ssid.copy_from_slice(&h2(SSID_PREFIX)[..8]);

        let mut c_digest = h2(C_PREFIX);
        let mut c = [0u8; AES_KEY_LEN];
        let mut cp = [0u8; AES_KEY_LEN];
        c.copy_from_slice(&c_digest[..AES_KEY_LEN]);
        cp.copy_from_slice(&c_digest[AES_KEY_LEN..]);
        c_digest.zeroize();

        let keys = Self {
            ssid,
            c,
            cp,
            m1: h2(M1_PREFIX),
            m2: h2(M2_PREFIX),
            m1p: h2(M1P_PREFIX),
            m2p: h2(M2P_PREFIX),
        };
        secret.zeroize();
        keys
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ssid", &hex::encode(self.ssid))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_and_cp_split_one_digest() {
        let s = BigUint::from(0xDEADBEEFu64);
        let keys = SessionKeys::derive(&s);

        let mut input = vec![C_PREFIX];
        input.extend_from_slice(&encode_mpi(&s));
        let digest = sha256_hash(&input);
        assert_eq!(&keys.c[..], &digest[..16]);
        assert_eq!(&keys.cp[..], &digest[16..]);
    }

    #[test]
    fn mac_keys_use_distinct_prefixes() {
        let s = BigUint::from(42u32);
        let keys = SessionKeys::derive(&s);

        let mut input = vec![M2P_PREFIX];
        input.extend_from_slice(&encode_mpi(&s));
        assert_eq!(keys.m2p, sha256_hash(&input));

        let all = [keys.m1, keys.m2, keys.m1p, keys.m2p];
        for i in 0..all.len() {
            for j in i + 1..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }

    #[test]
    fn deterministic() {
        let s = BigUint::from(7u32);
        assert!(SessionKeys::derive(&s) == SessionKeys::derive(&s));
        assert!(SessionKeys::derive(&s) != SessionKeys::derive(&BigUint::from(8u32)));
    }
}
