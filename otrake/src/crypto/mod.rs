// Crypto module declarations

pub mod aes_ctr;
pub mod dh;
pub mod dsa;
pub mod hash;
pub mod kdf;

pub use aes_ctr::{aes_ctr_decrypt, aes_ctr_encrypt};
pub use dh::{dh_shared_secret, validate_dh_public_value, DhKeyPair};
pub use self::dsa::{dsa_sign, dsa_verify, fingerprint, fingerprint_hex, DsaKeyPair, DsaPublicKey};
pub use hash::{hmac_sha1, hmac_sha256, hmac_sha256_160, sha1_hash, sha256_hash};
pub use kdf::SessionKeys;
