// DSA long-term identities: keypair generation, prehash sign/verify, fingerprints.
//
// The AKE signs a 32-byte MAC value. That value is reduced mod q and handed
// to the DSA signer as a prehash instead of being re-hashed, which is what
// every deployed peer does.

use dsa::signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::rngs::OsRng;

use crate::crypto::hash::sha1_hash;
use crate::error::{AkeError, Result};
use crate::wire::primitives::encode_public_key;

/// Length of a key fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 20;

/// A DSA public key `(p, q, g, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DsaPublicKey {
    p: BigUint,
    q: BigUint,
    g: BigUint,
    y: BigUint,
    verifying_key: dsa::VerifyingKey,
}

impl Eq for DsaPublicKey {}

impl DsaPublicKey {
    /// Assemble a public key, rejecting degenerate parameters.
    ///
    /// `y` must lie in the order-q subgroup, and q must be a whole number of
    /// bytes wide so the reduced digest is never truncated by the signer.
    pub fn new(p: BigUint, q: BigUint, g: BigUint, y: BigUint) -> Result<Self> {
        let one = BigUint::from(1u32);
        if q <= one || p <= q {
            return Err(AkeError::InvalidArgument("DSA group parameters out of range".into()));
        }
        if q.bits() % 8 != 0 {
            return Err(AkeError::InvalidArgument(format!(
                "unsupported DSA subgroup size: {} bits",
                q.bits()
            )));
        }
        if g <= one || g >= p || y <= one || y >= p {
            return Err(AkeError::InvalidArgument("DSA generator or public value out of range".into()));
        }
        let components = dsa::Components::from_components(to_dsa(&p), to_dsa(&q), to_dsa(&g))
            .map_err(|_| AkeError::InvalidArgument("DSA group parameters rejected".into()))?;
        let verifying_key = dsa::VerifyingKey::from_components(components, to_dsa(&y))
            .map_err(|_| AkeError::InvalidArgument("DSA public value is not in the subgroup".into()))?;
        Ok(Self { p, q, g, y, verifying_key })
    }

    fn from_verifying_key(verifying_key: &dsa::VerifyingKey) -> Result<Self> {
        let params = verifying_key.components();
        Self::new(
            from_dsa(params.p()),
            from_dsa(params.q()),
            from_dsa(params.g()),
            from_dsa(verifying_key.y()),
        )
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub fn g(&self) -> &BigUint {
        &self.g
    }

    pub fn y(&self) -> &BigUint {
        &self.y
    }

    /// Byte length of one signature half: `ceil(bitlen(q) / 8)`.
    pub fn q_len(&self) -> usize {
        ((self.q.bits() + 7) / 8) as usize
    }

    /// Total length of an encoded `r || s` signature.
    pub fn signature_len(&self) -> usize {
        2 * self.q_len()
    }

    /// SHA-1 fingerprint of this key.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        fingerprint(self)
    }

    /// Lower-case hex form of [`DsaPublicKey::fingerprint`].
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }
}

/// A DSA long-term identity keypair.
#[derive(Clone)]
pub struct DsaKeyPair {
    public: DsaPublicKey,
    signing_key: dsa::SigningKey,
}

impl DsaKeyPair {
    /// Generate a fresh 1024/160 identity, the size deployed OTR clients use.
    #[allow(deprecated)]
    pub fn generate() -> Result<Self> {
        let components = dsa::Components::generate(&mut OsRng, dsa::KeySize::DSA_1024_160);
        let signing_key = dsa::SigningKey::generate(&mut OsRng, components);
        let public = DsaPublicKey::from_verifying_key(signing_key.verifying_key())?;
        Ok(Self { public, signing_key })
    }

    /// Reconstruct from a public key and private exponent `x`.
    pub fn from_parts(public: DsaPublicKey, x: BigUint) -> Result<Self> {
        if x.is_zero() || x >= public.q {
            return Err(AkeError::InvalidArgument("DSA private key out of range".into()));
        }
        if public.g.modpow(&x, &public.p) != public.y {
            return Err(AkeError::InvalidArgument("DSA private key does not match public key".into()));
        }
        let signing_key = dsa::SigningKey::from_components(public.verifying_key.clone(), to_dsa(&x))
            .map_err(|_| AkeError::InvalidArgument("DSA private key rejected".into()))?;
        Ok(Self { public, signing_key })
    }

    /// The public half.
    pub fn public_key(&self) -> &DsaPublicKey {
        &self.public
    }

    /// Sign a digest; see [`dsa_sign`].
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        dsa_sign(digest, self)
    }

    /// Verify a signature against our own public key.
    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> Result<bool> {
        dsa_verify(digest, &self.public, signature)
    }
}

impl std::fmt::Debug for DsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsaKeyPair")
            .field("fingerprint", &self.public.fingerprint_hex())
            .finish_non_exhaustive()
    }
}

/// Sign `digest` (interpreted as an unsigned big-endian integer, reduced mod
/// q) and return `r || s`, each left-padded to [`DsaPublicKey::q_len`].
pub fn dsa_sign(digest: &[u8], key: &DsaKeyPair) -> Result<Vec<u8>> {
    let q_len = key.public.q_len();
    let prehash = reduced_prehash(digest, &key.public);
    let signature: dsa::Signature = key
        .signing_key
        .sign_prehash_with_rng(&mut OsRng, &prehash)
        .map_err(|e| AkeError::Crypto(format!("DSA signing failed: {e}")))?;

    let mut encoded = vec![0u8; 2 * q_len];
    write_padded(&mut encoded[..q_len], &signature.r().to_bytes_be());
    write_padded(&mut encoded[q_len..], &signature.s().to_bytes_be());
    Ok(encoded)
}

/// Verify an encoded `r || s` signature over `digest`.
///
/// A signature of the wrong length is an argument error; any other
/// malformed or non-matching signature verifies as `false`.
pub fn dsa_verify(digest: &[u8], public: &DsaPublicKey, signature: &[u8]) -> Result<bool> {
    let q_len = public.q_len();
    if signature.len() != 2 * q_len {
        return Err(AkeError::InvalidArgument(format!(
            "DSA signature must be {} bytes, got {}",
            2 * q_len,
            signature.len()
        )));
    }
    let r = dsa::BigUint::from_bytes_be(&signature[..q_len]);
    let s = dsa::BigUint::from_bytes_be(&signature[q_len..]);
    let Ok(signature) = dsa::Signature::from_components(r, s) else {
        return Ok(false);
    };
    let prehash = reduced_prehash(digest, public);
    Ok(public.verifying_key.verify_prehash(&prehash, &signature).is_ok())
}

/// SHA-1 over the serialized public key, minus its 2-byte key-type prefix.
pub fn fingerprint(public: &DsaPublicKey) -> [u8; FINGERPRINT_LEN] {
    let encoded = encode_public_key(public);
    sha1_hash(&encoded[2..])
}

/// Hex form of [`fingerprint`].
pub fn fingerprint_hex(public: &DsaPublicKey) -> String {
    hex::encode(fingerprint(public))
}

/// `digest mod q` as a big-endian integer exactly `q_len` bytes wide, so the
/// signer consumes all of it.
fn reduced_prehash(digest: &[u8], public: &DsaPublicKey) -> Vec<u8> {
    let reduced = BigUint::from_bytes_be(digest) % &public.q;
    let mut prehash = vec![0u8; public.q_len()];
    write_padded(&mut prehash, &reduced.to_bytes_be());
    prehash
}

fn write_padded(out: &mut [u8], bytes: &[u8]) {
    let start = out.len() - bytes.len();
    out[start..].copy_from_slice(bytes);
}

fn to_dsa(value: &BigUint) -> dsa::BigUint {
    dsa::BigUint::from_bytes_be(&value.to_bytes_be())
}

fn from_dsa(value: &dsa::BigUint) -> BigUint {
    BigUint::from_bytes_be(&value.to_bytes_be())
}
