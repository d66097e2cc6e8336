// Signed, encrypted and MACed identity payload carried by Reveal-Signature
// and Signature.
//
//   M     = MPI(signer dh) || MPI(counterpart dh) || PUBKEY || INT keyid
//   SIG   = DSA(HMAC-SHA256(m1 | m1', M))
//   X     = PUBKEY || INT keyid || SIG
//   ENC   = AES-CTR(c | c', X)
//   MAC   = HMAC-SHA256-160(m2 | m2', DATA(ENC))

use bytes::{BufMut, BytesMut};
use num_bigint::BigUint;

use crate::crypto::aes_ctr::{aes_ctr_decrypt, aes_ctr_encrypt};
use crate::crypto::dsa::{dsa_verify, DsaKeyPair, DsaPublicKey};
use crate::crypto::hash::{constant_time_eq, hmac_sha256, hmac_sha256_160, MAC_LEN};
use crate::crypto::kdf::SessionKeys;
use crate::error::{AkeError, Result};
use crate::handshake::state::IgnoreReason;
use crate::wire::primitives::{put_data, put_mpi, put_public_key, WireReader};

/// The decrypted identity payload `X`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub public_key: DsaPublicKey,
    pub dh_key_id: u32,
    pub signature: Vec<u8>,
}

impl SignedPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);
        put_public_key(&mut buf, &self.public_key);
        buf.put_u32(self.dh_key_id);
        buf.put_slice(&self.signature);
        buf.to_vec()
    }

    /// Parse `X`. The signature length follows from the embedded key's `q`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let public_key = reader.read_public_key()?;
        let dh_key_id = reader.read_u32()?;
        let signature = reader.read_fixed(public_key.signature_len())?.to_vec();
        reader.finish()?;
        Ok(Self {
            public_key,
            dh_key_id,
            signature,
        })
    }
}

/// The three keys one side uses for its own payload.
#[derive(Clone, Copy)]
pub struct PayloadKeys<'a> {
    pub encryption: &'a [u8],
    pub signature: &'a [u8],
    pub mac: &'a [u8],
}

impl<'a> PayloadKeys<'a> {
    /// `c`, `m1`, `m2`: the Reveal-Signature sender's keys.
    pub fn initiator(keys: &'a SessionKeys) -> Self {
        Self {
            encryption: &keys.c,
            signature: &keys.m1,
            mac: &keys.m2,
        }
    }

    /// `c'`, `m1'`, `m2'`: the Signature sender's keys.
    pub fn responder(keys: &'a SessionKeys) -> Self {
        Self {
            encryption: &keys.cp,
            signature: &keys.m1p,
            mac: &keys.m2p,
        }
    }
}

/// Serialize the tuple `M` that gets MACed and signed.
pub fn authentication_tuple(
    signer_dh: &BigUint,
    counterpart_dh: &BigUint,
    public_key: &DsaPublicKey,
    dh_key_id: u32,
) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1024);
    put_mpi(&mut buf, signer_dh);
    put_mpi(&mut buf, counterpart_dh);
    put_public_key(&mut buf, public_key);
    buf.put_u32(dh_key_id);
    buf.to_vec()
}

/// Build and sign `X` for our side of the exchange.
pub fn build_signed_payload(
    own_dh: &BigUint,
    remote_dh: &BigUint,
    long_term: &DsaKeyPair,
    dh_key_id: u32,
    signature_key: &[u8],
) -> Result<SignedPayload> {
    let public_key = long_term.public_key().clone();
    let tuple = authentication_tuple(own_dh, remote_dh, &public_key, dh_key_id);
    let digest = hmac_sha256(&tuple, signature_key, 0)?;
    let signature = long_term.sign(&digest)?;
    Ok(SignedPayload {
        public_key,
        dh_key_id,
        signature,
    })
}

pub fn encrypt_payload(payload: &SignedPayload, encryption_key: &[u8]) -> Result<Vec<u8>> {
    aes_ctr_encrypt(encryption_key, None, &payload.encode())
}

pub fn decrypt_payload(encrypted: &[u8], encryption_key: &[u8]) -> Result<SignedPayload> {
    let plain = aes_ctr_decrypt(encryption_key, None, encrypted)?;
    SignedPayload::decode(&plain)
}

/// MAC over the DATA encoding of the encrypted payload.
pub fn payload_mac(encrypted: &[u8], mac_key: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut buf = BytesMut::with_capacity(4 + encrypted.len());
    put_data(&mut buf, encrypted);
    hmac_sha256_160(&buf, mac_key)
}

/// Build, encrypt and MAC our payload in one step.
pub fn seal_payload(
    own_dh: &BigUint,
    remote_dh: &BigUint,
    long_term: &DsaKeyPair,
    dh_key_id: u32,
    keys: PayloadKeys<'_>,
) -> Result<(Vec<u8>, [u8; MAC_LEN])> {
    let payload = build_signed_payload(own_dh, remote_dh, long_term, dh_key_id, keys.signature)?;
    let encrypted = encrypt_payload(&payload, keys.encryption)?;
    let mac = payload_mac(&encrypted, keys.mac)?;
    Ok((encrypted, mac))
}

/// Result of checking a peer's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified(SignedPayload),
    Rejected(IgnoreReason),
}

/// Check the peer's encrypted payload against `keys` (the peer's role).
///
/// Integrity faults come back as `Rejected`; `Err` is reserved for
/// failures of the primitives themselves.
pub fn verify_signed_payload(
    encrypted: &[u8],
    mac: &[u8; MAC_LEN],
    claimed_remote_dh: &BigUint,
    own_dh: &BigUint,
    keys: PayloadKeys<'_>,
) -> Result<Verification> {
    let expected = payload_mac(encrypted, keys.mac)?;
    if !constant_time_eq(&expected, mac) {
        return Ok(Verification::Rejected(IgnoreReason::MacMismatch));
    }

    let payload = match decrypt_payload(encrypted, keys.encryption) {
        Ok(payload) => payload,
        Err(AkeError::Codec(_)) => return Ok(Verification::Rejected(IgnoreReason::MalformedPayload)),
        Err(e) => return Err(e),
    };
    if payload.dh_key_id == 0 {
        return Ok(Verification::Rejected(IgnoreReason::MalformedPayload));
    }

    let tuple = authentication_tuple(
        claimed_remote_dh,
        own_dh,
        &payload.public_key,
        payload.dh_key_id,
    );
    let digest = hmac_sha256(&tuple, keys.signature, 0)?;
    if !dsa_verify(&digest, &payload.public_key, &payload.signature)? {
        return Ok(Verification::Rejected(IgnoreReason::SignatureMismatch));
    }
    Ok(Verification::Verified(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn identity() -> &'static DsaKeyPair {
        static KEY: OnceLock<DsaKeyPair> = OnceLock::new();
        KEY.get_or_init(|| DsaKeyPair::generate().unwrap())
    }

    fn keys() -> SessionKeys {
        SessionKeys::derive(&BigUint::from(0x1234_5678u32))
    }

    #[test]
    fn payload_roundtrip_through_encryption() {
        let keys = keys();
        let own = BigUint::from(1000u32);
        let remote = BigUint::from(2000u32);
        let payload = build_signed_payload(&own, &remote, identity(), 1, &keys.m1).unwrap();
        assert_eq!(payload.signature.len(), identity().public_key().signature_len());

        let encrypted = encrypt_payload(&payload, &keys.c).unwrap();
        assert_eq!(decrypt_payload(&encrypted, &keys.c).unwrap(), payload);
    }

    #[test]
    fn peer_verifies_sealed_payload() {
        let keys = keys();
        let alice_dh = BigUint::from(1000u32);
        let bob_dh = BigUint::from(2000u32);
        let (encrypted, mac) = seal_payload(
            &alice_dh,
            &bob_dh,
            identity(),
            1,
            PayloadKeys::initiator(&keys),
        )
        .unwrap();

        let verdict =
            verify_signed_payload(&encrypted, &mac, &alice_dh, &bob_dh, PayloadKeys::initiator(&keys))
                .unwrap();
        match verdict {
            Verification::Verified(payload) => {
                assert_eq!(&payload.public_key, identity().public_key());
                assert_eq!(payload.dh_key_id, 1);
            }
            other => panic!("expected verification, got {other:?}"),
        }
    }

    #[test]
    fn wrong_role_keys_fail_the_mac() {
        let keys = keys();
        let a = BigUint::from(1000u32);
        let b = BigUint::from(2000u32);
        let (encrypted, mac) =
            seal_payload(&a, &b, identity(), 1, PayloadKeys::initiator(&keys)).unwrap();
        let verdict =
            verify_signed_payload(&encrypted, &mac, &a, &b, PayloadKeys::responder(&keys)).unwrap();
        assert_eq!(verdict, Verification::Rejected(IgnoreReason::MacMismatch));
    }

    #[test]
    fn swapped_dh_order_fails_the_signature() {
        let keys = keys();
        let a = BigUint::from(1000u32);
        let b = BigUint::from(2000u32);
        let (encrypted, mac) =
            seal_payload(&a, &b, identity(), 1, PayloadKeys::initiator(&keys)).unwrap();
        let verdict =
            verify_signed_payload(&encrypted, &mac, &b, &a, PayloadKeys::initiator(&keys)).unwrap();
        assert_eq!(verdict, Verification::Rejected(IgnoreReason::SignatureMismatch));
    }

    #[test]
    fn garbage_under_a_valid_mac_is_malformed() {
        let keys = keys();
        let encrypted = vec![0xAB; 37];
        let mac = payload_mac(&encrypted, &keys.m2).unwrap();
        let verdict = verify_signed_payload(
            &encrypted,
            &mac,
            &BigUint::from(5u32),
            &BigUint::from(6u32),
            PayloadKeys::initiator(&keys),
        )
        .unwrap();
        assert_eq!(verdict, Verification::Rejected(IgnoreReason::MalformedPayload));
    }

    #[test]
    fn mac_covers_the_length_prefix() {
        let key = [7u8; 32];
        let data = b"ciphertext";
        let mut framed = (data.len() as u32).to_be_bytes().to_vec();
        framed.extend_from_slice(data);
        assert_eq!(
            payload_mac(data, &key).unwrap(),
            hmac_sha256_160(&framed, &key).unwrap()
        );
    }
}
