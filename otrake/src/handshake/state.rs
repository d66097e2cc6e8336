// Handshake state, per-attempt data and processing outcomes.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::crypto::aes_ctr::{aes_ctr_encrypt, AES_KEY_LEN};
use crate::crypto::dh::DhKeyPair;
use crate::crypto::dsa::{DsaKeyPair, DsaPublicKey};
use crate::crypto::hash::sha256_hash;
use crate::crypto::kdf::SessionKeys;
use crate::error::{AkeError, Result};
use crate::wire::messages::DhCommit;
use crate::wire::primitives::encode_mpi;

/// Key id of the first DH key of a conversation.
pub const INITIAL_DH_KEY_ID: u32 = 1;

/// The current authentication state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    /// No handshake in progress.
    None,
    /// We sent DH-Commit and wait for the peer's DH-Key.
    AwaitingDhKey,
    /// We answered a DH-Commit with DH-Key and wait for Reveal-Signature.
    AwaitingRevealSig,
    /// We sent Reveal-Signature and wait for Signature.
    AwaitingSig,
    /// A legacy v1 key exchange was handed to this conversation.
    V1Setup,
}

impl AuthState {
    /// Human-readable label for the current state (used in log events).
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::None => "None",
            AuthState::AwaitingDhKey => "AwaitingDhKey",
            AuthState::AwaitingRevealSig => "AwaitingRevealSig",
            AuthState::AwaitingSig => "AwaitingSig",
            AuthState::V1Setup => "V1Setup",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an inbound message was dropped without a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// The policy does not allow the message's protocol version.
    VersionNotAllowed,
    /// v3 message addressed to a different instance.
    InstanceTagMismatch,
    /// Message kind not expected in the current state.
    UnexpectedMessage,
    /// Retransmitted DH-Key that does not match the one already accepted.
    StaleRetransmission,
    /// Revealed DH value does not hash to the earlier commitment.
    CommitmentMismatch,
    /// DH public value outside `[2, p-2]`.
    InvalidDhValue,
    /// MAC over the encrypted signature does not match.
    MacMismatch,
    /// Decrypted content could not be parsed.
    MalformedPayload,
    /// DSA signature over the authentication tuple does not verify.
    SignatureMismatch,
}

impl IgnoreReason {
    /// Reasons that indicate a forged or corrupted message rather than
    /// ordinary reordering or configuration.
    pub fn is_integrity_failure(self) -> bool {
        matches!(
            self,
            IgnoreReason::CommitmentMismatch
                | IgnoreReason::InvalidDhValue
                | IgnoreReason::MacMismatch
                | IgnoreReason::MalformedPayload
                | IgnoreReason::SignatureMismatch
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            IgnoreReason::VersionNotAllowed => "version not allowed by policy",
            IgnoreReason::InstanceTagMismatch => "instance tag mismatch",
            IgnoreReason::UnexpectedMessage => "unexpected in current state",
            IgnoreReason::StaleRetransmission => "stale retransmission",
            IgnoreReason::CommitmentMismatch => "commitment mismatch",
            IgnoreReason::InvalidDhValue => "illegal DH public value",
            IgnoreReason::MacMismatch => "MAC mismatch",
            IgnoreReason::MalformedPayload => "malformed payload",
            IgnoreReason::SignatureMismatch => "signature verification failed",
        }
    }
}

/// Result of feeding one inbound message to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message was acted on; a reply may have been emitted.
    Handled,
    /// The message was dropped; no state changed and nothing was emitted.
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored(_))
    }
}

/// The committed-but-unrevealed DH value received in a DH-Commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteCommit {
    pub(crate) encrypted_gx: Vec<u8>,
    pub(crate) hashed_gx: Vec<u8>,
}

impl From<&DhCommit> for RemoteCommit {
    fn from(msg: &DhCommit) -> Self {
        Self {
            encrypted_gx: msg.encrypted_gx.clone(),
            hashed_gx: msg.hashed_gx.clone(),
        }
    }
}

/// Everything one handshake attempt accumulates. Replaced wholesale on reset.
pub(crate) struct Attempt {
    pub(crate) local_dh: DhKeyPair,
    pub(crate) local_dh_key_id: u32,
    /// One-shot AES key hiding our DH value until Reveal-Signature.
    pub(crate) r: Zeroizing<[u8; AES_KEY_LEN]>,
    pub(crate) local_gx_encrypted: Vec<u8>,
    pub(crate) local_gx_hash: [u8; 32],
    pub(crate) remote_commit: Option<RemoteCommit>,
    pub(crate) remote_dh: Option<BigUint>,
    pub(crate) keys: Option<SessionKeys>,
    /// Encoded Reveal-Signature, kept for verbatim retransmission.
    pub(crate) reveal_signature: Option<Bytes>,
    pub(crate) long_term: Option<Arc<DsaKeyPair>>,
    pub(crate) remote_long_term: Option<DsaPublicKey>,
}

impl Attempt {
    /// A new attempt with a fresh DH keypair, `r`, and DH-Commit values.
    pub(crate) fn fresh() -> Result<Self> {
        let local_dh = DhKeyPair::generate()?;

        let mut r = Zeroizing::new([0u8; AES_KEY_LEN]);
        OsRng
            .try_fill_bytes(&mut r[..])
            .map_err(|e| AkeError::Crypto(format!("random source: {e}")))?;

        let gx_mpi = encode_mpi(local_dh.public());
        let local_gx_hash = sha256_hash(&gx_mpi);
        let local_gx_encrypted = aes_ctr_encrypt(&r[..], None, &gx_mpi)?;

        Ok(Self {
            local_dh,
            local_dh_key_id: INITIAL_DH_KEY_ID,
            r,
            local_gx_encrypted,
            local_gx_hash,
            remote_commit: None,
            remote_dh: None,
            keys: None,
            reveal_signature: None,
            long_term: None,
            remote_long_term: None,
        })
    }
}
