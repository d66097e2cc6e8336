// OTR AKE state machine.
//
//   Initiator (Alice)                     Responder (Bob)
//     |--- DH-Commit {AES(r, gx), H(gx)} -->|   None -> AwaitingRevealSig
//     |<-- DH-Key {gy} ---------------------|
//     |--- Reveal-Signature {r, X_A, MAC} ->|   AwaitingDhKey -> AwaitingSig
//     |<-- Signature {X_B, MAC} ------------|   AwaitingRevealSig -> None (secure)
//                                               AwaitingSig (secure)

use std::sync::Arc;

use bytes::Bytes;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::config::{AkeConfig, MIN_INSTANCE_TAG};
use crate::crypto::aes_ctr::aes_ctr_decrypt;
use crate::crypto::dh::{dh_shared_secret, validate_dh_public_value};
use crate::crypto::dsa::{DsaKeyPair, DsaPublicKey};
use crate::crypto::hash::{constant_time_eq, sha256_hash};
use crate::crypto::kdf::SessionKeys;
use crate::error::{AkeError, Result};
use crate::handshake::host::{AkeHost, ConversationId};
use crate::handshake::payload::{seal_payload, verify_signed_payload, PayloadKeys, Verification};
use crate::handshake::state::{Attempt, AuthState, IgnoreReason, Outcome, RemoteCommit};
use crate::policy::VersionPolicy;
use crate::wire::messages::{DhCommit, DhKey, RevealSignature, Signature};
use crate::wire::primitives::decode_mpi;
use crate::wire::{AkeMessage, MessageHeader, ProtocolVersion};

/// Runs the four-message AKE for one conversation.
///
/// Entry points take `&mut self`; drive each conversation from one place at
/// a time. Outbound messages go to the host after the transition they
/// belong to has been committed.
pub struct AkeStateMachine<H: AkeHost> {
    conversation: ConversationId,
    host: H,
    preferred_version: ProtocolVersion,
    version: ProtocolVersion,
    instance_tag: u32,
    remote_instance_tag: u32,
    state: AuthState,
    attempt: Attempt,
    secure: bool,
}

impl<H: AkeHost> AkeStateMachine<H> {
    /// A state machine with the default configuration.
    pub fn new(conversation: ConversationId, host: H) -> Result<Self> {
        Self::with_config(conversation, host, &AkeConfig::default())
    }

    pub fn with_config(conversation: ConversationId, host: H, config: &AkeConfig) -> Result<Self> {
        config.validate()?;
        let instance_tag = match config.instance_tag {
            Some(tag) => tag,
            None => random_instance_tag()?,
        };
        Ok(Self {
            conversation,
            host,
            preferred_version: config.preferred_version,
            version: config.preferred_version,
            instance_tag,
            remote_instance_tag: 0,
            state: AuthState::None,
            attempt: Attempt::fresh()?,
            secure: false,
        })
    }

    // ── Control ──────────────────────────────────────────────────────────

    /// Discard the current attempt: new DH keypair and `r`, state `None`,
    /// not secure.
    pub fn reset(&mut self) -> Result<()> {
        self.attempt = Attempt::fresh()?;
        self.secure = false;
        self.transition(AuthState::None);
        Ok(())
    }

    /// Begin a handshake as initiator and emit DH-Commit.
    pub fn start_handshake(&mut self) -> Result<()> {
        info!(
            account = %self.conversation.account,
            user = %self.conversation.user,
            version = %self.preferred_version,
            "starting authenticated key exchange"
        );
        self.reset()?;
        self.version = self.preferred_version;
        self.remote_instance_tag = 0;
        self.transition(AuthState::AwaitingDhKey);
        let commit = self.dh_commit_message();
        self.emit(commit.encode())
    }

    /// Mark the conversation as handed to a legacy v1 key exchange.
    pub fn enter_v1_setup(&mut self) {
        self.transition(AuthState::V1Setup);
    }

    // ── Inbound ──────────────────────────────────────────────────────────

    /// Decode `data` and process it.
    pub fn on_encoded<P: VersionPolicy + ?Sized>(&mut self, data: &[u8], policy: &P) -> Result<Outcome> {
        let message = AkeMessage::decode(data)?;
        self.on_message(&message, policy)
    }

    /// Process one inbound AKE message.
    ///
    /// Messages that fail a check are dropped and reported as
    /// [`Outcome::Ignored`]; errors are reserved for host and primitive
    /// failures and for DH-Commit during a v1 exchange.
    pub fn on_message<P: VersionPolicy + ?Sized>(
        &mut self,
        message: &AkeMessage,
        policy: &P,
    ) -> Result<Outcome> {
        debug!(
            account = %self.conversation.account,
            user = %self.conversation.user,
            state = %self.state,
            kind = message.label(),
            "received AKE message"
        );

        let header = message.header();
        let outcome = if !policy.allows(header.version) {
            Outcome::Ignored(IgnoreReason::VersionNotAllowed)
        } else if header.version.has_instance_tags() && !self.addressed_to_us(message) {
            Outcome::Ignored(IgnoreReason::InstanceTagMismatch)
        } else {
            match message {
                AkeMessage::DhCommit(m) => self.handle_dh_commit(m)?,
                AkeMessage::DhKey(m) => self.handle_dh_key(m)?,
                AkeMessage::RevealSignature(m) => self.handle_reveal_signature(m)?,
                AkeMessage::Signature(m) => self.handle_signature(m)?,
            }
        };

        if let Outcome::Ignored(reason) = outcome {
            self.log_ignored(message, reason);
        }
        Ok(outcome)
    }

    /// Only a DH-Commit may leave the v3 receiver tag unset; every later
    /// message answers one of ours and must name our tag.
    fn addressed_to_us(&self, message: &AkeMessage) -> bool {
        match message.header().receiver_instance {
            0 => matches!(message, AkeMessage::DhCommit(_)),
            tag => tag == self.instance_tag,
        }
    }

    fn handle_dh_commit(&mut self, msg: &DhCommit) -> Result<Outcome> {
        match self.state {
            AuthState::None => self.accept_dh_commit(msg),
            AuthState::AwaitingDhKey => {
                let theirs = BigUint::from_bytes_be(&msg.hashed_gx);
                let ours = BigUint::from_bytes_be(&self.attempt.local_gx_hash);
                if theirs < ours {
                    debug!(
                        account = %self.conversation.account,
                        user = %self.conversation.user,
                        "simultaneous DH-Commit: ours wins, resending"
                    );
                    let commit = self.dh_commit_message();
                    self.emit(commit.encode())?;
                    Ok(Outcome::Handled)
                } else {
                    debug!(
                        account = %self.conversation.account,
                        user = %self.conversation.user,
                        "simultaneous DH-Commit: theirs wins, dropping our gx"
                    );
                    self.reset()?;
                    self.accept_dh_commit(msg)
                }
            }
            AuthState::AwaitingRevealSig => {
                self.attempt.remote_commit = Some(RemoteCommit::from(msg));
                self.adopt_peer(&msg.header);
                let reply = self.dh_key_message();
                self.emit(reply.encode())?;
                Ok(Outcome::Handled)
            }
            AuthState::AwaitingSig => {
                self.reset()?;
                self.accept_dh_commit(msg)
            }
            AuthState::V1Setup => Err(AkeError::UnsupportedVersion(1)),
        }
    }

    /// Store the peer's commitment and answer with our DH value.
    fn accept_dh_commit(&mut self, msg: &DhCommit) -> Result<Outcome> {
        self.attempt.remote_commit = Some(RemoteCommit::from(msg));
        self.adopt_peer(&msg.header);
        self.transition(AuthState::AwaitingRevealSig);
        let reply = self.dh_key_message();
        self.emit(reply.encode())?;
        Ok(Outcome::Handled)
    }

    fn handle_dh_key(&mut self, msg: &DhKey) -> Result<Outcome> {
        match self.state {
            AuthState::AwaitingDhKey => {}
            AuthState::AwaitingSig => {
                if self.attempt.remote_dh.as_ref() != Some(&msg.gy) {
                    return Ok(Outcome::Ignored(IgnoreReason::StaleRetransmission));
                }
                let Some(cached) = self.attempt.reveal_signature.clone() else {
                    return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage));
                };
                debug!(
                    account = %self.conversation.account,
                    user = %self.conversation.user,
                    "retransmitting Reveal-Signature"
                );
                self.emit(cached)?;
                return Ok(Outcome::Handled);
            }
            _ => return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage)),
        }

        if validate_dh_public_value(&msg.gy).is_err() {
            return Ok(Outcome::Ignored(IgnoreReason::InvalidDhValue));
        }

        let long_term = self.long_term_key_pair()?;
        let shared = dh_shared_secret(self.attempt.local_dh.private(), &msg.gy)?;
        let keys = SessionKeys::derive(&shared);
        let (encrypted_signature, mac) = seal_payload(
            self.attempt.local_dh.public(),
            &msg.gy,
            &long_term,
            self.attempt.local_dh_key_id,
            PayloadKeys::initiator(&keys),
        )?;

        self.adopt_peer(&msg.header);
        let reply = AkeMessage::RevealSignature(RevealSignature {
            header: self.outbound_header(),
            revealed_key: self.attempt.r.to_vec(),
            encrypted_signature,
            mac,
        })
        .encode();

        self.attempt.remote_dh = Some(msg.gy.clone());
        self.attempt.keys = Some(keys);
        self.attempt.reveal_signature = Some(reply.clone());
        self.transition(AuthState::AwaitingSig);
        self.emit(reply)?;
        Ok(Outcome::Handled)
    }

    fn handle_reveal_signature(&mut self, msg: &RevealSignature) -> Result<Outcome> {
        if self.state != AuthState::AwaitingRevealSig {
            return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage));
        }
        let Some(commit) = self.attempt.remote_commit.as_ref() else {
            return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage));
        };

        let gx_mpi = match aes_ctr_decrypt(&msg.revealed_key, None, &commit.encrypted_gx) {
            Ok(plain) => plain,
            Err(AkeError::InvalidArgument(_)) => {
                return Ok(Outcome::Ignored(IgnoreReason::MalformedPayload))
            }
            Err(e) => return Err(e),
        };
        if !constant_time_eq(&sha256_hash(&gx_mpi), &commit.hashed_gx) {
            return Ok(Outcome::Ignored(IgnoreReason::CommitmentMismatch));
        }
        let gx = match decode_mpi(&gx_mpi) {
            Ok(value) => value,
            Err(AkeError::Codec(_)) => return Ok(Outcome::Ignored(IgnoreReason::MalformedPayload)),
            Err(e) => return Err(e),
        };
        if validate_dh_public_value(&gx).is_err() {
            return Ok(Outcome::Ignored(IgnoreReason::InvalidDhValue));
        }

        let shared = dh_shared_secret(self.attempt.local_dh.private(), &gx)?;
        let keys = SessionKeys::derive(&shared);
        let remote = match verify_signed_payload(
            &msg.encrypted_signature,
            &msg.mac,
            &gx,
            self.attempt.local_dh.public(),
            PayloadKeys::initiator(&keys),
        )? {
            Verification::Verified(payload) => payload,
            Verification::Rejected(reason) => return Ok(Outcome::Ignored(reason)),
        };

        let long_term = self.long_term_key_pair()?;
        let (encrypted_signature, mac) = seal_payload(
            self.attempt.local_dh.public(),
            &gx,
            &long_term,
            self.attempt.local_dh_key_id,
            PayloadKeys::responder(&keys),
        )?;

        self.adopt_peer(&msg.header);
        info!(
            account = %self.conversation.account,
            user = %self.conversation.user,
            fingerprint = %remote.public_key.fingerprint_hex(),
            "peer authenticated"
        );
        self.attempt.remote_dh = Some(gx);
        self.attempt.keys = Some(keys);
        self.attempt.remote_long_term = Some(remote.public_key);
        self.secure = true;
        self.transition(AuthState::None);

        let reply = AkeMessage::Signature(Signature {
            header: self.outbound_header(),
            encrypted_signature,
            mac,
        });
        self.emit(reply.encode())?;
        Ok(Outcome::Handled)
    }

    fn handle_signature(&mut self, msg: &Signature) -> Result<Outcome> {
        if self.state != AuthState::AwaitingSig {
            return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage));
        }
        let (Some(remote_dh), Some(keys)) =
            (self.attempt.remote_dh.as_ref(), self.attempt.keys.as_ref())
        else {
            return Ok(Outcome::Ignored(IgnoreReason::UnexpectedMessage));
        };

        let verdict = verify_signed_payload(
            &msg.encrypted_signature,
            &msg.mac,
            remote_dh,
            self.attempt.local_dh.public(),
            PayloadKeys::responder(keys),
        )?;
        let remote = match verdict {
            Verification::Verified(payload) => payload,
            Verification::Rejected(reason) => return Ok(Outcome::Ignored(reason)),
        };

        self.adopt_peer(&msg.header);
        info!(
            account = %self.conversation.account,
            user = %self.conversation.user,
            fingerprint = %remote.public_key.fingerprint_hex(),
            "peer authenticated"
        );
        self.attempt.remote_long_term = Some(remote.public_key);
        // State is left at AwaitingSig; only the secure flag changes.
        self.secure = true;
        Ok(Outcome::Handled)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn log_ignored(&self, message: &AkeMessage, reason: IgnoreReason) {
        if reason.is_integrity_failure() {
            warn!(
                account = %self.conversation.account,
                user = %self.conversation.user,
                state = %self.state,
                kind = message.label(),
                reason = reason.label(),
                "dropping AKE message"
            );
        } else {
            debug!(
                account = %self.conversation.account,
                user = %self.conversation.user,
                state = %self.state,
                kind = message.label(),
                reason = reason.label(),
                "dropping AKE message"
            );
        }
    }

    fn transition(&mut self, next: AuthState) {
        if self.state != next {
            info!(
                account = %self.conversation.account,
                user = %self.conversation.user,
                from = %self.state,
                to = %next,
                "AKE state transition"
            );
        }
        self.state = next;
    }

    fn emit(&self, message: Bytes) -> Result<()> {
        self.host.emit(message).map_err(|e| match e {
            AkeError::Transport(_) => e,
            other => AkeError::Transport(other.to_string()),
        })
    }

    /// Answer in the peer's version and address its instance.
    fn adopt_peer(&mut self, header: &MessageHeader) {
        self.version = header.version;
        if header.version.has_instance_tags() {
            self.remote_instance_tag = header.sender_instance;
        }
    }

    /// Our long-term key, fetched from the host once per attempt.
    fn long_term_key_pair(&mut self) -> Result<Arc<DsaKeyPair>> {
        if let Some(key) = &self.attempt.long_term {
            return Ok(Arc::clone(key));
        }
        let key = self
            .host
            .long_term_key_pair(&self.conversation.account, &self.conversation.protocol)?;
        self.attempt.long_term = Some(Arc::clone(&key));
        Ok(key)
    }

    fn outbound_header(&self) -> MessageHeader {
        MessageHeader::new(self.version, self.instance_tag, self.remote_instance_tag)
    }

    fn dh_commit_message(&self) -> AkeMessage {
        AkeMessage::DhCommit(DhCommit {
            header: self.outbound_header(),
            encrypted_gx: self.attempt.local_gx_encrypted.clone(),
            hashed_gx: self.attempt.local_gx_hash.to_vec(),
        })
    }

    fn dh_key_message(&self) -> AkeMessage {
        AkeMessage::DhKey(DhKey {
            header: self.outbound_header(),
            gy: self.attempt.local_dh.public().clone(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Whether the peer's identity has been verified in the current attempt.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Keys derived in the current attempt, once the shared secret is known.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.attempt.keys.as_ref()
    }

    pub fn ssid(&self) -> Option<[u8; 8]> {
        self.attempt.keys.as_ref().map(|keys| keys.ssid)
    }

    /// The peer's long-term public key, after its signature verified.
    pub fn remote_identity(&self) -> Option<&DsaPublicKey> {
        self.attempt.remote_long_term.as_ref()
    }

    pub fn remote_fingerprint(&self) -> Option<String> {
        self.remote_identity().map(DsaPublicKey::fingerprint_hex)
    }

    pub fn local_dh_public(&self) -> &BigUint {
        self.attempt.local_dh.public()
    }

    pub fn remote_dh_public(&self) -> Option<&BigUint> {
        self.attempt.remote_dh.as_ref()
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn instance_tag(&self) -> u32 {
        self.instance_tag
    }

    /// Protocol version used for outbound messages.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }
}

fn random_instance_tag() -> Result<u32> {
    loop {
        let mut bytes = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AkeError::Crypto(format!("random source: {e}")))?;
        let tag = u32::from_be_bytes(bytes);
        if tag >= MIN_INSTANCE_TAG {
            return Ok(tag);
        }
    }
}
