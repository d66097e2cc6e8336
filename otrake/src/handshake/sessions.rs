// Conversation table: one state machine per (account, user, protocol).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::config::AkeConfig;
use crate::error::{AkeError, Result};
use crate::handshake::host::{AkeHost, ConversationId};
use crate::handshake::machine::AkeStateMachine;
use crate::handshake::state::Outcome;
use crate::policy::VersionPolicy;

/// Owns the state machines of every conversation of one local installation.
pub struct SessionTable<H: AkeHost> {
    config: AkeConfig,
    sessions: HashMap<ConversationId, AkeStateMachine<H>>,
}

impl<H: AkeHost> SessionTable<H> {
    pub fn new(config: AkeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: HashMap::new(),
        })
    }

    pub fn config(&self) -> &AkeConfig {
        &self.config
    }

    /// The machine for `id`, created with `make_host` on first use.
    pub fn get_or_create<F>(&mut self, id: &ConversationId, make_host: F) -> Result<&mut AkeStateMachine<H>>
    where
        F: FnOnce() -> H,
    {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let machine = AkeStateMachine::with_config(id.clone(), make_host(), &self.config)?;
                Ok(entry.insert(machine))
            }
        }
    }

    /// Start a handshake on `id` with the configured preferred version.
    ///
    /// Fails with [`AkeError::UnsupportedVersion`] when the policy does not
    /// allow that version.
    pub fn start_handshake<F>(&mut self, id: &ConversationId, make_host: F) -> Result<()>
    where
        F: FnOnce() -> H,
    {
        let version = self.config.preferred_version;
        if !self.config.policy.allows(version) {
            return Err(AkeError::UnsupportedVersion(version.into()));
        }
        self.get_or_create(id, make_host)?.start_handshake()
    }

    /// Decode an inbound AKE message for `id` and process it under the
    /// configured policy.
    pub fn on_encoded<F>(&mut self, id: &ConversationId, data: &[u8], make_host: F) -> Result<Outcome>
    where
        F: FnOnce() -> H,
    {
        let policy = self.config.policy;
        self.get_or_create(id, make_host)?.on_encoded(data, &policy)
    }

    pub fn get(&self, id: &ConversationId) -> Option<&AkeStateMachine<H>> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut AkeStateMachine<H>> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &ConversationId) -> Option<AkeStateMachine<H>> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::dsa::DsaKeyPair;
    use crate::handshake::state::{AuthState, IgnoreReason};
    use crate::policy::PolicyFlags;
    use crate::wire::messages::DhCommit;
    use crate::wire::{AkeMessage, MessageHeader, ProtocolVersion};
    use bytes::Bytes;
    use std::sync::Arc;

    struct Sink;

    impl AkeHost for Sink {
        fn long_term_key_pair(&self, _account: &str, _protocol: &str) -> Result<Arc<DsaKeyPair>> {
            Err(AkeError::InvalidArgument("unused".into()))
        }

        fn emit(&self, _message: Bytes) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn conversations_are_isolated() {
        let mut table = SessionTable::new(AkeConfig::default()).unwrap();
        let bob = ConversationId::new("alice", "bob", "xmpp");
        let carol = ConversationId::new("alice", "carol", "xmpp");

        table.get_or_create(&bob, || Sink).unwrap().start_handshake().unwrap();
        table.get_or_create(&carol, || Sink).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&bob).unwrap().state(), AuthState::AwaitingDhKey);
        assert_eq!(table.get(&carol).unwrap().state(), AuthState::None);
    }

    #[test]
    fn get_or_create_reuses_existing_machine() {
        let mut table = SessionTable::new(AkeConfig::default()).unwrap();
        let id = ConversationId::new("alice", "bob", "irc");
        let tag = table.get_or_create(&id, || Sink).unwrap().instance_tag();
        assert_eq!(table.get_or_create(&id, || Sink).unwrap().instance_tag(), tag);
        assert_eq!(table.len(), 1);

        assert!(table.remove(&id).is_some());
        assert!(table.is_empty());
        assert!(table.get_mut(&id).is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AkeConfig {
            instance_tag: Some(1),
            ..AkeConfig::default()
        };
        assert!(matches!(
            SessionTable::<Sink>::new(config),
            Err(AkeError::Config(_))
        ));
    }

    fn inbound_commit() -> Bytes {
        AkeMessage::DhCommit(DhCommit {
            header: MessageHeader::new(ProtocolVersion::V3, 0x2000, 0),
            encrypted_gx: vec![0x11; 196],
            hashed_gx: vec![0x22; 32],
        })
        .encode()
    }

    #[test]
    fn inbound_messages_follow_configured_policy() {
        let id = ConversationId::new("bob", "alice", "xmpp");

        let mut open = SessionTable::new(AkeConfig::default()).unwrap();
        assert_eq!(open.on_encoded(&id, &inbound_commit(), || Sink).unwrap(), Outcome::Handled);
        assert_eq!(open.get(&id).unwrap().state(), AuthState::AwaitingRevealSig);

        let never = AkeConfig {
            policy: PolicyFlags::NEVER,
            ..AkeConfig::default()
        };
        let mut closed = SessionTable::new(never).unwrap();
        assert_eq!(
            closed.on_encoded(&id, &inbound_commit(), || Sink).unwrap(),
            Outcome::Ignored(IgnoreReason::VersionNotAllowed)
        );
        assert_eq!(closed.get(&id).unwrap().state(), AuthState::None);

        let v2_only = AkeConfig {
            policy: PolicyFlags::ALLOW_V2,
            preferred_version: ProtocolVersion::V2,
            instance_tag: None,
        };
        let mut v2 = SessionTable::new(v2_only).unwrap();
        assert_eq!(
            v2.on_encoded(&id, &inbound_commit(), || Sink).unwrap(),
            Outcome::Ignored(IgnoreReason::VersionNotAllowed)
        );
    }

    #[test]
    fn start_handshake_refused_when_policy_disallows_it() {
        let id = ConversationId::new("alice", "bob", "xmpp");
        let never = AkeConfig {
            policy: PolicyFlags::NEVER,
            ..AkeConfig::default()
        };
        let mut table = SessionTable::new(never).unwrap();
        assert!(matches!(
            table.start_handshake(&id, || Sink),
            Err(AkeError::UnsupportedVersion(3))
        ));
        assert!(table.get(&id).is_none());

        let mut open = SessionTable::new(AkeConfig::default()).unwrap();
        open.start_handshake(&id, || Sink).unwrap();
        assert_eq!(open.get(&id).unwrap().state(), AuthState::AwaitingDhKey);
    }

    #[test]
    fn preferred_version_outside_policy_is_rejected() {
        let config = AkeConfig {
            policy: PolicyFlags::ALLOW_V2,
            ..AkeConfig::default()
        };
        assert!(matches!(
            SessionTable::<Sink>::new(config),
            Err(AkeError::Config(_))
        ));
    }
}
