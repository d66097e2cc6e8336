// Host collaborator: long-term identity lookup and outbound transport.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::crypto::dsa::DsaKeyPair;
use crate::error::Result;

/// Identifies one conversation: our account, the remote user, and the
/// messaging protocol that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId {
    pub account: String,
    pub user: String,
    pub protocol: String,
}

impl ConversationId {
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            user: user.into(),
            protocol: protocol.into(),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({})", self.account, self.user, self.protocol)
    }
}

/// What the state machine needs from its environment.
///
/// `long_term_key_pair` is called at most once per handshake attempt and the
/// result is cached. `emit` hands an encoded AKE message to the transport;
/// a failure there surfaces as the error of the call that produced the
/// message, after the state transition has been committed.
pub trait AkeHost {
    fn long_term_key_pair(&self, account: &str, protocol: &str) -> Result<Arc<DsaKeyPair>>;

    fn emit(&self, message: Bytes) -> Result<()>;
}

impl<T: AkeHost + ?Sized> AkeHost for Arc<T> {
    fn long_term_key_pair(&self, account: &str, protocol: &str) -> Result<Arc<DsaKeyPair>> {
        (**self).long_term_key_pair(account, protocol)
    }

    fn emit(&self, message: Bytes) -> Result<()> {
        (**self).emit(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn conversation_ids_hash_by_all_fields() {
        let mut set = HashSet::new();
        set.insert(ConversationId::new("alice", "bob", "xmpp"));
        set.insert(ConversationId::new("alice", "bob", "irc"));
        set.insert(ConversationId::new("alice", "bob", "xmpp"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn display() {
        let id = ConversationId::new("alice@example.org", "bob@example.org", "xmpp");
        assert_eq!(id.to_string(), "alice@example.org->bob@example.org (xmpp)");
    }
}
