// otrake: OTR v2/v3 Authenticated Key Exchange
//
// Crate root: module declarations and public re-exports.

pub mod error;
pub mod config;
pub mod policy;
pub mod crypto;
pub mod wire;
pub mod handshake;

// Re-export key types at crate root for convenience.
pub use config::AkeConfig;
pub use crypto::dsa::{DsaKeyPair, DsaPublicKey};
pub use crypto::kdf::SessionKeys;
pub use error::{AkeError, Result};
pub use handshake::{
    AkeHost, AkeStateMachine, AuthState, ConversationId, IgnoreReason, Outcome, SessionTable,
};
pub use policy::{PolicyFlags, VersionPolicy};
pub use wire::{AkeMessage, MessageHeader, ProtocolVersion};
