// Handshake: state, host collaborator, signed payloads and the state machine.

pub mod host;
pub mod machine;
pub mod payload;
pub mod sessions;
pub mod state;

pub use host::{AkeHost, ConversationId};
pub use machine::AkeStateMachine;
pub use payload::{SignedPayload, Verification};
pub use sessions::SessionTable;
pub use state::{AuthState, IgnoreReason, Outcome};
