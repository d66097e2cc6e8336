// Wire encodings: OTR primitive types and the four AKE messages.

pub mod messages;
pub mod primitives;

pub use messages::{AkeMessage, MessageHeader, ProtocolVersion};
