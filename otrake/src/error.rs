// otrake error types

use thiserror::Error;

/// Top-level error type for the otrake crate.
///
/// Integrity failures during the handshake (bad commitment, MAC, signature,
/// out-of-range DH value) are not errors: they are reported as
/// [`crate::handshake::Outcome::Ignored`] and never surface as errors.
#[derive(Debug, Error)]
pub enum AkeError {
    // ── Crypto errors ───────────────────────────────────────────────────
    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ── Protocol errors ─────────────────────────────────────────────────
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    // ── Wire errors ─────────────────────────────────────────────────────
    #[error("malformed message: {0}")]
    Codec(String),

    // ── Collaborator errors ─────────────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, AkeError>;
