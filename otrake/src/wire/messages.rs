// AKE messages exchanged during the OTR v2/v3 handshake.
//
// Binary layout:
//
//   [version:SHORT][type:BYTE]
//   [sender_instance:INT][receiver_instance:INT]      -- v3 only
//   body
//
//   0x02 DH-Commit         DATA encrypted_gx, DATA hashed_gx
//   0x0a DH-Key            MPI gy
//   0x11 Reveal-Signature  DATA revealed_key, DATA encrypted_signature, MAC
//   0x12 Signature         DATA encrypted_signature, MAC

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::MAC_LEN;
use crate::error::{AkeError, Result};
use crate::wire::primitives::{put_data, put_mpi, WireReader};

/// Message type byte values.
pub mod message_type {
    pub const DH_COMMIT: u8 = 0x02;
    pub const DATA: u8 = 0x03;
    pub const DH_KEY: u8 = 0x0a;
    pub const REVEAL_SIGNATURE: u8 = 0x11;
    pub const SIGNATURE: u8 = 0x12;
}

/// Protocol versions that carry the four-message AKE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ProtocolVersion {
    V2 = 2,
    V3 = 3,
}

impl ProtocolVersion {
    /// Whether the header carries instance tags.
    pub fn has_instance_tags(self) -> bool {
        matches!(self, ProtocolVersion::V3)
    }
}

impl TryFrom<u16> for ProtocolVersion {
    type Error = AkeError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            other => Err(AkeError::UnsupportedVersion(other)),
        }
    }
}

impl From<ProtocolVersion> for u16 {
    fn from(version: ProtocolVersion) -> u16 {
        version as u16
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", u16::from(*self))
    }
}

/// Common header of every AKE message. Instance tags are zero for v2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: ProtocolVersion,
    pub sender_instance: u32,
    pub receiver_instance: u32,
}

impl MessageHeader {
    pub fn new(version: ProtocolVersion, sender_instance: u32, receiver_instance: u32) -> Self {
        match version {
            ProtocolVersion::V2 => Self {
                version,
                sender_instance: 0,
                receiver_instance: 0,
            },
            ProtocolVersion::V3 => Self {
                version,
                sender_instance,
                receiver_instance,
            },
        }
    }
}

/// Message 1: commitment to the sender's DH value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhCommit {
    pub header: MessageHeader,
    /// AES-CTR(r, MPI(gx)).
    pub encrypted_gx: Vec<u8>,
    /// SHA-256(MPI(gx)).
    pub hashed_gx: Vec<u8>,
}

/// Message 2: the responder's DH value in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhKey {
    pub header: MessageHeader,
    pub gy: BigUint,
}

/// Message 3: reveals `r` and carries the initiator's signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealSignature {
    pub header: MessageHeader,
    pub revealed_key: Vec<u8>,
    pub encrypted_signature: Vec<u8>,
    pub mac: [u8; MAC_LEN],
}

/// Message 4: the responder's signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub header: MessageHeader,
    pub encrypted_signature: Vec<u8>,
    pub mac: [u8; MAC_LEN],
}

/// Any of the four AKE messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AkeMessage {
    DhCommit(DhCommit),
    DhKey(DhKey),
    RevealSignature(RevealSignature),
    Signature(Signature),
}

impl AkeMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            AkeMessage::DhCommit(m) => &m.header,
            AkeMessage::DhKey(m) => &m.header,
            AkeMessage::RevealSignature(m) => &m.header,
            AkeMessage::Signature(m) => &m.header,
        }
    }

    pub fn message_type(&self) -> u8 {
        match self {
            AkeMessage::DhCommit(_) => message_type::DH_COMMIT,
            AkeMessage::DhKey(_) => message_type::DH_KEY,
            AkeMessage::RevealSignature(_) => message_type::REVEAL_SIGNATURE,
            AkeMessage::Signature(_) => message_type::SIGNATURE,
        }
    }

    /// Short name used in log events.
    pub fn label(&self) -> &'static str {
        match self {
            AkeMessage::DhCommit(_) => "DH-Commit",
            AkeMessage::DhKey(_) => "DH-Key",
            AkeMessage::RevealSignature(_) => "Reveal-Signature",
            AkeMessage::Signature(_) => "Signature",
        }
    }

    /// Serialize into the binary wire form.
    pub fn encode(&self) -> Bytes {
        let header = self.header();
        let mut buf = BytesMut::with_capacity(512);
        buf.put_u16(header.version.into());
        buf.put_u8(self.message_type());
        if header.version.has_instance_tags() {
            buf.put_u32(header.sender_instance);
            buf.put_u32(header.receiver_instance);
        }

        match self {
            AkeMessage::DhCommit(m) => {
                put_data(&mut buf, &m.encrypted_gx);
                put_data(&mut buf, &m.hashed_gx);
            }
            AkeMessage::DhKey(m) => put_mpi(&mut buf, &m.gy),
            AkeMessage::RevealSignature(m) => {
                put_data(&mut buf, &m.revealed_key);
                put_data(&mut buf, &m.encrypted_signature);
                buf.put_slice(&m.mac);
            }
            AkeMessage::Signature(m) => {
                put_data(&mut buf, &m.encrypted_signature);
                buf.put_slice(&m.mac);
            }
        }
        buf.freeze()
    }

    /// Parse the binary wire form.
    ///
    /// Versions other than 2 and 3 fail with `UnsupportedVersion`; message
    /// types outside the AKE fail with `UnsupportedOperation`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let version = ProtocolVersion::try_from(reader.read_u16()?)?;
        let kind = reader.read_u8()?;
        let header = if version.has_instance_tags() {
            let sender = reader.read_u32()?;
            let receiver = reader.read_u32()?;
            MessageHeader::new(version, sender, receiver)
        } else {
            MessageHeader::new(version, 0, 0)
        };

        let message = match kind {
            message_type::DH_COMMIT => AkeMessage::DhCommit(DhCommit {
                header,
                encrypted_gx: reader.read_data()?,
                hashed_gx: reader.read_data()?,
            }),
            message_type::DH_KEY => AkeMessage::DhKey(DhKey {
                header,
                gy: reader.read_mpi()?,
            }),
            message_type::REVEAL_SIGNATURE => AkeMessage::RevealSignature(RevealSignature {
                header,
                revealed_key: reader.read_data()?,
                encrypted_signature: reader.read_data()?,
                mac: reader.read_mac()?,
            }),
            message_type::SIGNATURE => AkeMessage::Signature(Signature {
                header,
                encrypted_signature: reader.read_data()?,
                mac: reader.read_mac()?,
            }),
            message_type::DATA => {
                return Err(AkeError::UnsupportedOperation(
                    "data messages are not part of the key exchange".into(),
                ))
            }
            other => {
                return Err(AkeError::UnsupportedOperation(format!(
                    "unknown message type: 0x{other:02x}"
                )))
            }
        };
        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal(version: ProtocolVersion) -> AkeMessage {
        AkeMessage::RevealSignature(RevealSignature {
            header: MessageHeader::new(version, 0x1234, 0x5678),
            revealed_key: vec![0x11; 16],
            encrypted_signature: vec![0x22; 40],
            mac: [0x33; MAC_LEN],
        })
    }

    #[test]
    fn v2_header_has_no_instance_tags() {
        let bytes = reveal(ProtocolVersion::V2).encode();
        assert_eq!(&bytes[..3], &[0x00, 0x02, message_type::REVEAL_SIGNATURE]);
        // SHORT + BYTE + DATA(16) + DATA(40) + MAC
        assert_eq!(bytes.len(), 3 + 4 + 16 + 4 + 40 + MAC_LEN);
        let decoded = AkeMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.header().sender_instance, 0);
    }

    #[test]
    fn v3_header_carries_instance_tags() {
        let msg = reveal(ProtocolVersion::V3);
        let bytes = msg.encode();
        assert_eq!(&bytes[3..11], &[0, 0, 0x12, 0x34, 0, 0, 0x56, 0x78]);
        assert_eq!(AkeMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn dh_key_decodes() {
        let msg = AkeMessage::DhKey(DhKey {
            header: MessageHeader::new(ProtocolVersion::V2, 0, 0),
            gy: BigUint::from(0xABCDu32),
        });
        let bytes = msg.encode();
        assert_eq!(&bytes[..], &[0, 2, 0x0a, 0, 0, 0, 2, 0xAB, 0xCD]);
        assert_eq!(AkeMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn version_one_is_unsupported() {
        let result = AkeMessage::decode(&[0x00, 0x01, message_type::DH_COMMIT]);
        assert!(matches!(result, Err(AkeError::UnsupportedVersion(1))));
    }

    #[test]
    fn unknown_type_is_unsupported_operation() {
        let result = AkeMessage::decode(&[0x00, 0x02, 0x7f]);
        assert!(matches!(result, Err(AkeError::UnsupportedOperation(_))));
        let result = AkeMessage::decode(&[0x00, 0x02, message_type::DATA]);
        assert!(matches!(result, Err(AkeError::UnsupportedOperation(_))));
    }

    #[test]
    fn truncated_and_trailing_rejected() {
        let bytes = reveal(ProtocolVersion::V2).encode();
        assert!(matches!(
            AkeMessage::decode(&bytes[..bytes.len() - 1]),
            Err(AkeError::Codec(_))
        ));
        let mut longer = bytes.to_vec();
        longer.push(0);
        assert!(matches!(AkeMessage::decode(&longer), Err(AkeError::Codec(_))));
    }
}
