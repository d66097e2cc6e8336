// OTR data-type encodings (all big-endian):
//
//   BYTE   [1B]
//   SHORT  [2B]
//   INT    [4B]
//   DATA   [len:4B][bytes:lenB]
//   MPI    [len:4B][magnitude:lenB]   (minimal, no leading zeros; 0 is empty)
//   MAC    [20B]
//   PUBKEY [type:2B = 0x0000][MPI p][MPI q][MPI g][MPI y]

use bytes::{Buf, BufMut, BytesMut};
use num_bigint::BigUint;
use num_traits::Zero;

use crate::crypto::dsa::DsaPublicKey;
use crate::crypto::hash::MAC_LEN;
use crate::error::{AkeError, Result};

/// Public-key type tag for DSA.
pub const PUBKEY_TYPE_DSA: u16 = 0x0000;

/// Append a DATA field.
pub fn put_data(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Append an MPI field.
pub fn put_mpi(buf: &mut BytesMut, value: &BigUint) {
    if value.is_zero() {
        buf.put_u32(0);
    } else {
        put_data(buf, &value.to_bytes_be());
    }
}

/// Append a serialized DSA public key.
pub fn put_public_key(buf: &mut BytesMut, key: &DsaPublicKey) {
    buf.put_u16(PUBKEY_TYPE_DSA);
    put_mpi(buf, key.p());
    put_mpi(buf, key.q());
    put_mpi(buf, key.g());
    put_mpi(buf, key.y());
}

/// Standalone MPI encoding of `value`.
pub fn encode_mpi(value: &BigUint) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + (value.bits() as usize + 7) / 8);
    put_mpi(&mut buf, value);
    buf.to_vec()
}

/// Standalone PUBKEY encoding of `key`.
pub fn encode_public_key(key: &DsaPublicKey) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2 + 4 * 132);
    put_public_key(&mut buf, key);
    buf.to_vec()
}

/// Decode a buffer holding exactly one MPI.
pub fn decode_mpi(data: &[u8]) -> Result<BigUint> {
    let mut reader = WireReader::new(data);
    let value = reader.read_mpi()?;
    reader.finish()?;
    Ok(value)
}

/// Cursor over an encoded buffer.
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(AkeError::Codec(format!(
                "unexpected end of data: need {n}, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_fixed(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_data(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.read_fixed(len)?.to_vec())
    }

    pub fn read_mpi(&mut self) -> Result<BigUint> {
        let len = self.read_u32()? as usize;
        Ok(BigUint::from_bytes_be(self.read_fixed(len)?))
    }

    pub fn read_mac(&mut self) -> Result<[u8; MAC_LEN]> {
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(self.read_fixed(MAC_LEN)?);
        Ok(mac)
    }

    pub fn read_public_key(&mut self) -> Result<DsaPublicKey> {
        let key_type = self.read_u16()?;
        if key_type != PUBKEY_TYPE_DSA {
            return Err(AkeError::Codec(format!("unknown public key type: 0x{key_type:04x}")));
        }
        let p = self.read_mpi()?;
        let q = self.read_mpi()?;
        let g = self.read_mpi()?;
        let y = self.read_mpi()?;
        DsaPublicKey::new(p, q, g, y).map_err(|e| AkeError::Codec(format!("public key: {e}")))
    }

    /// Fail if any bytes are left over.
    pub fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(AkeError::Codec(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpi_is_minimal() {
        assert_eq!(encode_mpi(&BigUint::zero()), vec![0, 0, 0, 0]);
        assert_eq!(encode_mpi(&BigUint::from(0x0102u32)), vec![0, 0, 0, 2, 0x01, 0x02]);
        assert_eq!(encode_mpi(&BigUint::from(0x80u32)), vec![0, 0, 0, 1, 0x80]);
    }

    #[test]
    fn decode_mpi_rejects_trailing_bytes() {
        assert_eq!(decode_mpi(&[0, 0, 0, 1, 7]).unwrap(), BigUint::from(7u32));
        assert!(decode_mpi(&[0, 0, 0, 1, 7, 0]).is_err());
    }

    #[test]
    fn truncated_data_fails() {
        let mut reader = WireReader::new(&[0, 0, 0, 5, 1, 2]);
        assert!(matches!(reader.read_data(), Err(AkeError::Codec(_))));
    }

    #[test]
    fn public_key_roundtrip() {
        // q = 131 divides p - 1 = 262; 4 generates the order-q subgroup.
        let key = DsaPublicKey::new(
            BigUint::from(263u32),
            BigUint::from(131u32),
            BigUint::from(4u32),
            BigUint::from(78u32),
        )
        .unwrap();
        let encoded = encode_public_key(&key);
        let mut reader = WireReader::new(&encoded);
        assert_eq!(reader.read_public_key().unwrap(), key);
        reader.finish().unwrap();
    }

    #[test]
    fn unknown_key_type_fails() {
        let mut reader = WireReader::new(&[0x00, 0x01, 0, 0, 0, 0]);
        assert!(reader.read_public_key().is_err());
    }
}
