use core::convert::TryInto;
use std::fmt;

use super::tag::FieldType;

/// Why a typed field read failed, mirroring the two failure shapes that
/// `get_*_field()` distinguished by the sign and magnitude of its return
/// value: a wrong-type field, or not enough bytes left in the packet.
#[derive(Debug, PartialEq, Eq)]
pub enum FieldError {
    TypeMismatch { expected: FieldType, found: u8 },
    Truncated,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldError::TypeMismatch { expected, found } => {
                write!(f, "expected field type {} but found {}", expected.name(), found)
            }
            FieldError::Truncated => write!(f, "truncated field"),
        }
    }
}

/// Cursor over an already-framed RDR packet, used to pull typed fields
/// off the wire in order. Each `read_*` call advances `pos` only on
/// success, so a caller can stop at the first error without needing to
/// track position itself.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pub pos: usize,
}

const FIELD_PREFIX_SIZE: usize = 5;

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Cursor { buf, pos }
    }

    fn prefix(&self) -> Result<(u8, usize), FieldError> {
        if self.pos + FIELD_PREFIX_SIZE > self.buf.len() {
            return Err(FieldError::Truncated);
        }
        let ty = self.buf[self.pos];
        let size = u32::from_be_bytes(self.buf[self.pos + 1..self.pos + 5].try_into().unwrap()) as usize;
        Ok((ty, size))
    }

    fn fixed_payload(&mut self, expected: FieldType, expected_size: usize) -> Result<&'a [u8], FieldError> {
        let (ty, size) = self.prefix()?;
        if ty != expected as u8 {
            return Err(FieldError::TypeMismatch { expected, found: ty });
        }
        if size != expected_size {
            return Err(FieldError::Truncated);
        }
        let start = self.pos + FIELD_PREFIX_SIZE;
        let end = start + size;
        if end > self.buf.len() {
            return Err(FieldError::Truncated);
        }
        self.pos = end;
        Ok(&self.buf[start..end])
    }

    pub fn read_int8(&mut self) -> Result<i8, FieldError> {
        Ok(self.fixed_payload(FieldType::Int8, 1)?[0] as i8)
    }

    pub fn read_uint8(&mut self) -> Result<u8, FieldError> {
        Ok(self.fixed_payload(FieldType::Uint8, 1)?[0])
    }

    pub fn read_int16(&mut self) -> Result<i16, FieldError> {
        let b = self.fixed_payload(FieldType::Int16, 2)?;
        Ok(i16::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_uint16(&mut self) -> Result<u16, FieldError> {
        let b = self.fixed_payload(FieldType::Uint16, 2)?;
        Ok(u16::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_int32(&mut self) -> Result<i32, FieldError> {
        let b = self.fixed_payload(FieldType::Int32, 4)?;
        Ok(i32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_uint32(&mut self) -> Result<u32, FieldError> {
        let b = self.fixed_payload(FieldType::Uint32, 4)?;
        Ok(u32::from_be_bytes(b.try_into().unwrap()))
    }

    /// UINT32 field carrying an IPv4 address. The original applies a
    /// second host-order conversion on top of the already-converted
    /// `get_uint32_field()` value (`ip->s_addr = ntohl(tmp_ip)`); on a
    /// little-endian host that is a byte swap, and it must be preserved
    /// bit-for-bit so addresses match what the upstream collector expects.
    pub fn read_ip(&mut self) -> Result<u32, FieldError> {
        let v = self.read_uint32()?;
        Ok(v.swap_bytes())
    }

    /// UINT32 field carrying an epoch-seconds timestamp. Kept as a raw
    /// `u32`, not converted to a wall-clock type, since every consumer
    /// only ever does integer arithmetic on it before re-emitting it.
    pub fn read_time(&mut self) -> Result<u32, FieldError> {
        self.read_uint32()
    }

    /// STRING field: truncates into `dst_cap` bytes and always leaves
    /// room for (and appends) a NUL terminator, the way `get_string_field`
    /// did for fixed-size C buffers. Returns the copied bytes without the
    /// terminator.
    pub fn read_string(&mut self, dst_cap: usize) -> Result<Vec<u8>, FieldError> {
        let (ty, size) = self.prefix()?;
        if ty != FieldType::String as u8 {
            return Err(FieldError::TypeMismatch { expected: FieldType::String, found: ty });
        }
        let start = self.pos + FIELD_PREFIX_SIZE;
        let end = start + size;
        if end > self.buf.len() {
            return Err(FieldError::Truncated);
        }
        self.pos = end;
        let copy_len = size.min(dst_cap.saturating_sub(1));
        Ok(self.buf[start..start + copy_len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn reads_uint32_in_network_order() {
        let buf: [u8; 9] = hex!("10 00 00 00 04 00 00 01 01");
        let mut c = Cursor::new(&buf, 0);
        assert_eq!(c.read_uint32().unwrap(), 0x0000_0101);
        assert_eq!(c.pos, 9);
    }

    #[test]
    fn type_mismatch_reports_found_type() {
        let buf: [u8; 9] = hex!("0f 00 00 00 04 00 00 01 01");
        let mut c = Cursor::new(&buf, 0);
        let err = c.read_uint32().unwrap_err();
        assert_eq!(err, FieldError::TypeMismatch { expected: FieldType::Uint32, found: 0x0f });
    }

    #[test]
    fn truncated_prefix_is_reported() {
        let buf: [u8; 3] = [0x10, 0x00, 0x00];
        let mut c = Cursor::new(&buf, 0);
        assert_eq!(c.read_uint32().unwrap_err(), FieldError::Truncated);
    }

    #[test]
    fn ip_field_double_swap_is_identity_on_round_trip() {
        // get_uint32_field() already converted network->host; get_ip_field()
        // then applies ntohl() again. On a little-endian host this means
        // the final value is the byte-swap of the plain uint32 read.
        let buf: [u8; 9] = hex!("10 00 00 00 04 0a 00 00 01");
        let mut c = Cursor::new(&buf, 0);
        assert_eq!(c.read_ip().unwrap(), 0x0a00_0001u32.swap_bytes());
    }

    #[test]
    fn string_field_truncates_and_excludes_terminator() {
        let buf: [u8; 8] = hex!("29 00 00 00 03 68 69 21");
        let mut c = Cursor::new(&buf, 0);
        let s = c.read_string(3).unwrap();
        assert_eq!(s, b"hi");
    }
}
