use core::convert::TryInto;

pub const HEADER_SIZE: usize = 20;
pub const MAX_PAYLOAD_SIZE: usize = 9999;
pub const MAX_PACKET_SIZE: usize = MAX_PAYLOAD_SIZE + 5;

/// Result of scanning a buffer prefix for an RDR frame.
///
/// Mirrors `is_rdr_packet()`'s tri-state return: a positive packet size,
/// `NotRdr` when the payload-size digits aren't ASCII, or `Truncated` when
/// there just isn't enough data yet to tell.
#[derive(Debug, PartialEq, Eq)]
pub enum Framing {
    Packet(usize),
    NotRdr,
    Truncated,
}

/// Scan `buf` for an RDR v1 frame starting at offset 0.
pub fn scan(buf: &[u8]) -> Framing {
    if buf.len() < 5 {
        return Framing::Truncated;
    }

    for &b in &buf[1..5] {
        if !b.is_ascii_digit() {
            return Framing::NotRdr;
        }
    }

    let payload_size = (buf[1] - b'0') as usize * 1000
        + (buf[2] - b'0') as usize * 100
        + (buf[3] - b'0') as usize * 10
        + (buf[4] - b'0') as usize;

    if payload_size < HEADER_SIZE - 5 {
        return Framing::NotRdr;
    }

    if payload_size + 5 > buf.len() {
        return Framing::Truncated;
    }

    Framing::Packet(payload_size + 5)
}

/// Decoded 20-octet RDR v1 header, in host order.
#[derive(Debug, Clone)]
pub struct Header {
    pub ppc_num: u8,
    pub payload_size: usize,
    pub src: u8,
    pub dst: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub fc_id: u32,
    pub tag: u32,
    pub field_cnt: u8,
}

impl Header {
    /// Parse the header of a buffer already known to hold a full packet
    /// (i.e. `scan()` returned `Framing::Packet(_)` for it).
    pub fn read(buf: &[u8]) -> Header {
        debug_assert!(buf.len() >= HEADER_SIZE);
        Header {
            ppc_num: buf[0],
            payload_size: buf.len() - 5,
            src: buf[5],
            dst: buf[6],
            src_port: u16::from_be_bytes(buf[7..9].try_into().unwrap()),
            dst_port: u16::from_be_bytes(buf[9..11].try_into().unwrap()),
            fc_id: u32::from_be_bytes(buf[11..15].try_into().unwrap()),
            tag: u32::from_be_bytes(buf[15..19].try_into().unwrap()),
            field_cnt: buf[19],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn scan_reports_truncated_prefix() {
        assert_eq!(scan(&[0x01, b'0']), Framing::Truncated);
    }

    #[test]
    fn scan_rejects_non_digit_size() {
        assert_eq!(scan(b"\x01XXXX"), Framing::NotRdr);
    }

    #[test]
    fn scan_reports_truncated_body() {
        // declares payload_size=0020 (25 total) but only 10 bytes given
        let buf = b"\x010020\x00\x00\x00\x00\x00";
        assert_eq!(scan(buf), Framing::Truncated);
    }

    #[test]
    fn scan_accepts_minimal_packet() {
        // payload_size must be >= 15 (HEADER_SIZE - 5)
        let mut buf = vec![0x01, b'0', b'0', b'1', b'5'];
        buf.extend_from_slice(&[0u8; 15]);
        assert_eq!(scan(&buf), Framing::Packet(20));
    }

    #[test]
    fn header_reads_fields_in_network_order() {
        let header_bytes: [u8; HEADER_SIZE] = hex!(
            "01 30 30 32 30
             05 06 1f 90 1f a4
             00 00 04 d2 f0 f0 f4 38 19"
        );
        let h = Header::read(&header_bytes);
        assert_eq!(h.ppc_num, 1);
        assert_eq!(h.src, 5);
        assert_eq!(h.dst, 6);
        assert_eq!(h.src_port, 0x1f90);
        assert_eq!(h.dst_port, 0x1fa4);
        assert_eq!(h.fc_id, 0x0000_04d2);
        assert_eq!(h.tag, crate::rdr::tag::TRANSACTION_USAGE_RDR);
        assert_eq!(h.field_cnt, 25);
    }
}
