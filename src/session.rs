//! Per-connection staging buffer: frames RDR packets out of a raw TCP
//! byte stream and resynchronizes after truncation or garbage, exactly
//! the way `convert_rcvd_data()` did. One `Session` exists per accepted
//! listener connection and owns that connection's NetFlow batch.

use std::net::{Ipv4Addr, SocketAddr};

use log::{debug, trace, warn};

use crate::ipfilter::IpFilter;
use crate::netflow;
use crate::rdr::{self, header::Framing, record::Record as RdrRecord};

pub const BUFFER_CAPACITY: usize = rdr::MAX_PACKET_SIZE + 1;

pub struct Session {
    pub remote_addr: SocketAddr,
    buf: Vec<u8>,
    pos: usize,
    pub netflow: netflow::Builder,
}

impl Session {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Session { remote_addr, buf: vec![0u8; BUFFER_CAPACITY], pos: 0, netflow: netflow::Builder::new() }
    }

    pub fn spare_capacity(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes written between a previously observed position and now,
    /// used to tee freshly-read bytes to the repeater.
    pub fn written_since(&self, from: usize) -> &[u8] {
        &self.buf[from..self.pos]
    }

    /// Record that `n` freshly-read bytes now occupy the tail of the
    /// spare capacity previously handed out by `spare_capacity()`.
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
        debug_assert!(self.pos <= self.buf.len());
    }

    pub fn is_buffer_full(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Scan the staged bytes for RDR packets, decode and fold each
    /// recognized `TRANSACTION_USAGE_RDR` into the session's NetFlow
    /// batch, and compact the buffer down to any trailing truncated
    /// packet. Mirrors `convert_rcvd_data()` field-for-field, including
    /// its two-truncation-marker buffer-full safety valve.
    ///
    /// Returns `true` if the NetFlow batch just became full and should
    /// be flushed.
    pub fn ingest(&mut self, ip_filter: &IpFilter) -> bool {
        if self.pos == 0 {
            return false;
        }

        trace!("rcvd {} bytes from {}", self.pos, self.remote_addr);

        let mut p = 0usize;
        let mut truncated1: Option<usize> = None;
        let mut truncated2: Option<usize> = None;
        let mut flush_needed = false;

        while p < self.pos {
            match rdr::header::scan(&self.buf[p..self.pos]) {
                Framing::Packet(size) => match rdr::record::decode(&self.buf[p..p + size]) {
                    Ok(packet) => {
                        if let RdrRecord::TransactionUsage(rec) = &packet.record {
                            let src = Ipv4Addr::from(rec.client_ip);
                            let dst = Ipv4Addr::from(rec.server_ip);
                            if ip_filter.matches(src, dst) == 0 {
                                flush_needed |= self.netflow.add(rec);
                            } else {
                                debug!("dropped filtered transaction usage record {}:{} -> {}:{}", src, rec.client_port, dst, rec.server_port);
                            }
                        }
                        p += size;
                        truncated1 = None;
                        truncated2 = None;
                    }
                    Err(e) => {
                        debug!("decode_rdr_packet() error {:?}", e);
                        p += 1;
                    }
                },
                Framing::Truncated => {
                    if truncated1.is_none() {
                        truncated1 = Some(p);
                    } else if truncated2.is_none() {
                        truncated2 = Some(p);
                    }
                    p += 1;
                }
                Framing::NotRdr => {
                    p += 1;
                }
            }
        }

        debug_assert!(p <= self.buf.len());

        if truncated1 == Some(0) && p == self.buf.len() {
            truncated1 = truncated2;
            if truncated1.is_none() {
                warn!("Skipped {} garbage bytes", self.buf.len());
            }
        }

        match truncated1 {
            None => self.pos = 0,
            Some(0) => {}
            Some(start) => {
                trace!("received truncated message");
                self.buf.copy_within(start..self.pos, 0);
                self.pos -= start;
            }
        }

        flush_needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdr::tag::TRANSACTION_USAGE_RDR;
    use std::net::IpAddr;

    fn field_u8(ty: u8, val: u8) -> Vec<u8> {
        vec![ty, 0, 0, 0, 1, val]
    }
    fn field_u16(ty: u8, val: u16) -> Vec<u8> {
        let mut v = vec![ty, 0, 0, 0, 2];
        v.extend_from_slice(&val.to_be_bytes());
        v
    }
    fn field_u32(ty: u8, val: u32) -> Vec<u8> {
        let mut v = vec![ty, 0, 0, 0, 4];
        v.extend_from_slice(&val.to_be_bytes());
        v
    }
    fn field_str(s: &[u8]) -> Vec<u8> {
        let mut v = vec![41u8, 0, 0, 0, s.len() as u8];
        v.extend_from_slice(s);
        v
    }

    fn usage_packet(client_ip: u32, upstream: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(field_str(b"sub"));
        body.extend(field_u16(12, 1));
        body.extend(field_u32(13, 1));
        body.extend(field_u16(12, 1));
        body.extend(field_u32(16, 0));
        body.extend(field_u32(16, 0x0a00_0001));
        body.extend(field_u16(15, 80));
        body.extend(field_str(b""));
        body.extend(field_str(b""));
        body.extend(field_u32(16, client_ip.swap_bytes()));
        body.extend(field_u16(15, 1234));
        body.extend(field_u8(11, 0));
        body.extend(field_u32(16, 1_700_000_010));
        body.extend(field_u32(16, 1500));
        body.extend(field_u8(11, 0));
        body.extend(field_u32(16, upstream));
        body.extend(field_u32(16, upstream));
        body.extend(field_u16(15, 0));
        body.extend(field_u16(15, 0));
        body.extend(field_u16(15, 0));
        body.extend(field_u8(14, 6));
        body.extend(field_u32(13, 0));
        body.extend(field_u32(13, 0));
        body.extend(field_u32(13, 0));
        body.extend(field_u8(14, 0));

        let payload_size = 15 + body.len();
        let mut pkt = vec![0x01u8];
        pkt.extend(format!("{:04}", payload_size).into_bytes());
        pkt.push(5);
        pkt.push(6);
        pkt.extend_from_slice(&0u16.to_be_bytes());
        pkt.extend_from_slice(&0u16.to_be_bytes());
        pkt.extend_from_slice(&0u32.to_be_bytes());
        pkt.extend_from_slice(&TRANSACTION_USAGE_RDR.to_be_bytes());
        pkt.push(25);
        pkt.extend(body);
        pkt
    }

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9000)
    }

    #[test]
    fn ingests_single_packet_and_clears_buffer() {
        let mut s = Session::new(addr());
        let pkt = usage_packet(0x0a00_0002, 1000);
        s.spare_capacity()[..pkt.len()].copy_from_slice(&pkt);
        s.advance(pkt.len());

        s.ingest(&IpFilter::new());

        assert!(!s.netflow.is_empty());
        assert_eq!(s.pos, 0);
    }

    #[test]
    fn leading_garbage_is_skipped_byte_by_byte() {
        let mut s = Session::new(addr());
        let mut data = vec![0xffu8; 3];
        data.extend(usage_packet(0x0a00_0002, 1000));
        s.spare_capacity()[..data.len()].copy_from_slice(&data);
        s.advance(data.len());

        s.ingest(&IpFilter::new());

        assert!(!s.netflow.is_empty());
        assert_eq!(s.pos, 0);
    }

    #[test]
    fn truncated_tail_is_preserved_for_next_read() {
        let mut s = Session::new(addr());
        let pkt = usage_packet(0x0a00_0002, 1000);
        let cut = pkt.len() - 3;
        s.spare_capacity()[..cut].copy_from_slice(&pkt[..cut]);
        s.advance(cut);

        s.ingest(&IpFilter::new());

        assert_eq!(s.pos, cut);
    }

    #[test]
    fn filtered_record_is_dropped_silently() {
        let mut s = Session::new(addr());
        let pkt = usage_packet(0x0a00_0002, 1000);
        s.spare_capacity()[..pkt.len()].copy_from_slice(&pkt);
        s.advance(pkt.len());

        let mut filter = IpFilter::new();
        filter.add_networks("10.0.0.2/32").unwrap();
        s.ingest(&filter);

        assert!(s.netflow.is_empty());
    }
}
