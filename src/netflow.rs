//! NetFlow v5 wire format and the per-session builder that turns decoded
//! `TRANSACTION_USAGE_RDR` records into export datagrams.
//!
//! The wire structs follow the teacher crate's `flow::netflow5` module
//! (same field layout, same `read`/`SIZE`/`Display` shape); this module
//! adds the write side and the per-session accumulation the teacher never
//! needed, since it only ever consumed NetFlow rather than producing it.

use core::convert::TryInto;
use std::fmt;
use std::net::Ipv4Addr;

use log::warn;

use crate::rdr::TransactionUsageRdr;

pub const VERSION: u16 = 5;
pub const MAX_RECORDS: usize = 30;

/******************************** HEADER ********************************/

/// from https://www.cisco.com/c/en/us/td/docs/net_mgmt/netflow_collection_engine/3-6/user/guide/format.html#wp1006108
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_seq: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: u16,
}

impl Header {
    pub const SIZE: usize = 24;

    pub fn write(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[0..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..4].copy_from_slice(&self.count.to_be_bytes());
        out[4..8].copy_from_slice(&self.sys_uptime.to_be_bytes());
        out[8..12].copy_from_slice(&self.unix_secs.to_be_bytes());
        out[12..16].copy_from_slice(&self.unix_nsecs.to_be_bytes());
        out[16..20].copy_from_slice(&self.flow_seq.to_be_bytes());
        out[20] = self.engine_type;
        out[21] = self.engine_id;
        out[22..24].copy_from_slice(&self.sampling_interval.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Result<Self, String> {
        if buf.len() < Self::SIZE {
            return Err(format!("Not enough space in buffer to read the NETFLOW V5 Header, required {} but received {}", Self::SIZE, buf.len()));
        }
        Ok(Header {
            version: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            count: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            sys_uptime: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            unix_secs: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            unix_nsecs: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            flow_seq: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            engine_type: buf[20],
            engine_id: buf[21],
            sampling_interval: u16::from_be_bytes(buf[22..24].try_into().unwrap()),
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "version: {}, count: {}, uptime: {}ms, unix_secs: {}s, flow_seq: {}",
            self.version, self.count, self.sys_uptime, self.unix_secs, self.flow_seq
        )
    }
}

/******************************** RECORD ********************************/

/// from https://www.cisco.com/c/en/us/td/docs/net_mgmt/netflow_collection_engine/3-6/user/guide/format.html#wp1006186
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub next_hop: u32,
    pub input_int: u16,
    pub output_int: u16,
    pub packets: u32,
    pub octets: u32,
    pub first: u32,
    pub last: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
}

impl Record {
    pub const SIZE: usize = 48;

    pub fn write(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[0..4].copy_from_slice(&self.src_addr.to_be_bytes());
        out[4..8].copy_from_slice(&self.dst_addr.to_be_bytes());
        out[8..12].copy_from_slice(&self.next_hop.to_be_bytes());
        out[12..14].copy_from_slice(&self.input_int.to_be_bytes());
        out[14..16].copy_from_slice(&self.output_int.to_be_bytes());
        out[16..20].copy_from_slice(&self.packets.to_be_bytes());
        out[20..24].copy_from_slice(&self.octets.to_be_bytes());
        out[24..28].copy_from_slice(&self.first.to_be_bytes());
        out[28..32].copy_from_slice(&self.last.to_be_bytes());
        out[32..34].copy_from_slice(&self.src_port.to_be_bytes());
        out[34..36].copy_from_slice(&self.dst_port.to_be_bytes());
        out[36] = 0; // pad1
        out[37] = self.tcp_flags;
        out[38] = self.protocol;
        out[39] = self.tos;
        out[40..42].copy_from_slice(&self.src_as.to_be_bytes());
        out[42..44].copy_from_slice(&self.dst_as.to_be_bytes());
        out[44] = self.src_mask;
        out[45] = self.dst_mask;
        out[46..48].copy_from_slice(&0u16.to_be_bytes()); // pad2
    }

    pub fn read(buf: &[u8]) -> Result<Self, String> {
        if buf.len() < Self::SIZE {
            return Err(format!("Not enough space in buffer to read the NETFLOW V5 Record, required {} but received {}", Self::SIZE, buf.len()));
        }
        Ok(Record {
            src_addr: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            dst_addr: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            next_hop: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            input_int: u16::from_be_bytes(buf[12..14].try_into().unwrap()),
            output_int: u16::from_be_bytes(buf[14..16].try_into().unwrap()),
            packets: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            octets: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
            first: u32::from_be_bytes(buf[24..28].try_into().unwrap()),
            last: u32::from_be_bytes(buf[28..32].try_into().unwrap()),
            src_port: u16::from_be_bytes(buf[32..34].try_into().unwrap()),
            dst_port: u16::from_be_bytes(buf[34..36].try_into().unwrap()),
            tcp_flags: buf[37],
            protocol: buf[38],
            tos: buf[39],
            src_as: u16::from_be_bytes(buf[40..42].try_into().unwrap()),
            dst_as: u16::from_be_bytes(buf[42..44].try_into().unwrap()),
            src_mask: buf[44],
            dst_mask: buf[45],
        })
    }

    #[inline]
    pub fn duration(&self) -> u32 {
        self.last - self.first
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "from: {}/{}:{}, to: {}/{}:{}, octets: {}, protocol: {}, duration: {}ms",
            Ipv4Addr::from(self.src_addr),
            self.src_mask,
            self.src_port,
            Ipv4Addr::from(self.dst_addr),
            self.dst_mask,
            self.dst_port,
            self.octets,
            self.protocol,
            self.duration()
        )
    }
}

/******************************** BUILDER ********************************/

/// Per-session accumulator: up to `MAX_RECORDS` NetFlow records batched
/// behind one header, flushed when full, on a timer, or at session close.
/// Grounded on `handle_rdr_packet()` / `flush_netflow_dgram()`.
pub struct Builder {
    first_packet_ts: u32,
    last_packet_ts: u32,
    flow_seq: u32,
    records: Vec<Record>,
}

impl Builder {
    pub fn new() -> Self {
        Builder { first_packet_ts: 0, last_packet_ts: 0, flow_seq: 0, records: Vec::with_capacity(MAX_RECORDS) }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold one `TRANSACTION_USAGE_RDR` record into the batch as a pair
    /// of upstream/downstream NetFlow records. Returns `true` if the
    /// batch just reached `MAX_RECORDS` and must be flushed immediately.
    pub fn add(&mut self, rec: &TransactionUsageRdr) -> bool {
        let duration_s = rec.millisec_duration / 1000 + if rec.millisec_duration % 1000 == 0 { 0 } else { 1 };
        let duration_s = if rec.report_time < duration_s { 0 } else { duration_s };
        let candidate_start = rec.report_time - duration_s;

        if self.first_packet_ts == 0 {
            self.first_packet_ts = candidate_start;
        } else if candidate_start < self.first_packet_ts {
            warn!(
                "report_time went backwards ({} < {}), resetting batch start",
                rec.report_time, self.first_packet_ts
            );
            self.first_packet_ts = candidate_start;
        }
        if rec.report_time < self.first_packet_ts {
            self.first_packet_ts = candidate_start;
        }
        self.last_packet_ts = rec.report_time;

        let uptime = 1000u32 * (self.last_packet_ts - self.first_packet_ts) + 1;
        let first = uptime.saturating_sub(rec.millisec_duration);

        let (up_src, up_dst, up_sport, up_dport) = if rec.initiating_side == 0 {
            (rec.client_ip, rec.server_ip, rec.client_port, rec.server_port)
        } else {
            (rec.server_ip, rec.client_ip, rec.server_port, rec.client_port)
        };

        self.flow_seq += 1;
        self.records.push(Record {
            src_addr: up_src,
            dst_addr: up_dst,
            src_port: up_sport,
            dst_port: up_dport,
            octets: rec.session_upstream_volume,
            first,
            last: uptime,
            protocol: rec.ip_protocol,
            src_mask: 32,
            dst_mask: 32,
            ..Record::default()
        });

        self.flow_seq += 1;
        self.records.push(Record {
            src_addr: up_dst,
            dst_addr: up_src,
            src_port: up_dport,
            dst_port: up_sport,
            octets: rec.session_downstream_volume,
            first,
            last: uptime,
            protocol: rec.ip_protocol,
            src_mask: 32,
            dst_mask: 32,
            ..Record::default()
        });

        self.records.len() >= MAX_RECORDS
    }

    /// Serialize the batch into one datagram and clear it. Returns
    /// `None` if there was nothing to send, matching `flush_netflow_dgram`'s
    /// no-op on `records_count == 0`.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.records.is_empty() {
            return None;
        }

        let uptime = 1000u32 * (self.last_packet_ts - self.first_packet_ts) + 1;
        let header = Header {
            version: VERSION,
            count: self.records.len() as u16,
            sys_uptime: uptime,
            unix_secs: self.last_packet_ts,
            unix_nsecs: 0,
            flow_seq: self.flow_seq,
            engine_type: 0,
            engine_id: 0,
            sampling_interval: 0,
        };

        let mut out = vec![0u8; Header::SIZE + Record::SIZE * self.records.len()];
        header.write(&mut out[0..Header::SIZE]);
        for (i, rec) in self.records.iter().enumerate() {
            let start = Header::SIZE + i * Record::SIZE;
            rec.write(&mut out[start..start + Record::SIZE]);
        }

        self.records.clear();
        Some(out)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const HEADER_PAYLOAD: [u8; Header::SIZE] = hex!(
        "00 05 00 10 00 00 04 b2 60 80 b8 9c 1a 47 ff 30
         00 00 00 02 01 00 00 00"
    );

    #[test]
    fn reads_valid_header() {
        let header = Header::read(&HEADER_PAYLOAD).unwrap();
        assert_eq!(header.version, VERSION);
        assert_eq!(header.count, 16);
        assert_eq!(header.flow_seq, 2);
    }

    #[test]
    fn header_round_trips_through_write() {
        let header = Header::read(&HEADER_PAYLOAD).unwrap();
        let mut buf = [0u8; Header::SIZE];
        header.write(&mut buf);
        assert_eq!(buf, HEADER_PAYLOAD);
    }

    fn usage_record(initiating_side: i8, upstream: u32, downstream: u32) -> TransactionUsageRdr {
        TransactionUsageRdr {
            subscriber_id: b"sub".to_vec(),
            package_id: 1,
            service_id: 1,
            protocol_id: 1,
            generation_reason: 0,
            server_ip: u32::from(Ipv4Addr::new(10, 0, 0, 1)),
            server_port: 80,
            access_string: Vec::new(),
            info_string: Vec::new(),
            client_ip: u32::from(Ipv4Addr::new(10, 0, 0, 2)),
            client_port: 1234,
            initiating_side,
            report_time: 1_700_000_010,
            millisec_duration: 1500,
            time_frame: 0,
            session_upstream_volume: upstream,
            session_downstream_volume: downstream,
            subscriber_counter_id: 0,
            global_counter_id: 0,
            package_counter_id: 0,
            ip_protocol: 6,
            protocol_signature: 0,
            zone_id: 0,
            flavor_id: 0,
            flow_close_mode: 0,
        }
    }

    #[test]
    fn add_emits_upstream_then_downstream_pair() {
        let mut b = Builder::new();
        let full = b.add(&usage_record(0, 1000, 2000));
        assert!(!full);
        assert_eq!(b.records.len(), 2);
        assert_eq!(b.records[0].octets, 1000);
        assert_eq!(b.records[0].src_addr, u32::from(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(b.records[1].octets, 2000);
        assert_eq!(b.records[1].src_addr, u32::from(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn network_initiated_session_swaps_direction() {
        let mut b = Builder::new();
        b.add(&usage_record(1, 1000, 2000));
        assert_eq!(b.records[0].src_addr, u32::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(b.records[1].src_addr, u32::from(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn flush_resets_batch_and_reports_count() {
        let mut b = Builder::new();
        b.add(&usage_record(0, 1000, 2000));
        let dgram = b.flush().unwrap();
        assert_eq!(dgram.len(), Header::SIZE + 2 * Record::SIZE);
        let header = Header::read(&dgram).unwrap();
        assert_eq!(header.count, 2);
        assert!(b.is_empty());
        assert!(b.flush().is_none());
    }

    #[test]
    fn full_batch_signals_flush_at_thirty_records() {
        let mut b = Builder::new();
        let mut full = false;
        for _ in 0..15 {
            full = b.add(&usage_record(0, 1, 1));
        }
        assert!(full);
        assert_eq!(b.records.len(), MAX_RECORDS);
    }

    #[test]
    fn clock_reversal_resets_batch_start() {
        let mut b = Builder::new();
        let mut rec = usage_record(0, 1, 1);
        rec.report_time = 1_000_000;
        b.add(&rec);

        rec.report_time = 999_000;
        b.add(&rec);

        assert_eq!(b.first_packet_ts, rec.report_time - (rec.millisec_duration / 1000 + 1));
        assert_eq!(b.last_packet_ts, 999_000);
    }

    #[test]
    fn oversized_duration_clamps_first_instead_of_underflowing() {
        let mut b = Builder::new();
        let mut rec = usage_record(0, 1, 1);
        rec.report_time = 100;
        rec.millisec_duration = u32::MAX;
        b.add(&rec);

        assert!(b.records[0].first <= b.records[0].last);
        assert_eq!(b.records[0].first, 0);
    }
}
