use super::field::{Cursor, FieldError};
use super::header::{Header, HEADER_SIZE};
use super::tag::{TRANSACTION_RDR, TRANSACTION_USAGE_RDR};

const SUBSCRIBER_ID_CAP: usize = 65;
const ACCESS_STRING_CAP: usize = 160;
const INFO_STRING_CAP: usize = 160;

/// Decoded `TRANSACTION_RDR` body. Field order matches the wire layout
/// exactly; this is the "session opened" record and carries no volume
/// counters, so it never feeds the NetFlow builder directly.
#[derive(Debug, Clone)]
pub struct TransactionRdr {
    pub subscriber_id: Vec<u8>,
    pub package_id: i16,
    pub service_id: i32,
    pub protocol_id: i16,
    pub skipped_sessions: i32,
    pub server_ip: u32,
    pub server_port: u16,
    pub access_string: Vec<u8>,
    pub info_string: Vec<u8>,
    pub client_ip: u32,
    pub client_port: u16,
    pub initiating_side: i8,
    pub report_time: u32,
    pub millisec_duration: u32,
    pub time_frame: i8,
    pub session_upstream_volume: u32,
    pub session_downstream_volume: u32,
    pub subscriber_counter_id: u16,
    pub global_counter_id: u16,
    pub package_counter_id: u16,
    pub ip_protocol: u8,
    pub protocol_signature: i32,
    pub zone_id: i32,
    pub flavor_id: i32,
    pub flow_close_mode: u8,
}

/// Decoded `TRANSACTION_USAGE_RDR` body, the record that actually drives
/// NetFlow export (see `crate::netflow`).
#[derive(Debug, Clone)]
pub struct TransactionUsageRdr {
    pub subscriber_id: Vec<u8>,
    pub package_id: i16,
    pub service_id: i32,
    pub protocol_id: i16,
    pub generation_reason: u32,
    pub server_ip: u32,
    pub server_port: u16,
    pub access_string: Vec<u8>,
    pub info_string: Vec<u8>,
    pub client_ip: u32,
    pub client_port: u16,
    pub initiating_side: i8,
    pub report_time: u32,
    pub millisec_duration: u32,
    pub time_frame: i8,
    pub session_upstream_volume: u32,
    pub session_downstream_volume: u32,
    pub subscriber_counter_id: u16,
    pub global_counter_id: u16,
    pub package_counter_id: u16,
    pub ip_protocol: u8,
    pub protocol_signature: i32,
    pub zone_id: i32,
    pub flavor_id: i32,
    pub flow_close_mode: u8,
}

/// What a recognized packet decoded to; `Other` covers every tag that
/// has no typed body (still a successful decode, header-only).
#[derive(Debug, Clone)]
pub enum Record {
    Transaction(TransactionRdr),
    TransactionUsage(TransactionUsageRdr),
    Other,
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    pub record: Record,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    TooFewFields { field_cnt: u8 },
    Field(FieldError),
}

impl From<FieldError> for DecodeError {
    fn from(e: FieldError) -> Self {
        DecodeError::Field(e)
    }
}

/// Decode a buffer already known to hold exactly one RDR packet (as
/// produced by `rdr::header::scan`). Fields are read in fixed order;
/// the first failure aborts the whole record, same as `decode_rdr_packet`.
pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
    let header = Header::read(buf);

    let record = match header.tag {
        TRANSACTION_RDR => Record::Transaction(decode_transaction(buf, header.field_cnt)?),
        TRANSACTION_USAGE_RDR => Record::TransactionUsage(decode_transaction_usage(buf, header.field_cnt)?),
        _ => Record::Other,
    };

    Ok(Packet { header, record })
}

fn decode_transaction(buf: &[u8], field_cnt: u8) -> Result<TransactionRdr, DecodeError> {
    if field_cnt < 25 {
        return Err(DecodeError::TooFewFields { field_cnt });
    }
    let mut c = Cursor::new(buf, HEADER_SIZE);
    Ok(TransactionRdr {
        subscriber_id: c.read_string(SUBSCRIBER_ID_CAP)?,
        package_id: c.read_int16()?,
        service_id: c.read_int32()?,
        protocol_id: c.read_int16()?,
        skipped_sessions: c.read_int32()?,
        server_ip: c.read_ip()?,
        server_port: c.read_uint16()?,
        access_string: c.read_string(ACCESS_STRING_CAP)?,
        info_string: c.read_string(INFO_STRING_CAP)?,
        client_ip: c.read_ip()?,
        client_port: c.read_uint16()?,
        initiating_side: c.read_int8()?,
        report_time: c.read_time()?,
        millisec_duration: c.read_uint32()?,
        time_frame: c.read_int8()?,
        session_upstream_volume: c.read_uint32()?,
        session_downstream_volume: c.read_uint32()?,
        subscriber_counter_id: c.read_uint16()?,
        global_counter_id: c.read_uint16()?,
        package_counter_id: c.read_uint16()?,
        ip_protocol: c.read_uint8()?,
        protocol_signature: c.read_int32()?,
        zone_id: c.read_int32()?,
        flavor_id: c.read_int32()?,
        flow_close_mode: c.read_uint8()?,
    })
}

fn decode_transaction_usage(buf: &[u8], field_cnt: u8) -> Result<TransactionUsageRdr, DecodeError> {
    if field_cnt < 25 {
        return Err(DecodeError::TooFewFields { field_cnt });
    }
    let mut c = Cursor::new(buf, HEADER_SIZE);
    Ok(TransactionUsageRdr {
        subscriber_id: c.read_string(SUBSCRIBER_ID_CAP)?,
        package_id: c.read_int16()?,
        service_id: c.read_int32()?,
        protocol_id: c.read_int16()?,
        generation_reason: c.read_uint32()?,
        server_ip: c.read_ip()?,
        server_port: c.read_uint16()?,
        access_string: c.read_string(ACCESS_STRING_CAP)?,
        info_string: c.read_string(INFO_STRING_CAP)?,
        client_ip: c.read_ip()?,
        client_port: c.read_uint16()?,
        initiating_side: c.read_int8()?,
        report_time: c.read_time()?,
        millisec_duration: c.read_uint32()?,
        time_frame: c.read_int8()?,
        session_upstream_volume: c.read_uint32()?,
        session_downstream_volume: c.read_uint32()?,
        subscriber_counter_id: c.read_uint16()?,
        global_counter_id: c.read_uint16()?,
        package_counter_id: c.read_uint16()?,
        ip_protocol: c.read_uint8()?,
        protocol_signature: c.read_int32()?,
        zone_id: c.read_int32()?,
        flavor_id: c.read_int32()?,
        flow_close_mode: c.read_uint8()?,
    })
}
