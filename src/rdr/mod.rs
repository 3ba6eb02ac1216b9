pub mod field;
pub mod header;
pub mod record;
pub mod tag;

pub use field::FieldError;
pub use header::{Framing, Header, HEADER_SIZE, MAX_PACKET_SIZE};
pub use record::{decode, DecodeError, Packet, Record, TransactionRdr, TransactionUsageRdr};

use field::Cursor;
use log::trace;

/// Walk every field of a packet whose header has already been parsed,
/// logging type/size/value the way `dump_raw_rdr_packet` did to stderr.
/// Used only at high verbosity; stops at the first unreadable field.
pub fn trace_raw_fields(buf: &[u8], field_cnt: u8) {
    let mut c = Cursor::new(buf, HEADER_SIZE);
    for n in 1..=field_cnt {
        if c.pos + 5 > buf.len() {
            trace!("field {:02}: truncated", n);
            return;
        }
        let ty = buf[c.pos];
        let size = u32::from_be_bytes([buf[c.pos + 1], buf[c.pos + 2], buf[c.pos + 3], buf[c.pos + 4]]) as usize;
        trace!("field {:02} {}({}), {} bytes", n, tag::field_type_name(ty), ty, size);
        c.pos += 5 + size;
        if c.pos > buf.len() {
            trace!("field {:02}: truncated payload", n);
            return;
        }
    }
}
