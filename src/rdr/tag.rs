//! RDR tag constants and the field-type enum carried on the wire.
//!
//! Only `TransactionRdr` and `TransactionUsageRdr` decode into a typed
//! record (see `rdr::record`); the rest are kept here purely so `name()`
//! can label a packet in diagnostics the way `rdr_name()` did upstream.

use num_derive::FromPrimitive;

pub const SUBSCRIBER_USAGE_RDR: u32 = 0xf0f0f000;
pub const REALTIME_SUBSCRIBER_USAGE_RDR: u32 = 0xf0f0f002;
pub const PACKAGE_USAGE_RDR: u32 = 0xf0f0f004;
pub const LINK_USAGE_RDR: u32 = 0xf0f0f005;
pub const VIRTUAL_LINKS_USAGE_RDR: u32 = 0xf0f0f006;
pub const TRANSACTION_RDR: u32 = 0xf0f0f010;
pub const TRANSACTION_USAGE_RDR: u32 = 0xf0f0f438;
pub const HTTP_TRANSACTION_USAGE_RDR: u32 = 0xf0f0f43c;
pub const RTSP_TRANSACTION_USAGE_RDR: u32 = 0xf0f0f440;
pub const VOIP_TRANSACTION_USAGE_RDR: u32 = 0xf0f0f46a;
pub const ANONYMIZED_HTTP_TRANSACTION_USAGE_RDR: u32 = 0xf0f0f53c;
pub const SERVICE_BLOCK_RDR: u32 = 0xf0f0f040;
pub const QUOTA_BREACH_RDR: u32 = 0xf0f0f022;
pub const REMAINING_QUOTA_RDR: u32 = 0xf0f0f030;
pub const QUOTA_THRESHOLD_BREACH_RDR: u32 = 0xf0f0f031;
pub const QUOTA_STATE_RESTORE_RDR: u32 = 0xf0f0f032;
pub const RADIUS_RDR: u32 = 0xf0f0f043;
pub const DHCP_RDR: u32 = 0xf0f0f042;
pub const FLOW_START_RDR: u32 = 0xf0f0f016;
pub const FLOW_END_RDR: u32 = 0xf0f0f018;
pub const MEDIA_FLOW_RDR: u32 = 0xf0f0f46c;
pub const FLOW_ONGOING_RDR: u32 = 0xf0f0f017;
pub const ATTACK_START_RDR: u32 = 0xf0f0f019;
pub const ATTACK_END_RDR: u32 = 0xf0f0f01a;
pub const MALICIOUS_TRAFFIC_PERIODIC_RDR: u32 = 0xf0f0f050;
pub const SPAM_RDR: u32 = 0xf0f0f080;
pub const GENERIC_USAGE_RDR: u32 = 0xf0f0f090;

/// Human-readable tag name for diagnostics, mirroring `rdr_name()`.
pub fn name(tag: u32) -> &'static str {
    match tag {
        SUBSCRIBER_USAGE_RDR => "SUBSCRIBER_USAGE_RDR",
        REALTIME_SUBSCRIBER_USAGE_RDR => "REALTIME_SUBSCRIBER_USAGE_RDR",
        PACKAGE_USAGE_RDR => "PACKAGE_USAGE_RDR",
        LINK_USAGE_RDR => "LINK_USAGE_RDR",
        VIRTUAL_LINKS_USAGE_RDR => "VIRTUAL_LINKS_USAGE_RDR",
        TRANSACTION_RDR => "TRANSACTION_RDR",
        TRANSACTION_USAGE_RDR => "TRANSACTION_USAGE_RDR",
        HTTP_TRANSACTION_USAGE_RDR => "HTTP_TRANSACTION_USAGE_RDR",
        RTSP_TRANSACTION_USAGE_RDR => "RTSP_TRANSACTION_USAGE_RDR",
        VOIP_TRANSACTION_USAGE_RDR => "VOIP_TRANSACTION_USAGE_RDR",
        ANONYMIZED_HTTP_TRANSACTION_USAGE_RDR => "ANONYMIZED_HTTP_TRANSACTION_USAGE_RDR",
        SERVICE_BLOCK_RDR => "SERVICE_BLOCK_RDR",
        QUOTA_BREACH_RDR => "QUOTA_BREACH_RDR",
        REMAINING_QUOTA_RDR => "REMAINING_QUOTA_RDR",
        QUOTA_THRESHOLD_BREACH_RDR => "QUOTA_THRESHOLD_BREACH_RDR",
        QUOTA_STATE_RESTORE_RDR => "QUOTA_STATE_RESTORE_RDR",
        RADIUS_RDR => "RADIUS_RDR",
        DHCP_RDR => "DHCP_RDR",
        FLOW_START_RDR => "FLOW_START_RDR",
        FLOW_END_RDR => "FLOW_END_RDR",
        MEDIA_FLOW_RDR => "MEDIA_FLOW_RDR",
        FLOW_ONGOING_RDR => "FLOW_ONGOING_RDR",
        ATTACK_START_RDR => "ATTACK_START_RDR",
        ATTACK_END_RDR => "ATTACK_END_RDR",
        MALICIOUS_TRAFFIC_PERIODIC_RDR => "MALICIOUS_TRAFFIC_PERIODIC_RDR",
        SPAM_RDR => "SPAM_RDR",
        GENERIC_USAGE_RDR => "GENERIC_USAGE_RDR",
        _ => "UNKNOWN",
    }
}

/// Wire type tag carried by every RDR field.
#[derive(Debug, FromPrimitive, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum FieldType {
    Int8 = 11,
    Int16 = 12,
    Int32 = 13,
    Uint8 = 14,
    Uint16 = 15,
    Uint32 = 16,
    Float = 21,
    Boolean = 31,
    String = 41,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Int8 => "INT8",
            FieldType::Int16 => "INT16",
            FieldType::Int32 => "INT32",
            FieldType::Uint8 => "UINT8",
            FieldType::Uint16 => "UINT16",
            FieldType::Uint32 => "UINT32",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::String => "STRING",
        }
    }
}

/// Label an arbitrary wire byte even if it isn't a known `FieldType`.
pub fn field_type_name(raw: u8) -> &'static str {
    use num_traits::FromPrimitive;
    FieldType::from_u8(raw).map(FieldType::name).unwrap_or("UNKNOWN")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_tags() {
        assert_eq!(name(TRANSACTION_RDR), "TRANSACTION_RDR");
        assert_eq!(name(TRANSACTION_USAGE_RDR), "TRANSACTION_USAGE_RDR");
        assert_eq!(name(0xdead_beef), "UNKNOWN");
    }

    #[test]
    fn names_known_field_types() {
        assert_eq!(field_type_name(11), "INT8");
        assert_eq!(field_type_name(41), "STRING");
        assert_eq!(field_type_name(99), "UNKNOWN");
    }
}
