//! Exclusion list for transaction-usage records, matched against both the
//! client and server address. Ported from `ip_filter_add_networks()` /
//! `is_ip_filtered()`, but built on `ipnetwork::Ipv4Network` for CIDR
//! parsing instead of a hand-rolled `inet_net_pton` equivalent.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const SRC_MATCH: u8 = 0x01;
pub const DST_MATCH: u8 = 0x02;

#[derive(Debug, Default, Clone)]
pub struct IpFilter {
    networks: Vec<Ipv4Network>,
}

impl IpFilter {
    pub fn new() -> Self {
        IpFilter { networks: Vec::new() }
    }

    /// Parse a comma-separated `ip[/len]` list, as passed to `-F`, and
    /// append every entry. A bare address is treated as a /32.
    pub fn add_networks(&mut self, spec: &str) -> Result<usize, String> {
        if spec.is_empty() {
            return Err("IP filter not defined".to_string());
        }

        let mut added = 0;
        for token in spec.split(',') {
            let net = parse_token(token)?;
            self.networks.push(net);
            added += 1;
        }

        if added == 0 {
            return Err(format!("Empty IP filter `{}`", spec));
        }
        Ok(added)
    }

    /// Bitmask of which side(s) matched an excluded network: `SRC_MATCH`,
    /// `DST_MATCH`, both, or neither.
    pub fn matches(&self, src: Ipv4Addr, dst: Ipv4Addr) -> u8 {
        let mut res = 0u8;
        for net in &self.networks {
            if net.contains(src) {
                res |= SRC_MATCH;
            }
            if net.contains(dst) {
                res |= DST_MATCH;
            }
        }
        res
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl std::fmt::Display for IpFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let parts: Vec<String> = self.networks.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

fn parse_token(token: &str) -> Result<Ipv4Network, String> {
    if let Some((addr, len)) = token.split_once('/') {
        let addr = Ipv4Addr::from_str(addr).map_err(|_| format!("Wrong IP/network {}", token))?;
        let prefix: u8 = len.parse().map_err(|_| format!("Wrong IP/network {}", token))?;
        Ipv4Network::new(addr, prefix).map_err(|_| format!("Wrong IP/network {}", token))
    } else {
        let addr = Ipv4Addr::from_str(token).map_err(|_| format!("Wrong IP/network {}", token))?;
        Ok(Ipv4Network::new(addr, 32).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_src_and_dst_independently() {
        let mut f = IpFilter::new();
        f.add_networks("10.0.0.0/8").unwrap();

        let src = Ipv4Addr::new(10, 1, 2, 3);
        let dst = Ipv4Addr::new(192, 168, 1, 1);
        assert_eq!(f.matches(src, dst), SRC_MATCH);
        assert_eq!(f.matches(dst, src), DST_MATCH);
    }

    #[test]
    fn bare_address_is_slash_32() {
        let mut f = IpFilter::new();
        f.add_networks("10.0.0.1").unwrap();
        assert_eq!(f.matches(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(0, 0, 0, 0)), SRC_MATCH);
        assert_eq!(f.matches(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(0, 0, 0, 0)), 0);
    }

    #[test]
    fn comma_separated_list_adds_all_entries() {
        let mut f = IpFilter::new();
        let n = f.add_networks("10.0.0.0/8,192.168.0.0/16").unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn rejects_garbage_token() {
        let mut f = IpFilter::new();
        assert!(f.add_networks("not-an-ip").is_err());
    }

    #[test]
    fn rejects_empty_spec() {
        let mut f = IpFilter::new();
        assert!(f.add_networks("").is_err());
    }
}
