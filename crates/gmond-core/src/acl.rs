//! IP-subnet allow-list matching.
//!
//! A small self-contained matcher over `std::net::IpAddr` rather than a
//! dependency on a CIDR crate. An absent ACL means "allow all"; a present
//! ACL that fails to compile at startup is fatal.

use std::net::IpAddr;

use crate::error::StartupError;

/// A compiled IP-subnet predicate: `allow_ip` + an optional `allow_mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpSubnet {
    network: IpAddr,
    prefix_len: u8,
}

impl IpSubnet {
    /// Compile `allow_ip`/`allow_mask` into a subnet predicate.
    ///
    /// `allow_mask` may be a dotted-quad netmask (`255.255.255.0`) or a bare
    /// prefix length (`24`); absent, it defaults to a host match (/32 or
    /// /128). Fails if `allow_ip` doesn't parse or the mask is malformed —
    /// both are startup-fatal.
    pub fn compile(allow_ip: &str, allow_mask: Option<&str>) -> Result<Self, StartupError> {
        let network: IpAddr = allow_ip
            .parse()
            .map_err(|_| StartupError::BadAcl(format!("invalid allow_ip {allow_ip:?}")))?;
        let max_len = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match allow_mask {
            None => max_len,
            Some(mask) => parse_mask(mask, max_len)
                .ok_or_else(|| StartupError::BadAcl(format!("invalid allow_mask {mask:?}")))?,
        };
        Ok(Self { network, prefix_len })
    }

    /// Test whether `addr` falls within this subnet.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(probe)) => {
                let mask = mask_u32(self.prefix_len);
                (u32::from(net) & mask) == (u32::from(probe) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(probe)) => {
                let mask = mask_u128(self.prefix_len);
                (u128::from(net) & mask) == (u128::from(probe) & mask)
            }
            _ => false,
        }
    }
}

fn parse_mask(mask: &str, max_len: u8) -> Option<u8> {
    if let Ok(prefix) = mask.parse::<u8>() {
        if prefix <= max_len {
            return Some(prefix);
        }
        return None;
    }
    // Dotted-quad netmask, e.g. "255.255.255.0".
    let addr: IpAddr = mask.parse().ok()?;
    match addr {
        IpAddr::V4(v4) => Some(u32::from(v4).count_ones() as u8),
        IpAddr::V6(v6) => Some(u128::from(v6).count_ones() as u8),
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

fn mask_u128(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_host_by_default() {
        let acl = IpSubnet::compile("10.0.0.7", None).unwrap();
        assert!(acl.contains("10.0.0.7".parse().unwrap()));
        assert!(!acl.contains("10.0.0.8".parse().unwrap()));
    }

    #[test]
    fn matches_prefix_length_mask() {
        let acl = IpSubnet::compile("10.0.0.0", Some("24")).unwrap();
        assert!(acl.contains("10.0.0.7".parse().unwrap()));
        assert!(acl.contains("10.0.0.254".parse().unwrap()));
        assert!(!acl.contains("10.0.1.1".parse().unwrap()));
    }

    #[test]
    fn matches_dotted_quad_mask() {
        let acl = IpSubnet::compile("10.0.0.0", Some("255.255.255.0")).unwrap();
        assert!(acl.contains("10.0.0.7".parse().unwrap()));
        assert!(!acl.contains("10.0.1.1".parse().unwrap()));
    }

    #[test]
    fn rejects_unparseable_ip() {
        assert!(IpSubnet::compile("not-an-ip", None).is_err());
    }

    #[test]
    fn rejects_bad_mask() {
        assert!(IpSubnet::compile("10.0.0.0", Some("999")).is_err());
    }

    #[test]
    fn v4_v6_never_cross_match() {
        let acl = IpSubnet::compile("10.0.0.0", Some("8")).unwrap();
        assert!(!acl.contains("::1".parse().unwrap()));
    }
}
