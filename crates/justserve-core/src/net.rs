//! Local address resolution.
//!
//! Served URLs and discovery frames advertise the machine's LAN address, so
//! a receiving peer can connect without knowing the host name.

use std::net::{IpAddr, Ipv4Addr};

/// Host used when no usable IPv4 interface exists.
pub const FALLBACK_HOST: &str = "localhost";

/// Returns the address other machines on the LAN should use to reach us.
///
/// Private `192.168.x.x` and `10.x.x.x` addresses win over anything else,
/// then the first non-loopback IPv4 address, then [`FALLBACK_HOST`].
pub fn preferred_local_ip() -> String {
    pick_preferred(&interface_ipv4s()).map_or_else(|| FALLBACK_HOST.to_string(), |ip| ip.to_string())
}

/// All non-loopback IPv4 addresses, in enumeration order.
pub fn local_ips() -> Vec<String> {
    interface_ipv4s()
        .into_iter()
        .filter(|ip| !ip.is_loopback())
        .map(|ip| ip.to_string())
        .collect()
}

fn interface_ipv4s() -> Vec<Ipv4Addr> {
    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        }
    }
}

fn pick_preferred(candidates: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    let usable = || candidates.iter().copied().filter(|ip| !ip.is_loopback());

    usable()
        .find(|ip| {
            let [a, b, ..] = ip.octets();
            (a == 192 && b == 168) || a == 10
        })
        .or_else(|| usable().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_private_lan_ranges() {
        let ips = [
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(172, 17, 0, 1),
            Ipv4Addr::new(192, 168, 1, 20),
        ];
        assert_eq!(pick_preferred(&ips), Some(Ipv4Addr::new(192, 168, 1, 20)));

        let ips = [Ipv4Addr::new(100, 64, 0, 3), Ipv4Addr::new(10, 0, 0, 7)];
        assert_eq!(pick_preferred(&ips), Some(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[test]
    fn test_falls_back_to_first_non_loopback() {
        let ips = [
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(172, 20, 0, 5),
            Ipv4Addr::new(100, 64, 0, 3),
        ];
        assert_eq!(pick_preferred(&ips), Some(Ipv4Addr::new(172, 20, 0, 5)));
    }

    #[test]
    fn test_loopback_only_yields_none() {
        assert_eq!(pick_preferred(&[Ipv4Addr::LOCALHOST]), None);
        assert_eq!(pick_preferred(&[]), None);
    }

    #[test]
    fn test_local_ips_exclude_loopback() {
        assert!(local_ips().iter().all(|ip| !ip.starts_with("127.")));
    }

    #[test]
    fn test_preferred_ip_is_never_empty() {
        assert!(!preferred_local_ip().is_empty());
    }
}
