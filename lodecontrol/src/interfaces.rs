//! Network interface selection.

use std::net::Ipv4Addr;

use tracing::debug;

/// One usable IPv4 interface: the address sockets bind to and the
/// prefix length the same-segment filter masks with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

/// Enumerates non-loopback IPv4 interfaces.
pub fn usable_interfaces() -> std::io::Result<Vec<NetworkInterface>> {
    let mut interfaces = Vec::new();
    for iface in get_if_addrs::get_if_addrs()? {
        if let get_if_addrs::IfAddr::V4(v4) = &iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            let prefix_len = prefix_from_netmask(v4.netmask);
            debug!(
                name = iface.name.as_str(),
                addr = %v4.ip,
                prefix = prefix_len,
                "usable interface"
            );
            interfaces.push(NetworkInterface {
                name: iface.name.clone(),
                addr: v4.ip,
                prefix_len,
            });
        }
    }
    Ok(interfaces)
}

fn prefix_from_netmask(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_lengths() {
        assert_eq!(prefix_from_netmask(Ipv4Addr::new(255, 255, 255, 0)), 24);
        assert_eq!(prefix_from_netmask(Ipv4Addr::new(255, 255, 0, 0)), 16);
        assert_eq!(prefix_from_netmask(Ipv4Addr::new(255, 128, 0, 0)), 9);
        assert_eq!(prefix_from_netmask(Ipv4Addr::new(0, 0, 0, 0)), 0);
    }
}
