//! SSDP: HTTP-over-UDP discovery at 239.255.255.250:1900.
//!
//! A control point needs two sockets per interface:
//!
//! - a *search* socket bound to an ephemeral port, which sends
//!   `M-SEARCH` requests and receives unicast replies
//!   ([`SsdpSearchSocket`]);
//! - a *notify* socket bound to port 1900 and joined to the multicast
//!   group, which receives `NOTIFY` advertisements
//!   ([`SsdpNotifySocket`]).
//!
//! Both are thin façades over [`SsdpSocket`], which owns the socket
//! lifecycle and the receive thread; the façades add parsing and the
//! validity filters a control point applies before trusting a
//! datagram.

mod message;
mod notify;
mod search;
mod socket;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use once_cell::sync::Lazy;

pub use message::{SsdpMessage, SsdpMessageError, SsdpStartLine};
pub use notify::SsdpNotifySocket;
pub use search::{SsdpMessageHandler, SsdpSearchSocket};
pub use socket::{DatagramHandler, SocketState, SsdpSocket};

/// SSDP multicast group address.
pub const SSDP_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Advertisement validity when CACHE-CONTROL is missing or unusable,
/// in seconds.
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// Search target matching every device and service.
pub const ST_ALL: &str = "ssdp:all";

/// Search target matching root devices.
pub const ST_ROOT_DEVICE: &str = "upnp:rootdevice";

pub(crate) static SSDP_TARGET: Lazy<SocketAddr> =
    Lazy::new(|| SocketAddr::V4(SocketAddrV4::new(SSDP_ADDR, SSDP_PORT)));

/// Notification sub-types carried in NTS.
pub mod nts {
    pub const ALIVE: &str = "ssdp:alive";
    pub const BYEBYE: &str = "ssdp:byebye";
    pub const UPDATE: &str = "ssdp:update";
}
