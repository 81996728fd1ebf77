//! Multicast NOTIFY receiver.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, trace, warn};

use super::search::SsdpMessageHandler;
use super::socket::{is_same_segment, SsdpSocket};
use super::{SocketState, SsdpMessage, SSDP_PORT};

/// The passive half of discovery: a socket bound to port 1900 and
/// joined to the SSDP group on one interface, receiving the NOTIFY
/// advertisements devices multicast on their own schedule.
pub struct SsdpNotifySocket {
    inner: SsdpSocket,
    prefix_len: u8,
}

impl SsdpNotifySocket {
    /// `prefix_len` is the interface's IPv4 network prefix, used for
    /// the same-segment filter.
    pub fn new(interface_addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            inner: SsdpSocket::new(interface_addr, SSDP_PORT, true),
            prefix_len,
        }
    }

    pub fn state(&self) -> SocketState {
        self.inner.state()
    }

    pub fn interface_addr(&self) -> Ipv4Addr {
        self.inner.interface_addr()
    }

    pub fn open(&mut self) -> io::Result<()> {
        self.inner.open()
    }

    /// Starts the receive thread. Datagrams pass these filters before
    /// `handler` sees them:
    ///
    /// - the peer must be on the interface's own subnet (a host with a
    ///   broken netmask can still multicast but cannot be reached back);
    /// - `M-SEARCH` requests from other control points are dropped;
    /// - non-byebye messages must carry a LOCATION whose host is the
    ///   peer itself.
    pub fn start(&mut self, handler: SsdpMessageHandler) -> io::Result<()> {
        let prefix_len = self.prefix_len;
        self.inner.start(Box::new(move |interface_addr, peer, data| {
            let peer_v4 = match peer.ip() {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(_) => return,
            };
            if !is_same_segment(interface_addr, prefix_len, peer_v4) {
                warn!(
                    peer = %peer,
                    interface = %interface_addr,
                    "dropping NOTIFY from foreign segment"
                );
                return;
            }
            let message = match SsdpMessage::parse(interface_addr, peer, data) {
                Ok(message) => message,
                Err(e) => {
                    trace!(peer = %peer, error = %e, "ignoring unparsable datagram");
                    return;
                }
            };
            // We are a control point; other control points' searches
            // are not for us.
            if message.method().eq_ignore_ascii_case("M-SEARCH") {
                return;
            }
            // Byebye involves no further communication, so it is
            // accepted without a LOCATION check.
            if !message.is_byebye()
                && (!message.has_required_location() || !message.location_matches_peer())
            {
                debug!(peer = %peer, "dropping NOTIFY with missing or foreign LOCATION");
                return;
            }
            handler(message);
        }))
    }

    pub fn stop(&mut self, join: bool) {
        self.inner.stop(join);
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
