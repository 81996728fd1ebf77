//! M-SEARCH sender and unicast reply receiver.

use std::io;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::SERVER_TOKEN;

use super::socket::SsdpSocket;
use super::{SocketState, SsdpMessage, SSDP_ADDR, SSDP_PORT, ST_ALL};

/// Callback receiving validated SSDP messages.
pub type SsdpMessageHandler = Box<dyn Fn(SsdpMessage) + Send + 'static>;

/// The active half of discovery: an ephemeral-port socket that sends
/// `M-SEARCH` to the multicast group and receives the unicast replies
/// devices address back to it.
pub struct SsdpSearchSocket {
    inner: SsdpSocket,
}

impl SsdpSearchSocket {
    pub fn new(interface_addr: Ipv4Addr) -> Self {
        Self {
            inner: SsdpSocket::new(interface_addr, 0, false),
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

    /// Starts the receive thread. Replies are parsed and validated
    /// before `handler` sees them: a reply must carry a LOCATION whose
    /// host is the peer that sent it.
    pub fn start(&mut self, handler: SsdpMessageHandler) -> io::Result<()> {
        self.inner.start(Box::new(move |interface_addr, peer, data| {
            let message = match SsdpMessage::parse(interface_addr, peer, data) {
                Ok(message) => message,
                Err(e) => {
                    trace!(peer = %peer, error = %e, "ignoring unparsable search reply");
                    return;
                }
            };
            if !message.has_required_location() || !message.location_matches_peer() {
                debug!(peer = %peer, "dropping search reply with missing or foreign LOCATION");
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

    /// Sends an `M-SEARCH` for `st` (`ssdp:all` when `None`).
    pub fn search(&self, st: Option<&str>) -> io::Result<()> {
        let message = build_search_message(st.unwrap_or(ST_ALL));
        debug!(st, interface = %self.inner.interface_addr(), "sending M-SEARCH");
        self.inner.send(message.as_bytes())
    }
}

fn build_search_message(st: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 1\r\n\
         ST: {}\r\n\
         USER-AGENT: {}\r\n\
         \r\n",
        SSDP_ADDR, SSDP_PORT, st, SERVER_TOKEN
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msearch_packet_has_required_headers() {
        let message = build_search_message("upnp:rootdevice");
        assert!(message.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(message.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(message.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(message.contains("MX: 1\r\n"));
        assert!(message.contains("ST: upnp:rootdevice\r\n"));
        assert!(message.ends_with("\r\n\r\n"));
    }

    #[test]
    fn default_target_is_ssdp_all() {
        assert!(build_search_message(ST_ALL).contains("ST: ssdp:all\r\n"));
    }
}
