//! Shared UDP transport for the two SSDP socket flavors.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use super::{SSDP_ADDR, SSDP_TARGET};

/// Datagram buffer size. SSDP messages fit a single non-fragmented
/// Ethernet frame.
const RECV_BUFFER_SIZE: usize = 1500;

/// Receive poll interval; the shutdown flag is observed at this
/// granularity.
const RECV_POLL: Duration = Duration::from_secs(1);

/// Lifecycle of an [`SsdpSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Open,
    Running,
    Stopping,
}

/// Raw datagram callback: interface address, source peer, payload.
pub type DatagramHandler = Box<dyn Fn(Ipv4Addr, SocketAddr, &[u8]) + Send + 'static>;

/// One UDP socket bound for SSDP use on a single interface.
///
/// The two behaviors a control point needs differ only in
/// configuration: the search socket binds an ephemeral port and never
/// joins the group; the notify socket binds port 1900 with
/// SO_REUSEADDR and joins the multicast group on its interface. Both
/// pin outgoing multicast to the interface and use TTL 4.
///
/// State machine: closed → open → running → stopping → closed.
/// `open` creates and configures the socket, `start` spawns the
/// receive thread, `stop` signals it (optionally joining), `close`
/// releases the socket. The receive thread polls with a short read
/// timeout so a stop request is observed promptly; errors after a
/// stop request are swallowed.
pub struct SsdpSocket {
    interface_addr: Ipv4Addr,
    bind_port: u16,
    join_group: bool,
    socket: Option<Arc<UdpSocket>>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
    state: SocketState,
}

impl SsdpSocket {
    /// `bind_port` 0 means an ephemeral unicast-reply socket;
    /// `join_group` makes this a multicast receiver.
    pub fn new(interface_addr: Ipv4Addr, bind_port: u16, join_group: bool) -> Self {
        Self {
            interface_addr,
            bind_port,
            join_group,
            socket: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            receiver: None,
            state: SocketState::Closed,
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn interface_addr(&self) -> Ipv4Addr {
        self.interface_addr
    }

    /// Creates and configures the socket.
    pub fn open(&mut self) -> io::Result<()> {
        if self.socket.is_some() {
            self.close();
        }
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        if self.join_group {
            // Port 1900 is shared with every other SSDP participant on
            // the host.
            raw.set_reuse_address(true)?;
        }
        let bind_addr: SocketAddr = if self.join_group {
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.bind_port).into()
        } else {
            SocketAddrV4::new(self.interface_addr, self.bind_port).into()
        };
        raw.bind(&bind_addr.into())?;
        // Outgoing multicast is pinned to the chosen interface; std's
        // UdpSocket cannot express this, so it happens here.
        raw.set_multicast_if_v4(&self.interface_addr)?;
        raw.set_multicast_ttl_v4(4)?;
        raw.set_read_timeout(Some(RECV_POLL))?;
        if self.join_group {
            raw.join_multicast_v4(&SSDP_ADDR, &self.interface_addr)?;
        }

        let socket: UdpSocket = raw.into();
        debug!(
            interface = %self.interface_addr,
            port = self.bind_port,
            multicast = self.join_group,
            "SSDP socket open"
        );
        self.socket = Some(Arc::new(socket));
        self.state = SocketState::Open;
        Ok(())
    }

    /// Spawns the receive thread delivering raw datagrams to `handler`.
    pub fn start(&mut self, handler: DatagramHandler) -> io::Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not open"))?
            .clone();
        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.shutdown);
        let interface_addr = self.interface_addr;
        let name = format!("ssdp-recv-{}", interface_addr);
        let handle = thread::Builder::new().name(name).spawn(move || {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            while !shutdown.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf) {
                    Ok((n, peer)) => {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        handler(interface_addr, peer, &buf[..n]);
                    }
                    Err(e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        // A socket torn down under us is the normal
                        // shutdown path; anything else ends the loop
                        // loudly.
                        if !shutdown.load(Ordering::SeqCst) {
                            warn!(error = %e, "SSDP receive failed, stopping receiver");
                        }
                        break;
                    }
                }
            }
        })?;
        self.receiver = Some(handle);
        self.state = SocketState::Running;
        Ok(())
    }

    /// Signals the receive thread to exit, joining it when `join` is
    /// set. The thread observes the flag within the poll interval.
    pub fn stop(&mut self, join: bool) {
        if self.receiver.is_none() {
            return;
        }
        self.state = SocketState::Stopping;
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.receiver.take() {
            if join {
                let _ = handle.join();
            }
        }
        self.state = SocketState::Open;
    }

    /// Releases the socket, leaving the multicast group first.
    pub fn close(&mut self) {
        self.stop(false);
        if let Some(socket) = self.socket.take() {
            if self.join_group {
                let _ = socket.leave_multicast_v4(&SSDP_ADDR, &self.interface_addr);
            }
        }
        self.state = SocketState::Closed;
    }

    /// Sends `data` to the SSDP multicast group through this socket.
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        match &self.socket {
            Some(socket) => socket.send_to(data, *SSDP_TARGET).map(|_| ()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "socket not open")),
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }
}

impl Drop for SsdpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Prefix-masked byte comparison of two IPv4 addresses.
///
/// Hosts with a misconfigured netmask can still emit multicast but are
/// unreachable over unicast, so their advertisements are useless to a
/// control point.
pub(crate) fn is_same_segment(interface_addr: Ipv4Addr, prefix_len: u8, other: Ipv4Addr) -> bool {
    let a = interface_addr.octets();
    let b = other.octets();
    let bytes = (prefix_len / 8) as usize;
    let bits = prefix_len % 8;
    if a[..bytes] != b[..bytes] {
        return false;
    }
    if bits != 0 {
        let mask = 0xffu8 << (8 - bits);
        return (a[bytes] & mask) == (b[bytes] & mask);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_segment_prefix_24() {
        let iface = Ipv4Addr::new(192, 0, 2, 3);
        assert!(is_same_segment(iface, 24, Ipv4Addr::new(192, 0, 2, 10)));
        assert!(!is_same_segment(iface, 24, Ipv4Addr::new(198, 51, 100, 5)));
        assert!(!is_same_segment(iface, 24, Ipv4Addr::new(192, 0, 3, 10)));
    }

    #[test]
    fn same_segment_odd_prefix() {
        let iface = Ipv4Addr::new(10, 0, 0, 1);
        // /9 keeps the top bit of the second octet.
        assert!(is_same_segment(iface, 9, Ipv4Addr::new(10, 127, 0, 1)));
        assert!(!is_same_segment(iface, 9, Ipv4Addr::new(10, 128, 0, 1)));
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let iface = Ipv4Addr::new(192, 0, 2, 3);
        assert!(is_same_segment(iface, 0, Ipv4Addr::new(203, 0, 113, 9)));
    }
}
