//! The local HTTP server GENA notifications are delivered to.

use std::io::{self, BufReader};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lodeupnp::http::{HttpRequest, HttpResponse};
use lodeupnp::SERVER_TOKEN;
use tracing::{debug, warn};
use xmltree::Element;

/// Per-connection read timeout.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked for each valid NOTIFY: `(sid, seq, properties)`.
/// Returns whether the event was accepted (an unknown SID is answered
/// with 412).
pub(crate) type EventHandler = Arc<dyn Fn(&str, u64, Vec<(String, String)>) -> bool + Send + Sync>;

/// Accepts NOTIFY requests from devices.
///
/// Binds an OS-chosen port on the chosen interface; that port becomes
/// part of every CALLBACK URL handed out in SUBSCRIBE requests. Each
/// connection carries one request and is answered and closed by a
/// short-lived worker thread.
pub(crate) struct EventReceiver {
    bind_addr: Ipv4Addr,
    listener: Option<TcpListener>,
    port: u16,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl EventReceiver {
    pub fn new(bind_addr: Ipv4Addr) -> Self {
        Self {
            bind_addr,
            listener: None,
            port: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
            acceptor: None,
        }
    }

    /// Binds the listening socket.
    pub fn open(&mut self) -> io::Result<()> {
        let listener = TcpListener::bind(SocketAddrV4::new(self.bind_addr, 0))?;
        self.port = listener.local_addr()?.port();
        debug!(addr = %self.bind_addr, port = self.port, "event receiver bound");
        self.listener = Some(listener);
        Ok(())
    }

    /// Port of the bound socket, 0 before [`open`](Self::open).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Starts the accept loop.
    pub fn start(&mut self, handler: EventHandler) -> io::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "receiver not open"))?;
        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.shutdown);
        self.acceptor = Some(
            thread::Builder::new()
                .name("event-receiver".into())
                .spawn(move || run_acceptor(listener, shutdown, handler))?,
        );
        Ok(())
    }

    /// Stops the accept loop and releases the socket. A throwaway
    /// local connection unblocks `accept`.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.acceptor.take() {
            let wake_addr = if self.bind_addr.is_unspecified() {
                Ipv4Addr::LOCALHOST
            } else {
                self.bind_addr
            };
            let _ = TcpStream::connect(SocketAddrV4::new(wake_addr, self.port));
            let _ = handle.join();
        }
        self.listener = None;
        self.port = 0;
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_acceptor(listener: TcpListener, shutdown: Arc<AtomicBool>, handler: EventHandler) {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                let handler = Arc::clone(&handler);
                let spawned = thread::Builder::new()
                    .name("event-receiver-conn".into())
                    .spawn(move || handle_connection(stream, handler));
                if let Err(e) = spawned {
                    warn!(error = %e, "cannot spawn event connection worker");
                }
            }
            Err(e) => {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                warn!(error = %e, "event receiver accept failed");
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, handler: EventHandler) {
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        warn!(error = %e, "cannot set read timeout on notify connection");
    }
    let mut reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            warn!(error = %e, "cannot clone notify connection");
            return;
        }
    };

    let request = match HttpRequest::read_from(&mut reader) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "unreadable notify request");
            let _ = write_status(&mut stream, 400, "Bad Request");
            return;
        }
    };

    let status = dispatch(&request, &handler);
    let _ = write_status(&mut stream, status.0, status.1);
}

fn dispatch(request: &HttpRequest, handler: &EventHandler) -> (u16, &'static str) {
    if !request.method().eq_ignore_ascii_case("NOTIFY") {
        return (405, "Method Not Allowed");
    }
    let nt = request.header("NT").unwrap_or("");
    let nts = request.header("NTS").unwrap_or("");
    if nt.is_empty() || nts.is_empty() {
        return (400, "Bad Request");
    }
    let sid = request.header("SID").unwrap_or("");
    if sid.is_empty() || nt != "upnp:event" || nts != "upnp:propchange" {
        return (412, "Precondition Failed");
    }
    let seq = request
        .header("SEQ")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0u64);
    let properties = parse_property_pairs(request.body());
    if handler(sid, seq, properties) {
        (200, "OK")
    } else {
        (412, "Precondition Failed")
    }
}

/// Parses an `<e:propertyset>` body into ordered (name, value) pairs.
///
/// Namespaces are ignored beyond local names; each `<e:property>`
/// wraps one `<Name>value</Name>` element.
fn parse_property_pairs(body: &[u8]) -> Vec<(String, String)> {
    let Ok(root) = Element::parse(BufReader::new(body)) else {
        return Vec::new();
    };
    if root.name != "propertyset" {
        return Vec::new();
    }
    let mut pairs = Vec::new();
    for property in root.children.iter().filter_map(|n| n.as_element()) {
        if property.name != "property" {
            continue;
        }
        for child in property.children.iter().filter_map(|n| n.as_element()) {
            let value = child
                .get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default();
            pairs.push((child.name.clone(), value));
        }
    }
    pairs
}

fn write_status(stream: &mut TcpStream, status: u16, reason: &str) -> io::Result<()> {
    let mut response = HttpResponse::new(status, reason);
    response.set_header("Server", SERVER_TOKEN);
    response.set_header("Connection", "close");
    response.set_body(Vec::new(), true);
    response.write_to(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::Mutex;

    const PROPERTYSET: &str = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><Variable>42</Variable></e:property></e:propertyset>"#;

    fn notify_request(headers: &str, body: &str) -> String {
        format!(
            "NOTIFY /uuid:dev/urn:id HTTP/1.1\r\nHost: 127.0.0.1\r\n{}Content-Length: {}\r\n\r\n{}",
            headers,
            body.len(),
            body
        )
    }

    fn exchange(receiver_port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", receiver_port)).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    struct Capture {
        events: Arc<Mutex<Vec<(String, u64, Vec<(String, String)>)>>>,
        handler: EventHandler,
    }

    fn capturing_handler(accept: bool) -> Capture {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let handler: EventHandler = Arc::new(move |sid, seq, properties| {
            captured
                .lock()
                .unwrap()
                .push((sid.to_string(), seq, properties));
            accept
        });
        Capture { events, handler }
    }

    #[test]
    fn dispatches_property_pairs_in_order() {
        let mut receiver = EventReceiver::new(Ipv4Addr::LOCALHOST);
        receiver.open().unwrap();
        let port = receiver.port();
        let capture = capturing_handler(true);
        receiver.start(capture.handler.clone()).unwrap();

        let request = notify_request(
            "NT: upnp:event\r\nNTS: upnp:propchange\r\nSID: uuid:s1\r\nSEQ: 7\r\n",
            PROPERTYSET,
        );
        let response = exchange(port, &request);
        assert!(response.starts_with("HTTP/1.1 200 OK"), "got {:?}", response);

        let events = capture.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let (sid, seq, properties) = &events[0];
        assert_eq!(sid, "uuid:s1");
        assert_eq!(*seq, 7);
        assert_eq!(
            properties,
            &vec![("Variable".to_string(), "42".to_string())]
        );
        drop(events);
        receiver.close();
    }

    #[test]
    fn missing_nt_is_bad_request() {
        let mut receiver = EventReceiver::new(Ipv4Addr::LOCALHOST);
        receiver.open().unwrap();
        let port = receiver.port();
        let capture = capturing_handler(true);
        receiver.start(capture.handler.clone()).unwrap();

        let request = notify_request("NTS: upnp:propchange\r\nSID: uuid:s1\r\n", PROPERTYSET);
        let response = exchange(port, &request);
        assert!(response.starts_with("HTTP/1.1 400"), "got {:?}", response);
        assert!(capture.events.lock().unwrap().is_empty());
        receiver.close();
    }

    #[test]
    fn missing_sid_is_precondition_failed() {
        let mut receiver = EventReceiver::new(Ipv4Addr::LOCALHOST);
        receiver.open().unwrap();
        let port = receiver.port();
        let capture = capturing_handler(true);
        receiver.start(capture.handler.clone()).unwrap();

        let request = notify_request("NT: upnp:event\r\nNTS: upnp:propchange\r\n", PROPERTYSET);
        let response = exchange(port, &request);
        assert!(response.starts_with("HTTP/1.1 412"), "got {:?}", response);
        receiver.close();
    }

    #[test]
    fn rejected_event_is_precondition_failed() {
        let mut receiver = EventReceiver::new(Ipv4Addr::LOCALHOST);
        receiver.open().unwrap();
        let port = receiver.port();
        let capture = capturing_handler(false);
        receiver.start(capture.handler.clone()).unwrap();

        let request = notify_request(
            "NT: upnp:event\r\nNTS: upnp:propchange\r\nSID: uuid:unknown\r\nSEQ: 0\r\n",
            PROPERTYSET,
        );
        let response = exchange(port, &request);
        assert!(response.starts_with("HTTP/1.1 412"), "got {:?}", response);
        receiver.close();
    }

    #[test]
    fn multiple_properties_keep_document_order() {
        let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><First>1</First></e:property><e:property><Second>2</Second></e:property></e:propertyset>"#;
        let pairs = parse_property_pairs(body.as_bytes());
        assert_eq!(
            pairs,
            vec![
                ("First".to_string(), "1".to_string()),
                ("Second".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn non_propertyset_body_yields_nothing() {
        assert!(parse_property_pairs(b"<not-an-event/>").is_empty());
        assert!(parse_property_pairs(b"garbage").is_empty());
    }
}
