//! Typed view over one SSDP datagram.

use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use url::Url;

use crate::http::{HttpError, HttpHeaders, HttpRequest, HttpResponse};

use super::{nts, DEFAULT_MAX_AGE};

#[derive(Debug, Error)]
pub enum SsdpMessageError {
    #[error("not an HTTP-framed datagram: {0}")]
    Malformed(#[from] HttpError),
}

/// The start line of an SSDP datagram: either a request (NOTIFY,
/// M-SEARCH) or an HTTP response to a search.
#[derive(Debug, Clone)]
pub enum SsdpStartLine {
    Request { method: String, uri: String },
    Response { status: u16 },
}

/// One received SSDP datagram, parsed.
///
/// Created when a datagram arrives and immutable afterwards. Besides
/// the raw start line and headers it exposes the derived fields the
/// control point works with: the `uuid`/`type` split of USN, the
/// `max-age` from CACHE-CONTROL, LOCATION and NTS.
#[derive(Debug, Clone)]
pub struct SsdpMessage {
    start_line: SsdpStartLine,
    headers: HttpHeaders,
    local_addr: Ipv4Addr,
    peer: SocketAddr,
    uuid: String,
    usn_type: String,
}

impl SsdpMessage {
    /// Parses a datagram received on the interface `local_addr` from
    /// `peer`.
    pub fn parse(
        local_addr: Ipv4Addr,
        peer: SocketAddr,
        data: &[u8],
    ) -> Result<Self, SsdpMessageError> {
        let mut cursor = Cursor::new(data);
        let (start_line, headers) = if data.starts_with(b"HTTP/") {
            let response = HttpResponse::read_from(&mut cursor)?;
            (
                SsdpStartLine::Response {
                    status: response.status(),
                },
                response.headers().clone(),
            )
        } else {
            let request = HttpRequest::read_from(&mut cursor)?;
            (
                SsdpStartLine::Request {
                    method: request.method().to_string(),
                    uri: request.uri().to_string(),
                },
                request.headers().clone(),
            )
        };
        let (uuid, usn_type) = split_usn(headers.get("USN").unwrap_or(""));
        Ok(Self {
            start_line,
            headers,
            local_addr,
            peer,
            uuid,
            usn_type,
        })
    }

    pub fn start_line(&self) -> &SsdpStartLine {
        &self.start_line
    }

    /// Request method, empty for search responses.
    pub fn method(&self) -> &str {
        match &self.start_line {
            SsdpStartLine::Request { method, .. } => method,
            SsdpStartLine::Response { .. } => "",
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Address of the interface the datagram arrived on.
    pub fn local_address(&self) -> Ipv4Addr {
        self.local_addr
    }

    /// Source peer of the datagram.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The `uuid:...` part of USN.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The type suffix of USN (after `::`), empty when USN is bare.
    pub fn usn_type(&self) -> &str {
        &self.usn_type
    }

    /// NTS value for NOTIFY messages.
    pub fn nts(&self) -> Option<&str> {
        self.headers.get("NTS")
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.nts(), Some(v) if v.eq_ignore_ascii_case(nts::ALIVE))
    }

    pub fn is_byebye(&self) -> bool {
        matches!(self.nts(), Some(v) if v.eq_ignore_ascii_case(nts::BYEBYE))
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("LOCATION")
    }

    /// SERVER header of advertisements, USER-AGENT is not mirrored.
    pub fn server(&self) -> Option<&str> {
        self.headers.get("SERVER")
    }

    /// `max-age` from CACHE-CONTROL, defaulting when absent or
    /// unparsable.
    pub fn max_age(&self) -> u32 {
        parse_max_age(self.headers.get("CACHE-CONTROL"))
    }

    /// A message is usable by the control point only when it carries a
    /// LOCATION or announces a departure.
    pub fn has_required_location(&self) -> bool {
        self.location().is_some() || self.is_byebye()
    }

    /// True when LOCATION parses as a URL whose host is the source
    /// peer. Advertisements pointing at another host are treated as
    /// spoofed and dropped by the receivers.
    pub fn location_matches_peer(&self) -> bool {
        let Some(location) = self.location() else {
            return false;
        };
        let Ok(url) = Url::parse(location) else {
            return false;
        };
        match url.host_str() {
            Some(host) => host == self.peer.ip().to_string(),
            None => false,
        }
    }
}

/// Splits a USN into its uuid and type parts. `uuid:x::urn:t` yields
/// `("uuid:x", "urn:t")`; a bare UDN has an empty type.
fn split_usn(usn: &str) -> (String, String) {
    let usn = usn.trim();
    if !usn.to_ascii_lowercase().starts_with("uuid:") {
        return (String::new(), String::new());
    }
    match usn.split_once("::") {
        Some((uuid, usn_type)) => (uuid.to_string(), usn_type.to_string()),
        None => (usn.to_string(), String::new()),
    }
}

fn parse_max_age(value: Option<&str>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
    }
    DEFAULT_MAX_AGE
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFACE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 3);

    fn peer() -> SocketAddr {
        "192.0.2.10:1900".parse().unwrap()
    }

    fn alive_datagram() -> &'static [u8] {
        b"NOTIFY * HTTP/1.1\r\n\
          HOST: 239.255.255.250:1900\r\n\
          CACHE-CONTROL: max-age=1800\r\n\
          LOCATION: http://192.0.2.10:2869/desc.xml\r\n\
          NT: upnp:rootdevice\r\n\
          NTS: ssdp:alive\r\n\
          SERVER: Foo/1.0\r\n\
          USN: uuid:11111111-1111-1111-1111-111111111111::upnp:rootdevice\r\n\
          \r\n"
    }

    #[test]
    fn parses_notify_alive() {
        let msg = SsdpMessage::parse(IFACE, peer(), alive_datagram()).unwrap();
        assert_eq!(msg.method(), "NOTIFY");
        assert!(msg.is_alive());
        assert!(!msg.is_byebye());
        assert_eq!(msg.uuid(), "uuid:11111111-1111-1111-1111-111111111111");
        assert_eq!(msg.usn_type(), "upnp:rootdevice");
        assert_eq!(msg.location(), Some("http://192.0.2.10:2869/desc.xml"));
        assert_eq!(msg.max_age(), 1800);
        assert_eq!(msg.server(), Some("Foo/1.0"));
        assert!(msg.has_required_location());
        assert!(msg.location_matches_peer());
    }

    #[test]
    fn parses_search_response() {
        let raw = b"HTTP/1.1 200 OK\r\n\
                    CACHE-CONTROL: max-age=120\r\n\
                    LOCATION: http://192.0.2.10:2869/desc.xml\r\n\
                    ST: upnp:rootdevice\r\n\
                    USN: uuid:22222222-2222-2222-2222-222222222222\r\n\
                    \r\n";
        let msg = SsdpMessage::parse(IFACE, peer(), raw).unwrap();
        assert!(matches!(
            msg.start_line(),
            SsdpStartLine::Response { status: 200 }
        ));
        assert_eq!(msg.uuid(), "uuid:22222222-2222-2222-2222-222222222222");
        assert_eq!(msg.usn_type(), "");
        assert_eq!(msg.max_age(), 120);
    }

    #[test]
    fn byebye_without_location_is_acceptable() {
        let raw = b"NOTIFY * HTTP/1.1\r\n\
                    HOST: 239.255.255.250:1900\r\n\
                    NT: upnp:rootdevice\r\n\
                    NTS: ssdp:byebye\r\n\
                    USN: uuid:11111111-1111-1111-1111-111111111111::upnp:rootdevice\r\n\
                    \r\n";
        let msg = SsdpMessage::parse(IFACE, peer(), raw).unwrap();
        assert!(msg.is_byebye());
        assert!(msg.has_required_location());
        assert!(!msg.location_matches_peer());
    }

    #[test]
    fn alive_without_location_is_rejected_by_invariant() {
        let raw = b"NOTIFY * HTTP/1.1\r\n\
                    NT: upnp:rootdevice\r\n\
                    NTS: ssdp:alive\r\n\
                    USN: uuid:11111111-1111-1111-1111-111111111111\r\n\
                    \r\n";
        let msg = SsdpMessage::parse(IFACE, peer(), raw).unwrap();
        assert!(!msg.has_required_location());
    }

    #[test]
    fn spoofed_location_host_is_detected() {
        let raw = b"NOTIFY * HTTP/1.1\r\n\
                    LOCATION: http://198.51.100.7:2869/desc.xml\r\n\
                    NT: upnp:rootdevice\r\n\
                    NTS: ssdp:alive\r\n\
                    USN: uuid:11111111-1111-1111-1111-111111111111\r\n\
                    \r\n";
        let msg = SsdpMessage::parse(IFACE, peer(), raw).unwrap();
        assert!(!msg.location_matches_peer());
    }

    #[test]
    fn max_age_defaults_when_unparsable() {
        let raw = b"NOTIFY * HTTP/1.1\r\n\
                    CACHE-CONTROL: max-age=soon\r\n\
                    LOCATION: http://192.0.2.10/d.xml\r\n\
                    NTS: ssdp:alive\r\n\
                    USN: uuid:1\r\n\
                    \r\n";
        let msg = SsdpMessage::parse(IFACE, peer(), raw).unwrap();
        assert_eq!(msg.max_age(), DEFAULT_MAX_AGE);
    }
}
