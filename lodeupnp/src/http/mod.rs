//! Minimal HTTP/1.x support for UPnP traffic.
//!
//! UPnP exchanges short messages: SSDP datagrams framed as HTTP, SOAP
//! POSTs of a few kilobytes, GENA NOTIFY callbacks. The codec here
//! parses and emits exactly that: start line, headers, body framed by
//! `Content-Length` or chunked transfer coding. Large transfers and
//! anything HTTP/2 are out of scope.
//!
//! [`client::HttpClient`] is the outgoing transport, backed by a ureq
//! agent so connection pooling and timeouts come from a maintained
//! stack rather than hand-rolled socket code.

mod client;
mod header;
mod message;

pub use client::{HttpClient, HttpClientError};
pub use header::HttpHeaders;
pub use message::{HttpError, HttpRequest, HttpResponse};

/// Header values used across the protocol modules.
pub mod headers {
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const HOST: &str = "Host";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const USER_AGENT: &str = "User-Agent";

    pub const CHUNKED: &str = "chunked";
    pub const CLOSE: &str = "close";
    pub const KEEP_ALIVE: &str = "keep-alive";
}
