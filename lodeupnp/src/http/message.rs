//! HTTP/1.x request and response framing.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::warn;

use super::headers;
use super::HttpHeaders;

pub const HTTP_1_0: &str = "HTTP/1.0";
pub const HTTP_1_1: &str = "HTTP/1.1";

const CRLF: &str = "\r\n";

/// Framing failures while reading or writing a message.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing start line")]
    MissingStartLine,

    #[error("malformed start line: {0:?}")]
    MalformedStartLine(String),

    #[error("malformed chunk size: {0:?}")]
    MalformedChunkSize(String),

    #[error("unexpected end of stream while reading body")]
    UnexpectedEof,
}

/// An HTTP request message.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    uri: String,
    version: String,
    headers: HttpHeaders,
    body: Vec<u8>,
}

/// An HTTP response message.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: String,
    status: u16,
    reason: String,
    headers: HttpHeaders,
    body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: HTTP_1_1.to_string(),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.put(name, value);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Sets the body and, when `with_content_length` is set, the
    /// matching `Content-Length` header.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>, with_content_length: bool) {
        self.body = body.into();
        if with_content_length {
            self.headers
                .put(headers::CONTENT_LENGTH, &self.body.len().to_string());
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        is_keep_alive(&self.version, &self.headers)
    }

    pub fn start_line(&self) -> String {
        format!("{} {} {}", self.method, self.uri, self.version)
    }

    /// Reads one request from `reader`.
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, HttpError> {
        let (start_line, headers) = read_head(reader)?;
        let mut tokens = start_line.split_whitespace();
        let (method, uri, version) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(m), Some(u), Some(v)) => (m.to_string(), u.to_string(), v.to_string()),
            _ => return Err(HttpError::MalformedStartLine(start_line)),
        };
        let body = read_body(reader, &headers)?;
        Ok(Self {
            method,
            uri,
            version,
            headers,
            body,
        })
    }

    /// Writes the message, headers first then the body as-is.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write_message(writer, &self.start_line(), &self.headers, &self.body)
    }
}

impl HttpResponse {
    pub fn new(status: u16, reason: &str) -> Self {
        Self {
            version: HTTP_1_1.to_string(),
            status,
            reason: reason.to_string(),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.put(name, value);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>, with_content_length: bool) {
        self.body = body.into();
        if with_content_length {
            self.headers
                .put(headers::CONTENT_LENGTH, &self.body.len().to_string());
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        is_keep_alive(&self.version, &self.headers)
    }

    pub fn start_line(&self) -> String {
        format!("{} {} {}", self.version, self.status, self.reason)
    }

    /// Reads one response from `reader`.
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, HttpError> {
        let (start_line, headers) = read_head(reader)?;
        // The reason phrase may itself contain spaces.
        let mut tokens = start_line.splitn(3, char::is_whitespace);
        let (version, status, reason) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(v), Some(s), Some(r)) => (v, s, r),
            _ => return Err(HttpError::MalformedStartLine(start_line)),
        };
        let status: u16 = status
            .parse()
            .map_err(|_| HttpError::MalformedStartLine(start_line.clone()))?;
        let version = version.to_string();
        let reason = reason.trim().to_string();
        let body = read_body(reader, &headers)?;
        Ok(Self {
            version,
            status,
            reason,
            headers,
            body,
        })
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write_message(writer, &self.start_line(), &self.headers, &self.body)
    }
}

fn is_keep_alive(version: &str, headers: &HttpHeaders) -> bool {
    if version == HTTP_1_0 {
        headers.contains_value(headers::CONNECTION, headers::KEEP_ALIVE)
    } else {
        !headers.contains_value(headers::CONNECTION, headers::CLOSE)
    }
}

/// Reads the start line and the header block.
fn read_head(reader: &mut impl BufRead) -> Result<(String, HttpHeaders), HttpError> {
    let start_line = match read_line(reader)? {
        Some(line) if !line.is_empty() => line,
        _ => return Err(HttpError::MissingStartLine),
    };
    let mut headers = HttpHeaders::new();
    loop {
        match read_line(reader)? {
            None => return Err(HttpError::UnexpectedEof),
            Some(line) if line.is_empty() => break,
            Some(line) => headers.put_line(&line),
        }
    }
    Ok((start_line, headers))
}

/// Reads the body according to `Transfer-Encoding` / `Content-Length`.
/// A message without either header has an empty body.
fn read_body(reader: &mut impl BufRead, headers: &HttpHeaders) -> Result<Vec<u8>, HttpError> {
    if headers.contains_value(headers::TRANSFER_ENCODING, headers::CHUNKED) {
        return read_chunked_body(reader);
    }
    let length = content_length(headers);
    let mut body = vec![0u8; length];
    read_exact(reader, &mut body)?;
    Ok(body)
}

fn read_chunked_body(reader: &mut impl BufRead) -> Result<Vec<u8>, HttpError> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader)?.ok_or(HttpError::UnexpectedEof)?;
        // Chunk extensions after ';' are ignored.
        let size_token = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_token, 16)
            .map_err(|_| HttpError::MalformedChunkSize(line.clone()))?;
        if size == 0 {
            // Optional trailers, then the final blank line.
            loop {
                match read_line(reader)? {
                    None => return Err(HttpError::UnexpectedEof),
                    Some(line) if line.is_empty() => return Ok(body),
                    Some(_) => {}
                }
            }
        }
        let start = body.len();
        body.resize(start + size, 0);
        read_exact(reader, &mut body[start..])?;
        // CRLF terminating the chunk data.
        if read_line(reader)?.is_none() {
            return Err(HttpError::UnexpectedEof);
        }
    }
}

fn content_length(headers: &HttpHeaders) -> usize {
    match headers.get(headers::CONTENT_LENGTH) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("unparsable Content-Length {:?}, assuming 0", value);
            0
        }),
        None => 0,
    }
}

fn read_exact(reader: &mut impl BufRead, buf: &mut [u8]) -> Result<(), HttpError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            HttpError::UnexpectedEof
        } else {
            HttpError::Io(e)
        }
    })
}

/// Reads a line terminated by LF, discarding CR. Returns `None` at end
/// of stream. Header text is treated as UTF-8, replacing invalid bytes.
fn read_line(reader: &mut impl BufRead) -> Result<Option<String>, HttpError> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw)?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

fn write_message(
    writer: &mut impl Write,
    start_line: &str,
    headers: &HttpHeaders,
    body: &[u8],
) -> io::Result<()> {
    let mut head = String::new();
    head.push_str(start_line);
    head.push_str(CRLF);
    for (name, value) in headers.iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str(CRLF);
    }
    head.push_str(CRLF);
    writer.write_all(head.as_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_request_with_content_length() {
        let raw = b"NOTIFY /cb HTTP/1.1\r\nHost: 192.0.2.3\r\nContent-Length: 5\r\n\r\nhello";
        let req = HttpRequest::read_from(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(req.method(), "NOTIFY");
        assert_eq!(req.uri(), "/cb");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("192.0.2.3"));
        assert_eq!(req.body(), b"hello");
    }

    #[test]
    fn parses_response_with_spaced_reason() {
        let raw = b"HTTP/1.1 412 Precondition Failed\r\nContent-Length: 0\r\n\r\n";
        let res = HttpResponse::read_from(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(res.status(), 412);
        assert_eq!(res.reason(), "Precondition Failed");
        assert!(res.body().is_empty());
    }

    #[test]
    fn short_start_line_is_malformed() {
        let raw = b"GET /\r\n\r\n";
        match HttpRequest::read_from(&mut Cursor::new(&raw[..])) {
            Err(HttpError::MalformedStartLine(_)) => {}
            other => panic!("expected MalformedStartLine, got {:?}", other),
        }
    }

    #[test]
    fn empty_stream_is_missing_start_line() {
        match HttpRequest::read_from(&mut Cursor::new(&b""[..])) {
            Err(HttpError::MissingStartLine) => {}
            other => panic!("expected MissingStartLine, got {:?}", other),
        }
    }

    #[test]
    fn chunked_body_matches_content_length_delivery() {
        let chunked = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                        7\r\nwithin \r\nC\r\nthe envelope\r\n0\r\n\r\n";
        let plain = b"HTTP/1.1 200 OK\r\nContent-Length: 19\r\n\r\nwithin the envelope";
        let a = HttpResponse::read_from(&mut Cursor::new(&chunked[..])).unwrap();
        let b = HttpResponse::read_from(&mut Cursor::new(&plain[..])).unwrap();
        assert_eq!(a.body(), b.body());
        assert_eq!(a.body_str(), "within the envelope");
    }

    #[test]
    fn chunked_with_extension_and_trailer() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    5;ext=1\r\nhello\r\n0\r\nX-Trailer: ignored\r\n\r\n";
        let res = HttpResponse::read_from(&mut Cursor::new(&raw[..])).unwrap();
        assert_eq!(res.body(), b"hello");
    }

    #[test]
    fn bad_chunk_size_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nhello\r\n0\r\n\r\n";
        match HttpResponse::read_from(&mut Cursor::new(&raw[..])) {
            Err(HttpError::MalformedChunkSize(_)) => {}
            other => panic!("expected MalformedChunkSize, got {:?}", other),
        }
    }

    #[test]
    fn truncated_body_is_unexpected_eof() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort";
        match HttpResponse::read_from(&mut Cursor::new(&raw[..])) {
            Err(HttpError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn keep_alive_follows_version_rules() {
        let mut req10 = HttpRequest::new("GET", "/");
        req10.set_version(HTTP_1_0);
        assert!(!req10.is_keep_alive());
        req10.set_header("Connection", "keep-alive");
        assert!(req10.is_keep_alive());

        let mut req11 = HttpRequest::new("GET", "/");
        assert!(req11.is_keep_alive());
        req11.set_header("Connection", "close");
        assert!(!req11.is_keep_alive());
    }

    #[test]
    fn round_trips_through_writer() {
        let mut req = HttpRequest::new("SUBSCRIBE", "/event");
        req.set_header("NT", "upnp:event");
        req.set_body(Vec::new(), true);
        let mut buf = Vec::new();
        req.write_to(&mut buf).unwrap();
        let parsed = HttpRequest::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.method(), "SUBSCRIBE");
        assert_eq!(parsed.header("nt"), Some("upnp:event"));
        assert_eq!(parsed.header("content-length"), Some("0"));
    }
}
