//! HTTP/1.x request/response codec, installed as a pair of pipeline handlers
//! rather than exposed as a standalone client type.
//!
//! Grounded on `boomnet::http`'s httparse-based command-line/header scanning
//! (`httparse::Request`/`Response`, `http::Method` re-export), generalized
//! from a client-only, `Content-Length`-only parser into a client-and-server
//! parser with full chunked-transfer decoding per spec.md §4.6.

use std::io::Write as _;

use httparse::{EMPTY_HEADER, Request as HttparseRequest, Response as HttparseResponse, Status};

pub use http::Method;

use crate::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use crate::channel::ChannelHandle;
use crate::pipeline::{ModuleHandle, Payload, PayloadKind, Pipeline};

const MAX_HEADERS: usize = 64;

/// Header names compared case-insensitively on lookup; values are preserved
/// as written except for leading/trailing whitespace (spec.md §6). Multiple
/// occurrences of a name (or a single occurrence with comma-separated
/// values) merge into one multi-value entry, in order.
#[derive(Default, Clone, Debug)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values for `name`, comma-joined, or `None` if absent.
    pub fn get(&self, name: &str) -> Option<String> {
        self.find(name).map(|(_, values)| values.join(", "))
    }

    /// The individual (already comma-split, per spec.md's parse rule)
    /// values for `name`, in order.
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.find(name).map(|(_, values)| values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Append `value` under `name`, merging into an existing entry if one
    /// with the same name (case-insensitively) is already present.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name.to_owned(), vec![value])),
        }
    }

    /// Replace every value for `name` with a single `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.push((name.to_owned(), vec![value.into()]));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    fn find(&self, name: &str) -> Option<&(String, Vec<String>)> {
        self.entries.iter().find(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Split on commas and append each trimmed piece, except for headers in
    /// [`no_comma_split`] whose raw value is appended whole (Open Question 2:
    /// `Set-Cookie` values routinely contain commas of their own).
    fn append_raw_value(&mut self, name: &str, raw_value: &str) {
        if no_comma_split(name) {
            self.append(name, raw_value.trim());
        } else {
            for part in raw_value.split(',') {
                self.append(name, part.trim());
            }
        }
    }
}

/// Header names exempted from comma-splitting on parse (spec.md §9 Open
/// Question 2). `Set-Cookie` is the only entry the HTTP spec itself singles
/// out this way; more can be added as other codecs need them.
fn no_comma_split(name: &str) -> bool {
    name.eq_ignore_ascii_case("set-cookie")
}

/// A parsed (incoming, server mode) or constructed (outgoing, client mode)
/// HTTP request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub version: &'static str,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Set on parse when `Transfer-Encoding: chunked` was present; on
    /// construction, set by the caller to request chunked emission.
    pub chunked: bool,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), version: "HTTP/1.1", headers: Headers::default(), body: Vec::new(), chunked: false }
    }
}

/// A parsed (incoming, client mode) or constructed (outgoing, server mode)
/// HTTP response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub version: &'static str,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub chunked: bool,
}

impl HttpResponse {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self { version: "HTTP/1.1", status, reason: reason.into(), headers: Headers::default(), body: Vec::new(), chunked: false }
    }
}

/// Which side of the exchange a codec installed via [`install`] plays:
/// `Client` parses responses in and serializes requests out; `Server` parses
/// requests in and serializes responses out (spec.md §4.6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HttpMode {
    Client,
    Server,
}

/// Splice this codec into `pipeline`: an incoming handler at the head of
/// `incoming` that turns accumulated bytes into a parsed request/response,
/// and an outgoing handler at the tail of `outgoing` that serializes a typed
/// request/response back to bytes. `pool` backs the `ChunkedBuffer`s the
/// outgoing handler builds. Returns a [`ModuleHandle`] that later removes
/// both handlers as a unit via [`Pipeline::remove_module`].
pub fn install(pipeline: &Pipeline<ChannelHandle>, mode: HttpMode, pool: DefaultBufferPool) -> ModuleHandle {
    let mut module = ModuleHandle::new();

    module.push_incoming(pipeline.add_incoming_first(PayloadKind::Bytes, move |ctx: &ChannelHandle, payload: &mut Payload| {
        incoming(mode, ctx, payload);
    }));

    let outgoing_kind = match mode {
        HttpMode::Client => PayloadKind::HttpRequest,
        HttpMode::Server => PayloadKind::HttpResponse,
    };
    module.push_outgoing(pipeline.add_outgoing_last(outgoing_kind, move |_ctx: &ChannelHandle, payload: &mut Payload| {
        outgoing(mode, &pool, payload);
    }));

    module
}

/// Attempts a fresh parse against every unread byte on each call rather than
/// retaining partial header state across deliveries (spec.md §4.6 allows
/// either; this crate keeps the simpler, cursor-restore-only design and
/// re-scans headers on every delivery of a still-incomplete message).
fn incoming(mode: HttpMode, ctx: &ChannelHandle, payload: &mut Payload) {
    use crate::channel::Channel;

    let original_pos;
    let mut scratch = Vec::new();
    if let Payload::Bytes(buffer) = payload {
        original_pos = buffer.read_pos();
        buffer.copy_unread_to(&mut scratch);
    } else {
        return;
    }
    let is_active = ctx.is_active();

    match mode {
        HttpMode::Client => match parse_response(&scratch, is_active) {
            ParseOutcome::Complete(response, consumed) => {
                if let Payload::Bytes(buffer) = payload {
                    buffer.rewind_to(original_pos + consumed).expect("consumed within buffered range");
                }
                *payload = Payload::HttpResponse(response);
            }
            ParseOutcome::Incomplete => restore(payload, original_pos),
            ParseOutcome::Malformed(reason) => {
                log::warn!("malformed HTTP response: {reason}");
                restore(payload, original_pos);
            }
        },
        HttpMode::Server => match parse_request(&scratch, is_active) {
            ParseOutcome::Complete(request, consumed) => {
                if let Payload::Bytes(buffer) = payload {
                    buffer.rewind_to(original_pos + consumed).expect("consumed within buffered range");
                }
                *payload = Payload::HttpRequest(request);
            }
            ParseOutcome::Incomplete => restore(payload, original_pos),
            ParseOutcome::Malformed(reason) => {
                log::warn!("malformed HTTP request: {reason}");
                restore(payload, original_pos);
            }
        },
    }
}

fn restore(payload: &mut Payload, pos: usize) {
    if let Payload::Bytes(buffer) = payload {
        buffer.rewind_to(pos).expect("rewind to original position");
    }
}

fn outgoing(mode: HttpMode, pool: &DefaultBufferPool, payload: &mut Payload) {
    let mut bytes = Vec::new();
    match (mode, &*payload) {
        (HttpMode::Client, Payload::HttpRequest(request)) => write_request(request, &mut bytes),
        (HttpMode::Server, Payload::HttpResponse(response)) => write_response(response, &mut bytes),
        _ => return,
    }
    let mut buffer = DefaultChunkedBuffer::new(pool.clone());
    buffer.write(&bytes);
    *payload = Payload::Bytes(buffer);
}

fn write_request(request: &HttpRequest, out: &mut Vec<u8>) {
    out.extend_from_slice(request.method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(request.path.as_bytes());
    out.push(b' ');
    out.extend_from_slice(request.version.as_bytes());
    out.extend_from_slice(b"\r\n");
    write_headers(&request.headers, out);
    write_body(request.chunked, &request.body, out);
}

fn write_response(response: &HttpResponse, out: &mut Vec<u8>) {
    out.extend_from_slice(response.version.as_bytes());
    out.push(b' ');
    out.extend_from_slice(itoa::Buffer::new().format(response.status).as_bytes());
    out.push(b' ');
    out.extend_from_slice(response.reason.as_bytes());
    out.extend_from_slice(b"\r\n");
    write_headers(&response.headers, out);
    write_body(response.chunked, &response.body, out);
}

fn write_headers(headers: &Headers, out: &mut Vec<u8>) {
    for (name, values) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(values.join(", ").as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

const CHUNK_SIZE: usize = 8192;

fn write_body(chunked: bool, body: &[u8], out: &mut Vec<u8>) {
    if !chunked {
        out.extend_from_slice(body);
        return;
    }
    for chunk in body.chunks(CHUNK_SIZE) {
        let _ = write!(out, "{:x}\r\n", chunk.len());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
}

enum ParseOutcome<T> {
    Complete(T, usize),
    Incomplete,
    Malformed(String),
}

enum BodyError {
    Incomplete,
    Malformed(String),
}

fn parse_request(bytes: &[u8], is_active: bool) -> ParseOutcome<HttpRequest> {
    let mut header_storage = [EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = HttparseRequest::new(&mut header_storage);
    let header_len = match parsed.parse(bytes) {
        Ok(Status::Complete(n)) => n,
        Ok(Status::Partial) => return ParseOutcome::Incomplete,
        Err(err) => return ParseOutcome::Malformed(err.to_string()),
    };

    let Some(method) = parsed.method.and_then(|m| Method::from_bytes(m.as_bytes()).ok()) else {
        return ParseOutcome::Malformed("invalid or missing method".to_owned());
    };
    let path = parsed.path.unwrap_or("/").to_owned();
    let version = if parsed.version == Some(1) { "HTTP/1.1" } else { "HTTP/1.0" };

    let mut headers = Headers::default();
    for header in parsed.headers.iter() {
        let Ok(value) = std::str::from_utf8(header.value) else {
            return ParseOutcome::Malformed("non-utf8 header value".to_owned());
        };
        headers.append_raw_value(header.name, value);
    }

    match read_body(&headers, &bytes[header_len..], is_active) {
        Ok((body, chunked, body_len)) => {
            ParseOutcome::Complete(HttpRequest { method, path, version, headers, body, chunked }, header_len + body_len)
        }
        Err(BodyError::Incomplete) => ParseOutcome::Incomplete,
        Err(BodyError::Malformed(reason)) => ParseOutcome::Malformed(reason),
    }
}

fn parse_response(bytes: &[u8], is_active: bool) -> ParseOutcome<HttpResponse> {
    let mut header_storage = [EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = HttparseResponse::new(&mut header_storage);
    let header_len = match parsed.parse(bytes) {
        Ok(Status::Complete(n)) => n,
        Ok(Status::Partial) => return ParseOutcome::Incomplete,
        Err(err) => return ParseOutcome::Malformed(err.to_string()),
    };

    let Some(status) = parsed.code else {
        return ParseOutcome::Malformed("missing status code".to_owned());
    };
    let reason = parsed.reason.unwrap_or("").to_owned();
    let version = if parsed.version == Some(1) { "HTTP/1.1" } else { "HTTP/1.0" };

    let mut headers = Headers::default();
    for header in parsed.headers.iter() {
        let Ok(value) = std::str::from_utf8(header.value) else {
            return ParseOutcome::Malformed("non-utf8 header value".to_owned());
        };
        headers.append_raw_value(header.name, value);
    }

    match read_body(&headers, &bytes[header_len..], is_active) {
        Ok((body, chunked, body_len)) => {
            ParseOutcome::Complete(HttpResponse { version, status, reason, headers, body, chunked }, header_len + body_len)
        }
        Err(BodyError::Incomplete) => ParseOutcome::Incomplete,
        Err(BodyError::Malformed(reason)) => ParseOutcome::Malformed(reason),
    }
}

/// Body-length resolution priority from spec.md §4.6: chunked wins over
/// Content-Length (Open Question 3); Content-Length wins over
/// connection-close delimiting; an unterminable body on a live connection
/// waits for more bytes.
fn read_body(headers: &Headers, bytes: &[u8], is_active: bool) -> Result<(Vec<u8>, bool, usize), BodyError> {
    let is_chunked = headers
        .get("transfer-encoding")
        .map(|value| value.to_ascii_lowercase().split(',').any(|part| part.trim() == "chunked"))
        .unwrap_or(false);

    if is_chunked {
        return read_chunked_body(bytes).map(|(body, consumed)| (body, true, consumed));
    }

    if let Some(raw_len) = headers.get("content-length") {
        let len: usize = raw_len.trim().parse().map_err(|_| BodyError::Malformed("invalid content-length".to_owned()))?;
        if bytes.len() < len {
            return Err(BodyError::Incomplete);
        }
        return Ok((bytes[..len].to_vec(), false, len));
    }

    if !is_active {
        return Ok((bytes.to_vec(), false, bytes.len()));
    }

    Err(BodyError::Incomplete)
}

/// Decodes `HEX-LENGTH CRLF payload CRLF` frames terminated by
/// `0 CRLF CRLF`; no trailer headers after the terminator are supported.
fn read_chunked_body(mut bytes: &[u8]) -> Result<(Vec<u8>, usize), BodyError> {
    let mut body = Vec::new();
    let mut consumed = 0;

    loop {
        let Some(line_len) = find_crlf(bytes) else {
            return Err(BodyError::Incomplete);
        };
        let size_line = std::str::from_utf8(&bytes[..line_len]).map_err(|_| BodyError::Malformed("non-utf8 chunk size line".to_owned()))?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| BodyError::Malformed("invalid chunk size".to_owned()))?;

        let frame_header_len = line_len + 2;
        if size == 0 {
            if bytes.len() < frame_header_len + 2 {
                return Err(BodyError::Incomplete);
            }
            consumed += frame_header_len + 2;
            return Ok((body, consumed));
        }

        if bytes.len() < frame_header_len + size + 2 {
            return Err(BodyError::Incomplete);
        }
        body.extend_from_slice(&bytes[frame_header_len..frame_header_len + size]);

        let frame_len = frame_header_len + size + 2;
        consumed += frame_len;
        bytes = &bytes[frame_len..];
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    memchr::memchr(b'\n', bytes).filter(|&i| i > 0 && bytes[i - 1] == b'\r').map(|i| i - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_comma_split_is_opted_out_for_set_cookie() {
        let mut headers = Headers::default();
        headers.append_raw_value("Accept", "text/html, application/json");
        headers.append_raw_value("Set-Cookie", "a=1, b=2; Path=/");

        assert_eq!(headers.get_all("accept"), Some(&["text/html".to_owned(), "application/json".to_owned()][..]));
        assert_eq!(headers.get_all("set-cookie"), Some(&["a=1, b=2; Path=/".to_owned()][..]));
    }

    #[test]
    fn duplicate_header_names_append_rather_than_overwrite() {
        let mut headers = Headers::default();
        headers.append_raw_value("X-Trace", "one");
        headers.append_raw_value("x-trace", "two");
        assert_eq!(headers.get("X-Trace"), Some("one, two".to_owned()));
    }

    #[test]
    fn parse_request_with_content_length_body() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";
        match parse_request(raw, true) {
            ParseOutcome::Complete(request, consumed) => {
                assert_eq!(request.method, Method::POST);
                assert_eq!(request.path, "/submit");
                assert_eq!(request.body, b"hello");
                assert!(!request.chunked);
                assert_eq!(consumed, raw.len());
            }
            _ => panic!("expected a complete parse"),
        }
    }

    #[test]
    fn parse_request_missing_bytes_is_incomplete() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        assert!(matches!(parse_request(raw, true), ParseOutcome::Incomplete));
    }

    #[test]
    fn chunked_transfer_encoding_wins_over_content_length() {
        let raw = b"POST /submit HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 999\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        match parse_request(raw, true) {
            ParseOutcome::Complete(request, consumed) => {
                assert!(request.chunked);
                assert_eq!(request.body, b"hello");
                assert_eq!(consumed, raw.len());
            }
            _ => panic!("expected a complete parse"),
        }
    }

    #[test]
    fn chunked_body_split_across_two_deliveries_is_incomplete_then_complete() {
        let first = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel";
        assert!(matches!(parse_request(first, true), ParseOutcome::Incomplete));

        let full = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        match parse_request(full, true) {
            ParseOutcome::Complete(request, _) => assert_eq!(request.body, b"hello"),
            _ => panic!("expected a complete parse once the rest arrives"),
        }
    }

    #[test]
    fn body_of_unknown_length_on_a_live_connection_waits() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\nsome trailing bytes";
        assert!(matches!(parse_request(raw, true), ParseOutcome::Incomplete));
    }

    #[test]
    fn body_of_unknown_length_on_a_closed_connection_reads_to_eof() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\nthe rest of the stream";
        match parse_response(raw, false) {
            ParseOutcome::Complete(response, _) => assert_eq!(response.body, b"the rest of the stream"),
            _ => panic!("expected a complete parse using connection-close delimiting"),
        }
    }

    #[test]
    fn writer_round_trips_headers_and_chunked_body() {
        let mut request = HttpRequest::new(Method::POST, "/x");
        request.headers.set("Host", "example.com");
        request.chunked = true;
        request.body = b"payload".to_vec();

        let mut out = Vec::new();
        write_request(&request, &mut out);

        match parse_request(&out, true) {
            ParseOutcome::Complete(parsed, consumed) => {
                assert_eq!(parsed.body, b"payload");
                assert_eq!(consumed, out.len());
            }
            _ => panic!("expected the writer's own output to parse back"),
        }
    }

    #[test]
    fn malformed_command_line_is_reported_and_leaves_input_untouched() {
        let raw = b"NOT A REQUEST LINE\r\n\r\n";
        assert!(matches!(parse_request(raw, true), ParseOutcome::Malformed(_)));
    }
}
