//! HTTP/1.1 upgrade handshake, both directions. The teacher only ever opens
//! connections (`Handshaker::perform_handshake` drives a client-side
//! request/response exchange and checks the response's status code alone);
//! it has no server-side counterpart, since `boomnet::ws` is a client-only
//! library. Here both sides are needed, so the accept-key computation
//! (RFC 6455 §1.3) is shared by the request builder and the response
//! verifier instead of being skipped as the teacher skips it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use httparse::{EMPTY_HEADER, Request as HttparseRequest, Response as HttparseResponse, Status};
use rand::Rng;
use sha1::{Digest, Sha1};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HEADERS: usize = 32;

pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    BASE64.encode(bytes)
}

pub fn accept_key(nonce: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

pub fn build_request(host: &str, path: &str, nonce: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("GET {path} HTTP/1.1\r\n").as_bytes());
    out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    out.extend_from_slice(b"Upgrade: websocket\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    out.extend_from_slice(format!("Sec-WebSocket-Key: {nonce}\r\n").as_bytes());
    out.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
    out.extend_from_slice(b"\r\n");
    out
}

pub fn build_response(accept: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    out.extend_from_slice(b"Upgrade: websocket\r\n");
    out.extend_from_slice(b"Connection: Upgrade\r\n");
    out.extend_from_slice(format!("Sec-WebSocket-Accept: {accept}\r\n").as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

pub enum HandshakeOutcome<T> {
    Complete(T, usize),
    Incomplete,
    Rejected(String),
}

/// Parses the server's upgrade response and confirms its
/// `Sec-WebSocket-Accept` matches what `nonce` should produce.
pub fn parse_client_response(bytes: &[u8], nonce: &str) -> HandshakeOutcome<()> {
    let mut header_storage = [EMPTY_HEADER; MAX_HEADERS];
    let mut response = HttparseResponse::new(&mut header_storage);
    let consumed = match response.parse(bytes) {
        Ok(Status::Complete(n)) => n,
        Ok(Status::Partial) => return HandshakeOutcome::Incomplete,
        Err(err) => return HandshakeOutcome::Rejected(err.to_string()),
    };

    if response.code != Some(101) {
        return HandshakeOutcome::Rejected(format!("expected status 101, got {:?}", response.code));
    }
    let Some(accept) = find_header(response.headers, "sec-websocket-accept") else {
        return HandshakeOutcome::Rejected("missing Sec-WebSocket-Accept header".to_owned());
    };
    if accept != accept_key(nonce) {
        return HandshakeOutcome::Rejected("Sec-WebSocket-Accept does not match the request nonce".to_owned());
    }

    HandshakeOutcome::Complete((), consumed)
}

/// Parses a client's upgrade request and returns the `Sec-WebSocket-Key` the
/// caller should feed into [`build_response`] via [`accept_key`].
pub fn parse_server_request(bytes: &[u8]) -> HandshakeOutcome<String> {
    let mut header_storage = [EMPTY_HEADER; MAX_HEADERS];
    let mut request = HttparseRequest::new(&mut header_storage);
    let consumed = match request.parse(bytes) {
        Ok(Status::Complete(n)) => n,
        Ok(Status::Partial) => return HandshakeOutcome::Incomplete,
        Err(err) => return HandshakeOutcome::Rejected(err.to_string()),
    };

    if request.method != Some("GET") {
        return HandshakeOutcome::Rejected("upgrade request must use GET".to_owned());
    }
    let Some(upgrade) = find_header(request.headers, "upgrade") else {
        return HandshakeOutcome::Rejected("missing Upgrade header".to_owned());
    };
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return HandshakeOutcome::Rejected(format!("unsupported Upgrade value: {upgrade}"));
    }
    let Some(key) = find_header(request.headers, "sec-websocket-key") else {
        return HandshakeOutcome::Rejected("missing Sec-WebSocket-Key header".to_owned());
    };

    HandshakeOutcome::Complete(key.to_owned(), consumed)
}

fn find_header<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .and_then(|header| std::str::from_utf8(header.value).ok())
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_the_rfc6455_worked_example() {
        // RFC 6455 section 1.3's own example nonce/accept pair.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn client_accepts_a_matching_response() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let response = build_response(&accept_key(nonce));
        match parse_client_response(&response, nonce) {
            HandshakeOutcome::Complete((), consumed) => assert_eq!(consumed, response.len()),
            _ => panic!("expected the handshake to complete"),
        }
    }

    #[test]
    fn client_rejects_a_forged_accept_value() {
        let response = build_response("not-the-right-value");
        assert!(matches!(parse_client_response(&response, "dGhlIHNhbXBsZSBub25jZQ=="), HandshakeOutcome::Rejected(_)));
    }

    #[test]
    fn server_extracts_the_key_from_a_valid_request() {
        let request = build_request("example.com", "/ws", "dGhlIHNhbXBsZSBub25jZQ==");
        match parse_server_request(&request) {
            HandshakeOutcome::Complete(key, consumed) => {
                assert_eq!(key, "dGhlIHNhbXBsZSBub25jZQ==");
                assert_eq!(consumed, request.len());
            }
            _ => panic!("expected the handshake to complete"),
        }
    }

    #[test]
    fn server_rejects_a_request_missing_the_upgrade_header() {
        let raw = b"GET /ws HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert!(matches!(parse_server_request(raw), HandshakeOutcome::Rejected(_)));
    }

    #[test]
    fn partial_response_is_incomplete() {
        let full = build_response(&accept_key("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(matches!(parse_client_response(&full[..full.len() - 2], "dGhlIHNhbXBsZSBub25jZQ=="), HandshakeOutcome::Incomplete));
    }
}
