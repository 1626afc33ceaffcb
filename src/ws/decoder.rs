//! Frame decoding against a plain byte slice rather than the teacher's
//! `ReadBuffer`-backed, `unsafe` `'static`-lifetime zero-copy reader: frames
//! here are parsed into owned `Vec<u8>` payloads the same way `http::parse_request`
//! parses into an owned `HttpRequest`, so decoding stays safe and idempotent
//! under [`super::incoming`]'s rewind-on-incomplete scheme.

use super::{Frame, WsRole};
use crate::ws::protocol;

pub enum DecodeOutcome {
    Complete(Frame, usize),
    Incomplete,
    Malformed(&'static str),
}

/// Decodes a single frame from the front of `bytes`. `role` determines which
/// masking direction is enforced: a `Server` must reject frames with the
/// mask bit unset (RFC 6455 §5.1 requires every client-to-server frame to be
/// masked); a `Client` must reject the reverse.
pub fn decode_frame(bytes: &[u8], role: WsRole) -> DecodeOutcome {
    if bytes.len() < 2 {
        return DecodeOutcome::Incomplete;
    }

    let b0 = bytes[0];
    if b0 & (protocol::RSV1_MASK | protocol::RSV2_MASK | protocol::RSV3_MASK) != 0 {
        return DecodeOutcome::Malformed("non-zero RSV bits");
    }
    let fin = b0 & protocol::FIN_MASK != 0;
    let op_code = b0 & protocol::OP_CODE_MASK;

    let b1 = bytes[1];
    let masked = b1 & protocol::MASK_MASK != 0;
    let mask_required = matches!(role, WsRole::Server);
    if masked != mask_required {
        return DecodeOutcome::Malformed(if mask_required {
            "client frame missing required mask bit"
        } else {
            "server frame must not set the mask bit"
        });
    }

    let mut pos = 2;
    let payload_len = match b1 & protocol::PAYLOAD_LENGTH_MASK {
        126 => {
            if bytes.len() < pos + 2 {
                return DecodeOutcome::Incomplete;
            }
            let len = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
            pos += 2;
            len
        }
        127 => {
            if bytes.len() < pos + 8 {
                return DecodeOutcome::Incomplete;
            }
            let len = u64::from_be_bytes(bytes[pos..pos + 8].try_into().expect("8 bytes")) as usize;
            pos += 8;
            len
        }
        short => short as usize,
    };

    let mask_key = if masked {
        if bytes.len() < pos + 4 {
            return DecodeOutcome::Incomplete;
        }
        let key = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
        pos += 4;
        Some(key)
    } else {
        None
    };

    if bytes.len() < pos + payload_len {
        return DecodeOutcome::Incomplete;
    }
    let mut payload = bytes[pos..pos + payload_len].to_vec();
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
    let consumed = pos + payload_len;

    let frame = match op_code {
        protocol::op::TEXT_FRAME => Frame::Text(fin, payload),
        protocol::op::BINARY_FRAME => Frame::Binary(fin, payload),
        protocol::op::CONTINUATION_FRAME => Frame::Continuation(fin, payload),
        protocol::op::PING => Frame::Ping(payload),
        protocol::op::PONG => Frame::Pong(payload),
        protocol::op::CONNECTION_CLOSE => {
            let (code, reason) = if payload.len() >= 2 {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                (code, payload.split_off(2))
            } else {
                (1005, Vec::new())
            };
            Frame::Close(code, reason)
        }
        _ => return DecodeOutcome::Malformed("unknown op code"),
    };

    DecodeOutcome::Complete(frame, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::encoder::encode_frame;

    #[test]
    fn decodes_a_masked_client_text_frame() {
        let mut bytes = Vec::new();
        encode_frame(WsRole::Client, true, protocol::op::TEXT_FRAME, b"hello", &mut bytes);
        match decode_frame(&bytes, WsRole::Server) {
            DecodeOutcome::Complete(Frame::Text(fin, body), consumed) => {
                assert!(fin);
                assert_eq!(body, b"hello");
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a complete decode"),
        }
    }

    #[test]
    fn server_rejects_a_masked_frame() {
        let mut bytes = Vec::new();
        encode_frame(WsRole::Client, true, protocol::op::TEXT_FRAME, b"x", &mut bytes);
        assert!(matches!(decode_frame(&bytes, WsRole::Client), DecodeOutcome::Malformed(_)));
    }

    #[test]
    fn client_rejects_an_unmasked_client_style_frame() {
        let mut bytes = Vec::new();
        encode_frame(WsRole::Server, true, protocol::op::TEXT_FRAME, b"x", &mut bytes);
        assert!(matches!(decode_frame(&bytes, WsRole::Server), DecodeOutcome::Malformed(_)));
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let mut bytes = Vec::new();
        encode_frame(WsRole::Server, true, protocol::op::BINARY_FRAME, b"0123456789", &mut bytes);
        assert!(matches!(decode_frame(&bytes[..bytes.len() - 1], WsRole::Client), DecodeOutcome::Incomplete));
    }

    #[test]
    fn extended_payload_length_round_trips() {
        let body = vec![7u8; 70_000];
        let mut bytes = Vec::new();
        encode_frame(WsRole::Server, true, protocol::op::BINARY_FRAME, &body, &mut bytes);
        match decode_frame(&bytes, WsRole::Client) {
            DecodeOutcome::Complete(Frame::Binary(_, payload), consumed) => {
                assert_eq!(payload, body);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a complete decode"),
        }
    }

    #[test]
    fn close_frame_splits_status_code_and_reason() {
        let mut body = 1000u16.to_be_bytes().to_vec();
        body.extend_from_slice(b"bye");
        let mut bytes = Vec::new();
        encode_frame(WsRole::Client, true, protocol::op::CONNECTION_CLOSE, &body, &mut bytes);
        match decode_frame(&bytes, WsRole::Server) {
            DecodeOutcome::Complete(Frame::Close(code, reason), _) => {
                assert_eq!(code, 1000);
                assert_eq!(reason, b"bye");
            }
            _ => panic!("expected a complete decode"),
        }
    }
}
