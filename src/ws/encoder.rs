//! Frame encoding. Unlike the teacher's encoder, which hardcodes a
//! zero masking key on the grounds that XORing against zero is a no-op
//! ("performance reason", by the teacher's own comment) and never had to
//! play a server role, this one masks for real: a `Client` encoder applies a
//! random key per RFC 6455 §5.3, a `Server` encoder sends unmasked, and
//! [`super::decoder`] enforces the matching requirement on the receive side.

use rand::Rng;

use crate::ws::WsRole;
use crate::ws::protocol;

pub fn encode_frame(role: WsRole, fin: bool, op_code: u8, payload: &[u8], out: &mut Vec<u8>) {
    let mut first_byte = op_code;
    if fin {
        first_byte |= protocol::FIN_MASK;
    }
    out.push(first_byte);

    let masked = matches!(role, WsRole::Client);
    let mask_bit = if masked { protocol::MASK_MASK } else { 0 };

    if payload.len() <= 125 {
        out.push(mask_bit | payload.len() as u8);
    } else if payload.len() <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }

    if masked {
        let key: [u8; 4] = rand::rng().random();
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, &b)| b ^ key[i % 4]));
    } else {
        out.extend_from_slice(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::decoder::{DecodeOutcome, decode_frame};

    #[test]
    fn client_frames_are_masked_and_server_frames_are_not() {
        let mut client_bytes = Vec::new();
        encode_frame(WsRole::Client, true, protocol::op::TEXT_FRAME, b"hi", &mut client_bytes);
        assert_ne!(client_bytes[1] & protocol::MASK_MASK, 0);

        let mut server_bytes = Vec::new();
        encode_frame(WsRole::Server, true, protocol::op::TEXT_FRAME, b"hi", &mut server_bytes);
        assert_eq!(server_bytes[1] & protocol::MASK_MASK, 0);
    }

    #[test]
    fn masking_key_varies_between_calls() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode_frame(WsRole::Client, true, protocol::op::BINARY_FRAME, b"same payload", &mut a);
        encode_frame(WsRole::Client, true, protocol::op::BINARY_FRAME, b"same payload", &mut b);
        // overwhelmingly likely to differ given a random 4-byte key; a false
        // positive here would mean the RNG degenerated to a fixed key.
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_the_decoder() {
        let mut bytes = Vec::new();
        encode_frame(WsRole::Client, false, protocol::op::CONTINUATION_FRAME, b"partial", &mut bytes);
        match decode_frame(&bytes, WsRole::Server) {
            DecodeOutcome::Complete(crate::ws::Frame::Continuation(fin, body), _) => {
                assert!(!fin);
                assert_eq!(body, b"partial");
            }
            _ => panic!("expected a complete decode"),
        }
    }
}
