//! WebSocket framing, installed as a pair of pipeline handlers the same way
//! [`crate::http`] installs its codec, rather than exposed as the teacher's
//! standalone `Websocket<S>` client type that owns its stream and is driven
//! by `batch_iter`/`receive_next`/`send_*`.
//!
//! The wire format (`protocol`, `decoder`, `encoder`) is adapted from
//! `boomnet::ws` nearly unchanged; the handshake gains a server side the
//! teacher never needed, and the encoder masks for real instead of relying
//! on the teacher's hardcoded zero masking key.

use std::sync::{Arc, Mutex};

use crate::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use crate::channel::{Channel, ChannelHandle};
use crate::pipeline::{ModuleHandle, Payload, PayloadKind, Pipeline};
use crate::ws::decoder::DecodeOutcome;
use crate::ws::handshake::HandshakeOutcome;

mod decoder;
mod encoder;
mod handshake;
mod protocol;

/// A single WebSocket message or control frame. `Ping`/`Close` frames a peer
/// sends are answered and, for `Close`, acted on by [`install`] before they
/// would ever reach a later pipeline handler — they exist on this enum so a
/// caller can also originate them (e.g. sending an application-level ping).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(bool, Vec<u8>),
    Binary(bool, Vec<u8>),
    Continuation(bool, Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(u16, Vec<u8>),
}

/// Which side of the handshake/masking direction a codec installed via
/// [`install`] plays. Distinct from [`WsMode`] because the masking rule
/// (RFC 6455 §5.1/§5.3) only cares about client-vs-server, not the extra
/// handshake parameters the client side needs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WsRole {
    Client,
    Server,
}

/// Configuration for [`install`]. `Client` carries what's needed to build
/// the initial upgrade request; `Server` answers whatever upgrade request
/// arrives first.
pub enum WsMode {
    Client { host: String, path: String },
    Server,
}

impl WsMode {
    fn role(&self) -> WsRole {
        match self {
            WsMode::Client { .. } => WsRole::Client,
            WsMode::Server => WsRole::Server,
        }
    }
}

enum ConnState {
    Handshaking { nonce: Option<String>, pending: Vec<(bool, u8, Vec<u8>)> },
    Ready,
}

/// Splice this codec into `pipeline`. For `WsMode::Client` an `opened`
/// handler sends the upgrade request as soon as the channel connects; for
/// `WsMode::Server` the codec answers the first upgrade request it sees on
/// `incoming`. Frames sent via [`Channel::send`] before the handshake
/// completes are queued and flushed in order once it does, matching
/// `boomnet::ws::handshake::Handshaker`'s `pending_msg_buffer`. Returns a
/// [`ModuleHandle`] that later removes every handler registered here as a
/// unit via [`Pipeline::remove_module`].
pub fn install(pipeline: &Pipeline<ChannelHandle>, mode: WsMode, pool: DefaultBufferPool) -> ModuleHandle {
    let mut module = ModuleHandle::new();

    let role = mode.role();
    let nonce = match &mode {
        WsMode::Client { .. } => Some(handshake::generate_nonce()),
        WsMode::Server => None,
    };
    let state = Arc::new(Mutex::new(ConnState::Handshaking { nonce: nonce.clone(), pending: Vec::new() }));

    if let WsMode::Client { host, path } = mode {
        let nonce = nonce.expect("client nonce generated above");
        let pool = pool.clone();
        module.push_opened(pipeline.add_opened_last(move |ctx: &ChannelHandle| {
            let request = handshake::build_request(&host, &path, &nonce);
            send_bytes(ctx, &pool, &request);
        }));
    }

    let incoming_state = state.clone();
    let incoming_pool = pool.clone();
    module.push_incoming(pipeline.add_incoming_first(PayloadKind::Bytes, move |ctx: &ChannelHandle, payload: &mut Payload| {
        incoming(role, &incoming_state, &incoming_pool, ctx, payload);
    }));

    module.push_outgoing(pipeline.add_outgoing_last(PayloadKind::WebSocketFrame, move |_ctx: &ChannelHandle, payload: &mut Payload| {
        outgoing(role, &state, &pool, payload);
    }));

    module
}

fn incoming(role: WsRole, state: &Mutex<ConnState>, pool: &DefaultBufferPool, ctx: &ChannelHandle, payload: &mut Payload) {
    let original_pos;
    let mut scratch = Vec::new();
    if let Payload::Bytes(buffer) = payload {
        original_pos = buffer.read_pos();
        buffer.copy_unread_to(&mut scratch);
    } else {
        return;
    }

    let offset = match complete_handshake_if_pending(role, state, pool, ctx, &scratch) {
        HandshakeStep::StillHandshaking(HandshakeOutcome::Incomplete) => {
            restore(payload, original_pos);
            return;
        }
        HandshakeStep::StillHandshaking(HandshakeOutcome::Rejected(reason)) => {
            log::warn!("websocket handshake rejected: {reason}");
            restore(payload, original_pos);
            ctx.close();
            return;
        }
        HandshakeStep::StillHandshaking(HandshakeOutcome::Complete((), _)) => unreachable!("handled above"),
        HandshakeStep::JustCompleted(consumed) | HandshakeStep::AlreadyDone(consumed) => consumed,
    };

    match decoder::decode_frame(&scratch[offset..], role) {
        DecodeOutcome::Complete(frame, consumed) => {
            if let Payload::Bytes(buffer) = payload {
                buffer.rewind_to(original_pos + offset + consumed).expect("consumed within buffered range");
            }
            match frame {
                Frame::Ping(body) => reply(ctx, pool, role, protocol::op::PONG, &body),
                Frame::Close(code, reason) => {
                    let mut body = code.to_be_bytes().to_vec();
                    body.extend_from_slice(&reason);
                    reply(ctx, pool, role, protocol::op::CONNECTION_CLOSE, &body);
                    ctx.close();
                }
                other => *payload = Payload::WebSocketFrame(other),
            }
        }
        DecodeOutcome::Incomplete => restore(payload, original_pos + offset),
        DecodeOutcome::Malformed(reason) => {
            log::warn!("malformed websocket frame: {reason}");
            restore(payload, original_pos + offset);
            ctx.close();
        }
    }
}

enum HandshakeStep {
    /// The handshake had already completed on an earlier delivery; `usize` is
    /// always 0 since there is nothing left of it in this delivery's bytes.
    AlreadyDone(usize),
    JustCompleted(usize),
    StillHandshaking(HandshakeOutcome<()>),
}

fn complete_handshake_if_pending(role: WsRole, state: &Mutex<ConnState>, pool: &DefaultBufferPool, ctx: &ChannelHandle, scratch: &[u8]) -> HandshakeStep {
    let mut guard = state.lock().expect("websocket handshake state mutex poisoned");
    let ConnState::Handshaking { nonce, .. } = &*guard else {
        return HandshakeStep::AlreadyDone(0);
    };

    let outcome = match role {
        WsRole::Client => handshake::parse_client_response(scratch, nonce.as_deref().expect("client nonce set at install time")),
        WsRole::Server => match handshake::parse_server_request(scratch) {
            HandshakeOutcome::Complete(key, consumed) => {
                let response = handshake::build_response(&handshake::accept_key(&key));
                send_bytes(ctx, pool, &response);
                HandshakeOutcome::Complete((), consumed)
            }
            HandshakeOutcome::Incomplete => HandshakeOutcome::Incomplete,
            HandshakeOutcome::Rejected(reason) => HandshakeOutcome::Rejected(reason),
        },
    };

    let consumed = match outcome {
        HandshakeOutcome::Complete((), consumed) => consumed,
        other => return HandshakeStep::StillHandshaking(other),
    };

    let previous = std::mem::replace(&mut *guard, ConnState::Ready);
    drop(guard);
    if let ConnState::Handshaking { pending, .. } = previous {
        for (fin, op_code, body) in pending {
            let mut bytes = Vec::new();
            encoder::encode_frame(role, fin, op_code, &body, &mut bytes);
            send_bytes(ctx, pool, &bytes);
        }
    }
    HandshakeStep::JustCompleted(consumed)
}

fn outgoing(role: WsRole, state: &Mutex<ConnState>, pool: &DefaultBufferPool, payload: &mut Payload) {
    let Payload::WebSocketFrame(frame) = std::mem::replace(payload, Payload::Bytes(DefaultChunkedBuffer::new(pool.clone()))) else {
        return;
    };
    let (fin, op_code, body) = frame_to_wire(frame);

    let mut guard = state.lock().expect("websocket handshake state mutex poisoned");
    if let ConnState::Handshaking { pending, .. } = &mut *guard {
        pending.push((fin, op_code, body));
        return;
    }
    drop(guard);

    let mut bytes = Vec::new();
    encoder::encode_frame(role, fin, op_code, &body, &mut bytes);
    let mut buffer = DefaultChunkedBuffer::new(pool.clone());
    buffer.write(&bytes);
    *payload = Payload::Bytes(buffer);
}

fn frame_to_wire(frame: Frame) -> (bool, u8, Vec<u8>) {
    match frame {
        Frame::Text(fin, body) => (fin, protocol::op::TEXT_FRAME, body),
        Frame::Binary(fin, body) => (fin, protocol::op::BINARY_FRAME, body),
        Frame::Continuation(fin, body) => (fin, protocol::op::CONTINUATION_FRAME, body),
        Frame::Ping(body) => (true, protocol::op::PING, body),
        Frame::Pong(body) => (true, protocol::op::PONG, body),
        Frame::Close(code, reason) => {
            let mut body = code.to_be_bytes().to_vec();
            body.extend_from_slice(&reason);
            (true, protocol::op::CONNECTION_CLOSE, body)
        }
    }
}

fn reply(ctx: &ChannelHandle, pool: &DefaultBufferPool, role: WsRole, op_code: u8, payload: &[u8]) {
    let mut bytes = Vec::new();
    encoder::encode_frame(role, true, op_code, payload, &mut bytes);
    send_bytes(ctx, pool, &bytes);
}

fn send_bytes(ctx: &ChannelHandle, pool: &DefaultBufferPool, bytes: &[u8]) {
    let mut buffer = DefaultChunkedBuffer::new(pool.clone());
    buffer.write(bytes);
    let _ = ctx.send(Payload::Bytes(buffer));
}

fn restore(payload: &mut Payload, pos: usize) {
    if let Payload::Bytes(buffer) = payload {
        buffer.rewind_to(pos).expect("rewind to original position");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_to_wire_prepends_close_status_code() {
        let (fin, op_code, body) = frame_to_wire(Frame::Close(1000, b"bye".to_vec()));
        assert!(fin);
        assert_eq!(op_code, protocol::op::CONNECTION_CLOSE);
        assert_eq!(body, [[3u8, 232].as_slice(), b"bye"].concat());
    }

    #[test]
    fn frame_to_wire_forces_fin_on_control_frames() {
        let (fin, op_code, _) = frame_to_wire(Frame::Ping(Vec::new()));
        assert!(fin);
        assert_eq!(op_code, protocol::op::PING);
    }

    #[test]
    fn frame_to_wire_preserves_fin_on_data_frames() {
        let (fin, op_code, body) = frame_to_wire(Frame::Text(false, b"chunk".to_vec()));
        assert!(!fin);
        assert_eq!(op_code, protocol::op::TEXT_FRAME);
        assert_eq!(body, b"chunk");
    }
}
