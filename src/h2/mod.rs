//! HTTP/2 sketch: SETTINGS and HEADERS framing plus a static-table-only
//! HPACK codec (see [`hpack`]), installed through the pipeline's generic
//! `Payload::User` escape hatch rather than a dedicated `Payload` variant —
//! demonstrating that a second protocol can compose on the core without the
//! core needing to know its name. Intentionally incomplete, matching this
//! being an example module rather than a conformant peer: no stream
//! multiplexing, flow control, CONTINUATION frames, or connection preface
//! handling.

pub mod frame;
pub mod hpack;
pub mod settings;

use std::any::TypeId;

use crate::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use crate::channel::{Channel, ChannelHandle};
use crate::pipeline::{ModuleHandle, Payload, PayloadKind, Pipeline};
use frame::{FRAME_HEADER_LEN, FrameHeader, frame_type, headers_flag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum H2Frame {
    Settings(Vec<(u16, u32)>),
    Headers { stream_id: u32, end_stream: bool, end_headers: bool, block: Vec<u8> },
}

pub enum FrameOutcome {
    Complete(H2Frame, usize),
    Incomplete,
    Malformed(&'static str),
}

pub fn parse_frame(bytes: &[u8]) -> FrameOutcome {
    let Some(header) = frame::parse_frame_header(bytes) else {
        return FrameOutcome::Incomplete;
    };
    let total = FRAME_HEADER_LEN + header.length as usize;
    if bytes.len() < total {
        return FrameOutcome::Incomplete;
    }
    let payload = &bytes[FRAME_HEADER_LEN..total];

    let frame = match header.frame_type {
        frame_type::SETTINGS => match settings::decode_settings_payload(payload) {
            Ok(settings) => H2Frame::Settings(settings),
            Err(reason) => return FrameOutcome::Malformed(reason),
        },
        frame_type::HEADERS => H2Frame::Headers {
            stream_id: header.stream_id,
            end_stream: header.flags & headers_flag::END_STREAM != 0,
            end_headers: header.flags & headers_flag::END_HEADERS != 0,
            block: payload.to_vec(),
        },
        _ => return FrameOutcome::Malformed("unsupported frame type"),
    };
    FrameOutcome::Complete(frame, total)
}

pub fn encode_frame(frame: &H2Frame, out: &mut Vec<u8>) {
    match frame {
        H2Frame::Settings(settings) => {
            let mut payload = Vec::new();
            settings::encode_settings_payload(settings, &mut payload);
            frame::encode_frame_header(
                &FrameHeader { length: payload.len() as u32, frame_type: frame_type::SETTINGS, flags: 0, stream_id: 0 },
                out,
            );
            out.extend_from_slice(&payload);
        }
        H2Frame::Headers { stream_id, end_stream, end_headers, block } => {
            let mut flags = 0;
            if *end_stream {
                flags |= headers_flag::END_STREAM;
            }
            if *end_headers {
                flags |= headers_flag::END_HEADERS;
            }
            frame::encode_frame_header(
                &FrameHeader { length: block.len() as u32, frame_type: frame_type::HEADERS, flags, stream_id: *stream_id },
                out,
            );
            out.extend_from_slice(block);
        }
    }
}

/// Splices framing into `pipeline`: incoming bytes are parsed into
/// [`H2Frame`]s (a malformed or unsupported frame closes the channel),
/// outgoing `H2Frame`s sent via [`Channel::send`] are lowered back to bytes.
/// Returns a [`ModuleHandle`] that later removes both handlers as a unit via
/// [`Pipeline::remove_module`].
pub fn install(pipeline: &Pipeline<ChannelHandle>, pool: DefaultBufferPool) -> ModuleHandle {
    let mut module = ModuleHandle::new();

    module.push_incoming(pipeline.add_incoming_first(PayloadKind::Bytes, move |ctx: &ChannelHandle, payload: &mut Payload| {
        incoming(ctx, payload);
    }));

    module.push_outgoing(pipeline.add_outgoing_last(PayloadKind::User(TypeId::of::<H2Frame>()), move |_ctx: &ChannelHandle, payload: &mut Payload| {
        outgoing(&pool, payload);
    }));

    module
}

fn incoming(ctx: &ChannelHandle, payload: &mut Payload) {
    let original_pos;
    let mut scratch = Vec::new();
    if let Payload::Bytes(buffer) = payload {
        original_pos = buffer.read_pos();
        buffer.copy_unread_to(&mut scratch);
    } else {
        return;
    }

    match parse_frame(&scratch) {
        FrameOutcome::Complete(frame, consumed) => {
            if let Payload::Bytes(buffer) = payload {
                buffer.rewind_to(original_pos + consumed).expect("consumed within buffered range");
            }
            *payload = Payload::User(Box::new(frame));
        }
        FrameOutcome::Incomplete => restore(payload, original_pos),
        FrameOutcome::Malformed(reason) => {
            log::warn!("malformed http/2 frame: {reason}");
            restore(payload, original_pos);
            ctx.close();
        }
    }
}

fn outgoing(pool: &DefaultBufferPool, payload: &mut Payload) {
    let Some(frame) = payload.downcast_user::<H2Frame>() else {
        return;
    };
    let mut bytes = Vec::new();
    encode_frame(frame, &mut bytes);
    let mut buffer = DefaultChunkedBuffer::new(pool.clone());
    buffer.write(&bytes);
    *payload = Payload::Bytes(buffer);
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
    fn round_trips_a_settings_frame() {
        let frame = H2Frame::Settings(vec![(settings::id::MAX_CONCURRENT_STREAMS, 64)]);
        let mut bytes = Vec::new();
        encode_frame(&frame, &mut bytes);
        match parse_frame(&bytes) {
            FrameOutcome::Complete(parsed, consumed) => {
                assert_eq!(parsed, frame);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a complete decode"),
        }
    }

    #[test]
    fn round_trips_a_headers_frame() {
        let frame = H2Frame::Headers { stream_id: 3, end_stream: false, end_headers: true, block: vec![0x80 | 2] };
        let mut bytes = Vec::new();
        encode_frame(&frame, &mut bytes);
        match parse_frame(&bytes) {
            FrameOutcome::Complete(parsed, consumed) => {
                assert_eq!(parsed, frame);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a complete decode"),
        }
    }

    #[test]
    fn incomplete_frame_waits_for_the_rest_of_the_payload() {
        let frame = H2Frame::Settings(vec![(settings::id::ENABLE_PUSH, 0)]);
        let mut bytes = Vec::new();
        encode_frame(&frame, &mut bytes);
        assert!(matches!(parse_frame(&bytes[..bytes.len() - 1]), FrameOutcome::Incomplete));
    }

    #[test]
    fn unknown_frame_type_is_malformed() {
        let header = FrameHeader { length: 0, frame_type: 0x2, flags: 0, stream_id: 0 };
        let mut bytes = Vec::new();
        frame::encode_frame_header(&header, &mut bytes);
        assert!(matches!(parse_frame(&bytes), FrameOutcome::Malformed(_)));
    }
}
