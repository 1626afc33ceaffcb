//! Echo server round-trip: a listener echoes received bytes back to the
//! client that sent them, exercising the full reactor/channel/pipeline
//! stack across a real loopback socket pair.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::time::Duration;

use pipechan::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use pipechan::channel::{Channel, ChannelHandle, ClientChannel, ListenerChannel};
use pipechan::pipeline::{Payload, PayloadKind};
use pipechan::stream::ConnectionInfo;

#[test]
fn echo_server_round_trip() {
    let listener = ListenerChannel::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).expect("bind");
    let pool = DefaultBufferPool::default();

    let echo_pool = pool.clone();
    listener.on_accept(move |remote| {
        let pool = echo_pool.clone();
        remote.pipeline().add_incoming_last(PayloadKind::Bytes, move |ctx: &ChannelHandle, payload: &mut Payload| {
            if let Payload::Bytes(buffer) = payload {
                let mut bytes = Vec::new();
                buffer.copy_unread_to(&mut bytes);
                let mut out = DefaultChunkedBuffer::new(pool.clone());
                out.write(&bytes);
                let _ = ctx.send(Payload::Bytes(out));
            }
        });
    });

    let addr = listener.local_addr().expect("bound addr");
    let (client, connect_promise) = ClientChannel::connect_with_pool(ConnectionInfo::new(addr.ip().to_string(), addr.port()), pool.clone())
        .expect("connect");
    connect_promise.wait_timeout(Duration::from_secs(5)).expect("client connected");

    let (tx, rx) = mpsc::channel();
    client.pipeline().add_incoming_last(PayloadKind::Bytes, move |_ctx: &ChannelHandle, payload: &mut Payload| {
        if let Payload::Bytes(buffer) = payload {
            let mut bytes = Vec::new();
            buffer.copy_unread_to(&mut bytes);
            let _ = tx.send(bytes);
        }
    });

    client.send_bytes(b"a test!", &pool);

    let echoed = rx.recv_timeout(Duration::from_secs(5)).expect("echo within 5 seconds");
    assert_eq!(echoed, b"a test!");
}
