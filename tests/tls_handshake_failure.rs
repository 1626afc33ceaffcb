//! TLS handshake failure: a client with default certificate verification
//! refuses a self-signed server cert. The connect promise resolves with a
//! handshake error, the client never reaches `CONNECTED`, and `closed`
//! fires exactly once even though `opened` never fired.

#![cfg(any(feature = "tls-native", feature = "tls-webpki"))]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

use pipechan::buffer::DefaultBufferPool;
use pipechan::channel::{Channel, ChannelHandle, ClientChannel, ListenerChannel};
use pipechan::promise::Promise;
use pipechan::stream::tls::{ServerTlsConfig, TlsConfig};
use pipechan::stream::ConnectionInfo;
use pipechan::Error;

#[test]
fn tls_handshake_failure_closes_channel() {
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(vec!["localhost".into()]).expect("rcgen failure");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let server_config = ServerTlsConfig::from_cert_chain(vec![cert.der().clone()], key).expect("server tls config");

    let listener = ListenerChannel::bind_tls("127.0.0.1:0".parse::<SocketAddr>().unwrap(), server_config).expect("bind tls");
    let addr = listener.local_addr().expect("bound addr");

    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    let tls_config = TlsConfig::new();
    let (client, connect_promise) =
        ClientChannel::connect_tls_with_pool(info, "localhost", &tls_config, DefaultBufferPool::default()).expect("connect_tls");

    let closed_count = Arc::new(AtomicUsize::new(0));
    let closed_count_handler = closed_count.clone();
    // `fail_connect` completes `connect_promise` before `begin_close` runs
    // `closed` handlers on the reactor thread, so waiting on the promise
    // alone can race ahead of this counter. A dedicated promise, completed
    // from inside the handler itself, gives the main thread something to
    // actually wait on.
    let closed_signal: Promise<()> = Promise::new();
    let closed_signal_handler = closed_signal.clone();
    client.pipeline().add_closed_last(move |_ctx: &ChannelHandle| {
        closed_count_handler.fetch_add(1, Ordering::SeqCst);
        closed_signal_handler.complete(Ok(()));
    });

    let result = connect_promise.wait_timeout(Duration::from_secs(5)).expect_err("handshake against an untrusted self-signed cert should fail");
    assert!(matches!(result, Error::Handshake(_) | Error::Transport(_)), "unexpected error variant: {result:?}");

    closed_signal.wait_timeout(Duration::from_secs(5)).expect("closed handler should fire after a failed handshake");

    assert!(!client.is_active());
    assert_eq!(closed_count.load(Ordering::SeqCst), 1, "closed should fire exactly once");
}
