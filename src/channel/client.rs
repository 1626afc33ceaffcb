//! Client-initiated channel: DISCONNECTED → CONNECTING → CONNECTED →
//! DISCONNECTING, grounded on `boomnet::stream::tcp::TcpStream`'s
//! non-blocking `BindAndConnect` idiom.

use std::io;
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;

use mio::Interest;

use crate::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use crate::channel::{Channel, ChannelCore, ChannelHandle, ConnectionState};
use crate::pipeline::{Payload, Pipeline};
use crate::promise::Promise;
use crate::reactor::{Reactive, Reactor};
use crate::stream::tcp::TcpStream;
use crate::stream::{BindAndConnect, ConnectionInfo, NetworkStream};

#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
use crate::channel::ClientTlsRequest;
#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
use crate::stream::tls::TlsConfig;

/// A channel dialed out to a remote endpoint. Cheap to clone; every clone
/// shares the same underlying [`ChannelCore`].
#[derive(Clone)]
pub struct ClientChannel {
    handle: ChannelHandle,
}

impl ClientChannel {
    /// Connect without TLS, using a private default buffer pool.
    pub fn connect(info: ConnectionInfo) -> io::Result<(Self, Promise<ChannelHandle>)> {
        Self::connect_with_pool(info, DefaultBufferPool::default())
    }

    /// Connect without TLS, sharing `pool` with other channels in the
    /// process (spec.md §9's "no global pool" resolution: callers thread a
    /// pool handle through explicitly).
    pub fn connect_with_pool(info: ConnectionInfo, pool: DefaultBufferPool) -> io::Result<(Self, Promise<ChannelHandle>)> {
        #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
        {
            Self::start(info, pool, None)
        }
        #[cfg(not(any(feature = "tls-native", feature = "tls-webpki")))]
        {
            Self::start(info, pool)
        }
    }

    /// Connect and upgrade to TLS once the raw transport completes, before
    /// announcing `opened` (spec.md §4.4's TLS upgrade step).
    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    pub fn connect_tls(info: ConnectionInfo, server_name: &str, tls_config: &TlsConfig) -> io::Result<(Self, Promise<ChannelHandle>)> {
        Self::connect_tls_with_pool(info, server_name, tls_config, DefaultBufferPool::default())
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    pub fn connect_tls_with_pool(
        info: ConnectionInfo,
        server_name: &str,
        tls_config: &TlsConfig,
        pool: DefaultBufferPool,
    ) -> io::Result<(Self, Promise<ChannelHandle>)> {
        let request = ClientTlsRequest { server_name: server_name.to_owned(), rustls_config: Arc::new(tls_config.as_rustls().clone()) };
        Self::start(info, pool, Some(request))
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    fn start(info: ConnectionInfo, pool: DefaultBufferPool, tls: Option<ClientTlsRequest>) -> io::Result<(Self, Promise<ChannelHandle>)> {
        let std_stream = StdTcpStream::bind_and_connect(&info)?;
        let tcp = TcpStream::from_std(std_stream, info);

        let reactor = Reactor::global();
        let token = reactor.next_token();
        let mut core = ChannelCore::new(NetworkStream::Plain(tcp), ConnectionState::Connecting, pool, token);
        if let Some(request) = tls {
            core.set_tls_request(request);
        }
        let handle = ChannelHandle::new(Arc::new(core));

        let promise = Promise::new();
        handle.watch_connect(promise.clone());
        reactor.register(token, Interest::WRITABLE, Arc::new(handle.clone()) as Arc<dyn Reactive>)?;

        Ok((Self { handle }, promise))
    }

    #[cfg(not(any(feature = "tls-native", feature = "tls-webpki")))]
    fn start(info: ConnectionInfo, pool: DefaultBufferPool) -> io::Result<(Self, Promise<ChannelHandle>)> {
        let std_stream = StdTcpStream::bind_and_connect(&info)?;
        let tcp = TcpStream::from_std(std_stream, info);

        let reactor = Reactor::global();
        let token = reactor.next_token();
        let core = ChannelCore::new(NetworkStream::Plain(tcp), ConnectionState::Connecting, pool, token);
        let handle = ChannelHandle::new(Arc::new(core));

        let promise = Promise::new();
        handle.watch_connect(promise.clone());
        reactor.register(token, Interest::WRITABLE, Arc::new(handle.clone()) as Arc<dyn Reactive>)?;

        Ok((Self { handle }, promise))
    }

    pub fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        self.handle.pipeline()
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Convenience helper lowering raw bytes straight to an outgoing
    /// `Payload::Bytes` without going through a typed pipeline handler.
    pub fn send_bytes(&self, bytes: &[u8], pool: &DefaultBufferPool) -> Promise<ChannelHandle> {
        let mut buffer = DefaultChunkedBuffer::new(pool.clone());
        buffer.write(bytes);
        self.send(Payload::Bytes(buffer))
    }
}

impl Channel for ClientChannel {
    fn send(&self, payload: Payload) -> Promise<ChannelHandle> {
        self.handle.send(payload)
    }

    fn close(&self) -> Promise<ChannelHandle> {
        self.handle.close()
    }

    fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.handle.connection_info()
    }

    fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        self.pipeline()
    }
}
