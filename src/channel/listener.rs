//! Listener channel: CLOSED → BINDING → BOUND → CLOSING, accepting
//! connections into [`RemoteChannel`]s whose pipeline starts as a clone of
//! the listener's own. Grounded on `boomnet::service::node::IONode`'s
//! accept bookkeeping, generalized from that type's poll-driven accept loop
//! into a readiness-pushed one.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::net::TcpListener as MioTcpListener;
use mio::{Interest, Registry, Token};

use crate::buffer::DefaultBufferPool;
use crate::channel::{Channel, ChannelCore, ChannelHandle, ConnectionState, ListenerState, ListenerStateCell};
use crate::error::{Error, Result};
use crate::pipeline::{Payload, Pipeline};
use crate::promise::Promise;
use crate::reactor::{Reactive, Reactor};
use crate::stream::tcp::TcpStream;
use crate::stream::{ConnectionInfo, NetworkStream};

#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
use crate::stream::tls::{ServerTlsConfig, TlsStream};

/// A connection accepted by a [`ListenerChannel`]. Shares the transport and
/// pipeline mechanics of [`super::client::ClientChannel`] but is created by
/// `accept` rather than `connect`. A plain `RemoteChannel` starts already
/// `CONNECTED`; a TLS one starts `CONNECTING` and is promoted once the
/// server-side handshake, driven by the same [`super::ChannelHandle::finish_connect`]
/// machinery `ClientChannel` uses, completes.
#[derive(Clone)]
pub struct RemoteChannel {
    handle: ChannelHandle,
}

impl RemoteChannel {
    pub fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        self.handle.pipeline()
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }
}

impl Channel for RemoteChannel {
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

struct Inner {
    listener: Mutex<MioTcpListener>,
    state: ListenerStateCell,
    token: Token,
    reactor: Reactor,
    pool: DefaultBufferPool,
    pipeline: Pipeline<ChannelHandle>,
    on_accept: Mutex<Option<Box<dyn Fn(&RemoteChannel) + Send + Sync>>>,
    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    tls: Option<Arc<ServerTlsConfig>>,
    closing_started: AtomicBool,
}

/// Binds a TCP listener and accepts connections into [`RemoteChannel`]s,
/// each starting with a clone of this listener's pipeline (spec.md §4.5).
#[derive(Clone)]
pub struct ListenerChannel {
    inner: Arc<Inner>,
}

impl ListenerChannel {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::bind_with_pool(addr, DefaultBufferPool::default())
    }

    pub fn bind_with_pool(addr: SocketAddr, pool: DefaultBufferPool) -> io::Result<Self> {
        #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
        {
            Self::bind_internal(addr, pool, None)
        }
        #[cfg(not(any(feature = "tls-native", feature = "tls-webpki")))]
        {
            Self::bind_internal(addr, pool)
        }
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    pub fn bind_tls(addr: SocketAddr, tls_config: ServerTlsConfig) -> io::Result<Self> {
        Self::bind_tls_with_pool(addr, tls_config, DefaultBufferPool::default())
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    pub fn bind_tls_with_pool(addr: SocketAddr, tls_config: ServerTlsConfig, pool: DefaultBufferPool) -> io::Result<Self> {
        Self::bind_internal(addr, pool, Some(Arc::new(tls_config)))
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    fn bind_internal(addr: SocketAddr, pool: DefaultBufferPool, tls: Option<Arc<ServerTlsConfig>>) -> io::Result<Self> {
        let std_listener = StdTcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let mio_listener = MioTcpListener::from_std(std_listener);

        let reactor = Reactor::global();
        let token = reactor.next_token();

        let inner = Arc::new(Inner {
            listener: Mutex::new(mio_listener),
            state: ListenerStateCell::new(ListenerState::Binding),
            token,
            reactor: reactor.clone(),
            pool,
            pipeline: Pipeline::default(),
            on_accept: Mutex::new(None),
            tls,
            closing_started: AtomicBool::new(false),
        });

        inner.state.transition(ListenerState::Binding, ListenerState::Bound)?;
        reactor.register(token, Interest::READABLE, Arc::new(ListenerReactive { inner: inner.clone() }) as Arc<dyn Reactive>)?;

        Ok(Self { inner })
    }

    #[cfg(not(any(feature = "tls-native", feature = "tls-webpki")))]
    fn bind_internal(addr: SocketAddr, pool: DefaultBufferPool) -> io::Result<Self> {
        let std_listener = StdTcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let mio_listener = MioTcpListener::from_std(std_listener);

        let reactor = Reactor::global();
        let token = reactor.next_token();

        let inner = Arc::new(Inner {
            listener: Mutex::new(mio_listener),
            state: ListenerStateCell::new(ListenerState::Binding),
            token,
            reactor: reactor.clone(),
            pool,
            pipeline: Pipeline::default(),
            on_accept: Mutex::new(None),
            closing_started: AtomicBool::new(false),
        });

        inner.state.transition(ListenerState::Binding, ListenerState::Bound)?;
        reactor.register(token, Interest::READABLE, Arc::new(ListenerReactive { inner: inner.clone() }) as Arc<dyn Reactive>)?;

        Ok(Self { inner })
    }

    pub fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        &self.inner.pipeline
    }

    /// Install a callback invoked once per accepted connection, right
    /// before the `RemoteChannel` announces `opened` on its own pipeline.
    /// Used by callers that need to track live `RemoteChannel`s (e.g. to
    /// broadcast to all of them).
    pub fn on_accept<F>(&self, callback: F)
    where
        F: Fn(&RemoteChannel) + Send + Sync + 'static,
    {
        *self.inner.on_accept.lock().expect("listener on_accept mutex poisoned") = Some(Box::new(callback));
    }

    pub fn is_bound(&self) -> bool {
        self.inner.state.get() == ListenerState::Bound
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.listener.lock().expect("listener mutex poisoned").local_addr()
    }

    pub fn close(&self) -> Result<()> {
        if self.inner.closing_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.state.transition(ListenerState::Bound, ListenerState::Closing).ok();
        self.inner.reactor.deregister(self.inner.token).map_err(Error::Transport)?;
        self.inner.state.transition(ListenerState::Closing, ListenerState::Closed).ok();
        Ok(())
    }
}

struct ListenerReactive {
    inner: Arc<Inner>,
}

impl Reactive for ListenerReactive {
    fn register(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        registry.register(&mut *self.inner.listener.lock().expect("listener mutex poisoned"), token, interest)
    }

    fn reregister(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        registry.reregister(&mut *self.inner.listener.lock().expect("listener mutex poisoned"), token, interest)
    }

    fn deregister(&self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut *self.inner.listener.lock().expect("listener mutex poisoned"))
    }

    fn on_readable(&self) {
        loop {
            let accepted = self.inner.listener.lock().expect("listener mutex poisoned").accept();
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::warn!("accept failed on listener {:?}: {err}", self.inner.token);
                    break;
                }
            };

            let connection_info = ConnectionInfo::new(peer.ip().to_string(), peer.port());
            let tcp = TcpStream::new(stream, connection_info);

            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            let (network_stream, needs_handshake) = match &self.inner.tls {
                Some(tls_config) => match TlsStream::wrap_server(tcp, tls_config) {
                    Ok(tls_stream) => (NetworkStream::Tls(tls_stream), true),
                    Err(err) => {
                        log::warn!("server tls wrap failed on listener {:?}: {err}", self.inner.token);
                        continue;
                    }
                },
                None => (NetworkStream::Plain(tcp), false),
            };
            #[cfg(not(any(feature = "tls-native", feature = "tls-webpki")))]
            let (network_stream, needs_handshake) = (NetworkStream::Plain(tcp), false);

            let remote_token = self.inner.reactor.next_token();
            let forked_pipeline = self.inner.pipeline.fork();
            let initial_state = if needs_handshake { ConnectionState::Connecting } else { ConnectionState::Connected };
            let core = ChannelCore::new_with_pipeline(network_stream, initial_state, self.inner.pool.clone(), remote_token, forked_pipeline);
            let handle = ChannelHandle::new(Arc::new(core));
            let remote = RemoteChannel { handle: handle.clone() };

            let interest = if needs_handshake { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE };
            if let Err(err) = self.inner.reactor.register(remote_token, interest, Arc::new(handle.clone()) as Arc<dyn Reactive>) {
                log::warn!("failed to register accepted connection on listener {:?}: {err}", self.inner.token);
                continue;
            }

            if let Some(callback) = self.inner.on_accept.lock().expect("listener on_accept mutex poisoned").as_ref() {
                callback(&remote);
            }

            if needs_handshake {
                // `opened` fires later, once `finish_connect` observes the
                // handshake complete on a subsequent readiness event.
            } else {
                handle.pipeline().handle_opened(&handle);
            }
        }
    }

    fn on_writable(&self) {}
}
