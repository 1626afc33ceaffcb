//! Channel state machine and I/O loop shared by client, remote and listener
//! channels.
//!
//! Grounded on `boomnet::service::endpoint::Endpoint`'s lifecycle shape
//! (connect/read/write/disconnect), generalized from that trait's "caller
//! polls once per duty cycle" model into a push model driven by the
//! [`crate::reactor`] thread, per spec.md §4.4.

pub mod client;
pub mod listener;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use mio::{Interest, Registry, Token};

use crate::buffer::{DefaultBufferPool, DefaultChunkedBuffer};
use crate::error::{Error, Result};
use crate::pipeline::{ModuleHandle, Payload, Pipeline};
use crate::promise::Promise;
use crate::reactor::{Reactive, Reactor};
use crate::stream::tcp::TcpStream;
use crate::stream::{ConnectionInfo, ConnectionInfoProvider, NetworkStream};
use crate::util::{ReadOutcome, classify_read};

pub use client::ClientChannel;
pub use listener::{ListenerChannel, RemoteChannel};

const WRITE_SCRATCH_SIZE: usize = 8192;

/// Lifecycle of a client or remote channel's transport.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => unreachable!("invalid ConnectionState byte"),
        }
    }
}

/// `AtomicU8`-backed compare-and-set cell for [`ConnectionState`]. A
/// transition from a state other than the expected `from` is a caller
/// programming error and is surfaced as [`Error::StateConflict`].
pub struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::state_conflict("illegal channel state transition"))
    }
}

/// Lifecycle of a listener channel's bound socket.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ListenerState {
    Closed = 0,
    Binding = 1,
    Bound = 2,
    Closing = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Closed,
            1 => ListenerState::Binding,
            2 => ListenerState::Bound,
            3 => ListenerState::Closing,
            _ => unreachable!("invalid ListenerState byte"),
        }
    }
}

pub struct ListenerStateCell(AtomicU8);

impl ListenerStateCell {
    pub fn new(initial: ListenerState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn transition(&self, from: ListenerState, to: ListenerState) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::state_conflict("illegal listener state transition"))
    }
}

/// Public surface of a client or remote channel, as seen by pipeline
/// handlers and callers holding a [`ChannelHandle`].
pub trait Channel {
    /// Run `payload` through the outgoing pipeline and, once lowered to
    /// bytes, queue it for the socket. The returned promise fulfills with
    /// this same channel once the bytes have been written.
    fn send(&self, payload: Payload) -> Promise<ChannelHandle>;

    /// Begin a graceful shutdown. Idempotent: closing an already-closed
    /// channel fulfills immediately.
    fn close(&self) -> Promise<ChannelHandle>;

    fn is_active(&self) -> bool;

    fn connection_info(&self) -> ConnectionInfo;

    /// This channel's pipeline, backing [`Self::add_module`]/[`Self::remove_module`]
    /// below as well as direct `add_incoming_*`/`add_outgoing_*` calls.
    fn pipeline(&self) -> &Pipeline<ChannelHandle>;

    /// addModule (spec.md §4.4): run a protocol module's `install()` against
    /// this channel's pipeline, returning the [`ModuleHandle`] it built so
    /// the module can later be removed as a unit.
    fn add_module<F>(&self, install: F) -> ModuleHandle
    where
        F: FnOnce(&Pipeline<ChannelHandle>) -> ModuleHandle,
    {
        install(self.pipeline())
    }

    /// removeModule (spec.md §4.4): remove every handler `handle` registered.
    fn remove_module(&self, handle: ModuleHandle) {
        self.pipeline().remove_module(handle);
    }
}

/// A TLS upgrade requested at connect time, driven to completion between
/// `CONNECTING` and `CONNECTED` (spec.md §4.4's TLS upgrade step) before the
/// channel is promoted and `opened` is announced.
#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
pub(crate) struct ClientTlsRequest {
    pub server_name: String,
    pub rustls_config: Arc<rustls::ClientConfig>,
}

/// Shared state backing [`ClientChannel`] and [`RemoteChannel`]. Registers
/// itself with the process-wide [`Reactor`] and is driven entirely from
/// that thread's readiness callbacks; `send`/`close` may be called from any
/// thread and only touch the `Mutex`-guarded queue and stream, never block
/// on I/O themselves.
pub(crate) struct ChannelCore {
    state: ConnectionStateCell,
    token: Token,
    reactor: Reactor,
    pool: DefaultBufferPool,
    /// `None` only for the brief window inside `finish_connect` while the
    /// stream is being swapped from plain into its TLS wrapper.
    stream: Mutex<Option<NetworkStream<TcpStream>>>,
    tcp_connected: AtomicBool,
    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    tls: Option<ClientTlsRequest>,
    pipeline: Pipeline<ChannelHandle>,
    receive_buffer: Mutex<DefaultChunkedBuffer>,
    outgoing: Mutex<VecDeque<(DefaultChunkedBuffer, Promise<ChannelHandle>)>>,
    close_waiters: Mutex<Vec<Promise<ChannelHandle>>>,
    closing_started: AtomicBool,
    connect_promise: Mutex<Option<Promise<ChannelHandle>>>,
}

impl ChannelCore {
    fn new(stream: NetworkStream<TcpStream>, state: ConnectionState, pool: DefaultBufferPool, token: Token) -> Self {
        Self::new_with_pipeline(stream, state, pool, token, Pipeline::default())
    }

    pub(crate) fn new_with_pipeline(
        stream: NetworkStream<TcpStream>,
        state: ConnectionState,
        pool: DefaultBufferPool,
        token: Token,
        pipeline: Pipeline<ChannelHandle>,
    ) -> Self {
        Self {
            state: ConnectionStateCell::new(state),
            token,
            reactor: Reactor::global().clone(),
            receive_buffer: Mutex::new(DefaultChunkedBuffer::new(pool.clone())),
            pool,
            stream: Mutex::new(Some(stream)),
            tcp_connected: AtomicBool::new(false),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            tls: None,
            pipeline,
            outgoing: Mutex::new(VecDeque::new()),
            close_waiters: Mutex::new(Vec::new()),
            closing_started: AtomicBool::new(false),
            connect_promise: Mutex::new(None),
        }
    }

    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    pub(crate) fn set_tls_request(&mut self, request: ClientTlsRequest) {
        self.tls = Some(request);
    }
}

/// Cheap, clonable handle to a [`ChannelCore`]; this is the `C` context type
/// pipeline handlers are invoked with, and the type [`Channel`] is
/// implemented for.
pub struct ChannelHandle {
    core: Arc<ChannelCore>,
}

impl Clone for ChannelHandle {
    fn clone(&self) -> Self {
        Self { core: self.core.clone() }
    }
}

impl ChannelHandle {
    pub(crate) fn new(core: Arc<ChannelCore>) -> Self {
        Self { core }
    }

    pub fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        &self.core.pipeline
    }

    pub(crate) fn watch_connect(&self, promise: Promise<ChannelHandle>) {
        *self.core.connect_promise.lock().expect("connect promise mutex poisoned") = Some(promise);
    }

    fn with_stream<R>(&self, f: impl FnOnce(&mut NetworkStream<TcpStream>) -> R) -> R {
        let mut guard = self.core.stream.lock().expect("stream mutex poisoned");
        f(guard.as_mut().expect("stream missing outside the connect-time TLS swap"))
    }

    /// A failed connect (or TLS handshake) still runs the channel through
    /// [`Self::begin_close`] so `closed` fires exactly once per channel
    /// lifetime, even for a channel that never reached `opened`.
    fn fail_connect(&self, err: Error) {
        if let Some(promise) = self.core.connect_promise.lock().expect("connect promise mutex poisoned").take() {
            promise.complete(Err(err.clone()));
        }
        self.begin_close(Err(err));
    }

    fn promote_to_connected(&self) {
        if self.core.state.transition(ConnectionState::Connecting, ConnectionState::Connected).is_err() {
            return;
        }
        let _ = self.core.reactor.reregister(self.core.token, Interest::READABLE);
        self.core.pipeline.handle_opened(self);
        if let Some(promise) = self.core.connect_promise.lock().expect("connect promise mutex poisoned").take() {
            promise.complete(Ok(self.clone()));
        }
    }

    /// Driven by every readable/writable event while `CONNECTING`: first
    /// confirms the raw TCP handshake completed, then (if TLS was
    /// requested) swaps in a `TlsStream` and pumps its handshake until it
    /// reports done, only then promoting to `CONNECTED`.
    fn finish_connect(&self) {
        if !self.core.tcp_connected.load(Ordering::Acquire) {
            let connected = self.with_stream(|stream| match stream {
                NetworkStream::Plain(tcp) => tcp.peer_addr().map(|_| ()),
                #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
                NetworkStream::Tls(_) => Ok(()),
            });

            match connected {
                Ok(()) => self.core.tcp_connected.store(true, Ordering::Release),
                Err(err) => {
                    self.fail_connect(Error::Transport(err));
                    return;
                }
            }

            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            if let Some(request) = &self.core.tls {
                let mut guard = self.core.stream.lock().expect("stream mutex poisoned");
                let plain = match guard.take().expect("stream present") {
                    NetworkStream::Plain(tcp) => tcp,
                    other => {
                        *guard = Some(other);
                        return;
                    }
                };
                match crate::stream::tls::TlsStream::wrap_client_with_rustls_config(plain, &request.server_name, request.rustls_config.clone()) {
                    Ok(tls_stream) => *guard = Some(NetworkStream::Tls(tls_stream)),
                    Err(err) => {
                        drop(guard);
                        self.fail_connect(Error::Handshake(err.to_string()));
                        return;
                    }
                }
                drop(guard);
                let _ = self.core.reactor.reregister(self.core.token, Interest::READABLE | Interest::WRITABLE);
                return;
            }
        }

        // Either a plain stream with nothing left to do, or a TLS stream
        // (just swapped in above for a client, or already wrapped at
        // accept time for a server) that may still be mid-handshake.
        #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
        {
            let still_handshaking = self.with_stream(|stream| stream.is_tls_handshaking());
            if still_handshaking {
                if let Err(err) = self.with_stream(|stream| stream.drive_tls_handshake()) {
                    if err.kind() != io::ErrorKind::WouldBlock {
                        self.fail_connect(Error::Handshake(err.to_string()));
                    }
                    return;
                }
                if self.with_stream(|stream| stream.is_tls_handshaking()) {
                    return;
                }
            }
        }

        self.promote_to_connected();
    }

    fn on_readable_connected(&self) {
        let mut chunk = self.core.pool.borrow();
        let read_result = self.with_stream(|stream| classify_read(stream.read(chunk.remaining_mut())));

        match read_result {
            Ok(ReadOutcome::WouldBlock) => {}
            Ok(ReadOutcome::Eof) => {
                self.begin_close(Ok(()));
            }
            Ok(ReadOutcome::Read(n)) => {
                chunk.advance(n);
                let mut guard = self.core.receive_buffer.lock().expect("receive buffer mutex poisoned");
                guard.offer(chunk, 0, n);
                let buffer = std::mem::replace(&mut *guard, DefaultChunkedBuffer::new(self.core.pool.clone()));
                drop(guard);

                let mut payload = Payload::Bytes(buffer);
                self.core.pipeline.handle_incoming(self, &mut payload);
                if let Payload::Bytes(mut buffer) = payload {
                    buffer.flush();
                    *self.core.receive_buffer.lock().expect("receive buffer mutex poisoned") = buffer;
                }
            }
            Err(err) => {
                log::warn!("read failed on channel {:?}: {err}", self.core.token);
                self.begin_close(Err(Error::Transport(err)));
            }
        }
    }

    fn drain_outgoing(&self) {
        loop {
            let mut outgoing = self.core.outgoing.lock().expect("outgoing queue mutex poisoned");
            let Some((buffer, _)) = outgoing.front_mut() else {
                break;
            };

            if buffer.unread() == 0 {
                let (mut buffer, promise) = outgoing.pop_front().expect("checked above");
                drop(outgoing);
                buffer.close();
                promise.complete(Ok(self.clone()));
                continue;
            }

            let mut scratch = [0u8; WRITE_SCRATCH_SIZE];
            let n = buffer.read(&mut scratch);
            let write_result = self.with_stream(|stream| stream.write(&scratch[..n]));

            match write_result {
                Ok(written) if written == n => {
                    buffer.flush();
                }
                Ok(written) => {
                    buffer.rewind_to(buffer.read_pos() - (n - written)).expect("rewind within buffered range");
                    buffer.flush();
                    break;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    buffer.rewind_to(buffer.read_pos() - n).expect("rewind within buffered range");
                    break;
                }
                Err(err) => {
                    drop(outgoing);
                    log::warn!("write failed on channel {:?}: {err}", self.core.token);
                    self.begin_close(Err(Error::Transport(err)));
                    return;
                }
            }
        }

        let still_pending = !self.core.outgoing.lock().expect("outgoing queue mutex poisoned").is_empty();
        let interest = if still_pending { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE };
        let _ = self.core.reactor.reregister(self.core.token, interest);
    }

    fn begin_close(&self, reason: Result<()>) {
        if self.core.closing_started.swap(true, Ordering::AcqRel) {
            return;
        }

        let prior = self.core.state.get();
        let _ = self.core.state.transition(prior, ConnectionState::Disconnecting);

        let _ = self.core.reactor.deregister(self.core.token);
        if let Ok(mut guard) = self.core.stream.lock() {
            if let Some(stream) = guard.as_mut() {
                let _ = stream.flush();
            }
        }
        self.core.receive_buffer.lock().expect("receive buffer mutex poisoned").close();
        for (mut buffer, promise) in self.core.outgoing.lock().expect("outgoing queue mutex poisoned").drain(..) {
            buffer.close();
            promise.complete(Err(Error::state_conflict("channel closed before send completed")));
        }

        let _ = self.core.state.transition(ConnectionState::Disconnecting, ConnectionState::Disconnected);
        self.core.pipeline.handle_closed(self);

        let outcome = reason.map(|()| self.clone());
        for promise in self.core.close_waiters.lock().expect("close waiters mutex poisoned").drain(..) {
            promise.complete(outcome.clone());
        }
    }
}

impl Channel for ChannelHandle {
    fn send(&self, mut payload: Payload) -> Promise<ChannelHandle> {
        let promise = Promise::new();
        if self.core.state.get() != ConnectionState::Connected {
            promise.complete(Err(Error::state_conflict("send on a channel that is not connected")));
            return promise;
        }

        self.core.pipeline.handle_outgoing(self, &mut payload);
        match payload {
            Payload::Bytes(buffer) => {
                self.core.outgoing.lock().expect("outgoing queue mutex poisoned").push_back((buffer, promise.clone()));
                if let Err(err) = self.core.reactor.reregister(self.core.token, Interest::READABLE | Interest::WRITABLE) {
                    log::warn!("failed to schedule write on channel {:?}: {err}", self.core.token);
                }
            }
            _ => {
                log::warn!("outgoing payload was not lowered to bytes by any handler; dropping");
                promise.complete(Err(Error::Usage("outgoing payload not lowered to bytes")));
            }
        }
        promise
    }

    fn close(&self) -> Promise<ChannelHandle> {
        let promise = Promise::new();
        if self.core.state.get() == ConnectionState::Disconnected {
            promise.complete(Ok(self.clone()));
            return promise;
        }
        self.core.close_waiters.lock().expect("close waiters mutex poisoned").push(promise.clone());
        self.begin_close(Ok(()));
        promise
    }

    fn is_active(&self) -> bool {
        self.core.state.get() == ConnectionState::Connected
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.with_stream(|stream| stream.connection_info().clone())
    }

    fn pipeline(&self) -> &Pipeline<ChannelHandle> {
        self.pipeline()
    }
}

impl Reactive for ChannelHandle {
    fn register(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        self.with_stream(|stream| stream.register(registry, token, interest))
    }

    fn reregister(&self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        self.with_stream(|stream| stream.reregister(registry, token, interest))
    }

    fn deregister(&self, registry: &Registry) -> io::Result<()> {
        self.with_stream(|stream| stream.deregister(registry))
    }

    fn on_readable(&self) {
        match self.core.state.get() {
            ConnectionState::Connected => self.on_readable_connected(),
            ConnectionState::Connecting => self.finish_connect(),
            _ => {}
        }
    }

    fn on_writable(&self) {
        match self.core.state.get() {
            ConnectionState::Connecting => self.finish_connect(),
            ConnectionState::Connected => self.drain_outgoing(),
            _ => {}
        }
    }
}
