//! Plain TCP and (optionally) TLS streams the channel core is built on.

use std::fmt::{Display, Formatter};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::vec;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};
use url::{ParseError, Url};

pub mod tcp;
#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
pub mod tls;

#[cfg(target_os = "linux")]
const EINPROGRESS: i32 = 115;
#[cfg(target_os = "macos")]
const EINPROGRESS: i32 = 36;

/// Creates a non-blocking `TcpStream` and starts (but does not wait out) the
/// connect handshake, so the caller can register it with the reactor and
/// learn of completion via a writable readiness event.
pub trait BindAndConnect {
    fn bind_and_connect<A>(addr: A) -> io::Result<StdTcpStream>
    where
        A: ToSocketAddrs,
    {
        Self::bind_and_connect_with_socket_config(addr, |_| Ok(()))
    }

    fn bind_and_connect_with_socket_config<A, F>(addr: A, socket_config: F) -> io::Result<StdTcpStream>
    where
        A: ToSocketAddrs,
        F: FnOnce(&Socket) -> io::Result<()>;
}

impl BindAndConnect for StdTcpStream {
    fn bind_and_connect_with_socket_config<A, F>(addr: A, socket_config: F) -> io::Result<StdTcpStream>
    where
        A: ToSocketAddrs,
        F: FnOnce(&Socket) -> io::Result<()>,
    {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;

        socket_config(&socket)?;

        match socket.connect(
            &addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| io::Error::other("unable to resolve socket address"))?
                .into(),
        ) {
            Ok(()) => Ok(socket.into()),
            Err(err) if err.raw_os_error() == Some(EINPROGRESS) => Ok(socket.into()),
            Err(err) => Err(err),
        }
    }
}

/// Destination a `ClientChannel` connects to.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self { host: host.as_ref().to_string(), port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl ToSocketAddrs for ConnectionInfo {
    type Iter = vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        format!("{}:{}", self.host, self.port).to_socket_addrs()
    }
}

impl Display for ConnectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<Url> for ConnectionInfo {
    type Error = io::Error;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        Ok(ConnectionInfo {
            host: url.host_str().ok_or_else(|| io::Error::other("host not present"))?.to_owned(),
            port: url.port_or_known_default().ok_or_else(|| io::Error::other("port not present"))?,
        })
    }
}

impl TryFrom<Result<Url, ParseError>> for ConnectionInfo {
    type Error = io::Error;

    fn try_from(result: Result<Url, ParseError>) -> Result<Self, Self::Error> {
        match result {
            Ok(url) => url.try_into(),
            Err(err) => Err(io::Error::other(err)),
        }
    }
}

pub trait ConnectionInfoProvider {
    fn connection_info(&self) -> &ConnectionInfo;
}

/// Either a plain TCP stream or a TLS-wrapped one, selected once at connect
/// time and then driven uniformly by the channel core.
#[allow(clippy::large_enum_variant)]
pub enum NetworkStream<S> {
    Plain(S),
    #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
    Tls(tls::TlsStream<S>),
}

impl<S: Read + Write> Read for NetworkStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NetworkStream::Plain(stream) => stream.read(buf),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl<S: Read + Write> Write for NetworkStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetworkStream::Plain(stream) => stream.write(buf),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetworkStream::Plain(stream) => stream.flush(),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => stream.flush(),
        }
    }
}

impl<S: Source> Source for NetworkStream<S> {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            NetworkStream::Plain(stream) => registry.register(stream, token, interests),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => registry.register(stream, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            NetworkStream::Plain(stream) => registry.reregister(stream, token, interests),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => registry.reregister(stream, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            NetworkStream::Plain(stream) => registry.deregister(stream),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => registry.deregister(stream),
        }
    }
}

impl<S: ConnectionInfoProvider> ConnectionInfoProvider for NetworkStream<S> {
    fn connection_info(&self) -> &ConnectionInfo {
        match self {
            NetworkStream::Plain(stream) => stream.connection_info(),
            #[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
            NetworkStream::Tls(stream) => stream.connection_info(),
        }
    }
}

#[cfg(any(feature = "tls-native", feature = "tls-webpki"))]
impl<S: Read + Write> NetworkStream<S> {
    /// `true` only for the `Tls` variant while its handshake hasn't
    /// completed yet; a `Plain` stream is never "handshaking".
    pub fn is_tls_handshaking(&self) -> bool {
        match self {
            NetworkStream::Plain(_) => false,
            NetworkStream::Tls(stream) => stream.is_handshaking(),
        }
    }

    /// Pump a not-yet-complete TLS handshake one step. A no-op on `Plain`.
    pub fn drive_tls_handshake(&mut self) -> io::Result<()> {
        match self {
            NetworkStream::Plain(_) => Ok(()),
            NetworkStream::Tls(stream) => stream.drive_handshake(),
        }
    }
}
