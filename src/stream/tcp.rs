//! Wrapper over `mio::net::TcpStream`.

use std::io;
use std::io::{Read, Write};

use mio::event::Source;
use mio::net::TcpStream as MioTcpStream;
use mio::{Interest, Registry, Token};

use crate::stream::{ConnectionInfo, ConnectionInfoProvider};

/// Wraps `mio::net::TcpStream` and carries the [`ConnectionInfo`] it was
/// dialed (or accepted) with, so higher layers (TLS, HTTP) can recover the
/// server name / peer description without threading it through separately.
pub struct TcpStream {
    inner: MioTcpStream,
    connection_info: ConnectionInfo,
}

impl TcpStream {
    pub fn new(stream: MioTcpStream, connection_info: ConnectionInfo) -> Self {
        Self { inner: stream, connection_info }
    }

    pub fn from_std(stream: std::net::TcpStream, connection_info: ConnectionInfo) -> Self {
        Self::new(MioTcpStream::from_std(stream), connection_info)
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.peer_addr()
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Source for TcpStream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        registry.register(&mut self.inner, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        registry.reregister(&mut self.inner, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.inner)
    }
}

impl ConnectionInfoProvider for TcpStream {
    fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }
}
