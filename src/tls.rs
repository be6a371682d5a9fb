//! TLS support, gated behind the `tls` feature.
//!
//! Grounded in `nni_http_server_set_tls` from the engine this crate's
//! shape is distilled from: a server-side TLS configuration is an opaque,
//! reference-counted value that may only be attached before the first
//! `start`, and replacing it releases whatever was attached before.

#![cfg(feature = "tls")]

use std::io;
use std::sync::Arc;

use futures::{Future, Poll};
use rustls::ServerConfig;
use tokio_core::io::Io;
use tokio_core::net::TcpStream;
use tokio_rustls::{AcceptAsync, ServerConfigExt};

/// A server-mode TLS configuration, ready to be attached to a
/// [`ServerInstance`](::server::ServerInstance) via `set_tls`.
#[derive(Clone)]
pub struct TlsConfig(pub(crate) Arc<ServerConfig>);

impl TlsConfig {
    pub fn new(config: ServerConfig) -> TlsConfig {
        TlsConfig(Arc::new(config))
    }
}

/// The concrete stream type produced once a plain TCP connection has
/// completed the TLS server handshake.
pub type TlsStream = ::tokio_rustls::TlsStream<TcpStream, ::rustls::ServerSession>;

/// Begin the server-side TLS handshake over a freshly accepted socket.
pub fn accept(socket: TcpStream, config: &TlsConfig) -> AcceptAsync<TcpStream> {
    config.0.accept_async(socket)
}

/// Either a plain or a TLS-wrapped accepted connection, used as the
/// server's single concrete [`Transport`](::handler::Transport) so one
/// registry and one session state machine can serve both `http`/`ws` and
/// `https`/`wss` listeners.
pub enum ServerTransport {
    Plain(TcpStream),
    Tls(TlsStream),
}

impl io::Read for ServerTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            ServerTransport::Plain(ref mut s) => s.read(buf),
            ServerTransport::Tls(ref mut s) => s.read(buf),
        }
    }
}

impl io::Write for ServerTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            ServerTransport::Plain(ref mut s) => s.write(buf),
            ServerTransport::Tls(ref mut s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match *self {
            ServerTransport::Plain(ref mut s) => s.flush(),
            ServerTransport::Tls(ref mut s) => s.flush(),
        }
    }
}

impl Io for ServerTransport {
    fn poll_read(&mut self) -> ::futures::Async<()> {
        match *self {
            ServerTransport::Plain(ref mut s) => s.poll_read(),
            ServerTransport::Tls(ref mut s) => s.poll_read(),
        }
    }
    fn poll_write(&mut self) -> ::futures::Async<()> {
        match *self {
            ServerTransport::Plain(ref mut s) => s.poll_write(),
            ServerTransport::Tls(ref mut s) => s.poll_write(),
        }
    }
}

/// Future that resolves a freshly accepted socket into a [`ServerTransport`],
/// performing the TLS handshake first when `config` is set.
pub enum Handshake {
    Ready(Option<TcpStream>),
    Tls(AcceptAsync<TcpStream>),
}

impl Handshake {
    pub fn plain(socket: TcpStream) -> Handshake {
        Handshake::Ready(Some(socket))
    }

    pub fn tls(socket: TcpStream, config: &TlsConfig) -> Handshake {
        Handshake::Tls(accept(socket, config))
    }
}

impl Future for Handshake {
    type Item = ServerTransport;
    type Error = io::Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        match *self {
            Handshake::Ready(ref mut s) => {
                let s = s.take().expect("Handshake polled after completion");
                Ok(::futures::Async::Ready(ServerTransport::Plain(s)))
            }
            Handshake::Tls(ref mut fut) => fut.poll().map(|a| a.map(ServerTransport::Tls)),
        }
    }
}
