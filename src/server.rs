//! The server instance: a listener bound to one address, a handler
//! registry, and the live set of sessions it is currently serving.
//!
//! Grounded in `nni_http_server_init`/`_start`/`_stop`/`_fini` from the
//! engine this crate's shape is distilled from. The accept loop itself has
//! no direct analogue in the teacher (a client-only library), so its shape
//! follows the standard `tokio-core` idiom for the same crate version the
//! teacher already depends on: `TcpListener::incoming()` as a `Stream`,
//! driven by `Handle::spawn` per accepted connection.

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};

use futures::{Future, Stream};
use tokio_core::net::{TcpListener, TcpStream};
use tokio_core::reactor::Handle;
use url::Url;

use error::{Error, Result};
use registry::Registry;
use session::{Session, SessionHandle};

#[cfg(feature = "tls")]
use tls::{Handshake, TlsConfig};

/// The transport type sessions run over.
///
/// Without the `tls` feature this is plain `TcpStream`; with it, it is
/// [`tls::ServerTransport`](::tls::ServerTransport), which can hold either
/// a plain or a TLS-wrapped connection so one registry serves both
/// `http`/`ws` and `https`/`wss` listeners.
#[cfg(not(feature = "tls"))]
pub type Transport = TcpStream;
#[cfg(feature = "tls")]
pub type Transport = ::tls::ServerTransport;

enum Scheme {
    Http,
    Ws,
    #[cfg(feature = "tls")]
    Https,
    #[cfg(feature = "tls")]
    Wss,
}

impl Scheme {
    fn parse(s: &str) -> Result<Scheme> {
        match s {
            "http" => Ok(Scheme::Http),
            "ws" => Ok(Scheme::Ws),
            #[cfg(feature = "tls")]
            "https" => Ok(Scheme::Https),
            #[cfg(feature = "tls")]
            "wss" => Ok(Scheme::Wss),
            "https" | "wss" => Err(Error::NotSupported("TLS support is not compiled in")),
            other => Err(Error::InvalidAddress(other.to_string())),
        }
    }
}

struct Shared {
    registry: Arc<Mutex<Registry<Transport>>>,
    live: Mutex<LiveState>,
    drained: Condvar,
    #[cfg(feature = "tls")]
    tls: Mutex<Option<TlsConfig>>,
}

struct LiveState {
    starts: usize,
    closed: bool,
    sessions: Vec<Arc<SessionHandle>>,
}

/// One bound address, its registry, and its in-flight sessions.
///
/// Normally obtained through a [`ServerDirectory`](::directory::ServerDirectory)
/// rather than constructed directly, so that repeated requests for the
/// same address share one listener.
pub struct ServerInstance {
    addr: SocketAddr,
    handle: Handle,
    shared: Arc<Shared>,
}

impl ServerInstance {
    /// Parse `url`, validate its scheme, and resolve its address -- but do
    /// not bind a listener yet. Binding happens on the first `start`.
    pub fn construct(url: &str, handle: Handle) -> Result<ServerInstance> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let _scheme = Scheme::parse(parsed.scheme())?;

        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidAddress("URL has no host".to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidAddress("URL has no resolvable port".to_string()))?;
        // Name resolution is expected to be fast (numeric or local); this
        // engine never resolves against a remote DNS server.
        let addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .or_else(|_| {
                use std::net::ToSocketAddrs;
                (host, port)
                    .to_socket_addrs()
                    .map_err(Error::Io)
                    .and_then(|mut it| it.next().ok_or_else(|| Error::InvalidAddress(url.to_string())))
            })?;

        Ok(ServerInstance {
            addr,
            handle,
            shared: Arc::new(Shared {
                registry: Arc::new(Mutex::new(Registry::new())),
                live: Mutex::new(LiveState {
                    starts: 0,
                    closed: false,
                    sessions: Vec::new(),
                }),
                drained: Condvar::new(),
                #[cfg(feature = "tls")]
                tls: Mutex::new(None),
            }),
        })
    }

    /// The registry backing this instance, for registering handlers before
    /// (or after) `start`.
    pub fn registry(&self) -> &Arc<Mutex<Registry<Transport>>> {
        &self.shared.registry
    }

    /// Attach (or replace) the TLS configuration. Only valid before the
    /// first successful `start`.
    #[cfg(feature = "tls")]
    pub fn set_tls(&self, config: TlsConfig) -> Result<()> {
        let live = self.shared.live.lock().unwrap();
        if live.starts > 0 {
            return Err(Error::Busy);
        }
        *self.shared.tls.lock().unwrap() = Some(config);
        Ok(())
    }

    /// Idempotent over multiple callers: only the first `start` actually
    /// binds and spawns the accept loop.
    pub fn start(&self) -> Result<()> {
        let mut live = self.shared.live.lock().unwrap();
        live.starts += 1;
        if live.starts > 1 {
            return Ok(());
        }
        drop(live);

        let listener = TcpListener::bind(&self.addr, &self.handle).map_err(Error::Io)?;
        let shared = self.shared.clone();
        let handle = self.handle.clone();

        let accept_loop = listener
            .incoming()
            .for_each(move |(socket, peer)| {
                Self::accept_one(shared.clone(), handle.clone(), socket, peer);
                Ok(())
            })
            .map_err(|e| error!("accept loop terminated: {}", e));

        self.handle.spawn(accept_loop);
        Ok(())
    }

    fn accept_one(shared: Arc<Shared>, handle: Handle, socket: TcpStream, peer: SocketAddr) {
        if shared.live.lock().unwrap().closed {
            debug!("discarding connection from {} on a closed server", peer);
            return;
        }
        let registry = shared.registry.clone();

        #[cfg(not(feature = "tls"))]
        let transport_ready: Box<Future<Item = Transport, Error = ::std::io::Error> + Send> =
            Box::new(::futures::future::ok(socket));
        #[cfg(feature = "tls")]
        let transport_ready: Box<Future<Item = Transport, Error = ::std::io::Error> + Send> =
            match shared.tls.lock().unwrap().clone() {
                Some(cfg) => Box::new(Handshake::tls(socket, &cfg)),
                None => Box::new(Handshake::plain(socket)),
            };

        let spawn_shared = shared.clone();
        handle.spawn(transport_ready.then(move |result| {
            match result {
                Ok(transport) => {
                    let (session, session_handle) = Session::new(transport, registry);
                    {
                        let mut live = spawn_shared.live.lock().unwrap();
                        if live.closed {
                            session_handle.stop();
                        }
                        live.sessions.push(session_handle.clone());
                    }
                    let reap_shared = spawn_shared.clone();
                    ::futures::future::Either::A(session.then(move |_| {
                        reap_shared.live.lock().unwrap().sessions.retain(|h| !Arc::ptr_eq(h, &session_handle));
                        reap_shared.drained.notify_all();
                        Ok(())
                    }))
                }
                Err(e) => {
                    debug!("handshake with {} failed: {}", peer, e);
                    ::futures::future::Either::B(::futures::future::ok(()))
                }
            }
        }));
    }

    /// Decrement `starts`; when it reaches zero, close the listener (by
    /// simply letting its spawned accept loop run against a now-`closed`
    /// shared state, so new connections are dropped) and hard-stop every
    /// live session.
    pub fn stop(&self) {
        let mut live = self.shared.live.lock().unwrap();
        if live.starts == 0 {
            return;
        }
        live.starts -= 1;
        if live.starts == 0 && !live.closed {
            live.closed = true;
            for session in &live.sessions {
                session.stop();
            }
        }
    }

    /// Block the calling thread until every session has reaped after a
    /// `stop`. Intended for orderly shutdown in tests and short-lived
    /// embeddings; production callers typically just drop the instance.
    pub fn wait_drained(&self) {
        let mut live = self.shared.live.lock().unwrap();
        while !live.sessions.is_empty() {
            live = self.shared.drained.wait(live).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_core::reactor::Core;

    #[test]
    fn rejects_unknown_scheme() {
        let core = Core::new().unwrap();
        let err = ServerInstance::construct("ftp://example.com/", core.handle()).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn start_is_idempotent_over_refcount() {
        let core = Core::new().unwrap();
        let inst = ServerInstance::construct("http://127.0.0.1:0/", core.handle()).unwrap();
        inst.start().unwrap();
        inst.start().unwrap();
        assert_eq!(inst.shared.live.lock().unwrap().starts, 2);
        inst.stop();
        assert_eq!(inst.shared.live.lock().unwrap().starts, 1);
        assert!(!inst.shared.live.lock().unwrap().closed);
        inst.stop();
        assert_eq!(inst.shared.live.lock().unwrap().starts, 0);
        assert!(inst.shared.live.lock().unwrap().closed);
    }
}
