//! An embeddable HTTP/1.x server runtime.
//!
//! This crate implements the parts of serving HTTP that are genuinely
//! hard to get right and mostly invisible from the outside: a handler
//! registry with collision detection and host/path/method matching, a
//! per-connection state machine that drives request read → dispatch →
//! response write → keep-alive-or-close, a server lifecycle with
//! reference-counted start/stop and orderly teardown, and URI
//! canonicalization for routing. HTTP message parsing/serialization
//! itself, the TLS/TCP transport primitives, and URL parsing are treated
//! as external collaborators rather than reimplemented here.
//!
//! Two small bundled handlers ([`handlers::FileHandler`],
//! [`handlers::StaticHandler`]) and a WebSocket upgrade-handshake helper
//! ([`websocket`]) are included as illustrative uses of the registry and
//! the `is_upgrader` hook; neither is part of the engine's hard core.

#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate matches;

extern crate futures;
extern crate httparse;
extern crate sha1;
extern crate tk_bufstream;
extern crate tokio_core;
extern crate url;

#[cfg(feature = "tls")]
extern crate rustls;
#[cfg(feature = "tls")]
extern crate tokio_rustls;

#[cfg(test)]
extern crate env_logger;

mod directory;
mod error;
mod handler;
mod registry;
mod server;
mod session;
mod uri;
mod wire;

pub mod handlers;
pub mod websocket;

#[cfg(feature = "tls")]
pub mod tls;

pub use directory::ServerDirectory;
pub use error::{Error, Result};
pub use handler::{Dispatched, DispatchFuture, Handler, Transport};
pub use registry::{HandlerEntry, Lookup, Registry};
pub use server::ServerInstance;
pub use session::{Session, SessionHandle};
pub use uri::canonify;
pub use wire::{error_response, Head, Response};
