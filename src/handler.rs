use futures::Future;
use tokio_core::io::Io;

use error::Error;
use wire::{Head, Response};

/// Anything the engine can accept a connection over and hand to a handler.
///
/// Blanket-implemented for any `tokio_core` I/O object; plain TCP and
/// TLS-wrapping-TCP (behind the `tls` feature) both satisfy it.
pub trait Transport: Io + Send + 'static {}
impl<T: Io + Send + 'static> Transport for T {}

/// What a handler produced.
///
/// Mirrors the handler contract in the spec: a handler either answers with
/// a response, or answers with nothing -- which means something different
/// depending on whether the handler is a registered upgrader (see
/// [`Handler::is_upgrader`]).
pub enum Dispatched<T: Transport> {
    /// The handler produced a response; the transport is handed back to the
    /// session so it can write it out and potentially serve another request.
    Responded(T, Response),
    /// The handler answered with no response and did not touch the
    /// transport itself (e.g. it already wrote and is waiting for the next
    /// request already sent ahead of it). Handed back to the session, which
    /// reads another request off it unless the original request demanded
    /// `close`.
    NoResponse(T),
    /// The handler is a registered upgrader and has taken ownership of the
    /// transport (e.g. to speak the WebSocket framing from here on). The
    /// session detaches silently: it will not write to or close this
    /// transport.
    Upgraded,
}

/// The future type every handler invocation returns.
pub type DispatchFuture<T> = Box<Future<Item = Dispatched<T>, Error = Error> + Send>;

/// A registered dispatch target.
///
/// The opaque `arg` from the spec's handler record has no separate
/// engine-visible representation here: concrete handlers simply close over
/// whatever state they need, and Rust's ownership model (a handler is
/// dropped, and with it its captured state, once its last `Arc` reference
/// goes away) plays the role the spec's explicit `destructor` field plays
/// in a non-GC'd host language.
pub trait Handler<T: Transport>: Send + Sync {
    /// Whether this handler may hijack the connection (see [`Dispatched`]).
    /// Defaults to `false`; `FileHandler` and `StaticHandler` both leave it
    /// at the default, a WebSocket-upgrading handler would override it.
    fn is_upgrader(&self) -> bool {
        false
    }

    /// Handle one request already matched to this handler by the registry.
    fn call(&self, transport: T, request: Head) -> DispatchFuture<T>;
}
