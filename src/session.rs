//! The per-connection state machine: one `Session` drives one accepted
//! transport through request read, dispatch, response write, and either
//! keep-alive or close.
//!
//! This is the direct analogue of the teacher's own per-connection `Proto`
//! in `client/proto.rs`: a state enum of boxed futures, advanced one
//! `mem::replace` at a time as the reactor polls it. Where the teacher's
//! `Proto` only ever drives one request/response exchange per task before
//! handing back to a fresh `Proto`, a `Session` here loops in place across
//! a whole keep-alive connection, because the server owns its lifetime
//! (registry lookups, live-set membership, hard stop) the way `tk-http`'s
//! client side never needed to.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{Async, Future, Poll};

use error::Error;
use handler::{Dispatched, DispatchFuture, Transport};
use registry::{HandlerEntry, Lookup, Registry};
use uri;
use wire::{self, Head, ReadRequest, WriteBody, WriteResponseHeaders};

/// Cross-thread handle to one session's cancellation flag.
///
/// The server's live-set stores one of these per session so that `stop()`,
/// running on whatever thread called it, can request a hard close without
/// touching the session's privately-owned state machine -- which is only
/// ever mutated from whichever reactor thread is polling it. This is the
/// Rust realization of the spec's "`close` on a session cancels all four
/// of its slots" rule: the flag is checked at the top of every `poll`, and
/// observing it set collapses whatever slot is in flight straight to
/// `Closing` by simply dropping it (in futures 0.1, dropping a future in
/// progress *is* cancelling it).
pub struct SessionHandle {
    stop_requested: AtomicBool,
    parked: Mutex<Option<::futures::task::Task>>,
}

impl SessionHandle {
    fn new() -> SessionHandle {
        SessionHandle {
            stop_requested: AtomicBool::new(false),
            parked: Mutex::new(None),
        }
    }

    /// Request a hard close of the session owning this handle. Idempotent.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(task) = self.parked.lock().unwrap().take() {
            task.unpark();
        }
    }

    fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn park_current(&self) {
        *self.parked.lock().unwrap() = Some(::futures::task::park());
    }
}

/// Everything about the in-flight request the tail end of the pipeline
/// (dispatch completion, header write, body write) needs to remember.
struct InFlight {
    is_head: bool,
    close: bool,
    is_upgrader: bool,
}

enum State<T: Transport> {
    Reading(ReadRequest<T>),
    Dispatching {
        fut: DispatchFuture<T>,
        // Kept alive for the duration of the dispatch; an `Arc` clone here
        // is the add-ref half of the spec's handler refcount, released by
        // ordinary `Drop` when this state is replaced.
        _handler: Arc<HandlerEntry<T>>,
        req: InFlight,
    },
    WritingHeaders {
        fut: WriteResponseHeaders<T>,
        body: Vec<u8>,
        is_head: bool,
        close: bool,
    },
    WritingBody {
        fut: WriteBody<T>,
        close: bool,
    },
    Closing,
    Closed,
    /// Only ever observed transiently inside `poll`, between
    /// `mem::replace`ing it out of `self.state` and replacing it with the
    /// next real state.
    Void,
}

/// One accepted connection, in the process of being served.
///
/// A `Session` is itself a `Future<Item = (), Error = ()>`: the server
/// spawns it directly onto the reactor and never touches it again except
/// through its [`SessionHandle`].
pub struct Session<T: Transport> {
    registry: Arc<Mutex<Registry<T>>>,
    handle: Arc<SessionHandle>,
    state: State<T>,
}

impl<T: Transport> Session<T> {
    /// Begin serving `transport` against `registry`. Returns the session
    /// future to spawn and the handle the owning server keeps in its
    /// live-set.
    pub fn new(transport: T, registry: Arc<Mutex<Registry<T>>>) -> (Session<T>, Arc<SessionHandle>) {
        let handle = Arc::new(SessionHandle::new());
        let session = Session {
            registry,
            handle: handle.clone(),
            state: State::Reading(wire::read_request(transport)),
        };
        (session, handle)
    }

    fn error_state(sock: T, status: u16, close: bool) -> State<T> {
        let mut resp = wire::error_response(status);
        if close {
            resp.force_connection_close();
        }
        let body = resp.body().to_vec();
        State::WritingHeaders {
            fut: wire::write_response(sock, &resp, false),
            body,
            is_head: false,
            close,
        }
    }

    /// `ReadingRequest` → one of `WritingHeaders` (version rejected, or no
    /// handler matched) or `Dispatching` (handler found), per the
    /// transition table's `rx succeeds` row.
    fn begin_dispatch(&self, sock: T, head: Head) -> State<T> {
        // Exactly HTTP/1.1 is persistent by default; any other accepted
        // HTTP/1.x (currently just 1.0, but not hardcoded to it) forces
        // `close=true` after the single response, per the version policy.
        let head_close = head.connection_close() || !head.is_http_11();

        if wire::has_no_version(&head) {
            debug!("request with no usable HTTP version; closing");
            return Self::error_state(sock, 400, true);
        }
        if wire::has_unsupported_version(&head) {
            debug!("request named an unsupported HTTP version; closing");
            return Self::error_state(sock, 505, true);
        }

        let canon = uri::canonify(head.raw_target());
        let method = head.method().to_string();
        let is_head = method.eq_ignore_ascii_case("HEAD");

        // Canonicalize only for the purposes of routing: the handler still
        // sees the original, uncanonicalized request, matching the engine
        // this crate's shape is grounded on, which canonicalizes into a
        // scratch buffer it frees right after the lookup.
        let mut lookup_head = head.clone();
        lookup_head.set_raw_target(canon.clone());

        let entry = {
            let reg = self.registry.lock().unwrap();
            match reg.lookup(&lookup_head) {
                Lookup::Matched(entry) => entry,
                Lookup::MethodNotAllowed => {
                    debug!("{} {}: no handler for method", method, canon);
                    return Self::error_state(sock, 405, head_close);
                }
                Lookup::NotFound => {
                    debug!("{} {}: no handler matched", method, canon);
                    return Self::error_state(sock, 404, head_close);
                }
            }
        };

        let is_upgrader = entry.is_upgrader();
        let fut = entry.handler().call(sock, head);
        State::Dispatching {
            fut,
            _handler: entry,
            req: InFlight { is_head, close: head_close, is_upgrader },
        }
    }

    /// `Dispatching` → `Closed` (upgrade or upgrader no-response detach),
    /// `Reading`/`Closing` (non-upgrader no-response), or `WritingHeaders`
    /// (response), per the transition table's `cb succeeds` rows.
    fn finish_dispatch(outcome: Dispatched<T>, req: InFlight) -> State<T> {
        match outcome {
            Dispatched::Upgraded => {
                debug!("handler claimed the transport; session detaching");
                State::Closed
            }
            Dispatched::NoResponse(sock) => {
                if req.is_upgrader {
                    // A registered upgrader answering with no response has
                    // taken over the connection's meaning itself; the
                    // session stops driving it rather than trying to read
                    // another HTTP request off it.
                    debug!("upgrader handler produced no response; detaching");
                    State::Closed
                } else if req.close {
                    State::Closing
                } else {
                    State::Reading(wire::read_request(sock))
                }
            }
            Dispatched::Responded(sock, mut resp) => {
                let mut close = req.close;
                if resp
                    .connection_header()
                    .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("close")))
                    .unwrap_or(false)
                {
                    close = true;
                }
                if close {
                    resp.force_connection_close();
                }
                let body = resp.body().to_vec();
                State::WritingHeaders {
                    fut: wire::write_response(sock, &resp, req.is_head),
                    body,
                    is_head: req.is_head,
                    close,
                }
            }
        }
    }

    fn reap(&self) {
        debug!("session finished");
    }
}

impl<T: Transport> Future for Session<T> {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<(), ()> {
        loop {
            if self.handle.is_stop_requested() {
                if !matches!(self.state, State::Closed) {
                    self.state = State::Closing;
                }
            }

            match mem::replace(&mut self.state, State::Void) {
                State::Reading(mut fut) => match fut.poll() {
                    Ok(Async::Ready((sock, head))) => {
                        self.state = self.begin_dispatch(sock, head);
                    }
                    Ok(Async::NotReady) => {
                        self.state = State::Reading(fut);
                        self.handle.park_current();
                        return Ok(Async::NotReady);
                    }
                    Err(e) => {
                        debug!("read_request failed: {:?}; closing", e);
                        self.state = State::Closing;
                    }
                },

                State::Dispatching { mut fut, _handler, req } => match fut.poll() {
                    Ok(Async::Ready(outcome)) => {
                        self.state = Self::finish_dispatch(outcome, req);
                    }
                    Ok(Async::NotReady) => {
                        self.state = State::Dispatching { fut, _handler, req };
                        self.handle.park_current();
                        return Ok(Async::NotReady);
                    }
                    Err(e) => {
                        debug!("handler dispatch failed: {:?}; closing", e);
                        self.state = State::Closing;
                    }
                },

                State::WritingHeaders {
                    mut fut,
                    body,
                    is_head,
                    close,
                } => match fut.poll() {
                    Ok(Async::Ready(sock)) => {
                        if !is_head && !body.is_empty() {
                            self.state = State::WritingBody {
                                fut: wire::write_body(sock, &body),
                                close,
                            };
                        } else if close {
                            self.state = State::Closing;
                        } else {
                            self.state = State::Reading(wire::read_request(sock));
                        }
                    }
                    Ok(Async::NotReady) => {
                        self.state = State::WritingHeaders { fut, body, is_head, close };
                        self.handle.park_current();
                        return Ok(Async::NotReady);
                    }
                    Err(e) => {
                        debug!("writing response headers failed: {:?}; closing", e);
                        self.state = State::Closing;
                    }
                },

                State::WritingBody { mut fut, close } => match fut.poll() {
                    Ok(Async::Ready(sock)) => {
                        if close {
                            self.state = State::Closing;
                        } else {
                            self.state = State::Reading(wire::read_request(sock));
                        }
                    }
                    Ok(Async::NotReady) => {
                        self.state = State::WritingBody { fut, close };
                        self.handle.park_current();
                        return Ok(Async::NotReady);
                    }
                    Err(e) => {
                        debug!("writing response body failed: {:?}; closing", e);
                        self.state = State::Closing;
                    }
                },

                State::Closing => {
                    self.handle.stop_requested.store(true, Ordering::SeqCst);
                    self.state = State::Closed;
                }

                State::Closed => {
                    self.reap();
                    return Ok(Async::Ready(()));
                }

                State::Void => unreachable!("Session polled while mid-transition"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future;
    use handler::Handler;
    use std::io::{Cursor, Read, Write};
    use tokio_core::io::Io;
    use wire::Response;

    // A minimal in-memory duplex transport for driving a Session without a
    // real socket: reads come from a fixed buffer, writes accumulate into
    // a Vec the test can inspect afterward.
    struct MockIo {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for MockIo {
        fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
            self.input.read(buf)
        }
    }
    impl Write for MockIo {
        fn write(&mut self, buf: &[u8]) -> ::std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> ::std::io::Result<()> {
            Ok(())
        }
    }
    impl Io for MockIo {}

    struct Ok200;
    impl Handler<MockIo> for Ok200 {
        fn call(&self, transport: MockIo, _req: Head) -> DispatchFuture<MockIo> {
            let resp = Response::new(200, "OK").with_body(b"hi".to_vec());
            Box::new(future::ok(Dispatched::Responded(transport, resp)))
        }
    }

    // Answers nothing and hands the transport back, without being a
    // registered upgrader -- the session is expected to keep serving it.
    struct SilentContinue;
    impl Handler<MockIo> for SilentContinue {
        fn call(&self, transport: MockIo, _req: Head) -> DispatchFuture<MockIo> {
            Box::new(future::ok(Dispatched::NoResponse(transport)))
        }
    }

    // Answers nothing but is registered as an upgrader -- the session is
    // expected to detach rather than try to read another request.
    struct SilentUpgrader;
    impl Handler<MockIo> for SilentUpgrader {
        fn is_upgrader(&self) -> bool {
            true
        }
        fn call(&self, transport: MockIo, _req: Head) -> DispatchFuture<MockIo> {
            Box::new(future::ok(Dispatched::NoResponse(transport)))
        }
    }

    fn registry_with(entry: (&str, &str)) -> Arc<Mutex<Registry<MockIo>>> {
        let mut reg = Registry::new();
        reg.add(entry.0, entry.1, None, false, Arc::new(Ok200)).unwrap();
        Arc::new(Mutex::new(reg))
    }

    fn drive_to_completion<T: Transport>(mut session: Session<T>) {
        for _ in 0..64 {
            match session.poll() {
                Ok(Async::Ready(())) => return,
                Ok(Async::NotReady) => panic!("session stalled without any pending I/O"),
                Err(()) => return,
            }
        }
        panic!("session did not reach Closed within the iteration budget");
    }

    #[test]
    fn simple_request_writes_a_response_then_closes_on_eof() {
        let registry = registry_with(("GET", "/a"));
        let io = MockIo {
            input: Cursor::new(b"GET /a HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let (session, _handle) = Session::new(io, registry);
        // We can't get `io` back out after it's moved into the session, so
        // this test only exercises that the state machine runs to
        // completion without panicking; response bytes are checked via the
        // wire-layer unit tests instead.
        drive_to_completion(session);
    }

    #[test]
    fn external_stop_forces_close_even_mid_dispatch() {
        let registry = registry_with(("GET", "/a"));
        let io = MockIo {
            input: Cursor::new(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let (mut session, handle) = Session::new(io, registry);
        handle.stop();
        assert!(handle.is_stop_requested());
        match session.poll() {
            Ok(Async::Ready(())) | Err(()) => {}
            Ok(Async::NotReady) => panic!("expected a forced close to reach Closed immediately"),
        }
    }

    #[test]
    fn not_found_path_still_closes_cleanly() {
        let registry = registry_with(("GET", "/a"));
        let io = MockIo {
            input: Cursor::new(b"GET /missing HTTP/1.0\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let (session, _handle) = Session::new(io, registry);
        drive_to_completion(session);
    }

    #[test]
    fn non_upgrader_no_response_keeps_serving_the_connection() {
        let mut reg = Registry::new();
        reg.add("GET", "/a", None, false, Arc::new(SilentContinue)).unwrap();
        let registry = Arc::new(Mutex::new(reg));
        let io = MockIo {
            // No `Connection: close`, so after the silent response the
            // session should loop back to reading -- and then hit EOF.
            input: Cursor::new(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let (session, _handle) = Session::new(io, registry);
        drive_to_completion(session);
    }

    #[test]
    fn upgrader_no_response_detaches_without_reading_again() {
        let mut reg = Registry::new();
        reg.add("GET", "/a", None, false, Arc::new(SilentUpgrader)).unwrap();
        let registry = Arc::new(Mutex::new(reg));
        let io = MockIo {
            input: Cursor::new(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()),
            output: Vec::new(),
        };
        let (session, _handle) = Session::new(io, registry);
        drive_to_completion(session);
    }
}
