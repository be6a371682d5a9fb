use futures::future;

use handler::{DispatchFuture, Dispatched, Handler, Transport};
use wire::{Head, Response};

/// Serves a fixed, in-memory byte blob -- e.g. a generated index page or an
/// embedded asset. Grounded in `http_handle_static` from the engine this
/// crate's shape is distilled from, which always answers `200 OK` (unlike
/// [`FileHandler`](super::FileHandler), there's no filesystem to fail
/// against).
pub struct StaticHandler {
    content_type: String,
    data: Vec<u8>,
}

impl StaticHandler {
    pub fn new(content_type: Option<&str>, data: Vec<u8>) -> StaticHandler {
        StaticHandler {
            content_type: content_type.unwrap_or("application/octet-stream").to_string(),
            data,
        }
    }
}

impl<T: Transport> Handler<T> for StaticHandler {
    fn call(&self, transport: T, _request: Head) -> DispatchFuture<T> {
        let resp = Response::new(200, "OK")
            .with_header("Content-Type", self.content_type.as_str())
            .with_body(self.data.clone());
        Box::new(future::ok(Dispatched::Responded(transport, resp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::Future;
    use std::io::{Cursor, Read, Write};
    use tokio_core::io::Io;

    struct MockIo(Cursor<Vec<u8>>);
    impl Read for MockIo {
        fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl Write for MockIo {
        fn write(&mut self, buf: &[u8]) -> ::std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> ::std::io::Result<()> {
            Ok(())
        }
    }
    impl Io for MockIo {}

    fn head() -> Head {
        ::wire::try_parse(b"GET / HTTP/1.1\r\n\r\n").unwrap().unwrap().0
    }

    #[test]
    fn serves_fixed_body() {
        let h = StaticHandler::new(Some("text/plain"), b"hello world".to_vec());
        let transport = MockIo(Cursor::new(Vec::new()));
        let outcome = h.call(transport, head()).wait().unwrap();
        match outcome {
            Dispatched::Responded(_, resp) => {
                assert_eq!(resp.status(), 200);
                assert_eq!(resp.body(), b"hello world");
            }
            Dispatched::NoResponse(_) | Dispatched::Upgraded => {
                panic!("StaticHandler always responds")
            }
        }
    }
}
