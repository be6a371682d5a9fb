use std::io::Write;

use futures::{Future, Poll};
use tk_bufstream::IoBuf;
use tokio_core::io::Io;

use error::Error;

/// A fully materialized HTTP response.
///
/// Per the crate's Non-goals, response bodies are not streamed: a
/// `Response` owns its whole body up front.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: String,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, reason: &str) -> Response {
        Response {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_header<V: AsRef<[u8]>>(&mut self, name: &str, value: V) {
        self.headers.push((name.to_string(), value.as_ref().to_vec()));
    }

    pub fn with_header<V: AsRef<[u8]>>(mut self, name: &str, value: V) -> Response {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Response {
        self.body = body;
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The `Connection:` header's value, if any -- used by the session
    /// state machine to decide whether to force-close the connection.
    pub fn connection_header(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("Connection"))
            .and_then(|(_, v)| ::std::str::from_utf8(v).ok())
    }

    /// Overwrite (or add) a `Connection: close` header, removing any prior
    /// `Connection` headers first.
    pub fn force_connection_close(&mut self) {
        self.headers
            .retain(|(n, _)| !n.eq_ignore_ascii_case("Connection"));
        self.set_header("Connection", "close");
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Serialize the status line and headers (and an auto-computed
    /// `Content-Length` if the caller didn't set one) into `buf`.
    fn write_head(&self, buf: &mut Vec<u8>) {
        let _ = write!(buf, "HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value);
            buf.extend_from_slice(b"\r\n");
        }
        if !self.has_header("Content-Length") {
            let _ = write!(buf, "Content-Length: {}\r\n", self.body.len());
        }
        buf.extend_from_slice(b"\r\n");
    }
}

/// Construct a standard error response for one of the status codes the
/// engine is permitted to synthesize on its own (see the crate's error
/// handling design): 400, 403, 404, 405, 500, 505.
pub fn error_response(status: u16) -> Response {
    let reason = match status {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        505 => "HTTP Version Not Supported",
        _ => "Error",
    };
    Response::new(status, reason).with_body(format!("{} {}", status, reason).into_bytes())
}

/// Future returned from [`write_response`]: writes the status line and
/// headers, then flushes them to the transport.
pub struct WriteResponseHeaders<S: Io> {
    inner: Option<IoBuf<S>>,
}

impl<S: Io> WriteResponseHeaders<S> {
    fn new(mut io: IoBuf<S>, resp: &Response) -> WriteResponseHeaders<S> {
        resp.write_head(&mut io.out_buf);
        WriteResponseHeaders { inner: Some(io) }
    }
}

impl<S: Io> Future for WriteResponseHeaders<S> {
    type Item = S;
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        let mut io = self.inner.take().expect("polled after completion");
        match io.flush() {
            Ok(()) => Ok(::futures::Async::Ready(io.into_inner())),
            Err(ref e) if e.kind() == ::std::io::ErrorKind::WouldBlock => {
                self.inner = Some(io);
                Ok(::futures::Async::NotReady)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Write `resp`'s status line and headers to `sock`.
///
/// `is_head` does not change what is written here (headers, including
/// `Content-Length`, are always sent in full); it only matters to the
/// caller deciding whether to follow up with [`write_body`].
pub fn write_response<S: Io>(sock: S, resp: &Response, _is_head: bool) -> WriteResponseHeaders<S> {
    WriteResponseHeaders::new(IoBuf::new(sock), resp)
}

/// Future returned from [`write_body`]: writes the response body bytes and
/// flushes them to the transport.
pub struct WriteBody<S: Io> {
    inner: Option<IoBuf<S>>,
}

impl<S: Io> WriteBody<S> {
    fn new(mut io: IoBuf<S>, body: &[u8]) -> WriteBody<S> {
        io.out_buf.extend(body);
        WriteBody { inner: Some(io) }
    }
}

impl<S: Io> Future for WriteBody<S> {
    type Item = S;
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        let mut io = self.inner.take().expect("polled after completion");
        match io.flush() {
            Ok(()) => Ok(::futures::Async::Ready(io.into_inner())),
            Err(ref e) if e.kind() == ::std::io::ErrorKind::WouldBlock => {
                self.inner = Some(io);
                Ok(::futures::Async::NotReady)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Write a (possibly empty) response body to `sock`. Callers skip this
/// entirely for `HEAD` requests and for zero-length bodies, per the
/// session state machine's transition table.
pub fn write_body<S: Io>(sock: S, body: &[u8]) -> WriteBody<S> {
    WriteBody::new(IoBuf::new(sock), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_content_length() {
        let resp = Response::new(200, "OK").with_body(b"hello".to_vec());
        let mut buf = Vec::new();
        resp.write_head(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn explicit_content_length_not_duplicated() {
        let resp = Response::new(200, "OK")
            .with_header("Content-Length", "3")
            .with_body(b"abc".to_vec());
        let mut buf = Vec::new();
        resp.write_head(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("Content-Length").count(), 1);
    }

    #[test]
    fn force_connection_close_replaces_prior_header() {
        let mut resp = Response::new(200, "OK").with_header("Connection", "keep-alive");
        resp.force_connection_close();
        assert_eq!(resp.connection_header(), Some("close"));
    }

    #[test]
    fn error_response_reasons() {
        assert_eq!(error_response(404).status(), 404);
        assert_eq!(error_response(405).status(), 405);
    }
}
