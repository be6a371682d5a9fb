use std::str::from_utf8;

use futures::{Async, Future, Poll};
use httparse;
use tk_bufstream::IoBuf;
use tokio_core::io::Io;

use error::Error;

/// Headers to allocate on the stack before falling back to a heap buffer.
const MIN_HEADERS: usize = 16;
/// Hard cap on the number of headers parsed from a single request.
const MAX_HEADERS: usize = 256;

/// A parsed request line and header block.
///
/// Bodies are out of scope for this engine (see the crate-level Non-goals):
/// a `Head` never carries a body, and handlers that need one read it
/// directly from the transport they are handed.
#[derive(Debug, Clone)]
pub struct Head {
    method: String,
    raw_target: String,
    version_minor: u8,
    headers: Vec<(String, Vec<u8>)>,
}

impl Head {
    /// The request method, verbatim (e.g. `"GET"`, `"HEAD"`).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request-target exactly as it appeared on the wire, before
    /// canonicalization.
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// Overwrite the request-target used for routing lookups.
    ///
    /// The session state machine uses this to route against the
    /// canonicalized form of the URI without mutating what a handler
    /// ultimately sees -- same as the engine this crate's shape is
    /// grounded on, which canonicalizes into a scratch buffer purely for
    /// matching and hands the handler the original, untouched request.
    pub(crate) fn set_raw_target(&mut self, target: String) {
        self.raw_target = target;
    }

    /// `true` for `HTTP/1.1`.
    pub fn is_http_11(&self) -> bool {
        self.version_minor == 1
    }

    /// `true` for `HTTP/1.0`.
    pub fn is_http_10(&self) -> bool {
        self.version_minor == 0
    }

    /// `true` when this head is a placeholder synthesized for a request
    /// line that carried no recognizable HTTP version token at all (as
    /// opposed to one that named an unsupported version).
    pub fn has_no_version(&self) -> bool {
        self.version_minor == NO_VERSION
    }

    /// `true` when this head is a placeholder for a request line whose
    /// version token named something other than `HTTP/1.x`.
    pub fn has_unsupported_version(&self) -> bool {
        self.version_minor == UNSUPPORTED_VERSION
    }

    /// The `HTTP/1.x` version string for use in synthesized log lines or
    /// error pages.
    pub fn version_str(&self) -> String {
        format!("HTTP/1.{}", self.version_minor)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// All headers, in wire order, excluding none of them (unlike the
    /// filtered iterator a higher-level codec might expose to handlers).
    pub fn all_headers(&self) -> &[(String, Vec<u8>)] {
        &self.headers
    }

    /// The `Host:` header, if present and valid UTF-8.
    pub fn host(&self) -> Option<&str> {
        self.header("Host").and_then(|v| from_utf8(v).ok())
    }

    /// `true` if a `Connection:` header contains the token `close`
    /// (case-insensitive), or the request is `HTTP/1.0`.
    pub fn connection_close(&self) -> bool {
        if self.is_http_10() {
            return true;
        }
        match self.header("Connection").and_then(|v| from_utf8(v).ok()) {
            Some(v) => v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("close")),
            None => false,
        }
    }
}

/// Sentinel stored in `version_minor` when the request line carried no
/// recognizable version token at all.
const NO_VERSION: u8 = 254;
/// Sentinel stored in `version_minor` when the request line's version token
/// was present but did not start with `HTTP/1.`.
const UNSUPPORTED_VERSION: u8 = 253;

/// `httparse` rejects a request line outright if its version token isn't
/// `HTTP/1.<digit>`, so on parse failure we can't ask it which kind of
/// version problem (if any) caused the failure. Scan the raw request line
/// ourselves to tell "no version token" apart from "unsupported version",
/// the two cases the version policy treats differently (400 vs 505).
fn classify_invalid_version(buf: &[u8]) -> u8 {
    let line_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
    let line = &buf[..line_end];
    let last_token = line
        .split(|&b| b == b' ')
        .map(|t| if t.ends_with(b"\r") { &t[..t.len() - 1] } else { t })
        .filter(|t| !t.is_empty())
        .last();
    match last_token {
        Some(t) if t.starts_with(b"HTTP/") && !t.starts_with(b"HTTP/1.") => UNSUPPORTED_VERSION,
        _ => NO_VERSION,
    }
}

fn trim_trailing_cr(t: &[u8]) -> &[u8] {
    if t.ends_with(b"\r") {
        &t[..t.len() - 1]
    } else {
        t
    }
}

/// `httparse` additionally rejects a version token of `HTTP/1.<digit>` for
/// any digit other than `0` or `1`, even though such a request is still an
/// accepted `HTTP/1.x` under the version policy (it just can't keep the
/// connection alive afterward). `httparse::Error::Version` tells us this was
/// specifically the version that tripped parsing, so recover the method,
/// target, and headers ourselves rather than falling back to
/// [`classify_invalid_version`]'s coarser 400-or-505 placeholder.
fn parse_nonstandard_version(buf: &[u8]) -> Head {
    let no_version = || Head {
        method: String::new(),
        raw_target: String::new(),
        version_minor: NO_VERSION,
        headers: Vec::new(),
    };

    let line_end = match buf.iter().position(|&b| b == b'\n') {
        Some(p) => p,
        None => return no_version(),
    };
    let line = trim_trailing_cr(&buf[..line_end]);
    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(t), Some(v)) => (m, t, v),
        _ => return no_version(),
    };

    if version.starts_with(b"HTTP/") && !version.starts_with(b"HTTP/1.") {
        return Head {
            method: String::new(),
            raw_target: String::new(),
            version_minor: UNSUPPORTED_VERSION,
            headers: Vec::new(),
        };
    }
    let minor_digit = match version.strip_prefix(b"HTTP/1.") {
        Some(suffix) if suffix.len() == 1 && suffix[0].is_ascii_digit() => suffix[0] - b'0',
        _ => return no_version(),
    };

    let rest = &buf[line_end + 1..];
    let mut header_buf = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let headers = match httparse::parse_headers(rest, &mut header_buf) {
        Ok(httparse::Status::Complete((_, headers))) => {
            headers.iter().map(|h| (h.name.to_string(), h.value.to_vec())).collect()
        }
        _ => Vec::new(),
    };

    Head {
        method: String::from_utf8_lossy(method).into_owned(),
        raw_target: String::from_utf8_lossy(target).into_owned(),
        version_minor: minor_digit,
        headers,
    }
}

/// Attempt to parse one request out of `buf`.
///
/// Returns `Ok(None)` when more data is needed. A missing or unsupported
/// version, or any other parse failure, comes back as a placeholder `Head`
/// (see [`Head::has_no_version`] and [`Head::has_unsupported_version`]) --
/// it is up to the session state machine, not this module, to turn that
/// into a 400 or 505 response, per the version policy in the engine's spec.
pub fn try_parse(buf: &[u8]) -> Result<Option<(Head, usize)>, Error> {
    let mut headers_stack = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut headers_heap;
    let mut req = httparse::Request::new(&mut headers_stack);
    let mut status = req.parse(buf);

    if let Err(httparse::Error::TooManyHeaders) = status {
        headers_heap = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        req = httparse::Request::new(&mut headers_heap);
        status = req.parse(buf);
    }

    let consumed = match status {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::Version) => return Ok(Some((parse_nonstandard_version(buf), 0))),
        Err(_) => {
            return Ok(Some((
                Head {
                    method: String::new(),
                    raw_target: String::new(),
                    version_minor: classify_invalid_version(buf),
                    headers: Vec::new(),
                },
                0,
            )))
        }
    };

    let method = req.method.unwrap_or("").to_string();
    let raw_target = req.path.unwrap_or("/").to_string();
    // httparse only stores the minor digit; HTTP/2+ request lines never
    // match its grammar and are rejected during parsing already.
    let version_minor = req.version.unwrap_or(NO_VERSION);
    let headers = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    Ok(Some((
        Head {
            method,
            raw_target,
            version_minor,
            headers,
        },
        consumed,
    )))
}

/// `true` if a parsed head lacks a usable HTTP version at all (used by the
/// session state machine to distinguish a 400 from a 505).
pub fn has_no_version(head: &Head) -> bool {
    head.version_minor == NO_VERSION
}

/// `true` if a parsed head named a version other than `HTTP/1.x`.
pub fn has_unsupported_version(head: &Head) -> bool {
    head.version_minor == UNSUPPORTED_VERSION
}

/// Future returned from [`read_request`]: resolves with the bare transport
/// handed back and the parsed head.
///
/// Any bytes already buffered past the header block (a pipelined body, or
/// the start of one) are not preserved across the handoff to the handler --
/// same as the engine this crate's shape is grounded on, body reading is
/// entirely the handler's responsibility, performed directly against the
/// transport it is handed.
pub struct ReadRequest<S: Io> {
    io: Option<IoBuf<S>>,
}

impl<S: Io> ReadRequest<S> {
    pub fn new(io: IoBuf<S>) -> ReadRequest<S> {
        ReadRequest { io: Some(io) }
    }
}

impl<S: Io> Future for ReadRequest<S> {
    type Item = (S, Head);
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            let mut io = self.io.take().expect("ReadRequest polled after completion");
            match try_parse(&io[..])? {
                Some((head, consumed)) => {
                    io.consume(consumed);
                    return Ok(Async::Ready((io.into_inner(), head)));
                }
                None => {
                    let filled = io.read().map_err(Error::Io)?;
                    if filled == 0 {
                        self.io = Some(io);
                        return Ok(Async::NotReady);
                    }
                    self.io = Some(io);
                }
            }
        }
    }
}

/// Begin reading the next request off `sock`.
pub fn read_request<S: Io>(sock: S) -> ReadRequest<S> {
    ReadRequest::new(IoBuf::new(sock))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let raw = b"GET /a/b?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (head, consumed) = try_parse(raw).unwrap().unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(head.method(), "GET");
        assert_eq!(head.raw_target(), "/a/b?x=1");
        assert!(head.is_http_11());
        assert_eq!(head.host(), Some("example.com"));
    }

    #[test]
    fn partial_request_needs_more_data() {
        let raw = b"GET /a HTTP/1.1\r\nHost: x";
        assert!(try_parse(raw).unwrap().is_none());
    }

    #[test]
    fn http_10_forces_connection_close() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (head, _) = try_parse(raw).unwrap().unwrap();
        assert!(head.connection_close());
    }

    #[test]
    fn connection_close_header_detected_case_insensitively() {
        let raw = b"GET / HTTP/1.1\r\nConnection: Keep-Alive, Close\r\n\r\n";
        let (head, _) = try_parse(raw).unwrap().unwrap();
        assert!(head.connection_close());
    }

    #[test]
    fn unparseable_request_line_yields_no_version_sentinel() {
        let raw = b"this is not http\r\n\r\n";
        let (head, _) = try_parse(raw).unwrap().unwrap();
        assert!(has_no_version(&head));
    }

    #[test]
    fn non_http_1_version_yields_unsupported_sentinel() {
        let raw = b"GET / HTTP/2.0\r\n\r\n";
        let (head, _) = try_parse(raw).unwrap().unwrap();
        assert!(has_unsupported_version(&head));
        assert!(!has_no_version(&head));
    }

    #[test]
    fn nonstandard_http_1_minor_is_accepted_not_rejected() {
        // httparse itself only accepts a minor digit of 0 or 1; a request
        // line like `HTTP/1.2` is still a recognizable HTTP/1.x under the
        // version policy and must not come back as a 400/505 placeholder.
        let raw = b"GET /a HTTP/1.2\r\nHost: x\r\n\r\n";
        let (head, _) = try_parse(raw).unwrap().unwrap();
        assert!(!has_no_version(&head));
        assert!(!has_unsupported_version(&head));
        assert!(!head.is_http_11());
        assert!(!head.is_http_10());
        assert_eq!(head.method(), "GET");
        assert_eq!(head.raw_target(), "/a");
        assert_eq!(head.host(), Some("x"));
    }
}
