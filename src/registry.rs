//! The handler registry: registration, collision detection, and
//! longest-prefix-ish lookup scoped by method and (optional) virtual host.

use std::sync::Arc;

use error::Error;
use handler::{Handler, Transport};
use wire::Head;

/// One registered mount point.
///
/// Reference-counting in the original design (a manual `refcnt` bumped on
/// every in-flight dispatch) is realized here as an ordinary `Arc`: cloning
/// an `Arc<HandlerEntry<T>>` into an in-flight dispatch *is* the add-ref,
/// and dropping it *is* the release. The entry's storage -- and the
/// concrete handler's own `Drop` impl, standing in for the spec's
/// `destructor` callback -- is freed only once every clone (registry
/// included) has gone away.
pub struct HandlerEntry<T: Transport> {
    method: String,
    path: String,
    host: Option<String>,
    is_dir: bool,
    is_upgrader: bool,
    handler: Arc<Handler<T>>,
}

impl<T: Transport> HandlerEntry<T> {
    pub fn method(&self) -> &str {
        &self.method
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn host(&self) -> Option<&str> {
        self.host.as_ref().map(|s| s.as_str())
    }
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
    /// Whether a no-response outcome from this handler means it has
    /// claimed the transport for itself (detach) rather than simply
    /// declining to answer this one request (keep serving).
    pub fn is_upgrader(&self) -> bool {
        self.is_upgrader
    }
    pub fn handler(&self) -> &Handler<T> {
        &*self.handler
    }
}

/// Outcome of [`Registry::lookup`].
pub enum Lookup<T: Transport> {
    /// A handler matched host, path, and method.
    Matched(Arc<HandlerEntry<T>>),
    /// At least one handler matched host and path, but none matched the
    /// method -- report 405, not 404.
    MethodNotAllowed,
    /// No handler matched host and path at all.
    NotFound,
}

/// Per-server ordered collection of handler records.
///
/// Ordering is registration order throughout: `lookup` returns the first
/// match, mirroring the spec's "first match wins" rule rather than, say,
/// preferring the longest matching path.
pub struct Registry<T: Transport> {
    entries: Vec<Arc<HandlerEntry<T>>>,
}

impl<T: Transport> Registry<T> {
    pub fn new() -> Registry<T> {
        Registry { entries: Vec::new() }
    }

    /// Register a new handler.
    ///
    /// Rejects empty method/path, the reserved `"HEAD"` method (HEAD is
    /// synthesized from a registered `GET`, see [`Lookup`]), and any
    /// registration whose (host, method) pair shares a path prefix with an
    /// existing one.
    pub fn add(
        &mut self,
        method: &str,
        path: &str,
        host: Option<&str>,
        is_dir: bool,
        handler: Arc<Handler<T>>,
    ) -> Result<Arc<HandlerEntry<T>>, Error> {
        if method.is_empty() {
            return Err(Error::InvalidArgument("method must not be empty"));
        }
        if method.eq_ignore_ascii_case("HEAD") {
            return Err(Error::InvalidArgument(
                "HEAD may not be registered directly; it is synthesized from GET",
            ));
        }
        if path.is_empty() {
            return Err(Error::InvalidArgument("path must not be empty"));
        }

        let trimmed_path = path.trim_end_matches('/');
        // An all-slashes path (e.g. "/") trims to empty; treat that as the
        // root rather than an invalid registration.
        let trimmed_path = if trimmed_path.is_empty() { "/" } else { trimmed_path };

        for existing in &self.entries {
            if !hosts_compatible(existing.host(), host) {
                continue;
            }
            if !existing.method.eq_ignore_ascii_case(method) {
                continue;
            }
            let l = trimmed_path.len().min(existing.path.len());
            if existing.path.as_bytes()[..l] == trimmed_path.as_bytes()[..l] {
                return Err(Error::AddrInUse(format!(
                    "path {:?} collides with already-registered {:?} (method {:?})",
                    trimmed_path, existing.path, existing.method
                )));
            }
        }

        let is_upgrader = handler.is_upgrader();
        let entry = Arc::new(HandlerEntry {
            method: method.to_string(),
            path: trimmed_path.to_string(),
            host: host.map(|h| h.to_string()),
            is_dir,
            is_upgrader,
            handler,
        });
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Unlink `entry` from the registry. The underlying handler may still be
    /// kept alive by in-flight dispatches holding their own `Arc` clone;
    /// this only removes it from future lookups.
    pub fn remove(&mut self, entry: &Arc<HandlerEntry<T>>) {
        self.entries.retain(|e| !Arc::ptr_eq(e, entry));
    }

    /// Find the handler for `request`, applying the host/path/method rules
    /// from the spec, in registration order.
    pub fn lookup(&self, request: &Head) -> Lookup<T> {
        let path = request.raw_target();
        let mut saw_host_path_match = false;

        for entry in &self.entries {
            if let Some(host) = entry.host() {
                match request.host() {
                    Some(req_host) if host_matches(host, req_host) => {}
                    _ => continue,
                }
            }

            if !path_matches(entry.path(), entry.is_dir(), path) {
                continue;
            }

            saw_host_path_match = true;

            if method_matches(entry.method(), request.method()) {
                return Lookup::Matched(entry.clone());
            }
        }

        if saw_host_path_match {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }
}

fn hosts_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true, // an absent host matches any host
    }
}

fn method_matches(handler_method: &str, request_method: &str) -> bool {
    if handler_method.eq_ignore_ascii_case(request_method) {
        return true;
    }
    handler_method.eq_ignore_ascii_case("GET") && request_method.eq_ignore_ascii_case("HEAD")
}

/// Path matching per the spec: the handler path must be a byte-prefix of
/// the request path, and the byte right after it must be end-of-string,
/// or `/` at end-of-string, or (only for directory handlers) `/` followed
/// by more characters.
fn path_matches(handler_path: &str, is_dir: bool, request_path: &str) -> bool {
    let l = handler_path.len();
    // Compare as bytes, not `&str` slices: `request_path` may carry a
    // multi-byte UTF-8 char straddling offset `l`, and slicing a `&str` on
    // a non-char-boundary panics.
    if request_path.len() < l || request_path.as_bytes()[..l] != *handler_path.as_bytes() {
        return false;
    }
    match request_path.as_bytes().get(l) {
        None => true,
        Some(b'/') => request_path.len() == l + 1 || is_dir,
        _ => false,
    }
}

/// Host matching per the spec: case-insensitive, a single trailing `.` on
/// the handler's host is optional, and the request host may continue with
/// `:` (port) or be exactly the matched prefix plus a lone `.`.
fn host_matches(handler_host: &str, request_host: &str) -> bool {
    let handler_host = handler_host.trim_end_matches('.');
    let l = handler_host.len();
    // Same non-char-boundary hazard as `path_matches`: an IDN `Host:` value
    // can straddle offset `l`, so compare bytes rather than slicing a `&str`.
    if request_host.len() < l || !request_host.as_bytes()[..l].eq_ignore_ascii_case(handler_host.as_bytes()) {
        return false;
    }
    match request_host.as_bytes().get(l) {
        None => true,
        Some(b':') => true,
        Some(b'.') => request_host.len() == l + 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future;
    use tokio_core::net::TcpStream;

    struct Noop;
    impl Handler<TcpStream> for Noop {
        fn call(&self, transport: TcpStream, _req: Head) -> ::handler::DispatchFuture<TcpStream> {
            Box::new(future::ok(::handler::Dispatched::Responded(
                transport,
                ::wire::Response::new(200, "OK"),
            )))
        }
    }

    fn head(method: &str, target: &str, host: Option<&str>) -> Head {
        let mut raw = format!("{} {} HTTP/1.1\r\n", method, target);
        if let Some(h) = host {
            raw.push_str(&format!("Host: {}\r\n", h));
        }
        raw.push_str("\r\n");
        ::wire::try_parse(raw.as_bytes()).unwrap().unwrap().0
    }

    #[test]
    fn exact_path_match() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("GET", "/a", None, false, Arc::new(Noop)).unwrap();
        assert!(matches!(
            reg.lookup(&head("GET", "/a", Some("x"))),
            Lookup::Matched(_)
        ));
    }

    #[test]
    fn prefix_collision_rejected() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("GET", "/abc", None, false, Arc::new(Noop)).unwrap();
        let err = reg.add("GET", "/ab", None, false, Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, Error::AddrInUse(_)));
    }

    #[test]
    fn directory_match() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("GET", "/static", None, true, Arc::new(Noop)).unwrap();
        assert!(matches!(
            reg.lookup(&head("GET", "/static/foo", None)),
            Lookup::Matched(_)
        ));
        assert!(matches!(
            reg.lookup(&head("GET", "/staticx", None)),
            Lookup::NotFound
        ));
    }

    #[test]
    fn method_mismatch_is_405_not_404() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("POST", "/x", None, false, Arc::new(Noop)).unwrap();
        assert!(matches!(
            reg.lookup(&head("GET", "/x", None)),
            Lookup::MethodNotAllowed
        ));
    }

    #[test]
    fn head_matches_get_handler() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("GET", "/x", None, false, Arc::new(Noop)).unwrap();
        assert!(matches!(
            reg.lookup(&head("HEAD", "/x", None)),
            Lookup::Matched(_)
        ));
    }

    #[test]
    fn virtual_host_matching() {
        let mut reg: Registry<TcpStream> = Registry::new();
        reg.add("GET", "/", Some("example.com."), false, Arc::new(Noop)).unwrap();
        assert!(matches!(
            reg.lookup(&head("GET", "/", Some("Example.COM:8080"))),
            Lookup::Matched(_)
        ));
        assert!(matches!(
            reg.lookup(&head("GET", "/", Some("other"))),
            Lookup::NotFound
        ));
    }

    #[test]
    fn non_conflicting_registration_order_does_not_matter() {
        let mut a: Registry<TcpStream> = Registry::new();
        a.add("GET", "/a", None, false, Arc::new(Noop)).unwrap();
        a.add("GET", "/b", None, false, Arc::new(Noop)).unwrap();

        let mut b: Registry<TcpStream> = Registry::new();
        b.add("GET", "/b", None, false, Arc::new(Noop)).unwrap();
        b.add("GET", "/a", None, false, Arc::new(Noop)).unwrap();

        assert!(matches!(a.lookup(&head("GET", "/a", None)), Lookup::Matched(_)));
        assert!(matches!(b.lookup(&head("GET", "/a", None)), Lookup::Matched(_)));
    }
}
