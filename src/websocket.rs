//! WebSocket handshake computation.
//!
//! This module is a concrete illustration of `is_upgrader` (left abstract
//! in the core spec): it computes the materials for an RFC 6455 handshake
//! from a request's headers. It stops there -- framing and message
//! exchange after the upgrade is out of scope for this crate, same as the
//! core engine never reads or writes a request/response body it doesn't
//! own.

use std::fmt;

use sha1::Sha1;

use wire::Head;

const GUID: &'static str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The computed `Sec-WebSocket-Accept` header value.
pub struct WebsocketAccept([u8; 20]);

/// Everything extracted from a validated WebSocket upgrade request.
pub struct WebsocketHandshake {
    /// Value to send back as `Sec-WebSocket-Accept`.
    pub accept: WebsocketAccept,
    /// Requested `Sec-WebSocket-Protocol` tokens, in order.
    pub protocols: Vec<String>,
    /// Requested `Sec-WebSocket-Extensions` tokens, in order.
    pub extensions: Vec<String>,
}

fn bytes_trim(mut x: &[u8]) -> &[u8] {
    while !x.is_empty() && matches!(x[0], b'\r' | b'\n' | b' ' | b'\t') {
        x = &x[1..];
    }
    while !x.is_empty() && matches!(x[x.len() - 1], b'\r' | b'\n' | b' ' | b'\t') {
        x = &x[..x.len() - 1];
    }
    x
}

/// Validate `req` as a WebSocket upgrade request and, if it is one,
/// compute the handshake response materials.
///
/// `Ok(None)` means this is an ordinary HTTP request (no `Connection:
/// upgrade`). `Err(())` means there was an upgrade attempt but it is
/// malformed -- callers should respond `400 Bad Request` rather than
/// falling back to treating it as plain HTTP.
pub fn get_handshake(req: &Head) -> Result<Option<WebsocketHandshake>, ()> {
    let conn_upgrade = req
        .header("Connection")
        .and_then(|v| ::std::str::from_utf8(v).ok())
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")));
    if !conn_upgrade.unwrap_or(false) {
        return Ok(None);
    }

    let mut upgrade = false;
    let mut version_ok = false;
    let mut accept = None;
    let mut protocols = Vec::new();
    let mut extensions = Vec::new();

    for (name, value) in req.all_headers() {
        if name.eq_ignore_ascii_case("Sec-WebSocket-Key") {
            if accept.is_some() {
                debug!("duplicate Sec-WebSocket-Key");
                return Err(());
            }
            let mut sha1 = Sha1::new();
            sha1.update(bytes_trim(value));
            sha1.update(GUID.as_bytes());
            accept = Some(WebsocketAccept(sha1.digest().bytes()));
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Version") {
            if bytes_trim(value) != b"13" {
                debug!("unsupported websocket version {:?}", String::from_utf8_lossy(value));
                return Err(());
            }
            version_ok = true;
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Protocol") {
            let tokens = ::std::str::from_utf8(value).map_err(|_| debug!("bad utf-8 in Sec-WebSocket-Protocol"))?;
            protocols.extend(tokens.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()).map(String::from));
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Extensions") {
            let tokens = ::std::str::from_utf8(value).map_err(|_| debug!("bad utf-8 in Sec-WebSocket-Extensions"))?;
            extensions.extend(tokens.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()).map(String::from));
        } else if name.eq_ignore_ascii_case("Upgrade") {
            if !value.eq_ignore_ascii_case(b"websocket") {
                return Ok(None);
            }
            upgrade = true;
        }
    }

    if !upgrade {
        debug!("no Upgrade header for a websocket request");
        return Err(());
    }
    if !version_ok || accept.is_none() {
        debug!("missing required websocket headers");
        return Err(());
    }

    Ok(Some(WebsocketHandshake {
        accept: accept.unwrap(),
        protocols,
        extensions,
    }))
}

impl fmt::Display for WebsocketAccept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const CHARS: &'static [u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut buf = [0u8; 28];
        for i in 0..6 {
            let n = ((self.0[i * 3] as usize) << 16) | ((self.0[i * 3 + 1] as usize) << 8) | (self.0[i * 3 + 2] as usize);
            buf[i * 4] = CHARS[(n >> 18) & 63];
            buf[i * 4 + 1] = CHARS[(n >> 12) & 63];
            buf[i * 4 + 2] = CHARS[(n >> 6) & 63];
            buf[i * 4 + 3] = CHARS[n & 63];
        }
        let n = ((self.0[18] as usize) << 16) | ((self.0[19] as usize) << 8);
        buf[24] = CHARS[(n >> 18) & 63];
        buf[25] = CHARS[(n >> 12) & 63];
        buf[26] = CHARS[(n >> 6) & 63];
        buf[27] = b'=';
        f.write_str(unsafe { ::std::str::from_utf8_unchecked(&buf) })
    }
}

impl fmt::Debug for WebsocketAccept {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WebsocketAccept({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(extra: &str) -> Head {
        let raw = format!(
            "GET /chat HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\n{}\r\n",
            extra
        );
        ::wire::try_parse(raw.as_bytes()).unwrap().unwrap().0
    }

    #[test]
    fn valid_handshake() {
        let h = head("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n");
        let hs = get_handshake(&h).unwrap().unwrap();
        assert_eq!(hs.accept.to_string(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn not_a_websocket_request() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let h = ::wire::try_parse(raw).unwrap().unwrap().0;
        assert!(get_handshake(&h).unwrap().is_none());
    }

    #[test]
    fn wrong_version_rejected() {
        let raw = b"GET /chat HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\n\
                    Upgrade: websocket\r\nSec-WebSocket-Version: 8\r\n\
                    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let h = ::wire::try_parse(raw).unwrap().unwrap().0;
        assert!(get_handshake(&h).is_err());
    }
}
