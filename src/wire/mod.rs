//! The wire-format collaborator: request parsing and response serialization.
//!
//! The engine's spec treats HTTP message parsing/serialization as an
//! external collaborator (a codec library the session drives, not something
//! it implements itself). In this crate that collaborator is realized as a
//! thin module built directly on `httparse` for requests and hand-rolled
//! serialization for responses, since request bodies and streaming
//! responses are both out of scope (see the crate's Non-goals) and do not
//! need a full message-body codec.

mod request;
mod response;

pub use self::request::{has_no_version, has_unsupported_version, read_request, try_parse, Head, ReadRequest};
pub use self::response::{error_response, write_body, write_response, Response, WriteBody, WriteResponseHeaders};
