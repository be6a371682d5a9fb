use std::io;

quick_error! {
    /// Errors returned from the public, fallible entry points of the engine.
    ///
    /// Per-request failures (bad request line, unsupported HTTP version,
    /// malformed headers) are *not* represented here: those are folded
    /// directly into synthesized HTTP error responses by the session state
    /// machine and never escape to the caller.
    #[derive(Debug)]
    pub enum Error {
        /// Allocation failure on a path that the underlying platform surfaces
        /// as exhaustion rather than aborting the process.
        OutOfMemory {
            description("out of memory")
        }
        /// A handler registration was missing a required field, or used the
        /// reserved `HEAD` method.
        InvalidArgument(reason: &'static str) {
            description("invalid argument")
            display("invalid argument: {}", reason)
        }
        /// The server URL's scheme is not one this build understands.
        InvalidAddress(scheme: String) {
            description("invalid address")
            display("invalid address: unsupported scheme {:?}", scheme)
        }
        /// A handler registration collided with an existing one, or the
        /// listener could not bind its address.
        AddrInUse(detail: String) {
            description("address in use")
            display("address in use: {}", detail)
        }
        /// `Instance::set_tls` was called after the server had already
        /// started at least once.
        Busy {
            description("busy")
        }
        /// TLS was requested (`https`/`wss`) but this build was compiled
        /// without the `tls` feature.
        NotSupported(what: &'static str) {
            description("not supported")
            display("not supported: {}", what)
        }
        /// An I/O failure from the listener or a connected transport.
        Io(err: io::Error) {
            from()
            description("i/o error")
            display("i/o error: {}", err)
            cause(err)
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
