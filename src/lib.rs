pub mod config;
pub mod error;
pub mod protocol;

pub use config::{Concurrency, ErrorSink, Handler, Middleware, TransportConfig};
pub use error::{BoxError, Error};
pub use protocol::{Client, Envelope, Kind, Server};
