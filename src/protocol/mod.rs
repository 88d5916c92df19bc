//! Client-server communication protocol.
//!
//! This module defines how a parcel client and server exchange messages: the
//! envelope framing, the stream transports it runs over, and the two
//! endpoints built on top of them.
//!
//! # Overview
//!
//! Every exchange is one request and one response on a freshly dialed
//! connection:
//!
//! 1. The [`Client`] dials, writes a `Data` [`Envelope`] and waits.
//! 2. The [`Server`] decodes the envelope and runs its middleware chain. A
//!    rejection closes the connection without a reply.
//! 3. The handler's result is written back as a `Data` envelope, or as an
//!    `Error` envelope carrying the failure's description.
//! 4. Both sides close the connection.
//!
//! Background failures on the server (accept, decode, rejection, write,
//! close) never reach the peer; they go to the configured error sink.
//!
//! # Key Components
//!
//! - [`Envelope`]: a kind tag plus an opaque payload, with its codec.
//! - [`ProtocolTransport`]: envelope reads and writes over any `Read + Write`.
//! - [`Server`] / [`Listening`]: bind, accept and dispatch connections.
//! - [`Client`]: one request per connection.
//!
//! # Binary Format
//!
//! ```text
//! +----------------------+------+-----------------+
//! | length (20 digits)   | kind | payload         |
//! +----------------------+------+-----------------+
//! ```
//!
//! - `length` is the ASCII decimal of `payload.len() + 1`, left-padded with
//!   zeros to 20 characters.
//! - `kind` is a single ASCII digit: `1` for data, `2` for error. Any other
//!   digit is rejected.
//! - There is no delimiter, checksum or version byte, and the format is never
//!   negotiated.
//!
//! # Limits
//!
//! Reads have no deadline, so a stalled peer holds its connection's thread
//! until it goes away. With [`Concurrency::Unbounded`](crate::Concurrency) the
//! number of those threads is not capped either.
mod client;
mod envelope;
pub mod net;
mod server;
mod thread;
mod transport;

use thread::ThreadPool;

pub use client::Client;
pub use envelope::{Envelope, KIND_SIZE, Kind, LENGTH_FIELD_SIZE, ProtocolError};
pub use net::Network;
pub use server::{Listening, Server, ServerBuilder, ShutdownHandle};
pub use transport::{ProtocolTransport, TransportError};
