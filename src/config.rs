//! Shared transport configuration.
//!
//! A [`TransportConfig`] is assembled once (through
//! [`ServerBuilder`](crate::protocol::ServerBuilder) or
//! [`Client`](crate::protocol::Client)) and then shared behind an `Arc`. It has
//! no mutating methods, so nothing can change the middleware chain or the
//! error sink once a server is accepting.
use std::{fmt, sync::Arc};

use log::error;

use crate::{BoxError, Error, protocol::Envelope};

/// Validation hook run before the handler. Receives the request read-only.
pub type Middleware = Arc<dyn Fn(&Envelope) -> Result<(), BoxError> + Send + Sync>;

/// Receives background errors that never reach the remote peer.
pub type ErrorSink = Arc<dyn Fn(&Error) + Send + Sync>;

/// Business logic turning a request into a response payload.
pub type Handler = Arc<dyn Fn(&Envelope) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// Writes the error as a log line.
pub fn default_error_sink() -> ErrorSink {
    Arc::new(|err: &Error| error!("{err}"))
}

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// One thread per connection with no upper bound.
    #[default]
    Unbounded,
    /// A fixed pool of `workers`; the accept loop waits once `backlog`
    /// connections are queued.
    Bounded { workers: usize, backlog: usize },
}

pub struct TransportConfig {
    network: String,
    address: String,
    middleware: Vec<Middleware>,
    error_sink: ErrorSink,
}

impl TransportConfig {
    pub(crate) fn new(
        network: impl Into<String>,
        address: impl Into<String>,
        middleware: Vec<Middleware>,
        error_sink: ErrorSink,
    ) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
            middleware,
            error_sink,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Hands `err` to the configured sink.
    pub fn report(&self, err: Error) {
        (self.error_sink)(&err)
    }

    /// Runs the middleware chain in registration order, stopping at the first
    /// rejection.
    pub fn check(&self, request: &Envelope) -> Result<(), Error> {
        for (index, middleware) in self.middleware.iter().enumerate() {
            middleware(request).map_err(|source| Error::Rejected { index, source })?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn config_with(middleware: Vec<Middleware>) -> TransportConfig {
        TransportConfig::new("tcp", "127.0.0.1:0", middleware, default_error_sink())
    }

    #[test]
    fn empty_chain_passes() {
        let config = config_with(Vec::new());
        assert!(config.check(&Envelope::data(b"x".to_vec())).is_ok());
    }

    #[test]
    fn chain_runs_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let middleware = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                Arc::new(move |_: &Envelope| -> Result<(), BoxError> {
                    order.lock().unwrap().push(i);
                    Ok(())
                }) as Middleware
            })
            .collect();

        config_with(middleware)
            .check(&Envelope::data(Vec::new()))
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn first_rejection_short_circuits() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let reject: Middleware =
            Arc::new(|_: &Envelope| -> Result<(), BoxError> { Err("too big".into()) });
        let count: Middleware = Arc::new(move |_: &Envelope| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = config_with(vec![reject, count])
            .check(&Envelope::data(Vec::new()))
            .unwrap_err();

        assert!(matches!(err, Error::Rejected { index: 0, .. }));
        assert_eq!(err.to_string(), "request rejected by middleware #0: too big");
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn report_reaches_custom_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let config = TransportConfig::new(
            "tcp",
            "127.0.0.1:0",
            Vec::new(),
            Arc::new(move |err: &Error| sink_seen.lock().unwrap().push(err.to_string())),
        );

        config.report(Error::Application("boom".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec!["boom".to_string()]);
    }

    #[test]
    fn accessors_return_configured_values() {
        let config = TransportConfig::new("a", "b", Vec::new(), default_error_sink());
        assert_eq!(config.network(), "a");
        assert_eq!(config.address(), "b");
        assert!(config.middleware().is_empty());
    }
}
