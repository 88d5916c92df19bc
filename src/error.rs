use std::io;

use thiserror::Error;

use crate::protocol::TransportError;

/// Failure type returned by handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// Dial, bind, accept, read, write or close failure, or a framing
    /// violation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A middleware refused the request; nothing was sent back.
    #[error("request rejected by middleware #{index}: {source}")]
    Rejected {
        index: usize,
        #[source]
        source: BoxError,
    },

    /// The remote handler failed. Displays exactly the remote description.
    #[error("{0}")]
    Application(String),

    #[error("failed to dispatch connection: {0}")]
    Spawn(#[source] io::Error),
}

impl Error {
    /// `true` when the failure came back from the remote handler rather than
    /// from the connection.
    pub fn is_application(&self) -> bool {
        matches!(self, Error::Application(_))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Transport(TransportError::Io(value))
    }
}
