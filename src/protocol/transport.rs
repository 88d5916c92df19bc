use std::io::{self, Read, Write};

use log::trace;
use thiserror::Error;

use super::{Envelope, ProtocolError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport IO error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported network '{0}'")]
    UnsupportedNetwork(String),
}

/// Exchanges envelopes over any bidirectional byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        trace!(
            "writing {:?} envelope ({} bytes)",
            envelope.kind(),
            envelope.encoded_len()
        );
        envelope.encode_into(&mut self.stream)?;
        Ok(())
    }

    pub fn read_envelope(&mut self) -> Result<Envelope, TransportError> {
        let envelope = Envelope::decode(&mut self.stream)?;
        trace!(
            "read {:?} envelope ({} payload bytes)",
            envelope.kind(),
            envelope.payload().len()
        );
        Ok(envelope)
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use crate::protocol::Kind;

    use super::*;

    #[test]
    fn read_write_data_envelope() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport
            .write_envelope(&Envelope::data(b"ping".to_vec()))
            .unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let envelope = transport.read_envelope().unwrap();
        assert_eq!(envelope, Envelope::data(b"ping".to_vec()));
    }

    #[test]
    fn read_write_error_envelope() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport.write_envelope(&Envelope::error("NOK")).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let envelope = transport.read_envelope().unwrap();
        assert_eq!(envelope.kind(), Kind::Error);
        assert_eq!(envelope.error_description().as_deref(), Some("NOK"));
    }

    #[test]
    fn read_from_empty_stream_fails() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));

        let err = transport.read_envelope().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::MalformedLength { .. })
        ));
    }

    #[test]
    fn write_lands_on_inner_stream() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));

        transport
            .write_envelope(&Envelope::data(b"x".to_vec()))
            .unwrap();
        assert_eq!(
            transport.into_inner().into_inner(),
            b"000000000000000000021x".to_vec()
        );
    }
}
