//! Envelope framing.
//!
//! An envelope travels on the wire as
//!
//! ```text
//! length (20 ASCII digits, zero padded) || kind (1 ASCII digit) || payload
//! ```
//!
//! where `length` counts the kind digit plus the payload bytes. There is no
//! delimiter, checksum or version byte.
//!
//! # Example
//! ```rust
//! use parcel::protocol::{Envelope, Kind};
//!
//! let envelope = Envelope::data(b"x".to_vec());
//! assert_eq!(envelope.encode(), b"000000000000000000021x");
//!
//! let decoded = Envelope::decode(&mut &envelope.encode()[..]).unwrap();
//! assert_eq!(decoded.kind(), Kind::Data);
//! assert_eq!(decoded.payload(), b"x");
//! ```
use std::io::{self, ErrorKind, Read, Write};

use log::trace;
use thiserror::Error;

use super::transport::TransportError;

/// Width of the ASCII length field.
pub const LENGTH_FIELD_SIZE: usize = 20;
/// Width of the ASCII kind tag.
pub const KIND_SIZE: usize = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed length field {field:?}")]
    MalformedLength { field: String },

    #[error("truncated envelope: expected {expected} bytes, read {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("unknown envelope type tag {0:#04x}")]
    UnknownType(u8),
}

/// Envelope type tag. Encoded as a single decimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Data = 1,
    Error = 2,
}

impl Kind {
    /// ASCII digit written on the wire.
    pub fn as_digit(self) -> u8 {
        b'0' + self as u8
    }

    pub fn is_data(self) -> bool {
        self == Kind::Data
    }

    pub fn is_error(self) -> bool {
        self == Kind::Error
    }
}

impl TryFrom<u8> for Kind {
    type Error = ProtocolError;

    /// Parses the ASCII digit found on the wire.
    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            b'1' => Ok(Kind::Data),
            b'2' => Ok(Kind::Error),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// A single framed message: a kind tag and an owned, opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: Kind,
    payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: Kind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Kind::Data, payload)
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self::new(Kind::Error, description.into().into_bytes())
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Value carried by the length field: payload plus the kind tag.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64 + KIND_SIZE as u64
    }

    /// Total number of bytes [`Envelope::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        LENGTH_FIELD_SIZE + KIND_SIZE + self.payload.len()
    }

    /// The remote description if this is an `Error` envelope.
    pub fn error_description(&self) -> Option<String> {
        self.kind
            .is_error()
            .then(|| String::from_utf8_lossy(&self.payload).into_owned())
    }

    /// Payload for `Data` envelopes, the decoded description for `Error` ones.
    pub fn into_result(self) -> Result<Vec<u8>, String> {
        match self.kind {
            Kind::Data => Ok(self.payload),
            Kind::Error => Err(String::from_utf8_lossy(&self.payload).into_owned()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(format!("{:020}", self.size()).as_bytes());
        out.push(self.kind.as_digit());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Writes the encoded envelope in one buffer so a frame is never split
    /// across separate `write_all` calls.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())?;
        writer.flush()
    }

    /// Reads exactly one envelope from `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, TransportError> {
        let mut field = [0u8; LENGTH_FIELD_SIZE];
        let read = read_full(reader, &mut field)?;
        if read < LENGTH_FIELD_SIZE {
            return Err(ProtocolError::MalformedLength {
                field: String::from_utf8_lossy(&field[..read]).into_owned(),
            }
            .into());
        }
        let declared = parse_length(&field)?;
        trace!("decoding envelope of {declared} bytes");

        // A declared length of zero leaves no room for the kind tag.
        let mut tag = [0u8; KIND_SIZE];
        let read = if declared == 0 {
            0
        } else {
            read_full(reader, &mut tag)?
        };
        if read < KIND_SIZE {
            return Err(ProtocolError::Truncated {
                expected: declared.max(KIND_SIZE as u64),
                actual: 0,
            }
            .into());
        }
        let kind = Kind::try_from(tag[0])?;

        // `take` bounds the read without trusting `declared` for an up-front
        // allocation.
        let remaining = declared - KIND_SIZE as u64;
        let mut payload = Vec::new();
        reader.take(remaining).read_to_end(&mut payload)?;
        if (payload.len() as u64) < remaining {
            return Err(ProtocolError::Truncated {
                expected: declared,
                actual: payload.len() as u64 + KIND_SIZE as u64,
            }
            .into());
        }

        Ok(Self { kind, payload })
    }
}

fn parse_length(field: &[u8; LENGTH_FIELD_SIZE]) -> Result<u64, ProtocolError> {
    let malformed = || ProtocolError::MalformedLength {
        field: String::from_utf8_lossy(field).into_owned(),
    };
    if !field.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    // Only digits remain, so the only failure left is u64 overflow.
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(malformed)
}

/// Fills `buf` until it is full or the stream reaches end of file. Returns
/// the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
