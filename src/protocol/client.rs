use std::sync::Arc;

use log::debug;

use crate::{
    Error,
    config::{TransportConfig, default_error_sink},
};

use super::{
    Envelope, ProtocolTransport,
    net::{Connection, Stream},
};

/// Sends one request per freshly dialed connection.
///
/// A `Client` holds no connection between calls, so it can be shared across
/// threads and used concurrently.
#[derive(Debug)]
pub struct Client {
    config: TransportConfig,
}

impl Client {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            config: TransportConfig::new(network, address, Vec::new(), default_error_sink()),
        }
    }

    /// Client whose connection close failures go to `sink` instead of the log.
    pub fn with_error_sink<F>(
        network: impl Into<String>,
        address: impl Into<String>,
        sink: F,
    ) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        Self {
            config: TransportConfig::new(network, address, Vec::new(), Arc::new(sink)),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sends `payload` as a `Data` envelope and waits for the reply.
    ///
    /// An `Error` reply comes back as [`Error::Application`] carrying the
    /// remote description. Connection and framing failures come back as
    /// [`Error::Transport`]; this includes a server that closed without
    /// answering, e.g. after a middleware rejection.
    pub fn request(&self, payload: impl Into<Vec<u8>>) -> Result<Vec<u8>, Error> {
        let conn = Connection::dial(self.config.network(), self.config.address())?;
        self.request_over(conn, payload)
    }

    fn request_over<S: Stream>(
        &self,
        conn: S,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Vec<u8>, Error> {
        let mut transport = ProtocolTransport::new(conn);

        let result = exchange(&mut transport, Envelope::data(payload));
        if let Err(err) = transport.into_inner().close() {
            self.config.report(err.into());
        }
        result
    }
}

fn exchange<S: Stream>(
    transport: &mut ProtocolTransport<S>,
    request: Envelope,
) -> Result<Vec<u8>, Error> {
    transport.write_envelope(&request)?;
    let response = transport.read_envelope()?;
    debug!(
        "received {:?} response from {}",
        response.kind(),
        transport.get_ref().peer()
    );
    response.into_result().map_err(Error::Application)
}

#[cfg(test)]
mod tests {
    use std::{io::Write, net::TcpListener, sync::Mutex, sync::atomic::Ordering, thread};

    use crate::protocol::{Kind, ProtocolError, TransportError, net::scripted::ScriptedStream};

    use super::*;

    /// Accepts one connection, reads the request and replies with `wire`.
    fn one_shot_server(wire: Vec<u8>) -> (String, thread::JoinHandle<Envelope>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let join = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = Envelope::decode(&mut stream).unwrap();
            stream.write_all(&wire).unwrap();
            request
        });
        (addr, join)
    }

    #[test]
    fn new_client_keeps_network_and_address() {
        let client = Client::new("a", "b");
        assert_eq!(client.config().network(), "a");
        assert_eq!(client.config().address(), "b");
        assert!(client.config().middleware().is_empty());
    }

    #[test]
    fn sends_data_envelope_and_returns_payload() {
        let (addr, join) = one_shot_server(Envelope::data(b"OK".to_vec()).encode());

        let resp = Client::new("tcp", addr).request(b"hello".to_vec()).unwrap();
        let request = join.join().unwrap();

        assert_eq!(resp, b"OK".to_vec());
        assert_eq!(request.kind(), Kind::Data);
        assert_eq!(request.payload(), b"hello");
    }

    #[test]
    fn error_envelope_becomes_application_error() {
        let (addr, join) = one_shot_server(Envelope::error("NOK").encode());

        let err = Client::new("tcp", addr).request(Vec::new()).unwrap_err();
        join.join().unwrap();

        assert!(matches!(&err, Error::Application(desc) if desc == "NOK"));
        assert_eq!(err.to_string(), "NOK");
    }

    #[test]
    fn garbled_reply_is_protocol_error() {
        let (addr, join) = one_shot_server(b"000000000000000000027x".to_vec());

        let err = Client::new("tcp", addr).request(Vec::new()).unwrap_err();
        join.join().unwrap();

        assert!(matches!(
            err,
            Error::Transport(TransportError::Protocol(ProtocolError::UnknownType(b'7')))
        ));
    }

    #[test]
    fn dial_failure_is_returned() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let seen = Arc::new(Mutex::new(0usize));
        let sink_seen = Arc::clone(&seen);
        let client = Client::with_error_sink("tcp", addr, move |_: &Error| {
            *sink_seen.lock().unwrap() += 1;
        });

        let err = client.request(b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn close_failure_goes_to_sink_and_keeps_reply() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let client = Client::with_error_sink("tcp", "unused", move |err: &Error| {
            sink_seen.lock().unwrap().push(err.to_string());
        });
        let conn = ScriptedStream::new(Envelope::data(b"OK".to_vec()).encode()).failing_close();
        let written = Arc::clone(&conn.written);
        let closed = Arc::clone(&conn.closed);

        let resp = client.request_over(conn, b"hello".to_vec()).unwrap();

        assert_eq!(resp, b"OK".to_vec());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(*written.lock().unwrap(), Envelope::data(b"hello".to_vec()).encode());
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["transport IO error: close failed".to_string()]
        );
    }

    #[test]
    fn write_failure_is_returned_and_still_closes() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink_seen = Arc::clone(&seen);
        let client = Client::with_error_sink("tcp", "unused", move |_: &Error| {
            *sink_seen.lock().unwrap() += 1;
        });
        let conn = ScriptedStream::new(Vec::new()).failing_writes();
        let closed = Arc::clone(&conn.closed);

        let err = client.request_over(conn, b"hello".to_vec()).unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
