//! Stream transports the protocol runs over.
//!
//! The `(network, address)` pair given to a server or client is kept as plain
//! text and only resolved here, at bind or dial time.
use std::{
    fmt,
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpListener, TcpStream},
    str::FromStr,
};

#[cfg(unix)]
use std::{
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
};

use log::debug;

use super::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    #[cfg(unix)]
    Unix,
}

impl FromStr for Network {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            #[cfg(unix)]
            "unix" => Ok(Network::Unix),
            other => Err(TransportError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            #[cfg(unix)]
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// A connected byte stream that carries one request/response exchange.
pub trait Stream: Read + Write + Send + 'static {
    /// Describes the remote end for log lines.
    fn peer(&self) -> String;

    /// Shuts the stream down. A peer that already went away is not an error.
    fn close(self) -> io::Result<()>;
}

/// Source of accepted streams for the server's accept loop.
pub trait Accept {
    type Stream: Stream;

    fn accept(&self) -> io::Result<Self::Stream>;
}

/// A bound listening socket.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    pub fn bind(network: &str, address: &str) -> Result<Self, TransportError> {
        let listener = match network.parse::<Network>()? {
            Network::Tcp => Listener::Tcp(TcpListener::bind(address)?),
            #[cfg(unix)]
            Network::Unix => Listener::Unix {
                listener: UnixListener::bind(address)?,
                path: PathBuf::from(address),
            },
        };
        Ok(listener)
    }

    pub fn network(&self) -> Network {
        match self {
            Listener::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            Listener::Unix { .. } => Network::Unix,
        }
    }

    /// Address a client can dial to reach this listener.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Listener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(path.display().to_string()),
        }
    }

    /// Releases the socket. A Unix listener also removes its socket file.
    pub fn close(self) -> io::Result<()> {
        match self {
            Listener::Tcp(listener) => {
                drop(listener);
                Ok(())
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                drop(listener);
                debug!("removing socket file {}", path.display());
                std::fs::remove_file(path)
            }
        }
    }
}

impl Accept for Listener {
    type Stream = Connection;

    fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Tcp(listener) => listener.accept().map(|(s, _)| Connection::Tcp(s)),
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                listener.accept().map(|(s, _)| Connection::Unix(s))
            }
        }
    }
}

/// One established stream, exclusively owned by whoever handles it.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    pub fn dial(network: &str, address: &str) -> Result<Self, TransportError> {
        let conn = match network.parse::<Network>()? {
            Network::Tcp => Connection::Tcp(TcpStream::connect(address)?),
            #[cfg(unix)]
            Network::Unix => Connection::Unix(UnixStream::connect(address)?),
        };
        Ok(conn)
    }
}

impl Stream for Connection {
    fn peer(&self) -> String {
        match self {
            Connection::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:?".to_string()),
            #[cfg(unix)]
            Connection::Unix(_) => "unix".to_string(),
        }
    }

    fn close(self) -> io::Result<()> {
        let res = match &self {
            Connection::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match res {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.flush(),
        }
    }
}
