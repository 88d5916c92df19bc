use std::{
    io::{self, ErrorKind},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::{debug, info};

use crate::{
    BoxError, Error,
    config::{Concurrency, ErrorSink, Handler, Middleware, TransportConfig, default_error_sink},
};

use super::{
    Envelope, ProtocolTransport, ThreadPool,
    net::{Accept, Connection, Listener, Network, Stream},
};

/// Collects everything a [`Server`] needs before it starts accepting.
pub struct ServerBuilder {
    network: String,
    address: String,
    middleware: Vec<Middleware>,
    error_sink: ErrorSink,
    concurrency: Concurrency,
}

impl ServerBuilder {
    /// Appends a middleware to the chain. Middleware run in the order they
    /// were added.
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Fn(&Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn register_middleware<I>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = Middleware>,
    {
        self.middleware.extend(middleware);
        self
    }

    /// Replaces the default log-line sink.
    pub fn error_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_sink = Arc::new(sink);
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> Server {
        Server {
            config: Arc::new(TransportConfig::new(
                self.network,
                self.address,
                self.middleware,
                self.error_sink,
            )),
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug)]
pub struct Server {
    config: Arc<TransportConfig>,
    concurrency: Concurrency,
}

impl Server {
    /// Server with no middleware, the default error sink and unbounded
    /// concurrency.
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self::builder(network, address).build()
    }

    pub fn builder(network: impl Into<String>, address: impl Into<String>) -> ServerBuilder {
        ServerBuilder {
            network: network.into(),
            address: address.into(),
            middleware: Vec::new(),
            error_sink: default_error_sink(),
            concurrency: Concurrency::default(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Binds the configured address without accepting yet.
    pub fn bind(&self) -> Result<Listening, Error> {
        let listener = Listener::bind(self.config.network(), self.config.address())?;
        let local_addr = listener.local_addr()?;
        info!("listening at {}:{local_addr}", listener.network());

        Ok(Listening {
            listener,
            local_addr,
            config: Arc::clone(&self.config),
            concurrency: self.concurrency,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Binds and serves until the listener fails or a shutdown is requested.
    /// Bind failures are returned immediately.
    pub fn listen<H>(&self, handler: H) -> Result<(), Error>
    where
        H: Fn(&Envelope) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    {
        self.bind()?.serve(handler)
    }
}

/// A bound server that has not started accepting.
#[derive(Debug)]
pub struct Listening {
    listener: Listener,
    local_addr: String,
    config: Arc<TransportConfig>,
    concurrency: Concurrency,
    stop: Arc<AtomicBool>,
}

impl Listening {
    /// The address actually bound, e.g. with the real port when `:0` was
    /// requested.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            network: self.listener.network(),
            address: wake_address(self.listener.network(), &self.local_addr),
        }
    }

    /// Runs the accept loop. Returns `Ok(())` after a requested shutdown and
    /// the listener error if accepting fails for good. The listener is closed
    /// on every path.
    pub fn serve<H>(self, handler: H) -> Result<(), Error>
    where
        H: Fn(&Envelope) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    {
        let Listening {
            listener,
            local_addr,
            config,
            concurrency,
            stop,
        } = self;
        let handler: Handler = Arc::new(handler);

        let result = Dispatcher::new(concurrency)
            .map_err(Error::from)
            .and_then(|dispatcher| accept_loop(&listener, &dispatcher, &config, &handler, &stop));

        if let Err(err) = listener.close() {
            config.report(err.into());
        }
        info!("stopped listening at {local_addr}");
        result
    }
}

/// Asks a running accept loop to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    network: Network,
    address: String,
}

impl ShutdownHandle {
    /// Sets the stop flag and dials the listener once so a blocked `accept`
    /// returns.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        match Connection::dial(&self.network.to_string(), &self.address) {
            Ok(conn) => {
                if let Err(e) = conn.close() {
                    debug!("closing shutdown wake-up connection failed: {e}");
                }
            }
            Err(e) => debug!("shutdown wake-up dial failed: {e}"),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Wildcard binds are reachable through loopback.
fn wake_address(network: Network, local_addr: &str) -> String {
    if network != Network::Tcp {
        return local_addr.to_string();
    }
    match local_addr.parse::<SocketAddr>() {
        Ok(mut addr) if addr.ip().is_unspecified() => {
            let loopback = match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            addr.set_ip(loopback);
            addr.to_string()
        }
        _ => local_addr.to_string(),
    }
}

enum Dispatcher {
    Unbounded,
    Pool(ThreadPool),
}

impl Dispatcher {
    fn new(concurrency: Concurrency) -> io::Result<Self> {
        match concurrency {
            Concurrency::Unbounded => Ok(Dispatcher::Unbounded),
            Concurrency::Bounded { workers, backlog } => {
                Ok(Dispatcher::Pool(ThreadPool::new(workers, backlog)?))
            }
        }
    }

    fn dispatch<S: Stream>(
        &self,
        conn: S,
        config: &Arc<TransportConfig>,
        handler: &Handler,
    ) -> io::Result<()> {
        let config = Arc::clone(config);
        let handler = Arc::clone(handler);
        let job = move || handle_connection(conn, &config, &handler);

        match self {
            Dispatcher::Unbounded => thread::Builder::new()
                .name("parcel-conn".to_string())
                .spawn(job)
                .map(|_| ()),
            Dispatcher::Pool(pool) => pool.execute(job),
        }
    }
}

fn accept_loop<L: Accept>(
    listener: &L,
    dispatcher: &Dispatcher,
    config: &Arc<TransportConfig>,
    handler: &Handler,
    stop: &AtomicBool,
) -> Result<(), Error> {
    loop {
        let accepted = listener.accept();
        if stop.load(Ordering::Acquire) {
            if let Ok(conn) = accepted {
                debug!("closing {} accepted during shutdown", conn.peer());
                if let Err(err) = conn.close() {
                    debug!("closing connection accepted during shutdown failed: {err}");
                }
            }
            return Ok(());
        }

        match accepted {
            Ok(conn) => {
                debug!("accepted connection from {}", conn.peer());
                if let Err(err) = dispatcher.dispatch(conn, config, handler) {
                    config.report(Error::Spawn(err));
                }
            }
            Err(err) if is_fatal(&err) => return Err(err.into()),
            Err(err) => config.report(err.into()),
        }
    }
}

/// Accept errors that mean the listener itself is unusable.
fn is_fatal(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::InvalidInput | ErrorKind::Unsupported)
}

/// Runs the single request/response exchange of one connection, then closes
/// it.
fn handle_connection<S: Stream>(conn: S, config: &TransportConfig, handler: &Handler) {
    let peer = conn.peer();
    let mut transport = ProtocolTransport::new(conn);

    if let Err(err) = respond(&mut transport, config, handler) {
        debug!("abandoning connection from {peer}: {err}");
        config.report(err);
    }
    if let Err(err) = transport.into_inner().close() {
        config.report(err.into());
    }
}

fn respond<S: Stream>(
    transport: &mut ProtocolTransport<S>,
    config: &TransportConfig,
    handler: &Handler,
) -> Result<(), Error> {
    let request = transport.read_envelope()?;
    config.check(&request)?;

    let response = match handler(&request) {
        Ok(payload) => Envelope::data(payload),
        Err(err) => {
            debug!("handler failed: {err}");
            Envelope::error(err.to_string())
        }
    };
    transport.write_envelope(&response)?;
    Ok(())
}
