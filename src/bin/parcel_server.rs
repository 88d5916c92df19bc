use std::error::Error;

use clap::Parser;
use log::info;
use parcel::{BoxError, Concurrency, Envelope, Server};

/// Echo server speaking the parcel protocol.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Transport kind: tcp or unix
    network: String,
    /// Address to listen on (host:port or socket path)
    address: String,
    /// Serve connections from a fixed pool of this many workers
    #[arg(long)]
    workers: Option<usize>,
    /// Connections allowed to queue for a free worker
    #[arg(long, default_value_t = 64)]
    backlog: usize,
    /// Reject requests whose payload is larger than this many bytes
    #[arg(long)]
    max_request_bytes: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let concurrency = match cli.workers {
        Some(workers) => Concurrency::Bounded {
            workers,
            backlog: cli.backlog,
        },
        None => Concurrency::Unbounded,
    };

    let mut builder = Server::builder(cli.network, cli.address).concurrency(concurrency);
    if let Some(limit) = cli.max_request_bytes {
        builder = builder.middleware(move |req: &Envelope| -> Result<(), BoxError> {
            let size = req.payload().len();
            if size > limit {
                return Err(format!("payload of {size} bytes exceeds {limit}").into());
            }
            Ok(())
        });
    }

    let listening = builder.build().bind()?;
    let shutdown = listening.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        shutdown.shutdown();
    })?;

    listening.serve(|req| Ok(req.payload().to_vec()))?;
    Ok(())
}
