use std::{
    error::Error,
    io::{self, Write},
    process::ExitCode,
};

use clap::Parser;
use parcel::Client;

/// Sends one request and prints the response payload.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Transport kind: tcp or unix
    network: String,
    /// Server address (host:port or socket path)
    address: String,
    /// Request payload
    payload: String,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let client = Client::new(cli.network, cli.address);

    match client.request(cli.payload.into_bytes()) {
        Ok(resp) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&resp)?;
            writeln!(stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_application() => {
            eprintln!("server error: {err}");
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err.into()),
    }
}
