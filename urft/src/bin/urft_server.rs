//! `urft-server`: receive one file into the current directory.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use urft::config::DEFAULT_PORT;
use urft::{ProtocolConfig, Receiver, ReceiverOptions};

/// Receive a file over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local IP address to bind (e.g. 0.0.0.0).
    server_ip: IpAddr,
    /// Local UDP port.
    #[arg(default_value_t = DEFAULT_PORT)]
    server_port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // RUST_LOG overrides the default verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let bind = SocketAddr::new(cli.server_ip, cli.server_port);

    let receiver = Receiver::bind(bind, ProtocolConfig::default(), ReceiverOptions::default())
        .await
        .with_context(|| format!("binding {bind}"))?;

    match receiver.listen().await {
        Ok(report) if report.is_complete() => {
            log::info!(
                "[recv] wrote {} ({} bytes, {} duplicate(s), {} corrupt)",
                report.path.display(),
                report.bytes_written,
                report.duplicates,
                report.corrupt
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            log::warn!(
                "[recv] sender went away; {} holds {} of {} bytes",
                report.path.display(),
                report.bytes_written,
                report.filesize
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) if e.is_peer_failure() => {
            log::warn!("[recv] {e}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("receiving file"),
    }
}
