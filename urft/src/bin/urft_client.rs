//! `urft-client`: send one file to a running `urft-server`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::Parser;

use urft::{ProtocolConfig, Sender};

/// Send a file over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// File to send.  Only its base name is announced to the server.
    file_path: PathBuf,
    /// Server host name or IP address.
    server_ip: String,
    /// Server UDP port.
    server_port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    // RUST_LOG overrides the default verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let server = tokio::net::lookup_host((cli.server_ip.as_str(), cli.server_port))
        .await
        .with_context(|| format!("resolving {}", cli.server_ip))?
        .next()
        .ok_or_else(|| anyhow!("{} did not resolve to an address", cli.server_ip))?;

    let sender = Sender::connect(server, ProtocolConfig::default())
        .await
        .context("opening client socket")?;

    match sender.send_file(&cli.file_path).await {
        Ok(report) => {
            log::info!(
                "[send] done: {} bytes, {} INIT attempt(s), {} ACK(s)",
                report.filesize,
                report.init_attempts,
                report.acks_received
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_peer_failure() => {
            log::warn!("[send] {e}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("sending {}", cli.file_path.display())),
    }
}
