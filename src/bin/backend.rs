use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use tubescan::config::{SettingsOverrides, resolve_settings};
use tubescan::pipeline::Pipeline;
use tubescan::server::{AppState, router};

/// Serves channel metadata runs over HTTP as server-sent events.
#[derive(Debug, Clone, Parser)]
#[command(name = "backend", version)]
struct BackendArgs {
    /// Address to listen on (overrides TUBESCAN_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides TUBESCAN_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Concurrent metadata fetches per run.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    no_transcripts: bool,
    #[arg(long)]
    no_enrich: bool,
    /// Settings file read before the environment.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            host: self.host.clone(),
            port: self.port,
            fetch_workers: self.workers,
            transcripts: self.no_transcripts.then_some(false),
            enrich: self.no_enrich.then_some(false),
            env_path: self.env_file.clone(),
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TUBESCAN_HOST")
}

#[tokio::main]
async fn main() -> Result<()> {
    tubescan::init_logging();
    let args = BackendArgs::parse();
    let settings = resolve_settings(args.overrides())?;
    let host = parse_host_arg(&settings.host)?;

    let pipeline = Pipeline::from_settings(&settings);
    info!(
        workers = pipeline.options().fetch_workers,
        max_continuations = pipeline.options().max_continuations,
        transcripts = settings.transcripts,
        enrich = settings.enrich,
        "pipeline configured"
    );
    let app = router(AppState::new(pipeline));

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("API server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> BackendArgs {
        BackendArgs::try_parse_from(std::iter::once("backend").chain(extra.iter().copied()))
            .expect("parsed args")
    }

    #[test]
    fn no_flags_means_no_overrides() {
        let overrides = parse(&[]).overrides();
        assert!(overrides.host.is_none());
        assert!(overrides.port.is_none());
        assert!(overrides.transcripts.is_none());
        assert!(overrides.enrich.is_none());
    }

    #[test]
    fn flags_become_overrides() {
        let overrides = parse(&[
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--workers",
            "4",
            "--no-transcripts",
            "--no-enrich",
            "--env-file",
            "/etc/tubescan.env",
        ])
        .overrides();
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.fetch_workers, Some(4));
        assert_eq!(overrides.transcripts, Some(false));
        assert_eq!(overrides.enrich, Some(false));
        assert_eq!(overrides.env_path, Some(PathBuf::from("/etc/tubescan.env")));
    }

    #[test]
    fn rejects_bad_port_and_unknown_flags() {
        assert!(BackendArgs::try_parse_from(["backend", "--port", "nope"]).is_err());
        assert!(BackendArgs::try_parse_from(["backend", "--media-root", "/x"]).is_err());
    }

    #[test]
    fn host_must_be_an_address() {
        assert!(parse_host_arg("127.0.0.1").is_ok());
        assert!(parse_host_arg("::1").is_ok());
        assert!(parse_host_arg("localhost").is_err());
    }
}
