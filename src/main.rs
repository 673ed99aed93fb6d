//! dockup - expose labeled containers over TLS
//!
//! Watches the Docker daemon for container starts and deaths and keeps one
//! TLS-terminated route per labeled container on a shared edge listener.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{ConfigLayer, Settings};
use dockup_cert::FileCertificateStore;
use dockup_control::{
    CertificateResolver, EventWatcher, HostnameResolver, TunnelController, TunnelRegistry,
};
use dockup_docker::DockerRuntime;
use dockup_edge::{EdgeRoutes, EdgeServer, EdgeServerConfig, EdgeTransport};
use dockup_proto::LabelSchema;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "dockup",
    about = "Expose Docker containers under TLS hostnames declared in their labels",
    version,
    long_about = "dockup watches Docker for containers labeled with a hostname and a port\n\
                  and serves each one over TLS on a shared listener, using the\n\
                  certificate of the hostname's root domain.\n\n\
                  Example:\n  \
                  docker run -d --label dockup.hostname=app.example.com \\\n    \
                  --label dockup.port=8080 my-app"
)]
struct Cli {
    /// YAML configuration file (command line and environment take precedence)
    #[arg(short, long, env = "DOCKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Docker daemon address (unix:// or tcp://), local defaults if unset
    #[arg(long, env = "DOCKER_HOST")]
    docker_host: Option<String>,

    /// Directory holding <root-domain>.pem or <root-domain>.crt/.key [default: /certs]
    #[arg(long, env = "DOCKUP_CERTS_DIR")]
    certs_dir: Option<PathBuf>,

    /// TLS listen address [default: 0.0.0.0:443]
    #[arg(short, long, env = "DOCKUP_LISTEN")]
    listen: Option<SocketAddr>,

    /// Label namespace, e.g. `dockup` for `dockup.hostname` [default: dockup]
    #[arg(long, env = "DOCKUP_LABEL_PREFIX")]
    label_prefix: Option<String>,

    /// Container address lookups before giving up [default: 5]
    #[arg(long, env = "DOCKUP_RESOLVE_ATTEMPTS")]
    resolve_attempts: Option<u32>,

    /// Seconds between lookup attempts [default: 2]
    #[arg(long, env = "DOCKUP_RESOLVE_DELAY_SECS")]
    resolve_delay_secs: Option<u64>,

    /// Upper bound in seconds for handling one event (unbounded if unset)
    #[arg(long, env = "DOCKUP_EVENT_TIMEOUT_SECS")]
    event_timeout_secs: Option<u64>,

    /// Seconds to wait before resubscribing after the event stream breaks [default: 5]
    #[arg(long, env = "DOCKUP_RECONNECT_DELAY_SECS")]
    reconnect_delay_secs: Option<u64>,

    /// Log filter (trace, debug, info, warn, error or a RUST_LOG directive) [default: info]
    #[arg(long, env = "DOCKUP_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            docker_host: self.docker_host.clone(),
            certs_dir: self.certs_dir.clone(),
            listen: self.listen,
            label_prefix: self.label_prefix.clone(),
            resolve_attempts: self.resolve_attempts,
            resolve_delay_secs: self.resolve_delay_secs,
            event_timeout_secs: self.event_timeout_secs,
            reconnect_delay_secs: self.reconnect_delay_secs,
            log_level: self.log_level.clone(),
        }
    }

    fn settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => ConfigLayer::load(path)?,
            None => ConfigLayer::default(),
        };
        Settings::resolve(self.layer().or(file))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Edge TLS and the HTTPS backend connector both use ring
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    init_logging(&settings.log_level)?;

    info!("Starting dockup");
    info!("Listen: {}", settings.listen);
    info!("Certificates: {}", settings.certs_dir.display());
    info!("Label prefix: {}", settings.label_prefix);

    let runtime = Arc::new(
        DockerRuntime::connect(settings.docker_host.as_deref())
            .await
            .context("Docker is not reachable")?,
    );

    let routes = Arc::new(EdgeRoutes::new());
    let edge = EdgeServer::bind(
        EdgeServerConfig {
            bind_addr: settings.listen,
        },
        routes.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to start edge listener on {} (is another process using port {}? try --listen)",
            settings.listen,
            settings.listen.port()
        )
    })?;
    info!("Edge listening on {}", edge.local_addr()?);

    let edge_task = tokio::spawn(async move {
        if let Err(e) = edge.run().await {
            error!("Edge listener stopped: {}", e);
        }
    });

    let mut controller = TunnelController::new(
        runtime.clone(),
        Arc::new(EdgeTransport::new(routes)),
        Arc::new(TunnelRegistry::new()),
        HostnameResolver::system().with_policy(settings.retry),
        CertificateResolver::new(Arc::new(FileCertificateStore::new(&settings.certs_dir))),
    )
    .with_labels(LabelSchema::new(&settings.label_prefix));
    if let Some(timeout) = settings.event_timeout {
        controller = controller.with_event_timeout(timeout);
    }
    let controller = Arc::new(controller);

    let watcher = EventWatcher::new(runtime, controller.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut supervisor = tokio::spawn(supervise(
        watcher,
        shutdown_rx,
        settings.reconnect_delay,
    ));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            let _ = shutdown_tx.send(true);
            if let Err(e) = (&mut supervisor).await {
                error!("Event supervisor failed: {}", e);
            }
        }
        result = &mut supervisor => {
            if let Err(e) = result {
                error!("Event supervisor failed: {}", e);
            }
        }
    }

    let stopped = controller.shutdown().await;
    info!("Stopped {} tunnels", stopped);

    edge_task.abort();
    info!("dockup stopped");

    Ok(())
}

/// Replay running containers and watch events, resubscribing whenever the
/// event stream breaks
async fn supervise(
    watcher: EventWatcher,
    mut shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
) {
    loop {
        match watcher.run(shutdown.clone()).await {
            Ok(()) => return,
            Err(e) => error!("Container event stream failed: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }
        warn!("Resubscribing to container events");
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}
