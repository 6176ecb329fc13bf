//! # s3csi
//!
//! Node and controller plugin exposing S3 buckets as CSI volumes over QUIC.
//!
//! ## Usage
//! ```bash
//! MINIO_ACCESSKEY=... MINIO_SECRETKEY=... \
//! s3csi --config /etc/s3csi/config.yaml --node-id "$(hostname)"
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use libs3csi::store::{BucketStore, InMemoryBucketStore, S3BucketStore};
use libs3csi::transport::{CsiServer, parse_endpoint, tls};
use libs3csi::{DriverConfig, S3Driver};

mod cli;
mod logging;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.log_json {
        logging::init_logging_json(&args.log_level)?;
    } else {
        logging::init_logging(&args.log_level)?;
    }

    let mut config =
        DriverConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        version = %config.meta.driver_version,
        driver = %config.meta.driver_name,
        node_id = %config.node_id,
        "starting s3csi"
    );
    debug!(?config, "effective configuration");

    let store: Arc<dyn BucketStore> = if args.dev {
        warn!("development mode: buckets are kept in memory, mount binaries are not checked");
        Arc::new(InMemoryBucketStore::new())
    } else {
        config.preflight().context("preflight check failed")?;
        Arc::new(
            S3BucketStore::new(config.store_config())
                .context("failed to create object store client")?,
        )
    };
    let driver = Arc::new(S3Driver::from_config(&config, store));

    let addr = parse_endpoint(&config.endpoint)
        .with_context(|| format!("invalid endpoint {}", config.endpoint))?;
    let (cert_path, key_path) = match (&config.tls.cert_path, &config.tls.key_path) {
        (Some(cert), Some(key)) => (cert, key),
        _ => anyhow::bail!("TLS certificate and key are required"),
    };
    let tls_config =
        tls::load_server_config(cert_path, key_path).context("failed to load TLS material")?;

    let server = CsiServer::new(addr, tls_config, driver).context("failed to start server")?;
    server
        .serve_with_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("s3csi stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
