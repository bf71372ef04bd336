//! snapkv - A Single-Node In-Memory Key-Value Server
//!
//! Entry point: reads the startup flags, restores the last snapshot, starts
//! the snapshot timer and serves clients until Ctrl+C.

use anyhow::Context;
use clap::error::ErrorKind as ClapErrorKind;
use snapkv::commands::{CommandRegistry, ServerContext};
use snapkv::config::{ConfigError, ServerConfig};
use snapkv::connection::{handle_connection, ConnectionStats};
use snapkv::persistence::{run_snapshot, AppendLog, SnapshotCodec, SnapshotScheduler};
use snapkv::storage::Store;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn parse_config() -> ServerConfig {
    match ServerConfig::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(ConfigError::Cli(e))
            if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) =>
        {
            let _ = e.print();
            std::process::exit(0);
        }
        // Malformed arguments: exit before binding anything
        Err(_) => std::process::exit(1),
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
snapkv v{} - In-Memory Key-Value Server
──────────────────────────────────────────────
Server started on {}
Snapshot file     {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        snapkv::VERSION,
        config.bind_address(),
        config.db_path().display()
    );
}

/// Prepares the snapshot file and loads whatever it holds into `store`.
///
/// A failure is logged and the server keeps booting.
fn restore_snapshot(store: &Store, codec: &SnapshotCodec) {
    match codec.restore(store) {
        Ok(report) => info!(
            path = %codec.path().display(),
            loaded = report.loaded,
            appended = report.appended,
            truncated = report.truncated,
            "Snapshot restored"
        ),
        Err(e) => warn!(
            path = %codec.path().display(),
            error = %e,
            "Could not restore snapshot"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = parse_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let store = Arc::new(Store::new());
    let codec = Arc::new(SnapshotCodec::new(config.db_path()));

    restore_snapshot(&store, &codec);

    // Started only after the restore so its first tick cannot clobber
    // a file that has not been read yet
    let scheduler = SnapshotScheduler::start(
        Arc::clone(&store),
        Arc::clone(&codec),
        config.snapshot.clone(),
    );
    let append_log = AppendLog::start(Arc::clone(&codec));

    let ctx = ServerContext {
        store: Arc::clone(&store),
        codec: Arc::clone(&codec),
        config: Arc::new(config.clone()),
        append_log: Some(append_log),
    };
    let registry = Arc::new(CommandRegistry::with_defaults(&ctx));
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    print_banner(&config);
    info!(address = %config.bind_address(), "Listening");

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&registry), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    scheduler.stop();
    run_snapshot(&store, &codec).await;

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<CommandRegistry>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let registry = Arc::clone(&registry);
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr.to_string(), registry, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
