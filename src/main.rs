use std::io;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use kir::api::{create_router, server_config, AppState};
use kir::cli as commands;
use kir::config::{Cli, Command, ServerArgs, ServerConfig, Settings, StoreConfig};
use kir::observability::init_tracing;
use kir::policy::DecisionEngine;
use kir::storage::{EtcdStore, MemoryStore, RuleStore};

/// Time in-flight HTTPS requests get to finish after a shutdown signal.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("Cannot read config file")?;
    let store_config = cli.store.apply(settings.etcd);

    match &cli.command {
        Command::Server(args) => serve(args, &store_config, args.apply(settings.server)).await,
        Command::Add(args) => {
            let store = EtcdStore::connect(&store_config).await?;
            commands::add(&store, args, &mut io::stdout()).await
        }
        Command::Get(args) => {
            let store = EtcdStore::connect(&store_config).await?;
            commands::get(&store, args, &mut io::stdout()).await
        }
        Command::Delete(args) => {
            let store = EtcdStore::connect(&store_config).await?;
            commands::delete(&store, args, &mut io::stdout()).await
        }
    }
}

async fn serve(
    args: &ServerArgs,
    store_config: &StoreConfig,
    server: ServerConfig,
) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting kir review server"
    );

    // One store handle shared by every request
    let store: Arc<dyn RuleStore> = if args.memory {
        warn!("Serving rules from memory, nothing is persisted");
        Arc::new(MemoryStore::new())
    } else {
        info!(
            endpoints = ?store_config.endpoints,
            prefix = %store_config.prefix,
            "Connecting to etcd"
        );
        Arc::new(EtcdStore::connect(store_config).await?)
    };

    let state = Arc::new(AppState::new(DecisionEngine::with_regex(store)));
    let app = create_router(state);

    let addr: SocketAddr = server
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {:?}", server.listen))?;

    if server.tls.enabled {
        let tls = RustlsConfig::from_config(Arc::new(
            server_config(&server.tls).context("Cannot configure HTTPS listener")?,
        ));

        let handle = Handle::new();
        if server.graceful_shutdown {
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
            });
        }

        info!(
            addr = %addr,
            client_ca = ?server.tls.cacert_file,
            require_client_cert = server.tls.require_and_verify_client_cert,
            "Starting HTTPS server"
        );

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;

        info!("Shutdown complete");
        return Ok(());
    }

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if server.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
