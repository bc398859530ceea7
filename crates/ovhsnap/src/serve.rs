// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ovhsnap serve` command implementation.
//!
//! Assembles the engine (client pool, store, probe, order driver, notifier,
//! queue scheduler, availability monitor), starts the control plane, and
//! coordinates graceful shutdown. The [`Engine`] value constructed here owns
//! every long-lived component; the HTTP handlers hold Arcs into it and there
//! is no process-global mutable state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ovhsnap_config::{validate, SnapConfig};
use ovhsnap_core::{
    AvailabilityProbe, Notifier, NullNotifier, OrderPlacer, PriceQuoter, SnapError,
};
use ovhsnap_gateway::{start_server, AppState, AuthConfig};
use ovhsnap_monitor::MonitorRunner;
use ovhsnap_order::OrderDriver;
use ovhsnap_ovh::{ClientPool, ProbeService};
use ovhsnap_queue::{worker_cap, QueueScheduler};
use ovhsnap_store::Store;
use ovhsnap_telegram::TelegramNotifier;

/// Owns the engine's long-lived components (C1-C7).
struct Engine {
    store: Arc<Store>,
    scheduler: Arc<QueueScheduler>,
    monitor: Arc<MonitorRunner>,
}

/// Runs the `ovhsnap serve` command until SIGINT/SIGTERM.
pub async fn run_serve(config: SnapConfig) -> Result<(), SnapError> {
    init_tracing(&config);
    validate(&config)?;

    info!("starting ovhsnap serve");

    // Filesystem layout, all auto-created.
    for dir in [
        &config.data.data_dir,
        &config.data.cache_dir,
        &config.data.log_dir,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SnapError::Store {
                source: Box::new(e),
            })?;
    }

    // Fails closed on corrupt state files; the operator must restore.
    let store = Arc::new(Store::open(&config.data.data_dir).await?);

    let pool = Arc::new(ClientPool::new());
    let probe = Arc::new(ProbeService::new(Arc::clone(&pool)));
    let driver = Arc::new(OrderDriver::new(Arc::clone(&pool)));

    let notifier: Arc<dyn Notifier> = if config.telegram.is_enabled() {
        info!("telegram notifications enabled");
        Arc::new(TelegramNotifier::new(&config.telegram)?)
    } else {
        info!("telegram not configured, notifications disabled");
        Arc::new(NullNotifier)
    };

    let account_count = store.accounts().len().await;
    let workers = worker_cap(config.queue.max_workers, account_count);
    info!(accounts = account_count, workers, "sizing worker pool");

    let scheduler = QueueScheduler::new(
        Arc::clone(&store),
        Arc::clone(&probe) as Arc<dyn AvailabilityProbe>,
        Arc::clone(&driver) as Arc<dyn OrderPlacer>,
        Arc::clone(&notifier),
        workers,
    );
    let monitor = MonitorRunner::new(
        Arc::clone(&store),
        Arc::clone(&probe) as Arc<dyn AvailabilityProbe>,
        Arc::clone(&notifier),
        Some(Arc::clone(&driver) as Arc<dyn PriceQuoter>),
        config.monitor.check_interval,
    );

    let engine = Engine {
        store,
        scheduler,
        monitor,
    };

    let scheduler_handle = Arc::clone(&engine.scheduler).spawn();
    if config.monitor.autostart {
        Arc::clone(&engine.monitor).start().await;
    }

    let shutdown = install_signal_handler();

    let api_key = config
        .server
        .enable_api_key_auth
        .then(|| config.server.api_secret_key.clone().unwrap_or_default());
    let state = AppState {
        store: Arc::clone(&engine.store),
        scheduler: Arc::clone(&engine.scheduler),
        monitor: Arc::clone(&engine.monitor),
        auth: AuthConfig { api_key },
    };

    start_server(
        &config.server.host,
        config.server.port,
        state,
        shutdown.clone(),
    )
    .await?;

    // The server returned: the shutdown token fired. Stop dispatching new
    // attempts; in-flight attempts were allowed to finish and record their
    // outcome before their worker returned.
    info!("shutting down");
    engine.scheduler.shutdown();
    engine.monitor.stop().await;
    let _ = scheduler_handle.await;
    info!("shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber from the configured verbosity.
///
/// `RUST_LOG` wins when set.
fn init_tracing(config: &SnapConfig) {
    let default_level = if config.server.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}
