//! whs-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, runs the startup
//! sequence (database, ledger probe, initial passes), wires middleware,
//! and starts the HTTP server.  All route handlers live in `routes.rs`;
//! all shared state types live in `state.rs`.
//!
//! Startup order matters: the ledger node must answer, the program must
//! be readable at the configured address, the warehouse sync must link
//! what the ledger lost, and one sweep must settle what expired — only
//! then does the periodic scheduler take over.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use whs_audit::HealJournal;
use whs_daemon::{routes, scheduler, state};
use whs_db::PgStore;
use whs_ledger::{GasLimits, LedgerEndpoint, RpcLedger};
use whs_reconcile::{LedgerGateway, ReconcileEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_path = std::env::var("WHS_CONFIG").unwrap_or_else(|_| "whs.yaml".to_string());
    let loaded = whs_config::load_yaml(&config_path)
        .with_context(|| format!("loading config {config_path}"))?;
    info!(config = %config_path, config_hash = %loaded.config_hash, "config loaded");
    let cfg = loaded.config;

    let pool = whs_db::connect_from_env().await?;
    whs_db::migrate(&pool).await?;
    let store = PgStore::new(pool);

    let signer_key = whs_config::resolve_signer_key(&cfg.ledger)?;
    let ledger = RpcLedger::new(LedgerEndpoint {
        rpc_url: cfg.ledger.rpc_url.clone(),
        program_address: cfg.ledger.program_address.clone(),
        signer_address: cfg.ledger.signer_address.clone(),
        signer_key,
        confirm_timeout: Duration::from_secs(cfg.ledger.confirm_timeout_secs),
        gas: GasLimits {
            register_warehouse: cfg.ledger.gas.register_warehouse,
            update_warehouse: cfg.ledger.gas.update_warehouse,
            create_lease: cfg.ledger.gas.create_lease,
            complete_lease: cfg.ledger.gas.complete_lease,
        },
    });

    wait_for_ledger(&ledger, cfg.scheduler.startup_probe_attempts).await?;
    ledger.warehouse_counter().await.with_context(|| {
        format!(
            "ledger program not readable at {}",
            cfg.ledger.program_address
        )
    })?;
    info!(program = %cfg.ledger.program_address, "ledger program verified");

    let journal = HealJournal::new(&cfg.daemon.heal_journal_path, true)?;
    let engine = ReconcileEngine::new(ledger, store).with_journal(journal);
    let shared = Arc::new(state::AppState::new(engine));

    // Initial passes before the scheduler takes over.
    match shared
        .run_sync_guarded()
        .await
        .context("startup warehouse sync failed")?
    {
        state::SyncRun::Completed(report) => {
            info!(synced = report.synced, skipped = report.skipped, "startup warehouse sync done");
        }
        state::SyncRun::SkippedOverlap => {}
    }

    match shared
        .run_sweep_guarded()
        .await
        .context("startup sweep failed")?
    {
        state::SweepRun::Completed(report) => {
            info!(completed = report.completed, failed = report.failed, "startup sweep done");
        }
        state::SweepRun::SkippedOverlap => {}
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = scheduler::spawn_sweep_scheduler(
        Arc::clone(&shared),
        Duration::from_secs(cfg.scheduler.sweep_interval_secs),
        shutdown_rx,
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cfg
        .daemon
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind addr {}", cfg.daemon.bind_addr))?;
    info!("whs-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            scheduler::shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server crashed")?;

    // Let the in-flight sweep (if any) finish before exiting.
    let _ = scheduler_task.await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// One-second probes until the ledger node answers, bounded by config.
async fn wait_for_ledger(ledger: &RpcLedger, attempts: u32) -> anyhow::Result<()> {
    for attempt in 1..=attempts {
        match ledger.block_number().await {
            Ok(block) => {
                info!(block, attempt, "ledger node reachable");
                return Ok(());
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "ledger node not reachable yet");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    bail!("ledger node unreachable after {attempts} probes");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
