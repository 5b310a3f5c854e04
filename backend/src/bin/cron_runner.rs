//! Cron Runner - Scheduled tasks for the Gridmesh fleet backend
//!
//! This binary runs as a daemon with proper cron scheduling:
//! - diagnostics-sweep: runs the diagnostic suite for every active
//!   controller site every 5 minutes (and once at startup)
//! - notification-sweep: routes not-yet-routed alarm events to subscribed
//!   users every minute
//!
//! Environment variables:
//!   DATABASE_URL              - PostgreSQL connection string (required)
//!   STALENESS_THRESHOLD_SECS  - online/offline threshold (default 60)
//!   TUNNEL_HOST               - host terminating remote-access tunnels

use std::env;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

// Import from the library crate
use backend::config::EngineConfig;
use backend::db::{self, DbPool};
use backend::remote::{RemoteHandle, TcpRemoteAccess};
use backend::services::diagnostics::DiagnosticService;
use backend::services::notifications::NotificationService;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            log::error!("DATABASE_URL environment variable is not set");
            std::process::exit(1);
        }
    };

    let pool = match db::init_pool(&database_url) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            log::error!("Database initialization failed: {}", e);
            std::process::exit(1);
        }
    };
    let engine_config = EngineConfig::from_env();
    let tunnel_host = env::var("TUNNEL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let remote: RemoteHandle = Arc::new(TcpRemoteAccess::new(tunnel_host));

    log::info!("Starting Gridmesh cron scheduler...");

    // Run an initial sweep at startup so freshly provisioned sites get a
    // verdict before the first scheduled tick.
    run_diagnostics_sweep(pool.clone(), engine_config, remote.clone()).await;

    let sched = JobScheduler::new().await.expect("Failed to create scheduler");

    // Diagnostics sweep every 5 minutes
    // Cron: "0 */5 * * * *" = second 0, every 5th minute
    let pool_diag = pool.clone();
    let remote_diag = remote.clone();
    let diag_job = Job::new_async("0 */5 * * * *", move |_uuid, _l| {
        let pool = pool_diag.clone();
        let remote = remote_diag.clone();
        Box::pin(async move {
            log::info!("Scheduled diagnostics-sweep triggered");
            run_diagnostics_sweep(pool, engine_config, remote).await;
        })
    })
    .expect("Failed to create diagnostics job");
    sched.add(diag_job).await.expect("Failed to add diagnostics job");

    // Notification routing sweep every minute
    // Cron: "0 * * * * *" = second 0, every minute
    let pool_notify = pool.clone();
    let notify_job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let pool = pool_notify.clone();
        Box::pin(async move {
            run_notification_sweep(pool).await;
        })
    })
    .expect("Failed to create notification job");
    sched
        .add(notify_job)
        .await
        .expect("Failed to add notification job");

    sched.start().await.expect("Failed to start scheduler");

    log::info!("Cron scheduler running. Jobs scheduled:");
    log::info!("  - diagnostics-sweep: every 5 minutes");
    log::info!("  - notification-sweep: every minute");

    // Keep the process running
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
    }
}

/// Run the diagnostic suite across all active controller sites
async fn run_diagnostics_sweep(pool: Arc<DbPool>, config: EngineConfig, remote: RemoteHandle) {
    let service = DiagnosticService::new((*pool).clone(), config, remote);
    let completed = service.run_for_all_active().await;

    if completed == 0 {
        log::info!("Diagnostics sweep: no sites to check");
    } else {
        log::info!("Diagnostics sweep completed for {} sites", completed);
    }
}

/// Evaluate routing for alarm events that have not been routed yet
async fn run_notification_sweep(pool: Arc<DbPool>) {
    let service = NotificationService::new((*pool).clone());

    match service.route_pending() {
        Ok(0) => {}
        Ok(routed) => log::info!("Notification sweep: {} routing decisions emitted", routed),
        Err(e) => log::error!("Notification sweep failed: {}", e),
    }
}
