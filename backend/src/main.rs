use actix_cors::Cors;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;

use backend::api;
use backend::config::EngineConfig;
use backend::db;
use backend::remote::{RemoteHandle, TcpRemoteAccess};

#[get("/")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "Gridmesh Fleet Backend",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // DB Pool initialization
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = match db::init_pool(&database_url) {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Database initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // Engine tunables; the staleness threshold is shared by site and
    // project status so they cannot drift apart.
    let engine_config = EngineConfig::from_env();

    // Tunnel ports terminate on a single access host
    let tunnel_host =
        std::env::var("TUNNEL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let remote: RemoteHandle = Arc::new(TcpRemoteAccess::new(tunnel_host));

    log::info!("Starting Gridmesh Fleet Backend at http://0.0.0.0:8080");
    log::info!(
        "Staleness threshold: {}s",
        engine_config.staleness_threshold_secs
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(engine_config))
            .app_data(web::Data::new(remote.clone()))
            .service(health_check)
            .configure(api::config)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
