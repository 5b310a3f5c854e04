use crate::{
    config::EngineConfig,
    db::DbPool,
    remote::RemoteHandle,
    schema::sites,
    services::{
        alarms::AlarmService, auth::Claims, config_sync::ConfigSyncService,
        diagnostics::DiagnosticService, site_status::SiteStatusService,
    },
};
use actix_web::{get, post, web, HttpResponse, Responder};
use diesel::prelude::*;

/// Full derived status document for one site
#[get("/{site_id}/status")]
pub async fn site_status(
    pool: web::Data<DbPool>,
    config: web::Data<EngineConfig>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let site_id = path.into_inner();
    let service = SiteStatusService::new(pool.get_ref().clone(), *config.get_ref());

    match service.status_for_site(site_id) {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => {
            log::warn!("Status for site {} unavailable: {}", site_id, e);
            HttpResponse::NotFound().body("Site not found")
        }
    }
}

/// Re-copy template definitions onto enabled devices and stamp the sync moment
#[post("/{site_id}/sync-templates")]
pub async fn sync_templates(
    pool: web::Data<DbPool>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let site_id = path.into_inner();

    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };
    let site_exists = sites::table
        .filter(sites::id.eq(site_id))
        .select(sites::id)
        .first::<i32>(&mut conn)
        .is_ok();
    if !site_exists {
        return HttpResponse::NotFound().body("Site not found");
    }

    let service = ConfigSyncService::new(pool.get_ref().clone());

    // The user explicitly requested this write, so a failure must surface.
    match service.sync_templates(site_id) {
        Ok(synced) => HttpResponse::Ok().json(serde_json::json!({
            "synced": synced,
            "message": format!("Synced {} devices from templates", synced)
        })),
        Err(e) => HttpResponse::InternalServerError()
            .body(format!("Template sync failed: {}", e)),
    }
}

/// Run the diagnostic battery and persist the result as the latest run
#[post("/{site_id}/test")]
pub async fn run_diagnostics(
    pool: web::Data<DbPool>,
    config: web::Data<EngineConfig>,
    remote: web::Data<RemoteHandle>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let site_id = path.into_inner();
    let service = DiagnosticService::new(
        pool.get_ref().clone(),
        *config.get_ref(),
        remote.get_ref().clone(),
    );

    match service.run_for_site(site_id).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => HttpResponse::InternalServerError()
            .body(format!("Diagnostic run failed: {}", e)),
    }
}

/// Return the last persisted diagnostic run without re-running checks
#[get("/{site_id}/test")]
pub async fn last_diagnostics(
    pool: web::Data<DbPool>,
    config: web::Data<EngineConfig>,
    remote: web::Data<RemoteHandle>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let site_id = path.into_inner();
    let service = DiagnosticService::new(
        pool.get_ref().clone(),
        *config.get_ref(),
        remote.get_ref().clone(),
    );

    match service.last_run_for_site(site_id) {
        Ok(Some(report)) => HttpResponse::Ok().json(report),
        Ok(None) => HttpResponse::NotFound().body("No diagnostic run recorded for this site"),
        Err(e) => HttpResponse::InternalServerError().body(e),
    }
}

/// List alarms for a site, newest first
#[get("/{site_id}/alarms")]
pub async fn list_site_alarms(
    pool: web::Data<DbPool>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let site_id = path.into_inner();
    let service = AlarmService::new(pool.get_ref().clone());

    match service.list_for_site(site_id) {
        Ok(alarms) => HttpResponse::Ok().json(alarms),
        Err(e) => {
            log::warn!("Could not list alarms for site {}: {}", site_id, e);
            HttpResponse::InternalServerError().body("Error fetching alarms")
        }
    }
}
