use actix_web::web;

pub mod alarms;
pub mod auth;
pub mod heartbeats;
pub mod projects;
pub mod sites;

pub fn config(cfg: &mut web::ServiceConfig) {
    // Auth routes (public)
    cfg.service(
        web::scope("/api/auth")
            .service(auth::register)
            .service(auth::login),
    );

    // Site status & actions (protected)
    cfg.service(
        web::scope("/api/sites")
            .service(sites::site_status)
            .service(sites::sync_templates)
            .service(sites::run_diagnostics)
            .service(sites::last_diagnostics)
            .service(sites::list_site_alarms),
    );

    // Project aggregation & per-user routing preferences (protected)
    cfg.service(
        web::scope("/api/projects")
            .service(projects::project_status)
            .service(projects::get_notification_preferences)
            .service(projects::put_notification_preferences),
    );

    // Alarm lifecycle actions (protected)
    cfg.service(
        web::scope("/api/alarms")
            .service(alarms::acknowledge_alarm)
            .service(alarms::resolve_alarm),
    );

    // Controller check-ins (device-authenticated upstream, not user JWTs)
    cfg.service(web::scope("/api/heartbeats").service(heartbeats::ingest_heartbeat));
}
