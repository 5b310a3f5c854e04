use crate::{
    db::DbPool,
    models::NewHeartbeat,
    schema::{heartbeats, sites},
    services::config_sync::ConfigSyncService,
    services::status::parse_reported_timestamp,
};
use actix_web::{post, web, HttpResponse, Responder};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub site_id: i32,
    /// Controller-reported time; server receive time is used when absent.
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
    pub control_loop_status: Option<String>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub active_alarms_count: i32,
}

/// Append a controller check-in. Heartbeats are immutable once written;
/// status reads only ever look at the newest row per site.
#[post("")]
pub async fn ingest_heartbeat(
    pool: web::Data<DbPool>,
    body: web::Json<HeartbeatRequest>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let site_exists = sites::table
        .filter(sites::id.eq(body.site_id))
        .select(sites::id)
        .first::<i32>(&mut conn)
        .is_ok();
    if !site_exists {
        return HttpResponse::NotFound().body("Unknown site");
    }

    let timestamp = body
        .timestamp
        .as_deref()
        .and_then(parse_reported_timestamp)
        .unwrap_or_else(|| Utc::now().naive_utc());

    let new_heartbeat = NewHeartbeat {
        site_id: body.site_id,
        timestamp,
        metadata: body.metadata.clone(),
        control_loop_status: body.control_loop_status.clone(),
        last_error: body.last_error.clone(),
        active_alarms_count: body.active_alarms_count,
    };

    if let Err(e) = diesel::insert_into(heartbeats::table)
        .values(&new_heartbeat)
        .execute(&mut conn)
    {
        return HttpResponse::InternalServerError().body(format!("Failed to store heartbeat: {}", e));
    }

    // A heartbeat that reports when it pulled config doubles as the
    // controller's sync confirmation.
    if let Some(pulled_at) = body
        .metadata
        .get("config_pulled_at")
        .and_then(|v| v.as_str())
        .and_then(parse_reported_timestamp)
    {
        let service = ConfigSyncService::new(pool.get_ref().clone());
        if let Err(e) = service.record_pull_confirmation(body.site_id, pulled_at) {
            log::warn!(
                "Heartbeat stored but pull confirmation failed for site {}: {}",
                body.site_id,
                e
            );
        }
    }

    HttpResponse::Ok().json(serde_json::json!({"accepted": true, "timestamp": timestamp}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_request_full_deserialization() {
        let json = r#"{
            "site_id": 3,
            "timestamp": "2024-01-15T12:00:00Z",
            "metadata": {"config_version": "v7", "services": {"control": "running"}},
            "control_loop_status": "running",
            "active_alarms_count": 1
        }"#;
        let request: HeartbeatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.site_id, 3);
        assert_eq!(request.active_alarms_count, 1);
        assert_eq!(request.metadata["config_version"], "v7");
        assert!(request.last_error.is_none());
    }

    #[test]
    fn test_heartbeat_request_minimal() {
        let json = r#"{"site_id": 9}"#;
        let request: HeartbeatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.site_id, 9);
        assert!(request.timestamp.is_none());
        assert_eq!(request.active_alarms_count, 0);
        assert!(request.metadata.is_null());
    }
}
