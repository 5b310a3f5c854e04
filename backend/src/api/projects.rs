use crate::{
    config::EngineConfig,
    db::DbPool,
    models::NotificationPreference,
    schema::notification_preferences,
    services::{auth::Claims, notifications::RoutingPrefs, site_status::SiteStatusService},
};
use actix_web::{get, put, web, HttpResponse, Responder};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct PreferencesRequest {
    pub email_enabled: Option<bool>,
    pub email_min_severity: Option<String>,
    pub email_on_active: Option<bool>,
    pub email_on_resolved: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub sms_min_severity: Option<String>,
    pub sms_on_active: Option<bool>,
    pub sms_on_resolved: Option<bool>,
}

#[derive(Serialize)]
pub struct PreferencesResponse {
    pub project_id: i32,
    pub email_enabled: bool,
    pub email_min_severity: String,
    pub email_on_active: bool,
    pub email_on_resolved: bool,
    pub sms_enabled: bool,
    pub sms_min_severity: String,
    pub sms_on_active: bool,
    pub sms_on_resolved: bool,
}

impl PreferencesResponse {
    fn from_prefs(project_id: i32, p: RoutingPrefs) -> Self {
        Self {
            project_id,
            email_enabled: p.email_enabled,
            email_min_severity: p.email_min_severity,
            email_on_active: p.email_on_active,
            email_on_resolved: p.email_on_resolved,
            sms_enabled: p.sms_enabled,
            sms_min_severity: p.sms_min_severity,
            sms_on_active: p.sms_on_active,
            sms_on_resolved: p.sms_on_resolved,
        }
    }
}

/// Online/offline counts across the project's active sites
#[get("/{project_id}/status")]
pub async fn project_status(
    pool: web::Data<DbPool>,
    config: web::Data<EngineConfig>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let project_id = path.into_inner();
    let service = SiteStatusService::new(pool.get_ref().clone(), *config.get_ref());

    match service.status_for_project(project_id) {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => {
            log::warn!("Status for project {} unavailable: {}", project_id, e);
            HttpResponse::InternalServerError().body("Error computing project status")
        }
    }
}

/// The current user's routing preferences for this project; documented
/// defaults when no row has been stored yet
#[get("/{project_id}/notification-preferences")]
pub async fn get_notification_preferences(
    pool: web::Data<DbPool>,
    claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let project_id = path.into_inner();
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(e) => return HttpResponse::BadRequest().body(e),
    };

    let stored: Option<NotificationPreference> = notification_preferences::table
        .filter(notification_preferences::user_id.eq(user_id))
        .filter(notification_preferences::project_id.eq(project_id))
        .first(&mut conn)
        .optional()
        .unwrap_or(None);

    let prefs = stored.map(RoutingPrefs::from).unwrap_or_default();
    HttpResponse::Ok().json(PreferencesResponse::from_prefs(project_id, prefs))
}

/// Upsert the current user's routing preferences for this project.
/// Omitted fields keep their current (or default) values.
#[put("/{project_id}/notification-preferences")]
pub async fn put_notification_preferences(
    pool: web::Data<DbPool>,
    claims: Claims,
    path: web::Path<i32>,
    body: web::Json<PreferencesRequest>,
) -> impl Responder {
    let project_id = path.into_inner();
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(e) => return HttpResponse::BadRequest().body(e),
    };

    let current: Option<NotificationPreference> = notification_preferences::table
        .filter(notification_preferences::user_id.eq(user_id))
        .filter(notification_preferences::project_id.eq(project_id))
        .first(&mut conn)
        .optional()
        .unwrap_or(None);

    let base = current.map(RoutingPrefs::from).unwrap_or_default();
    let merged = RoutingPrefs {
        email_enabled: body.email_enabled.unwrap_or(base.email_enabled),
        email_min_severity: body
            .email_min_severity
            .clone()
            .unwrap_or(base.email_min_severity),
        email_on_active: body.email_on_active.unwrap_or(base.email_on_active),
        email_on_resolved: body.email_on_resolved.unwrap_or(base.email_on_resolved),
        sms_enabled: body.sms_enabled.unwrap_or(base.sms_enabled),
        sms_min_severity: body
            .sms_min_severity
            .clone()
            .unwrap_or(base.sms_min_severity),
        sms_on_active: body.sms_on_active.unwrap_or(base.sms_on_active),
        sms_on_resolved: body.sms_on_resolved.unwrap_or(base.sms_on_resolved),
    };

    let result = diesel::insert_into(notification_preferences::table)
        .values((
            notification_preferences::user_id.eq(user_id),
            notification_preferences::project_id.eq(project_id),
            notification_preferences::email_enabled.eq(merged.email_enabled),
            notification_preferences::email_min_severity.eq(&merged.email_min_severity),
            notification_preferences::email_on_active.eq(merged.email_on_active),
            notification_preferences::email_on_resolved.eq(merged.email_on_resolved),
            notification_preferences::sms_enabled.eq(merged.sms_enabled),
            notification_preferences::sms_min_severity.eq(&merged.sms_min_severity),
            notification_preferences::sms_on_active.eq(merged.sms_on_active),
            notification_preferences::sms_on_resolved.eq(merged.sms_on_resolved),
        ))
        .on_conflict((
            notification_preferences::user_id,
            notification_preferences::project_id,
        ))
        .do_update()
        .set((
            notification_preferences::email_enabled.eq(merged.email_enabled),
            notification_preferences::email_min_severity.eq(&merged.email_min_severity),
            notification_preferences::email_on_active.eq(merged.email_on_active),
            notification_preferences::email_on_resolved.eq(merged.email_on_resolved),
            notification_preferences::sms_enabled.eq(merged.sms_enabled),
            notification_preferences::sms_min_severity.eq(&merged.sms_min_severity),
            notification_preferences::sms_on_active.eq(merged.sms_on_active),
            notification_preferences::sms_on_resolved.eq(merged.sms_on_resolved),
        ))
        .execute(&mut conn);

    match result {
        Ok(_) => HttpResponse::Ok().json(PreferencesResponse::from_prefs(project_id, merged)),
        Err(e) => HttpResponse::InternalServerError()
            .body(format!("Failed to save preferences: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_request_partial_deserialization() {
        let json = r#"{"sms_enabled": true, "sms_min_severity": "major"}"#;
        let request: PreferencesRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.sms_enabled, Some(true));
        assert_eq!(request.sms_min_severity, Some("major".to_string()));
        assert!(request.email_enabled.is_none());
    }

    #[test]
    fn test_preferences_response_defaults_shape() {
        let response = PreferencesResponse::from_prefs(7, RoutingPrefs::default());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["project_id"], 7);
        assert_eq!(value["email_enabled"], true);
        assert_eq!(value["email_min_severity"], "major");
        assert_eq!(value["sms_enabled"], false);
        assert_eq!(value["sms_min_severity"], "critical");
    }
}
