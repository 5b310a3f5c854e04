use crate::{db::DbPool, services::alarms::AlarmService, services::auth::Claims};
use actix_web::{post, web, HttpResponse, Responder};

/// Acknowledge an alarm. Safe to call repeatedly; the flag never reverts.
#[post("/{alarm_id}/acknowledge")]
pub async fn acknowledge_alarm(
    pool: web::Data<DbPool>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let alarm_id = path.into_inner();
    let service = AlarmService::new(pool.get_ref().clone());

    match service.acknowledge(alarm_id) {
        Ok(alarm) => HttpResponse::Ok().json(alarm),
        Err(e) => {
            log::warn!("Could not acknowledge alarm {}: {}", alarm_id, e);
            HttpResponse::NotFound().body("Alarm not found")
        }
    }
}

/// Resolve an alarm. Independent of acknowledgement, and idempotent.
#[post("/{alarm_id}/resolve")]
pub async fn resolve_alarm(
    pool: web::Data<DbPool>,
    _claims: Claims,
    path: web::Path<i32>,
) -> impl Responder {
    let alarm_id = path.into_inner();
    let service = AlarmService::new(pool.get_ref().clone());

    match service.resolve(alarm_id) {
        Ok(alarm) => HttpResponse::Ok().json(alarm),
        Err(e) => {
            log::warn!("Could not resolve alarm {}: {}", alarm_id, e);
            HttpResponse::NotFound().body("Alarm not found")
        }
    }
}
