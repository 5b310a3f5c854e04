use crate::db::DbPool;
use crate::models::{Alarm, Severity};
use crate::schema::alarms;
use chrono::Utc;
use diesel::prelude::*;
use log::info;

/// Reduce a sequence of raw severity strings to the highest known severity.
///
/// Returns `None` for an empty sequence. Unrecognized strings rank below
/// `info` and never override a known severity. Stops early once `critical`
/// is seen since nothing outranks it.
pub fn highest_of<'a, I>(severities: I) -> Option<Severity>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<Severity> = None;
    for raw in severities {
        if let Some(sev) = Severity::from_str(raw) {
            if best.map(|b| sev.rank() > b.rank()).unwrap_or(true) {
                best = Some(sev);
            }
            if sev == Severity::Critical {
                break;
            }
        }
    }
    best
}

/// Summary of a site's alarm state for the dashboard.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlarmSummary {
    pub active: i64,
    pub unacknowledged: i64,
    pub highest_severity: Option<String>,
}

impl AlarmSummary {
    pub fn empty() -> Self {
        Self {
            active: 0,
            unacknowledged: 0,
            highest_severity: None,
        }
    }
}

pub struct AlarmService {
    pool: DbPool,
}

impl AlarmService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Active (unresolved) alarm counts plus the highest active severity.
    pub fn summary_for_site(&self, site_id: i32) -> Result<AlarmSummary, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let active: Vec<Alarm> = alarms::table
            .filter(alarms::site_id.eq(site_id))
            .filter(alarms::resolved.eq(false))
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let unacknowledged = active.iter().filter(|a| !a.acknowledged).count() as i64;
        let highest = highest_of(active.iter().map(|a| a.severity.as_str()));

        Ok(AlarmSummary {
            active: active.len() as i64,
            unacknowledged,
            highest_severity: highest.map(|s| s.as_str().to_string()),
        })
    }

    pub fn list_for_site(&self, site_id: i32) -> Result<Vec<Alarm>, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        alarms::table
            .filter(alarms::site_id.eq(site_id))
            .order(alarms::created_at.desc())
            .load(&mut conn)
            .map_err(|e| e.to_string())
    }

    /// Mark an alarm acknowledged. Idempotent: acknowledging an already
    /// acknowledged alarm is a no-op, and the flag never reverts.
    pub fn acknowledge(&self, alarm_id: i32) -> Result<Alarm, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        diesel::update(
            alarms::table
                .filter(alarms::id.eq(alarm_id))
                .filter(alarms::acknowledged.eq(false)),
        )
        .set(alarms::acknowledged.eq(true))
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;

        alarms::table
            .filter(alarms::id.eq(alarm_id))
            .first(&mut conn)
            .map_err(|e| e.to_string())
    }

    /// Mark an alarm resolved. Idempotent, and independent of acknowledgement:
    /// an alarm may be resolved while still unacknowledged.
    pub fn resolve(&self, alarm_id: i32) -> Result<Alarm, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let now = Utc::now().naive_utc();
        let updated = diesel::update(
            alarms::table
                .filter(alarms::id.eq(alarm_id))
                .filter(alarms::resolved.eq(false)),
        )
        .set((alarms::resolved.eq(true), alarms::resolved_at.eq(Some(now))))
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;

        if updated > 0 {
            info!("Alarm {} resolved", alarm_id);
        }

        alarms::table
            .filter(alarms::id.eq(alarm_id))
            .first(&mut conn)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_of_empty_is_none() {
        assert_eq!(highest_of(std::iter::empty()), None);
    }

    #[test]
    fn test_highest_of_mixed() {
        let result = highest_of(["info", "critical", "warning"]);
        assert_eq!(result, Some(Severity::Critical));
    }

    #[test]
    fn test_highest_of_without_critical() {
        let result = highest_of(["info", "minor", "warning"]);
        assert_eq!(result, Some(Severity::Minor));
    }

    #[test]
    fn test_highest_of_unknown_ranks_below_info() {
        let result = highest_of(["catastrophic", "info"]);
        assert_eq!(result, Some(Severity::Info));
    }

    #[test]
    fn test_highest_of_only_unknown_is_none() {
        let result = highest_of(["bogus", "???", ""]);
        assert_eq!(result, None);
    }

    #[test]
    fn test_highest_of_unknown_never_overrides_known() {
        let result = highest_of(["major", "catastrophic"]);
        assert_eq!(result, Some(Severity::Major));
    }

    #[test]
    fn test_highest_of_early_exit_on_critical_is_still_correct() {
        // Values after critical must not matter either way.
        let result = highest_of(["critical", "info", "major"]);
        assert_eq!(result, Some(Severity::Critical));
    }

    #[test]
    fn test_alarm_summary_empty() {
        let summary = AlarmSummary::empty();
        assert_eq!(summary.active, 0);
        assert_eq!(summary.unacknowledged, 0);
        assert!(summary.highest_severity.is_none());
    }
}
