use crate::db::DbPool;
use crate::models::{NotificationPreference, Severity, User};
use crate::schema::{alarms, notification_preferences, sites, users};
use chrono::{NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use log::{info, warn};
use serde::Serialize;

/// Lifecycle phase of the alarm event being routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    Active,
    Resolved,
}

/// The event under routing: a raw severity string plus its phase.
#[derive(Debug, Clone)]
pub struct AlarmEvent<'a> {
    pub severity: &'a str,
    pub phase: AlarmPhase,
}

/// Per-channel routing preferences with the documented defaults applied
/// when no stored preference row exists.
#[derive(Debug, Clone)]
pub struct RoutingPrefs {
    pub email_enabled: bool,
    pub email_min_severity: String,
    pub email_on_active: bool,
    pub email_on_resolved: bool,
    pub sms_enabled: bool,
    pub sms_min_severity: String,
    pub sms_on_active: bool,
    pub sms_on_resolved: bool,
}

impl Default for RoutingPrefs {
    fn default() -> Self {
        Self {
            email_enabled: true,
            email_min_severity: Severity::Major.as_str().to_string(),
            email_on_active: true,
            email_on_resolved: false,
            sms_enabled: false,
            sms_min_severity: Severity::Critical.as_str().to_string(),
            sms_on_active: true,
            sms_on_resolved: false,
        }
    }
}

impl From<NotificationPreference> for RoutingPrefs {
    fn from(p: NotificationPreference) -> Self {
        Self {
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

/// Which channels should carry this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub email: bool,
    pub sms: bool,
}

impl RoutingDecision {
    pub fn suppressed() -> Self {
        Self {
            email: false,
            sms: false,
        }
    }

    pub fn any(&self) -> bool {
        self.email || self.sms
    }
}

/// True when `now` falls inside [start, end), a window that may wrap
/// midnight.
pub fn in_quiet_hours(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        // Window crosses midnight
        now >= start || now < end
    }
}

fn channel_allows(
    enabled: bool,
    min_severity: &str,
    on_active: bool,
    on_resolved: bool,
    event: &AlarmEvent,
) -> bool {
    if !enabled {
        return false;
    }
    if Severity::rank_str(event.severity) < Severity::rank_str(min_severity) {
        return false;
    }
    match event.phase {
        AlarmPhase::Active => on_active,
        AlarmPhase::Resolved => on_resolved,
    }
}

/// Decide whether to emit email/SMS for an alarm event.
///
/// Pure and total: missing preference rows fall back to defaults, unknown
/// severities rank lowest and are suppressed by any real threshold. Quiet
/// hours suppress everything except critical, which always goes through.
pub fn should_notify(
    event: &AlarmEvent,
    prefs: &RoutingPrefs,
    quiet_hours: Option<(NaiveTime, NaiveTime)>,
    now_local: NaiveTime,
) -> RoutingDecision {
    if let Some((start, end)) = quiet_hours {
        let critical = Severity::from_str(event.severity) == Some(Severity::Critical);
        if in_quiet_hours(start, end, now_local) && !critical {
            return RoutingDecision::suppressed();
        }
    }

    RoutingDecision {
        email: channel_allows(
            prefs.email_enabled,
            &prefs.email_min_severity,
            prefs.email_on_active,
            prefs.email_on_resolved,
            event,
        ),
        sms: channel_allows(
            prefs.sms_enabled,
            &prefs.sms_min_severity,
            prefs.sms_on_active,
            prefs.sms_on_resolved,
            event,
        ),
    }
}

/// Resolve a user's wall-clock time from their stored IANA timezone,
/// falling back to UTC when absent or unparseable.
pub fn user_local_time(user: &User) -> NaiveTime {
    let now_utc = Utc::now();
    match user.timezone.as_deref().and_then(|tz| tz.parse::<Tz>().ok()) {
        Some(tz) => tz.from_utc_datetime(&now_utc.naive_utc()).time(),
        None => now_utc.time(),
    }
}

/// Evaluate one alarm event against every subscriber, returning the user
/// ids and channels selected. Users whose preferences suppress the event
/// are dropped here.
pub fn route_event(
    event: &AlarmEvent,
    subscribers: Vec<(NotificationPreference, User)>,
) -> Vec<(i32, RoutingDecision)> {
    subscribers
        .into_iter()
        .filter_map(|(pref, user)| {
            let quiet = user.quiet_hours_start.zip(user.quiet_hours_end);
            let decision = should_notify(
                event,
                &RoutingPrefs::from(pref),
                quiet,
                user_local_time(&user),
            );
            decision.any().then_some((user.id, decision))
        })
        .collect()
}

/// Sweeps alarms and records routing decisions for subscribed users.
/// Delivery itself is out of scope; this logs what would be sent where.
pub struct NotificationService {
    pool: DbPool,
}

impl NotificationService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Route all alarm events that have not been routed yet. Returns the
    /// number of (alarm, user) decisions that selected at least one channel.
    pub fn route_pending(&self) -> Result<usize, String> {
        let mut routed = self.route_phase(AlarmPhase::Active)?;
        routed += self.route_phase(AlarmPhase::Resolved)?;
        Ok(routed)
    }

    fn route_phase(&self, phase: AlarmPhase) -> Result<usize, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let pending: Vec<(i32, i32, String)> = match phase {
            AlarmPhase::Active => alarms::table
                .inner_join(sites::table)
                .filter(alarms::active_routed_at.is_null())
                .select((alarms::id, sites::project_id, alarms::severity))
                .load(&mut conn)
                .map_err(|e| e.to_string())?,
            AlarmPhase::Resolved => alarms::table
                .inner_join(sites::table)
                .filter(alarms::resolved.eq(true))
                .filter(alarms::resolved_routed_at.is_null())
                .select((alarms::id, sites::project_id, alarms::severity))
                .load(&mut conn)
                .map_err(|e| e.to_string())?,
        };

        let now = Utc::now().naive_utc();
        let mut routed = 0;

        for (alarm_id, project_id, severity) in pending {
            let subscribers: Vec<(NotificationPreference, User)> = match notification_preferences::table
                .inner_join(users::table)
                .filter(notification_preferences::project_id.eq(project_id))
                .select((NotificationPreference::as_select(), User::as_select()))
                .load(&mut conn)
            {
                Ok(subs) => subs,
                Err(e) => {
                    // Leave the event unstamped so the next sweep retries it.
                    warn!("Could not load subscribers for project {}: {}", project_id, e);
                    continue;
                }
            };

            let event = AlarmEvent {
                severity: &severity,
                phase,
            };

            for (user_id, decision) in route_event(&event, subscribers) {
                info!(
                    "Alarm {} ({:?}, {}) routed to user {}: email={} sms={}",
                    alarm_id, phase, severity, user_id, decision.email, decision.sms
                );
                routed += 1;
            }

            let stamp_result = match phase {
                AlarmPhase::Active => {
                    diesel::update(alarms::table.filter(alarms::id.eq(alarm_id)))
                        .set(alarms::active_routed_at.eq(Some(now)))
                        .execute(&mut conn)
                }
                AlarmPhase::Resolved => {
                    diesel::update(alarms::table.filter(alarms::id.eq(alarm_id)))
                        .set(alarms::resolved_routed_at.eq(Some(now)))
                        .execute(&mut conn)
                }
            };
            if let Err(e) = stamp_result {
                warn!("Failed to stamp routing for alarm {}: {}", alarm_id, e);
            }
        }

        Ok(routed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn active(severity: &str) -> AlarmEvent<'_> {
        AlarmEvent {
            severity,
            phase: AlarmPhase::Active,
        }
    }

    #[test]
    fn test_defaults_route_major_email_only() {
        let prefs = RoutingPrefs::default();
        let decision = should_notify(&active("major"), &prefs, None, t(12, 0));
        assert!(decision.email);
        assert!(!decision.sms);
    }

    #[test]
    fn test_below_min_severity_suppressed() {
        let prefs = RoutingPrefs::default();
        let decision = should_notify(&active("warning"), &prefs, None, t(12, 0));
        assert!(!decision.email);
        assert!(!decision.sms);
    }

    #[test]
    fn test_master_toggle_dominates_severity() {
        let prefs = RoutingPrefs {
            email_enabled: false,
            ..Default::default()
        };
        let decision = should_notify(&active("critical"), &prefs, None, t(12, 0));
        assert!(!decision.email);
    }

    #[test]
    fn test_resolved_phase_respects_channel_flag() {
        let prefs = RoutingPrefs::default();
        let event = AlarmEvent {
            severity: "critical",
            phase: AlarmPhase::Resolved,
        };
        // Default email_on_resolved is false.
        assert!(!should_notify(&event, &prefs, None, t(12, 0)).email);

        let prefs = RoutingPrefs {
            email_on_resolved: true,
            ..Default::default()
        };
        assert!(should_notify(&event, &prefs, None, t(12, 0)).email);
    }

    #[test]
    fn test_quiet_hours_suppress_non_critical() {
        let prefs = RoutingPrefs::default();
        let quiet = Some((t(22, 0), t(7, 0)));
        let decision = should_notify(&active("major"), &prefs, quiet, t(23, 30));
        assert!(!decision.email);
    }

    #[test]
    fn test_critical_bypasses_quiet_hours() {
        let prefs = RoutingPrefs {
            sms_enabled: true,
            ..Default::default()
        };
        let quiet = Some((t(22, 0), t(7, 0)));
        let decision = should_notify(&active("critical"), &prefs, quiet, t(23, 30));
        assert!(decision.email);
        assert!(decision.sms);
    }

    #[test]
    fn test_outside_quiet_hours_routes_normally() {
        let prefs = RoutingPrefs::default();
        let quiet = Some((t(22, 0), t(7, 0)));
        let decision = should_notify(&active("major"), &prefs, quiet, t(12, 0));
        assert!(decision.email);
    }

    #[test]
    fn test_unknown_severity_suppressed_by_thresholds() {
        let prefs = RoutingPrefs {
            email_min_severity: "info".to_string(),
            ..Default::default()
        };
        // rank 0 < rank(info), so even the lowest threshold suppresses it.
        let decision = should_notify(&active("catastrophic"), &prefs, None, t(12, 0));
        assert!(!decision.email);
    }

    #[test]
    fn test_unknown_min_severity_lets_everything_through() {
        // A corrupt stored threshold ranks 0; known severities clear it.
        let prefs = RoutingPrefs {
            email_min_severity: "garbage".to_string(),
            ..Default::default()
        };
        assert!(should_notify(&active("info"), &prefs, None, t(12, 0)).email);
    }

    #[test]
    fn test_quiet_window_wrapping_midnight() {
        let start = t(22, 0);
        let end = t(7, 0);
        assert!(in_quiet_hours(start, end, t(23, 0)));
        assert!(in_quiet_hours(start, end, t(3, 0)));
        assert!(in_quiet_hours(start, end, t(22, 0))); // inclusive start
        assert!(!in_quiet_hours(start, end, t(7, 0))); // exclusive end
        assert!(!in_quiet_hours(start, end, t(12, 0)));
    }

    #[test]
    fn test_quiet_window_same_day() {
        let start = t(13, 0);
        let end = t(15, 0);
        assert!(in_quiet_hours(start, end, t(14, 0)));
        assert!(!in_quiet_hours(start, end, t(15, 0)));
        assert!(!in_quiet_hours(start, end, t(12, 59)));
    }

    fn pref_row(user_id: i32, email_min_severity: &str) -> NotificationPreference {
        NotificationPreference {
            id: user_id,
            user_id,
            project_id: 1,
            email_enabled: true,
            email_min_severity: email_min_severity.to_string(),
            email_on_active: true,
            email_on_resolved: false,
            sms_enabled: false,
            sms_min_severity: "critical".to_string(),
            sms_on_active: true,
            sms_on_resolved: false,
        }
    }

    fn user_row(id: i32) -> User {
        User {
            id,
            username: format!("user{}", id),
            password_hash: String::new(),
            timezone: None,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_route_event_filters_suppressed_subscribers() {
        let subscribers = vec![
            (pref_row(1, "warning"), user_row(1)),
            (pref_row(2, "critical"), user_row(2)),
        ];
        let routed = route_event(&active("major"), subscribers);
        // Only the warning-threshold subscriber clears a major alarm.
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, 1);
        assert!(routed[0].1.email);
        assert!(!routed[0].1.sms);
    }

    #[test]
    fn test_route_event_without_subscribers_routes_nothing() {
        assert!(route_event(&active("critical"), Vec::new()).is_empty());
    }

    #[test]
    fn test_empty_quiet_window_never_matches() {
        let midnight = t(0, 0);
        assert!(!in_quiet_hours(midnight, midnight, t(0, 0)));
        assert!(!in_quiet_hours(midnight, midnight, t(12, 0)));
    }
}
