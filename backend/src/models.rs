use chrono::{NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::sites)]
pub struct Site {
    pub id: i32,
    pub project_id: i32,
    pub name: String,
    pub connectivity_type: String,
    pub is_active: bool,
    pub wizard_completed: bool,
    pub config_changed_at: Option<NaiveDateTime>,
    pub config_synced_at: Option<NaiveDateTime>,
    pub sync_interval_seconds: i32,
    pub ssh_port: Option<i32>,
    pub last_test_run_id: Option<Uuid>,
    pub last_test_passed: Option<bool>,
    pub last_test_results: Option<JsonValue>,
    pub last_test_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Site {
    /// Gateway-only sites have no local control loop to report on.
    pub fn is_controller(&self) -> bool {
        self.connectivity_type == "controller"
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
pub struct Device {
    pub id: i32,
    pub site_id: i32,
    pub name: String,
    pub device_type: String,
    pub enabled: bool,
    pub template_id: Option<i32>,
    pub registers: JsonValue,
    pub alarm_defs: JsonValue,
    pub calculated_fields: JsonValue,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::device_templates)]
pub struct DeviceTemplate {
    pub id: i32,
    pub name: String,
    pub enterprise_id: Option<i32>,
    pub registers: JsonValue,
    pub alarm_defs: JsonValue,
    pub calculated_fields: JsonValue,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::heartbeats)]
pub struct Heartbeat {
    pub id: i32,
    pub site_id: i32,
    pub timestamp: NaiveDateTime,
    pub metadata: JsonValue,
    pub control_loop_status: Option<String>,
    pub last_error: Option<String>,
    pub active_alarms_count: i32,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::heartbeats)]
pub struct NewHeartbeat {
    pub site_id: i32,
    pub timestamp: NaiveDateTime,
    pub metadata: JsonValue,
    pub control_loop_status: Option<String>,
    pub last_error: Option<String>,
    pub active_alarms_count: i32,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::alarms)]
pub struct Alarm {
    pub id: i32,
    pub site_id: i32,
    pub severity: String,
    pub message: String,
    pub acknowledged: bool,
    pub resolved: bool,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
    pub active_routed_at: Option<NaiveDateTime>,
    pub resolved_routed_at: Option<NaiveDateTime>,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub timezone: Option<String>,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::notification_preferences)]
pub struct NotificationPreference {
    pub id: i32,
    pub user_id: i32,
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

/// Alarm severity, totally ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Severity> {
        match s {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "minor" => Some(Severity::Minor),
            "major" => Some(Severity::Major),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Strictly increasing with urgency, starting at 1 so that unknown
    /// severity strings (rank 0) never override a known one.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Minor => 3,
            Severity::Major => 4,
            Severity::Critical => 5,
        }
    }

    /// Rank for a raw severity string; unrecognized values rank below `info`.
    pub fn rank_str(s: &str) -> u8 {
        Severity::from_str(s).map(|sev| sev.rank()).unwrap_or(0)
    }
}

/// Configuration sync status for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Synced,
    SyncNeeded,
    NeverSynced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::SyncNeeded => "sync_needed",
            SyncStatus::NeverSynced => "never_synced",
        }
    }
}

/// Status of a single diagnostic check within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }

    /// Once a check reaches a terminal status it never reverts within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_is_strictly_increasing() {
        let ordered = [
            Severity::Info,
            Severity::Warning,
            Severity::Minor,
            Severity::Major,
            Severity::Critical,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_severity_round_trip() {
        for s in ["info", "warning", "minor", "major", "critical"] {
            assert_eq!(Severity::from_str(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_unknown_severity_ranks_below_info() {
        assert_eq!(Severity::rank_str("catastrophic"), 0);
        assert_eq!(Severity::rank_str(""), 0);
        assert!(Severity::rank_str("nonsense") < Severity::Info.rank());
    }

    #[test]
    fn test_sync_status_strings() {
        assert_eq!(SyncStatus::Synced.as_str(), "synced");
        assert_eq!(SyncStatus::SyncNeeded.as_str(), "sync_needed");
        assert_eq!(SyncStatus::NeverSynced.as_str(), "never_synced");
    }

    #[test]
    fn test_test_status_terminal() {
        assert!(!TestStatus::Pending.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
        assert!(TestStatus::Passed.is_terminal());
        assert!(TestStatus::Failed.is_terminal());
        assert!(TestStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_test_status_serde_snake_case() {
        let json = serde_json::to_string(&TestStatus::Skipped).unwrap();
        assert_eq!(json, r#""skipped""#);
        let back: TestStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(back, TestStatus::Failed);
    }
}
