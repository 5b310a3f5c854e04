use crate::config::EngineConfig;
use crate::db::DbPool;
use crate::models::{Heartbeat, Site};
use crate::schema::{heartbeats, sites};
use crate::services::alarms::{AlarmService, AlarmSummary};
use crate::services::config_sync::ConfigSyncService;
use crate::services::status::is_online;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSection {
    pub status: String,
    pub last_seen: Option<NaiveDateTime>,
    #[serde(rename = "type")]
    pub connectivity_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlLogicSection {
    pub status: Option<String>,
    pub last_error: Option<String>,
    pub active_alarms: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSyncSection {
    pub status: String,
    pub last_synced_at: Option<NaiveDateTime>,
    pub cloud_changed_at: Option<NaiveDateTime>,
    pub local_pulled_at: Option<NaiveDateTime>,
    pub last_config_update: Option<NaiveDateTime>,
    pub sync_interval_seconds: i32,
    pub total_devices: i64,
    pub devices_needing_sync: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSection {
    pub has_logs: bool,
    pub last_log_timestamp: Option<NaiveDateTime>,
    pub total_logs: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatusResponse {
    pub connection: ConnectionSection,
    pub control_logic: Option<ControlLogicSection>,
    pub config_sync: ConfigSyncSection,
    pub logging: LoggingSection,
    pub alarms: AlarmSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatusResponse {
    pub online: i64,
    pub offline: i64,
    pub total: i64,
}

/// Composes the leaf evaluators into the dashboard response documents.
///
/// Every section sits behind its own error boundary: a failed sub-query
/// degrades that section to its safe default instead of failing the whole
/// response, so the dashboard always renders best-effort status.
pub struct SiteStatusService {
    pool: DbPool,
    config: EngineConfig,
}

impl SiteStatusService {
    pub fn new(pool: DbPool, config: EngineConfig) -> Self {
        Self { pool, config }
    }

    pub fn status_for_site(&self, site_id: i32) -> Result<SiteStatusResponse, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        // The site row itself is the only hard requirement.
        let site: Site = sites::table
            .filter(sites::id.eq(site_id))
            .first(&mut conn)
            .map_err(|e| format!("Site {} not found: {}", site_id, e))?;

        let now = Utc::now().naive_utc();

        let latest: Option<Heartbeat> = heartbeats::table
            .filter(heartbeats::site_id.eq(site_id))
            .order(heartbeats::timestamp.desc())
            .first(&mut conn)
            .optional()
            .unwrap_or_else(|e| {
                warn!("Could not read heartbeats for site {}: {}", site_id, e);
                None
            });

        let heartbeat_count: i64 = heartbeats::table
            .filter(heartbeats::site_id.eq(site_id))
            .count()
            .get_result(&mut conn)
            .unwrap_or_else(|e| {
                warn!("Could not count heartbeats for site {}: {}", site_id, e);
                0
            });

        let last_seen = latest.as_ref().map(|hb| hb.timestamp);
        let online = is_online(last_seen, now, self.config.staleness_threshold());

        let connection = ConnectionSection {
            status: if online { "online" } else { "offline" }.to_string(),
            last_seen,
            connectivity_type: site.connectivity_type.clone(),
        };

        // Gateway-only sites have no local control loop to report.
        let control_logic = if site.is_controller() {
            Some(ControlLogicSection {
                status: latest.as_ref().and_then(|hb| hb.control_loop_status.clone()),
                last_error: latest.as_ref().and_then(|hb| hb.last_error.clone()),
                active_alarms: latest.as_ref().map(|hb| hb.active_alarms_count).unwrap_or(0),
            })
        } else {
            None
        };

        let sync_state = ConfigSyncService::new(self.pool.clone()).sync_state_for_site(site_id);
        let local_pulled_at = latest
            .as_ref()
            .and_then(|hb| hb.metadata.get("config_pulled_at"))
            .and_then(|v| v.as_str())
            .and_then(crate::services::status::parse_reported_timestamp);

        let config_sync = ConfigSyncSection {
            status: sync_state.status.as_str().to_string(),
            last_synced_at: site.config_synced_at,
            cloud_changed_at: site.config_changed_at,
            local_pulled_at,
            last_config_update: sync_state.last_config_update,
            sync_interval_seconds: site.sync_interval_seconds,
            total_devices: sync_state.total_devices,
            devices_needing_sync: sync_state.devices_needing_sync,
        };

        let logging = LoggingSection {
            has_logs: heartbeat_count > 0,
            last_log_timestamp: last_seen,
            total_logs: heartbeat_count,
        };

        let alarms = AlarmService::new(self.pool.clone())
            .summary_for_site(site_id)
            .unwrap_or_else(|e| {
                warn!("Could not summarize alarms for site {}: {}", site_id, e);
                AlarmSummary::empty()
            });

        Ok(SiteStatusResponse {
            connection,
            control_logic,
            config_sync,
            logging,
            alarms,
        })
    }

    /// Online/offline counts across all active sites of a project, using
    /// the same staleness threshold as the per-site endpoint.
    pub fn status_for_project(&self, project_id: i32) -> Result<ProjectStatusResponse, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let site_ids: Vec<i32> = sites::table
            .filter(sites::project_id.eq(project_id))
            .filter(sites::is_active.eq(true))
            .select(sites::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let now = Utc::now().naive_utc();
        let threshold = self.config.staleness_threshold();
        let mut online = 0;

        for site_id in &site_ids {
            let last_seen: Option<NaiveDateTime> = heartbeats::table
                .filter(heartbeats::site_id.eq(*site_id))
                .select(diesel::dsl::max(heartbeats::timestamp))
                .first(&mut conn)
                .unwrap_or_else(|e| {
                    warn!("Could not read heartbeats for site {}: {}", site_id, e);
                    None
                });

            if is_online(last_seen, now, threshold) {
                online += 1;
            }
        }

        let total = site_ids.len() as i64;
        Ok(ProjectStatusResponse {
            online,
            offline: total - online,
            total,
        })
    }
}
