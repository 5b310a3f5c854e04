use crate::db::DbPool;
use crate::models::{DeviceTemplate, SyncStatus};
use crate::schema::{device_templates, devices, sites};
use crate::services::status::latest_of;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};

/// Per-device inputs to drift detection, already normalized to plain
/// optionals at the data-access boundary.
#[derive(Debug, Clone)]
pub struct DeviceSyncInput {
    pub device_id: i32,
    pub updated_at: NaiveDateTime,
    pub template_updated_at: Option<NaiveDateTime>,
}

/// Result of comparing a site's deployed configuration against cloud intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSyncState {
    pub status: SyncStatus,
    pub last_config_update: Option<NaiveDateTime>,
    pub total_devices: i64,
    pub devices_needing_sync: i64,
}

impl ConfigSyncState {
    /// Safe fallback when the device/template join cannot be read.
    pub fn unknown() -> Self {
        Self {
            status: SyncStatus::NeverSynced,
            last_config_update: None,
            total_devices: 0,
            devices_needing_sync: 0,
        }
    }
}

/// Decide whether a site's deployed configuration is stale relative to
/// cloud intent.
///
/// A site that has never synced is `never_synced` regardless of config age.
/// Otherwise a device needs sync when its own mutation or its template's
/// mutation is strictly newer than the last sync; template edits propagate
/// to every device referencing the template.
pub fn compute_sync_state(
    config_changed_at: Option<NaiveDateTime>,
    config_synced_at: Option<NaiveDateTime>,
    devices: &[DeviceSyncInput],
) -> ConfigSyncState {
    let last_config_update = latest_of(
        std::iter::once(config_changed_at)
            .chain(devices.iter().map(|d| Some(d.updated_at)))
            .chain(devices.iter().map(|d| d.template_updated_at)),
    );

    let total_devices = devices.len() as i64;

    let synced_at = match config_synced_at {
        Some(t) => t,
        None => {
            return ConfigSyncState {
                status: SyncStatus::NeverSynced,
                last_config_update,
                total_devices,
                devices_needing_sync: 0,
            };
        }
    };

    let devices_needing_sync = devices
        .iter()
        .filter(|d| {
            d.updated_at > synced_at
                || d.template_updated_at.map(|t| t > synced_at).unwrap_or(false)
        })
        .count() as i64;

    let site_drift = config_changed_at.map(|t| t > synced_at).unwrap_or(false);

    let status = if devices_needing_sync > 0 || site_drift {
        SyncStatus::SyncNeeded
    } else {
        SyncStatus::Synced
    };

    ConfigSyncState {
        status,
        last_config_update,
        total_devices,
        devices_needing_sync,
    }
}

/// True when a reported pull should replace the stored sync stamp: a first
/// confirmation always does, otherwise only a strictly newer one.
pub fn advances_sync_stamp(current: Option<NaiveDateTime>, pulled_at: NaiveDateTime) -> bool {
    current.map(|t| pulled_at > t).unwrap_or(true)
}

pub struct ConfigSyncService {
    pool: DbPool,
}

impl ConfigSyncService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Compute the sync state for one site from the stored rows.
    ///
    /// Never errors: failing to compute sync status must not block status
    /// display, so any read failure degrades to the never_synced default.
    pub fn sync_state_for_site(&self, site_id: i32) -> ConfigSyncState {
        match self.load_and_compute(site_id) {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not compute sync state for site {}: {}", site_id, e);
                ConfigSyncState::unknown()
            }
        }
    }

    fn load_and_compute(&self, site_id: i32) -> Result<ConfigSyncState, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let (config_changed_at, config_synced_at): (
            Option<NaiveDateTime>,
            Option<NaiveDateTime>,
        ) = sites::table
            .filter(sites::id.eq(site_id))
            .select((sites::config_changed_at, sites::config_synced_at))
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        // Left join so devices without a template still participate; the
        // nullable template timestamp collapses to a plain Option here.
        let rows: Vec<(i32, NaiveDateTime, Option<NaiveDateTime>)> = devices::table
            .left_join(device_templates::table)
            .filter(devices::site_id.eq(site_id))
            .filter(devices::enabled.eq(true))
            .select((
                devices::id,
                devices::updated_at,
                device_templates::updated_at.nullable(),
            ))
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let inputs: Vec<DeviceSyncInput> = rows
            .into_iter()
            .map(|(device_id, updated_at, template_updated_at)| DeviceSyncInput {
                device_id,
                updated_at,
                template_updated_at,
            })
            .collect();

        Ok(compute_sync_state(
            config_changed_at,
            config_synced_at,
            &inputs,
        ))
    }

    /// Re-copy register/alarm/calculated-field definitions from each enabled
    /// device's template onto the device and stamp the site as synced now.
    ///
    /// Idempotent: running it twice with no intervening config edits leaves
    /// `devices_needing_sync` at zero on the second drift check.
    pub fn sync_templates(&self, site_id: i32) -> Result<usize, String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let targets: Vec<(i32, i32)> = devices::table
            .filter(devices::site_id.eq(site_id))
            .filter(devices::enabled.eq(true))
            .filter(devices::template_id.is_not_null())
            .select((devices::id, devices::template_id.assume_not_null()))
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let now = Utc::now().naive_utc();
        let mut synced_count = 0;

        for (device_id, template_id) in targets {
            let template: DeviceTemplate = match device_templates::table
                .filter(device_templates::id.eq(template_id))
                .first(&mut conn)
            {
                Ok(t) => t,
                Err(e) => {
                    warn!(
                        "Template {} for device {} not readable, skipping: {}",
                        template_id, device_id, e
                    );
                    continue;
                }
            };

            diesel::update(devices::table.filter(devices::id.eq(device_id)))
                .set((
                    devices::registers.eq(&template.registers),
                    devices::alarm_defs.eq(&template.alarm_defs),
                    devices::calculated_fields.eq(&template.calculated_fields),
                    devices::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|e| e.to_string())?;
            synced_count += 1;
        }

        // The sync moment, never a future or stale timestamp.
        diesel::update(sites::table.filter(sites::id.eq(site_id)))
            .set(sites::config_synced_at.eq(Some(now)))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        info!("Synced {} devices from templates for site {}", synced_count, site_id);
        Ok(synced_count)
    }

    /// Record that the controller itself confirmed pulling config, stamping
    /// the sync moment reported by the heartbeat. Older confirmations never
    /// move the timestamp backwards.
    pub fn record_pull_confirmation(
        &self,
        site_id: i32,
        pulled_at: NaiveDateTime,
    ) -> Result<(), String> {
        let mut conn = self.pool.get().map_err(|e| e.to_string())?;

        let current: Option<NaiveDateTime> = sites::table
            .filter(sites::id.eq(site_id))
            .select(sites::config_synced_at)
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        if advances_sync_stamp(current, pulled_at) {
            diesel::update(sites::table.filter(sites::id.eq(site_id)))
                .set(sites::config_synced_at.eq(Some(pulled_at)))
                .execute(&mut conn)
                .map_err(|e| e.to_string())?;
            info!("Site {} confirmed config pull at {}", site_id, pulled_at);
        }

        Ok(())
    }
}
