pub mod alarms;
pub mod auth;
pub mod config_sync;
pub mod diagnostics;
pub mod notifications;
pub mod site_status;
pub mod status;
