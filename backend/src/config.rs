use chrono::Duration;

/// Engine-wide tunables, passed explicitly to the services that need them.
///
/// The staleness threshold is a single value shared by the site status
/// endpoint and the project aggregation so the two can never disagree on
/// what "online" means.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub staleness_threshold_secs: i64,
}

impl EngineConfig {
    pub const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 60;

    pub fn from_env() -> Self {
        let staleness_threshold_secs = std::env::var("STALENESS_THRESHOLD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_STALENESS_THRESHOLD_SECS);

        Self {
            staleness_threshold_secs,
        }
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::seconds(self.staleness_threshold_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: Self::DEFAULT_STALENESS_THRESHOLD_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        let config = EngineConfig::default();
        assert_eq!(config.staleness_threshold(), Duration::seconds(60));
    }
}
