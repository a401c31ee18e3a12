use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub cycle_interval: Duration,
    pub target_pause: Duration,
    pub query_timeout: Duration,
    pub cache_ttl: Duration,
    pub history_scan_limit: u8,
    pub voice_label_max: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(60),
            target_pause: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(30),
            history_scan_limit: 15,
            voice_label_max: 32,
        }
    }
}
