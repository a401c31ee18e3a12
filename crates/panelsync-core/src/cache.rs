use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::status::ServerStatus;

/// Time-windowed memo of query results keyed by query address.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    entries: HashMap<(String, u16), (ServerStatus, Instant)>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, host: &str, port: u16) -> Option<&ServerStatus> {
        let (status, captured) = self.entries.get(&(host.to_string(), port))?;
        (captured.elapsed() < self.ttl).then_some(status)
    }

    pub fn put(&mut self, host: &str, port: u16, status: ServerStatus) {
        self.entries
            .insert((host.to_string(), port), (status, Instant::now()));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
