use std::time::Duration;

use tracing::{debug, warn};

use crate::a2s::{QueryError, ServerQuery};
use crate::cache::ResultCache;
use crate::status::ServerStatus;

pub struct StatusQuerier<Q: ServerQuery> {
    client: Q,
    cache: ResultCache,
    timeout: Duration,
}

impl<Q: ServerQuery> StatusQuerier<Q> {
    pub fn new(client: Q, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            client,
            cache: ResultCache::new(cache_ttl),
            timeout,
        }
    }

    pub async fn query(&mut self, host: &str, port: u16) -> Result<ServerStatus, QueryError> {
        if let Some(hit) = self.cache.get(host, port) {
            debug!(host, port, online = hit.online, "status served from cache");
            return Ok(hit.clone());
        }

        match self.client.query(host, port, self.timeout).await {
            Ok(status) => {
                debug!(host, port, online = status.online, max = status.max, "status cached");
                self.cache.put(host, port, status.clone());
                Ok(status)
            }
            Err(err) => {
                warn!(host, port, error = %err, "status query failed");
                Err(err)
            }
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn client(&self) -> &Q {
        &self.client
    }
}
