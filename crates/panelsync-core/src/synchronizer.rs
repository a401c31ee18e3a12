use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::a2s::ServerQuery;
use crate::config::SyncConfig;
use crate::querier::StatusQuerier;
use crate::sink::ChatSink;
use crate::status::ServerStatus;
use crate::store::{RecordStore, StoreError};
use crate::writer::{self, PanelOutcome, VoiceOutcome, WriteError};

#[derive(Debug)]
pub enum TargetOutcome {
    Unreachable(String),
    Synced {
        status: ServerStatus,
        panel: Result<PanelOutcome, WriteError>,
        voice: Result<VoiceOutcome, WriteError>,
    },
}

impl TargetOutcome {
    pub fn failed(&self) -> bool {
        match self {
            TargetOutcome::Unreachable(_) => true,
            TargetOutcome::Synced { panel, voice, .. } => panel.is_err() || voice.is_err(),
        }
    }

    pub fn writes(&self) -> usize {
        match self {
            TargetOutcome::Unreachable(_) => 0,
            TargetOutcome::Synced { panel, voice, .. } => {
                usize::from(panel.as_ref().is_ok_and(|p| p.wrote()))
                    + usize::from(voice.as_ref().is_ok_and(|v| v.wrote()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub synced: usize,
    pub failed: usize,
    pub unreachable: usize,
    pub writes: usize,
    pub elapsed: Duration,
}

pub struct Synchronizer<Q: ServerQuery, S: ChatSink> {
    pub(crate) store: RecordStore,
    pub(crate) querier: StatusQuerier<Q>,
    pub(crate) sink: S,
    pub(crate) config: SyncConfig,
}

impl<Q: ServerQuery, S: ChatSink> Synchronizer<Q, S> {
    pub fn new(store: RecordStore, client: Q, sink: S, config: SyncConfig) -> Self {
        Self {
            store,
            querier: StatusQuerier::new(client, config.cache_ttl, config.query_timeout),
            sink,
            config,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn querier(&self) -> &StatusQuerier<Q> {
        &self.querier
    }

    pub fn clear_cache(&mut self) {
        self.querier.clear_cache();
        info!("query cache cleared");
    }

    // Panel and voice writes are independent; one failing does not stop the other.
    pub async fn sync_target(&mut self, id: u64) -> Result<TargetOutcome, StoreError> {
        let (host, port) = {
            let record = self.store.get(id)?;
            (record.ip.clone(), record.port)
        };

        let status = match self.querier.query(&host, port).await {
            Ok(status) => status,
            Err(err) => return Ok(TargetOutcome::Unreachable(err.to_string())),
        };

        self.store.update(id, |r| r.last_online = status.occupancy())?;

        let panel = writer::sync_panel(
            &self.sink,
            &mut self.store,
            id,
            &status,
            self.config.history_scan_limit,
        )
        .await;
        if let Err(err) = &panel {
            warn!(target_id = id, error = %err, "panel write failed");
        }

        let record = self.store.get(id)?;
        let voice =
            writer::sync_voice_name(&self.sink, record, &status, self.config.voice_label_max)
                .await;
        if let Err(err) = &voice {
            warn!(target_id = id, error = %err, "voice channel write failed");
        }

        Ok(TargetOutcome::Synced { status, panel, voice })
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let ids = self.store.ids();
        let mut report = CycleReport {
            targets: ids.len(),
            ..CycleReport::default()
        };

        if ids.is_empty() {
            return report;
        }
        info!(targets = ids.len(), "cycle started");

        for (idx, id) in ids.iter().copied().enumerate() {
            match self.sync_target(id).await {
                Ok(outcome) => {
                    report.writes += outcome.writes();
                    if let TargetOutcome::Unreachable(reason) = &outcome {
                        warn!(
                            target_id = id,
                            reason = %reason,
                            "target unreachable, skipped this cycle"
                        );
                        report.unreachable += 1;
                    }
                    if outcome.failed() {
                        report.failed += 1;
                    } else {
                        report.synced += 1;
                    }
                }
                Err(err) => {
                    warn!(target_id = id, error = %err, "target vanished during cycle");
                    report.failed += 1;
                }
            }

            if idx + 1 < ids.len() {
                sleep(self.config.target_pause).await;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            synced = report.synced,
            failed = report.failed,
            unreachable = report.unreachable,
            writes = report.writes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "cycle finished"
        );
        report
    }
}
