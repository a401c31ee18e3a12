use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::a2s::ServerQuery;
use crate::sink::ChatSink;
use crate::synchronizer::Synchronizer;

/// Requests delivered to a running scheduler between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ClearCache,
    Shutdown,
}

/// Runs a cycle immediately and then once per `cycle_interval`, measured between cycle starts.
/// A cycle that overruns pushes the next one back instead of bunching them up. Control messages
/// are looked at between cycles and take precedence over a due tick; a closed channel stops the
/// loop like `Shutdown`.
pub async fn run<Q, S>(
    sync: &mut Synchronizer<Q, S>,
    mut control: mpsc::Receiver<Control>,
) -> usize
where
    Q: ServerQuery,
    S: ChatSink,
{
    let mut ticker = interval(sync.config().cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0;

    info!(
        interval_secs = sync.config().cycle_interval.as_secs(),
        targets = sync.store().len(),
        "scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            msg = control.recv() => match msg {
                Some(Control::ClearCache) => sync.clear_cache(),
                Some(Control::Shutdown) | None => {
                    warn!(cycles, "scheduler stopping");
                    break;
                }
            },
            _ = ticker.tick() => {
                sync.run_cycle().await;
                cycles += 1;
            }
        }
    }

    cycles
}
