// Refresh scheduler: decides per source whether a refresh is due, drives the
// adapter, and writes the resulting snapshot. One explicit state record per
// source (next check due, failure counter, in-flight guard) advanced by a
// single driving loop or a manual refresh-all trigger.

use crate::models::Source;
use crate::snapshot_repo::SnapshotRepo;
use crate::sources::{Refresh, StatSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, interval, timeout};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Kill switch: when false, refresh-all passes do nothing.
    pub enable_refresh: bool,
    /// Tolerance band for the due check, clamped to interval/2 per source.
    pub acceptable_variance_ms: i64,
    /// Upper bound on one adapter call; expiry counts as an adapter failure.
    pub adapter_timeout: Duration,
}

/// Result of one per-source due check within a refresh-all pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Due; adapter returned data; snapshot written.
    Refreshed,
    /// Due; adapter had nothing to record; no snapshot written.
    NoData,
    /// Due; adapter errored or timed out; no snapshot written.
    Failed,
    /// Not due yet.
    NotDue,
    /// A previous refresh for this source is still in flight; skipped.
    InFlight,
}

struct SourceState {
    adapter: Arc<dyn StatSource>,
    /// Held for the duration of one adapter call; try_lock enforces at most
    /// one in-flight refresh per source.
    in_flight: Mutex<()>,
    /// Epoch ms of the next scheduled due check. 0 = check immediately.
    next_check_due_ms: AtomicI64,
    failures: AtomicU64,
}

pub struct Scheduler {
    repo: Arc<SnapshotRepo>,
    config: SchedulerConfig,
    states: BTreeMap<Source, SourceState>,
}

/// Effective tolerance band: the configured variance, but never more than
/// half the interval (short intervals would otherwise always read as due).
pub fn effective_variance_ms(acceptable_variance_ms: i64, interval_ms: i64) -> i64 {
    acceptable_variance_ms.min(interval_ms / 2)
}

/// Due predicate: the elapsed time plus the tolerance band has passed the
/// target interval. A source with no prior snapshot has "infinite" elapsed
/// time and is always due.
pub fn is_due(elapsed_ms: i64, interval_ms: i64, variance_ms: i64) -> bool {
    elapsed_ms.saturating_add(variance_ms) > interval_ms
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|e| {
            warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

impl Scheduler {
    pub fn new(
        repo: Arc<SnapshotRepo>,
        adapters: Vec<Arc<dyn StatSource>>,
        config: SchedulerConfig,
    ) -> Self {
        let mut states = BTreeMap::new();
        for adapter in adapters {
            let source = adapter.source();
            states.insert(
                source,
                SourceState {
                    adapter,
                    in_flight: Mutex::new(()),
                    next_check_due_ms: AtomicI64::new(0),
                    failures: AtomicU64::new(0),
                },
            );
        }
        Self {
            repo,
            config,
            states,
        }
    }

    pub fn sources(&self) -> Vec<Source> {
        self.states.keys().copied().collect()
    }

    /// Adapter failures (errors + timeouts) observed for a source so far.
    pub fn failure_count(&self, source: Source) -> u64 {
        self.states
            .get(&source)
            .map(|s| s.failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Check every source and refresh the due ones, sequentially. One
    /// source's failure never stops the pass. `force` ignores the recorded
    /// next-check time (manual trigger); the due predicate still applies.
    #[instrument(skip(self), fields(operation = "refresh_all"))]
    pub async fn refresh_all(&self, force: bool) -> Vec<(Source, CheckOutcome)> {
        if !self.config.enable_refresh {
            info!("refresh disabled by config; skipping pass");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(self.states.len());
        for (source, state) in &self.states {
            let now = now_ms();
            if !force && state.next_check_due_ms.load(Ordering::Relaxed) > now {
                outcomes.push((*source, CheckOutcome::NotDue));
                continue;
            }
            let outcome = match self.check_and_refresh(*source, state).await {
                Ok(o) => o,
                Err(e) => {
                    // Storage trouble for one source must not stop the pass.
                    warn!(source = %source, error = %e, "check failed");
                    CheckOutcome::Failed
                }
            };
            outcomes.push((*source, outcome));
        }
        outcomes
    }

    /// One due check for one source. Returns the outcome and records the
    /// next check time. Storage errors propagate; adapter errors do not.
    async fn check_and_refresh(
        &self,
        source: Source,
        state: &SourceState,
    ) -> anyhow::Result<CheckOutcome> {
        let interval_ms = state.adapter.refresh_interval_ms();
        let variance = effective_variance_ms(self.config.acceptable_variance_ms, interval_ms);

        let latest = self.repo.latest(source).await?;
        let now = now_ms();
        // No prior snapshot reads as "last refreshed at the epoch": always due.
        let last_ts = latest.map(|s| s.timestamp_ms).unwrap_or(0);
        let elapsed = now - last_ts;
        let due = is_due(elapsed, interval_ms, variance);
        debug!(
            source = %source,
            elapsed_secs = elapsed / 1000,
            interval_secs = interval_ms / 1000,
            refreshing = due,
            "due check"
        );

        if !due {
            let wait = interval_ms - elapsed;
            state.next_check_due_ms.store(now + wait, Ordering::Relaxed);
            debug!(source = %source, next_update_secs = wait / 1000, "not due");
            return Ok(CheckOutcome::NotDue);
        }

        // Next attempt is a full interval away regardless of how this one
        // ends: no backoff, no immediate retry.
        state
            .next_check_due_ms
            .store(now + interval_ms, Ordering::Relaxed);

        let Ok(_guard) = state.in_flight.try_lock() else {
            debug!(source = %source, "refresh already in flight; skipping");
            return Ok(CheckOutcome::InFlight);
        };

        match timeout(self.config.adapter_timeout, state.adapter.refresh()).await {
            Ok(Ok(Refresh::Data(payload))) => {
                let written_at = now_ms();
                self.repo.insert(source, written_at, &payload).await?;
                info!(source = %source, timestamp_ms = written_at, "snapshot written");
                Ok(CheckOutcome::Refreshed)
            }
            Ok(Ok(Refresh::NoData)) => {
                info!(source = %source, "adapter returned no data");
                Ok(CheckOutcome::NoData)
            }
            Ok(Err(e)) => {
                state.failures.fetch_add(1, Ordering::Relaxed);
                warn!(source = %source, error = %e, "adapter refresh failed");
                Ok(CheckOutcome::Failed)
            }
            Err(_) => {
                state.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source = %source,
                    timeout_secs = self.config.adapter_timeout.as_secs(),
                    "adapter refresh timed out"
                );
                Ok(CheckOutcome::Failed)
            }
        }
    }
}

/// Spawns the driving loop: a refresh-all pass per tick until shutdown.
/// The tick is the external cadence; the per-source due predicate decides
/// what actually refreshes.
pub fn spawn(
    scheduler: Arc<Scheduler>,
    tick_interval: Duration,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let outcomes = scheduler.refresh_all(false).await;
                    let refreshed = outcomes
                        .iter()
                        .filter(|(_, o)| *o == CheckOutcome::Refreshed)
                        .count();
                    if refreshed > 0 {
                        debug!(refreshed, checked = outcomes.len(), "scheduler pass complete");
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("Scheduler shutting down");
                    break;
                }
            }
        }
    })
}
