//! Sync rounds: push pending quotes, fetch the remote, merge, persist.
//!
//! At most one round runs at a time. Rounds start either from
//! [`SyncScheduler::trigger_manual_sync`] or from the auto-sync timer; a
//! trigger that arrives while a round is in flight is rejected with
//! [`SyncError::AlreadyRunning`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::join_all;
use quotesync_engine::{RecordId, Timestamp};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::SyncError;
use crate::remote::{RemoteError, RemoteSource};

/// Shortest auto-sync period accepted.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// What started a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Auto,
}

/// How a round ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum RoundOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// A push that the remote refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFailure {
    pub id: RecordId,
    pub error: String,
}

/// Result of one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub trigger: Trigger,
    pub outcome: RoundOutcome,
    /// Records published during the push phase
    pub pushed: usize,
    pub push_failures: Vec<PushFailure>,
    /// Records returned by the fetch
    pub fetched: usize,
    pub inserted: usize,
    pub replaced: usize,
    /// Conflict entries appended to the ledger
    pub conflicts: usize,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl SyncReport {
    fn new(trigger: Trigger, started_at: Timestamp) -> Self {
        Self {
            trigger,
            outcome: RoundOutcome::Completed,
            pushed: 0,
            push_failures: Vec::new(),
            fetched: 0,
            inserted: 0,
            replaced: 0,
            conflicts: 0,
            started_at,
            finished_at: started_at,
        }
    }
}

/// Auto-sync settings as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncStatus {
    pub enabled: bool,
    pub interval_secs: u64,
}

struct AutoSync {
    interval: Duration,
    /// Present while the timer task runs
    stop: Option<CancellationToken>,
}

/// Orchestrates sync rounds and owns the auto-sync timer.
pub struct SyncScheduler {
    engine: Arc<Engine>,
    remote: Arc<dyn RemoteSource>,
    fetch_limit: usize,
    running: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
    auto: Mutex<AutoSync>,
}

/// Held for the duration of a round; releases the single-flight flag on drop.
struct RoundGuard<'a> {
    scheduler: &'a SyncScheduler,
    cancel: CancellationToken,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.scheduler.current) = None;
        self.scheduler.running.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<Engine>,
        remote: Arc<dyn RemoteSource>,
        fetch_limit: usize,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            remote,
            fetch_limit,
            running: AtomicBool::new(false),
            current: Mutex::new(None),
            auto: Mutex::new(AutoSync {
                interval: interval.max(MIN_SYNC_INTERVAL),
                stop: None,
            }),
        })
    }

    /// Run one round now.
    pub async fn trigger_manual_sync(&self) -> Result<SyncReport, SyncError> {
        let guard = self.try_start().ok_or(SyncError::AlreadyRunning)?;
        Ok(self.run_round(Trigger::Manual, guard).await)
    }

    /// Cancel the round in flight, if any.
    ///
    /// Remote calls that already finished are honored; no new ones start.
    pub fn cancel_current_round(&self) -> bool {
        match lock(&self.current).as_ref() {
            Some(cancel) => {
                tracing::info!("Cancelling sync round");
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn auto_sync_status(&self) -> AutoSyncStatus {
        let auto = lock(&self.auto);
        AutoSyncStatus {
            enabled: auto.stop.is_some(),
            interval_secs: auto.interval.as_secs(),
        }
    }

    /// Turn periodic sync on or off, optionally changing its period.
    ///
    /// Enabling fires a round right away. Once this returns with `enabled ==
    /// false`, no further auto round starts; a round already in flight runs
    /// to completion.
    pub fn set_auto_sync(
        self: &Arc<Self>,
        enabled: bool,
        interval: Option<Duration>,
    ) -> AutoSyncStatus {
        let mut auto = lock(&self.auto);

        let restart = match interval.map(|i| i.max(MIN_SYNC_INTERVAL)) {
            Some(interval) if interval != auto.interval => {
                auto.interval = interval;
                true
            }
            _ => false,
        };

        if !enabled || restart {
            if let Some(stop) = auto.stop.take() {
                stop.cancel();
                tracing::info!("Auto-sync stopped");
            }
        }

        if enabled && auto.stop.is_none() {
            let stop = CancellationToken::new();
            tokio::spawn(auto_sync_loop(
                Arc::downgrade(self),
                auto.interval,
                stop.clone(),
            ));
            auto.stop = Some(stop);
            tracing::info!(interval_secs = auto.interval.as_secs(), "Auto-sync started");
        }

        AutoSyncStatus {
            enabled: auto.stop.is_some(),
            interval_secs: auto.interval.as_secs(),
        }
    }

    /// Stop the timer and cancel whatever round is running.
    pub fn shutdown(self: &Arc<Self>) {
        self.set_auto_sync(false, None);
        self.cancel_current_round();
    }

    fn try_start(&self) -> Option<RoundGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let cancel = CancellationToken::new();
        *lock(&self.current) = Some(cancel.clone());
        Some(RoundGuard {
            scheduler: self,
            cancel,
        })
    }

    /// Claim a round for the timer, unless auto-sync was switched off.
    fn try_start_auto(
        &self,
        stop: &CancellationToken,
    ) -> Option<Result<RoundGuard<'_>, SyncError>> {
        let _auto = lock(&self.auto);
        if stop.is_cancelled() {
            return None;
        }
        Some(self.try_start().ok_or(SyncError::AlreadyRunning))
    }

    async fn run_round(&self, trigger: Trigger, guard: RoundGuard<'_>) -> SyncReport {
        let mut report = SyncReport::new(trigger, self.engine.now());
        tracing::info!(?trigger, "Sync round started");
        self.engine.begin_sync().await;

        let outcome = self.execute(&guard.cancel, &mut report).await;
        report.outcome = outcome;
        report.finished_at = self.engine.now();

        match &report.outcome {
            RoundOutcome::Completed => tracing::info!(
                pushed = report.pushed,
                fetched = report.fetched,
                inserted = report.inserted,
                replaced = report.replaced,
                conflicts = report.conflicts,
                "Sync round completed"
            ),
            RoundOutcome::Cancelled => {
                tracing::info!(pushed = report.pushed, "Sync round cancelled")
            }
            RoundOutcome::Failed(reason) => {
                tracing::warn!(reason = %reason, pushed = report.pushed, "Sync round failed")
            }
        }

        // Release the flag before subscribers hear about the result.
        drop(guard);
        self.engine.finish_sync(report.clone()).await;
        report
    }

    async fn execute(&self, cancel: &CancellationToken, report: &mut SyncReport) -> RoundOutcome {
        let pending = self.engine.pending_push().await;
        if !pending.is_empty() {
            if cancel.is_cancelled() {
                return RoundOutcome::Cancelled;
            }

            let results = join_all(pending.iter().map(|record| async move {
                (record.id, self.remote.push(record, cancel).await)
            }))
            .await;

            let mut published = Vec::new();
            let mut interrupted = false;
            for (id, result) in results {
                match result {
                    Ok(remote_id) => published.push((id, remote_id)),
                    Err(RemoteError::Cancelled) => interrupted = true,
                    Err(e) => {
                        tracing::warn!(id, error = %e, "Push failed");
                        report.push_failures.push(PushFailure {
                            id,
                            error: e.to_string(),
                        });
                    }
                }
            }
            report.pushed = self.engine.record_published(published).await;

            if !report.push_failures.is_empty() {
                return RoundOutcome::Failed(format!(
                    "{} of {} pushes failed",
                    report.push_failures.len(),
                    pending.len()
                ));
            }
            if interrupted {
                return RoundOutcome::Cancelled;
            }
        }

        if cancel.is_cancelled() {
            return RoundOutcome::Cancelled;
        }

        let fetched_at = self.engine.now();
        let batch = match self.remote.fetch(self.fetch_limit, cancel).await {
            Ok(batch) => batch,
            Err(RemoteError::Cancelled) => return RoundOutcome::Cancelled,
            Err(e) => return RoundOutcome::Failed(e.to_string()),
        };
        report.fetched = batch.len();

        // A fetch that completed is merged even if cancel arrived meanwhile.
        let merged = self.engine.apply_remote(batch, fetched_at).await;
        report.inserted = merged.inserted;
        report.replaced = merged.replaced;
        report.conflicts = merged.conflicts;

        RoundOutcome::Completed
    }
}

async fn auto_sync_loop(scheduler: Weak<SyncScheduler>, period: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(this) = scheduler.upgrade() else {
            break;
        };

        let claim = this.try_start_auto(&stop);
        match claim {
            None => break,
            Some(Ok(guard)) => {
                this.run_round(Trigger::Auto, guard).await;
            }
            Some(Err(SyncError::AlreadyRunning)) => {
                tracing::debug!("Skipping auto-sync tick, a round is already running");
            }
        }
    }

    tracing::debug!("Auto-sync loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw, seeded_engine, ScriptedRemote};
    use quotesync_engine::CategoryFilter;

    fn scheduler(engine: Arc<Engine>, remote: Arc<ScriptedRemote>) -> Arc<SyncScheduler> {
        SyncScheduler::new(engine, remote, 5, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn round_pushes_then_merges() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.script_fetch(Ok(vec![raw("1", "Wisdom", "Know thyself")]));
        let scheduler = scheduler(engine.clone(), remote.clone());

        let report = scheduler.trigger_manual_sync().await.unwrap();

        assert_eq!(report.outcome, RoundOutcome::Completed);
        assert_eq!(report.trigger, Trigger::Manual);
        assert_eq!(report.pushed, 3);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(remote.pushed().len(), 3);
        assert!(engine.pending_push().await.is_empty());
        assert_eq!(engine.active_records(&CategoryFilter::All).await.len(), 4);
        assert_eq!(engine.last_sync().await, Some(report));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn overlapping_trigger_is_rejected() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::gated());
        let scheduler = scheduler(engine, remote.clone());

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_manual_sync().await }
        });
        remote.fetch_started.notified().await;

        assert!(scheduler.is_running());
        assert_eq!(
            scheduler.trigger_manual_sync().await,
            Err(SyncError::AlreadyRunning)
        );

        remote.release();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.outcome, RoundOutcome::Completed);
        assert_eq!(remote.fetch_calls(), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn cancel_during_fetch_leaves_state_alone() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::gated());
        remote.script_fetch(Ok(vec![raw("1", "Wisdom", "Know thyself")]));
        let scheduler = scheduler(engine.clone(), remote.clone());

        let round = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_manual_sync().await }
        });
        remote.fetch_started.notified().await;
        let before = engine.active_records(&CategoryFilter::All).await;

        assert!(scheduler.cancel_current_round());
        let report = round.await.unwrap().unwrap();

        assert_eq!(report.outcome, RoundOutcome::Cancelled);
        // Pushes finished before the cancel and stay published.
        assert_eq!(report.pushed, 3);
        assert_eq!(engine.active_records(&CategoryFilter::All).await, before);

        // The next round picks up where we left off.
        remote.release();
        let next = scheduler.trigger_manual_sync().await.unwrap();
        assert_eq!(next.outcome, RoundOutcome::Completed);
        assert_eq!(next.inserted, 1);
    }

    #[tokio::test]
    async fn cancel_when_idle_is_noop() {
        let (engine, _, _) = seeded_engine().await;
        let scheduler = scheduler(engine, Arc::new(ScriptedRemote::new()));
        assert!(!scheduler.cancel_current_round());
    }

    #[tokio::test]
    async fn push_failure_fails_round_without_fetching() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.fail_push_of("Happiness depends upon ourselves.");
        let scheduler = scheduler(engine.clone(), remote.clone());

        let report = scheduler.trigger_manual_sync().await.unwrap();

        assert!(matches!(report.outcome, RoundOutcome::Failed(_)));
        assert_eq!(report.pushed, 2);
        assert_eq!(report.push_failures.len(), 1);
        assert_eq!(remote.fetch_calls(), 0);

        let pending = engine.pending_push().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "Happiness depends upon ourselves.");
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_and_recovered_from() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::new());
        remote.script_fetch(Err(RemoteError::Network("connection reset".into())));
        remote.script_fetch(Ok(vec![raw("1", "Wisdom", "Know thyself")]));
        let scheduler = scheduler(engine.clone(), remote);
        let before = engine.active_records(&CategoryFilter::All).await.len();

        let failed = scheduler.trigger_manual_sync().await.unwrap();
        assert_eq!(
            failed.outcome,
            RoundOutcome::Failed("network error: connection reset".into())
        );
        assert_eq!(engine.active_records(&CategoryFilter::All).await.len(), before);

        let recovered = scheduler.trigger_manual_sync().await.unwrap();
        assert_eq!(recovered.outcome, RoundOutcome::Completed);
        assert_eq!(
            engine.active_records(&CategoryFilter::All).await.len(),
            before + 1
        );
    }

    #[tokio::test]
    async fn local_addition_during_round_survives() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::gated());
        remote.script_fetch(Ok(vec![raw("1", "Wisdom", "Know thyself")]));
        let scheduler = scheduler(engine.clone(), remote.clone());

        let round = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_manual_sync().await }
        });
        remote.fetch_started.notified().await;

        let added = engine.add_local_record("Added mid-round", "Mine").await.unwrap();
        remote.release();
        round.await.unwrap().unwrap();

        let records = engine.active_records(&CategoryFilter::All).await;
        assert_eq!(records.len(), 5);
        let kept = records.iter().find(|r| r.text == "Added mid-round").unwrap();
        assert_eq!(kept.id, added.id);

        let mut ids: Vec<_> = records.iter().map(|r| r.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn subscribers_see_round_start_and_end() {
        let (engine, _, _) = seeded_engine().await;
        let mut changes = engine.subscribe();
        let scheduler = scheduler(engine, Arc::new(ScriptedRemote::new()));

        scheduler.trigger_manual_sync().await.unwrap();

        let summary = changes.borrow_and_update().clone();
        assert!(!summary.syncing);
        assert_eq!(
            summary.last_sync.map(|r| r.outcome),
            Some(RoundOutcome::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sync_fires_on_schedule_and_stops() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::new());
        let scheduler = scheduler(engine, remote.clone());

        let status = scheduler.set_auto_sync(true, None);
        assert!(status.enabled);
        assert_eq!(status.interval_secs, 60);

        // First tick is immediate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.fetch_calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(remote.fetch_calls(), 2);

        let status = scheduler.set_auto_sync(false, None);
        assert!(!status.enabled);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(remote.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_interval_restarts_timer() {
        let (engine, _, _) = seeded_engine().await;
        let remote = Arc::new(ScriptedRemote::new());
        let scheduler = scheduler(engine, remote.clone());

        scheduler.set_auto_sync(true, None);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.fetch_calls(), 1);

        let status = scheduler.set_auto_sync(true, Some(Duration::from_secs(5)));
        assert_eq!(status.interval_secs, 5);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.fetch_calls(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remote.fetch_calls(), 3);

        scheduler.shutdown();
        assert!(!scheduler.auto_sync_status().enabled);
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let (engine, _, _) = seeded_engine().await;
        let scheduler = SyncScheduler::new(
            engine,
            Arc::new(ScriptedRemote::new()),
            5,
            Duration::ZERO,
        );
        assert_eq!(scheduler.auto_sync_status().interval_secs, 1);
    }
}
