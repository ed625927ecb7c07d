// Scheduler tests: due decisions, failure isolation, kill switch, in-flight guard

mod common;

use async_trait::async_trait;
use common::{payload, temp_repo};
use statdash::models::Source;
use statdash::scheduler::{CheckOutcome, Scheduler, SchedulerConfig, now_ms};
use statdash::snapshot_repo::SnapshotRepo;
use statdash::sources::{Refresh, StatSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Duration;

const HOUR_MS: i64 = 3_600_000;

enum Behavior {
    Data(f64),
    NoData,
    Fail,
    Slow(Duration),
}

struct MockSource {
    source: Source,
    interval_ms: i64,
    behavior: Behavior,
    calls: AtomicU64,
}

impl MockSource {
    fn new(source: Source, interval_ms: i64, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            source,
            interval_ms,
            behavior,
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatSource for MockSource {
    fn source(&self) -> Source {
        self.source
    }

    fn refresh_interval_ms(&self) -> i64 {
        self.interval_ms
    }

    async fn refresh(&self) -> anyhow::Result<Refresh> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Data(v) => Ok(Refresh::Data(payload("test", "value", *v))),
            Behavior::NoData => Ok(Refresh::NoData),
            Behavior::Fail => anyhow::bail!("upstream exploded"),
            Behavior::Slow(d) => {
                tokio::time::sleep(*d).await;
                Ok(Refresh::Data(payload("test", "value", 1.0)))
            }
        }
    }
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        enable_refresh: true,
        acceptable_variance_ms: 10_000,
        adapter_timeout: Duration::from_secs(5),
    }
}

fn build(
    repo: Arc<SnapshotRepo>,
    adapters: Vec<Arc<MockSource>>,
    config: SchedulerConfig,
) -> Arc<Scheduler> {
    let dyns: Vec<Arc<dyn StatSource>> = adapters
        .into_iter()
        .map(|a| a as Arc<dyn StatSource>)
        .collect();
    Arc::new(Scheduler::new(repo, dyns, config))
}

#[tokio::test]
async fn first_run_refreshes_immediately() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(Source::Twitter, HOUR_MS, Behavior::Data(42.0));
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let outcomes = scheduler.refresh_all(false).await;
    assert_eq!(outcomes, vec![(Source::Twitter, CheckOutcome::Refreshed)]);
    assert_eq!(adapter.calls(), 1);

    let latest = repo.latest(Source::Twitter).await.unwrap().unwrap();
    assert_eq!(latest.payload["test"]["value"], 42.0);
    // Timestamp assigned by the scheduler, not the adapter
    assert!((now_ms() - latest.timestamp_ms).abs() < 5_000);
}

#[tokio::test]
async fn recent_snapshot_is_not_due() {
    let (_dir, repo) = temp_repo().await;
    // Refreshed 3580s ago: inside the 10s tolerance band of a 1h interval
    repo.insert(Source::Twitter, now_ms() - 3_580_000, &payload("test", "value", 1.0))
        .await
        .unwrap();

    let adapter = MockSource::new(Source::Twitter, HOUR_MS, Behavior::Data(2.0));
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let outcomes = scheduler.refresh_all(false).await;
    assert_eq!(outcomes, vec![(Source::Twitter, CheckOutcome::NotDue)]);
    assert_eq!(adapter.calls(), 0);
    assert_eq!(repo.count(Source::Twitter).await.unwrap(), 1);
}

#[tokio::test]
async fn slightly_early_refresh_is_due_within_variance() {
    let (_dir, repo) = temp_repo().await;
    // 3591s ago: 9s early, but within the 10s band
    repo.insert(Source::Twitter, now_ms() - 3_591_000, &payload("test", "value", 1.0))
        .await
        .unwrap();

    let adapter = MockSource::new(Source::Twitter, HOUR_MS, Behavior::Data(2.0));
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let outcomes = scheduler.refresh_all(false).await;
    assert_eq!(outcomes, vec![(Source::Twitter, CheckOutcome::Refreshed)]);
    assert_eq!(repo.count(Source::Twitter).await.unwrap(), 2);
}

#[tokio::test]
async fn failure_is_isolated_from_other_sources() {
    let (_dir, repo) = temp_repo().await;
    let failing = MockSource::new(Source::Gmail, HOUR_MS, Behavior::Fail);
    let healthy = MockSource::new(Source::Weather, HOUR_MS, Behavior::Data(72.0));
    let scheduler = build(
        repo.clone(),
        vec![failing.clone(), healthy.clone()],
        scheduler_config(),
    );

    let outcomes = scheduler.refresh_all(false).await;
    assert!(outcomes.contains(&(Source::Gmail, CheckOutcome::Failed)));
    assert!(outcomes.contains(&(Source::Weather, CheckOutcome::Refreshed)));

    assert_eq!(repo.count(Source::Gmail).await.unwrap(), 0);
    assert_eq!(repo.count(Source::Weather).await.unwrap(), 1);
    assert_eq!(scheduler.failure_count(Source::Gmail), 1);
    assert_eq!(scheduler.failure_count(Source::Weather), 0);
}

#[tokio::test]
async fn no_data_writes_nothing() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(Source::Stocks, HOUR_MS, Behavior::NoData);
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let outcomes = scheduler.refresh_all(false).await;
    assert_eq!(outcomes, vec![(Source::Stocks, CheckOutcome::NoData)]);
    assert_eq!(adapter.calls(), 1);
    assert_eq!(repo.count(Source::Stocks).await.unwrap(), 0);
    // NoData is not a failure
    assert_eq!(scheduler.failure_count(Source::Stocks), 0);
}

#[tokio::test]
async fn kill_switch_skips_everything() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(Source::Twitter, HOUR_MS, Behavior::Data(1.0));
    let mut config = scheduler_config();
    config.enable_refresh = false;
    let scheduler = build(repo.clone(), vec![adapter.clone()], config);

    let outcomes = scheduler.refresh_all(true).await;
    assert!(outcomes.is_empty());
    assert_eq!(adapter.calls(), 0);
    assert_eq!(repo.count(Source::Twitter).await.unwrap(), 0);
}

#[tokio::test]
async fn adapter_timeout_counts_as_failure() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(
        Source::Fitbit,
        HOUR_MS,
        Behavior::Slow(Duration::from_secs(60)),
    );
    let mut config = scheduler_config();
    config.adapter_timeout = Duration::from_millis(50);
    let scheduler = build(repo.clone(), vec![adapter.clone()], config);

    let outcomes = scheduler.refresh_all(false).await;
    assert_eq!(outcomes, vec![(Source::Fitbit, CheckOutcome::Failed)]);
    assert_eq!(scheduler.failure_count(Source::Fitbit), 1);
    assert_eq!(repo.count(Source::Fitbit).await.unwrap(), 0);
}

#[tokio::test]
async fn at_most_one_in_flight_refresh_per_source() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(
        Source::Tscraper,
        HOUR_MS,
        Behavior::Slow(Duration::from_millis(300)),
    );
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let a = scheduler.clone();
    let b = scheduler.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.refresh_all(true).await }),
        tokio::spawn(async move {
            // Let the first pass reach the adapter before we race it
            tokio::time::sleep(Duration::from_millis(50)).await;
            b.refresh_all(true).await
        }),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first, vec![(Source::Tscraper, CheckOutcome::Refreshed)]);
    assert_eq!(second, vec![(Source::Tscraper, CheckOutcome::InFlight)]);
    assert_eq!(adapter.calls(), 1, "no second concurrent adapter call");
    assert_eq!(repo.count(Source::Tscraper).await.unwrap(), 1);
}

#[tokio::test]
async fn non_forced_pass_respects_next_check_due() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(Source::Twitter, HOUR_MS, Behavior::Data(1.0));
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let first = scheduler.refresh_all(false).await;
    assert_eq!(first, vec![(Source::Twitter, CheckOutcome::Refreshed)]);

    // Second pass right away: the recorded next-check time is an hour out,
    // so the source is skipped without touching the store or adapter.
    let second = scheduler.refresh_all(false).await;
    assert_eq!(second, vec![(Source::Twitter, CheckOutcome::NotDue)]);
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn spawned_loop_refreshes_and_shuts_down() {
    let (_dir, repo) = temp_repo().await;
    let adapter = MockSource::new(Source::Time, HOUR_MS, Behavior::Data(1.0));
    let scheduler = build(repo.clone(), vec![adapter.clone()], scheduler_config());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = statdash::scheduler::spawn(scheduler, Duration::from_millis(20), shutdown_rx);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    // First tick refreshed; later ticks saw the hour-long interval as not due
    assert_eq!(adapter.calls(), 1);
    assert_eq!(repo.count(Source::Time).await.unwrap(), 1);
}
