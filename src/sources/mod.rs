// Adapter capability contract plus the built-in adapters.
// Real provider adapters (OAuth, scraping, upstream API shapes) plug in
// behind the StatSource trait; none of that is visible to the scheduler.

mod time;

pub use time::TimeSource;

use crate::models::{Payload, Source};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one adapter refresh. NoData is a normal result, not an error:
/// the upstream had nothing to record this cycle (e.g. non-success status).
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    Data(Payload),
    NoData,
}

/// One external source of stats. Implementations own their identifier and
/// nominal refresh interval; the scheduler owns timestamps and persistence.
#[async_trait]
pub trait StatSource: Send + Sync {
    fn source(&self) -> Source;

    /// Target period between successful refreshes, in milliseconds. Must be > 0.
    fn refresh_interval_ms(&self) -> i64;

    /// Fetch the current measurement. Errors are absorbed by the scheduler
    /// (logged, counted, next attempt a full interval away).
    async fn refresh(&self) -> anyhow::Result<Refresh>;
}

/// Adapters registered out of the box. Provider adapters append here once
/// they have credentials configured.
pub fn default_sources() -> Vec<Arc<dyn StatSource>> {
    vec![Arc::new(TimeSource::new())]
}
