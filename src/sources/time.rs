// Wall-clock demo source: reports the current hour/minute/second under the
// "clock" subSource. The one adapter with no external dependency; useful for
// exercising the whole pipeline end to end.

use super::{Refresh, StatSource};
use crate::models::{Payload, Source};
use async_trait::async_trait;
use chrono::Timelike;
use std::collections::BTreeMap;

const REFRESH_INTERVAL_MS: i64 = 5 * 1000;

pub struct TimeSource;

impl TimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatSource for TimeSource {
    fn source(&self) -> Source {
        Source::Time
    }

    fn refresh_interval_ms(&self) -> i64 {
        REFRESH_INTERVAL_MS
    }

    async fn refresh(&self) -> anyhow::Result<Refresh> {
        let now = chrono::Local::now();
        let mut clock = BTreeMap::new();
        clock.insert("hours".to_string(), now.hour() as f64);
        clock.insert("minutes".to_string(), now.minute() as f64);
        clock.insert("seconds".to_string(), now.second() as f64);

        let mut payload = Payload::new();
        payload.insert("clock".to_string(), clock);
        tracing::debug!(source = "time", "clock sample taken");
        Ok(Refresh::Data(payload))
    }
}
