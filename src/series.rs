// Series reconstruction: turns an irregularly-sampled snapshot history into
// chartable series. Four modes: raw, bucketed (fixed-window means), delta
// (day-over-day change), relative-time (ordinal x-axis with interpolation).
// DB access stays in snapshot_repo; everything below the query is pure.

use crate::models::{Payload, Snapshot, Source, StatPoint, StatsResponse};
use crate::snapshot_repo::SnapshotRepo;
use chrono::{FixedOffset, TimeZone};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Raw,
    Bucketed,
    Delta,
    RelativeTime,
}

#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub source: Source,
    /// Lookback window in ms; None = from the earliest stored snapshot.
    pub since_ms: Option<i64>,
    pub buckets: u32,
    pub mode: Mode,
}

#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Histories larger than this are randomly pre-sampled down to this many
    /// rows before bucketing (bounded cost; charts are approximate anyway).
    pub max_pre_sample: u32,
    /// Fixed UTC offset for calendar-day grouping in delta mode.
    pub timezone_offset_hours: i32,
}

pub struct SeriesReconstructor {
    repo: Arc<SnapshotRepo>,
    config: ReconstructorConfig,
}

impl SeriesReconstructor {
    pub fn new(repo: Arc<SnapshotRepo>, config: ReconstructorConfig) -> Self {
        Self { repo, config }
    }

    /// Produce the response for one read request. Empty history yields a
    /// well-formed empty result in every mode; never an error.
    #[instrument(skip(self), fields(operation = "stats", source = %req.source))]
    pub async fn stats(&self, req: &SeriesRequest) -> anyhow::Result<StatsResponse> {
        match req.mode {
            Mode::Raw => self.raw(req.source).await,
            Mode::Bucketed => self.bucketed(req).await,
            Mode::Delta => self.delta(req).await,
            Mode::RelativeTime => self.relative_time(req).await,
        }
    }

    async fn raw(&self, source: Source) -> anyhow::Result<StatsResponse> {
        let snapshots = self.repo.query_all_desc(source).await?;
        let stats: Vec<StatPoint> = snapshots
            .into_iter()
            .map(|s| StatPoint {
                timestamp: s.timestamp_ms,
                stats: s.payload,
            })
            .collect();
        let series = catalog_from_first(&stats);
        Ok(StatsResponse { stats, series })
    }

    async fn bucketed(&self, req: &SeriesRequest) -> anyhow::Result<StatsResponse> {
        let Some(latest) = self.repo.latest(req.source).await? else {
            return Ok(StatsResponse::empty());
        };

        let now = crate::scheduler::now_ms();
        let range_start = match req.since_ms {
            Some(since) => now - since,
            None => match self.repo.earliest(req.source).await? {
                Some(s) => s.timestamp_ms,
                None => return Ok(StatsResponse::empty()),
            },
        };

        let snapshots = self
            .bounded_snapshots(req.source, Some(range_start), Some(now))
            .await?;
        let boundaries = bucket_boundaries(range_start, now, req.buckets);
        let stats = bucketed_points(&snapshots, &boundaries, &latest.payload);
        let series = payload_catalog(&latest.payload);
        Ok(StatsResponse { stats, series })
    }

    async fn delta(&self, req: &SeriesRequest) -> anyhow::Result<StatsResponse> {
        let now = crate::scheduler::now_ms();
        let start = req.since_ms.map(|since| now - since);
        let snapshots = self.repo.query_range(req.source, start, None).await?;
        if snapshots.is_empty() {
            return Ok(StatsResponse::empty());
        }

        let offset = fixed_offset(self.config.timezone_offset_hours);
        let stats = delta_points(&snapshots, &offset);
        let series = catalog_union(&stats);
        Ok(StatsResponse { stats, series })
    }

    async fn relative_time(&self, req: &SeriesRequest) -> anyhow::Result<StatsResponse> {
        let now = crate::scheduler::now_ms();
        let start = req.since_ms.map(|since| now - since);
        let mut snapshots = self.bounded_snapshots(req.source, start, None).await?;
        if snapshots.is_empty() {
            return Ok(StatsResponse::empty());
        }

        // Newest first, like raw mode; the ordinal position becomes the x-axis.
        snapshots.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        let stats = relative_points(&snapshots);
        let series = catalog_union(&stats);
        Ok(StatsResponse { stats, series })
    }

    /// Full range query, or a random pre-sample when the history is larger
    /// than the configured bound.
    async fn bounded_snapshots(
        &self,
        source: Source,
        start: Option<i64>,
        end: Option<i64>,
    ) -> anyhow::Result<Vec<Snapshot>> {
        let total = self.repo.count(source).await?;
        if total > self.config.max_pre_sample as u64 {
            tracing::debug!(
                source = %source,
                total,
                limit = self.config.max_pre_sample,
                "history above pre-sample bound; sampling"
            );
            self.repo
                .sample(source, start, end, self.config.max_pre_sample)
                .await
        } else {
            self.repo.query_range(source, start, end).await
        }
    }
}

/// N+1 boundaries exactly partitioning [range_start, range_end] into N
/// equal-width buckets. The final boundary is forced to range_end so
/// rounding error accumulates into the last bucket, never past the range.
pub fn bucket_boundaries(range_start: i64, range_end: i64, buckets: u32) -> Vec<i64> {
    let n = buckets.max(1);
    let width = (range_end - range_start) as f64 / n as f64;
    let mut out = Vec::with_capacity(n as usize + 1);
    for i in 0..n {
        out.push(range_start + (width * i as f64) as i64);
    }
    out.push(range_end);
    out
}

/// One point per bucket: per-field mean of the snapshots falling inside it.
/// The field set is taken from the most recent snapshot's payload; a field
/// with no values in a bucket is simply absent from that point.
pub fn bucketed_points(
    snapshots: &[Snapshot],
    boundaries: &[i64],
    field_template: &Payload,
) -> Vec<StatPoint> {
    let mut out = Vec::with_capacity(boundaries.len().saturating_sub(1));
    for w in boundaries.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        let last_bucket = hi == *boundaries.last().unwrap_or(&hi);
        let in_bucket = snapshots.iter().filter(|s| {
            s.timestamp_ms >= lo && (s.timestamp_ms < hi || (last_bucket && s.timestamp_ms <= hi))
        });

        // sum/count per subSource:field, restricted to the template fields
        let mut sums: BTreeMap<(&str, &str), (f64, u64)> = BTreeMap::new();
        for s in in_bucket {
            for (sub, fields) in field_template {
                let Some(observed) = s.payload.get(sub) else {
                    continue;
                };
                for field in fields.keys() {
                    if let Some(v) = observed.get(field) {
                        let entry = sums.entry((sub.as_str(), field.as_str())).or_insert((0.0, 0));
                        entry.0 += v;
                        entry.1 += 1;
                    }
                }
            }
        }

        let mut stats = Payload::new();
        for ((sub, field), (sum, count)) in sums {
            stats
                .entry(sub.to_string())
                .or_default()
                .insert(field.to_string(), sum / count as f64);
        }
        out.push(StatPoint {
            timestamp: lo,
            stats,
        });
    }
    out
}

/// Collapse to the last snapshot per calendar day (latest wins), then emit
/// day-over-day differences. The first day's delta is 0 (no baseline). A
/// missing field value counts as 0 on either side of the subtraction; this
/// is the literal upstream contract, spurious jumps included.
pub fn delta_points(snapshots: &[Snapshot], offset: &FixedOffset) -> Vec<StatPoint> {
    // snapshots arrive ascending, so insertion order gives latest-wins
    let mut by_day: BTreeMap<String, &Snapshot> = BTreeMap::new();
    for s in snapshots {
        by_day.insert(day_key(s.timestamp_ms, offset), s);
    }
    let per_day: Vec<&Snapshot> = by_day.into_values().collect();

    let fields = field_union(per_day.iter().map(|s| &s.payload));

    let mut out = Vec::with_capacity(per_day.len());
    for (i, snap) in per_day.iter().enumerate() {
        let mut stats = Payload::new();
        for (sub, field) in &fields {
            let current = lookup(&snap.payload, sub, field).unwrap_or(0.0);
            let previous = if i == 0 {
                current // delta[0] = 0
            } else {
                lookup(&per_day[i - 1].payload, sub, field).unwrap_or(0.0)
            };
            stats
                .entry(sub.clone())
                .or_default()
                .insert(field.clone(), current - previous);
        }
        out.push(StatPoint {
            timestamp: snap.timestamp_ms,
            stats,
        });
    }
    out
}

/// One point per snapshot with the ordinal position as the x value. Missing
/// field values are linearly interpolated from the nearest earlier and later
/// points carrying that field; with no neighbor on either side the value
/// stays absent (no extrapolation).
pub fn relative_points(snapshots: &[Snapshot]) -> Vec<StatPoint> {
    let fields = field_union(snapshots.iter().map(|s| &s.payload));

    let mut out = Vec::with_capacity(snapshots.len());
    for (idx, snap) in snapshots.iter().enumerate() {
        let mut stats = Payload::new();
        for (sub, field) in &fields {
            let value = match lookup(&snap.payload, sub, field) {
                Some(v) => Some(v),
                None => interpolate(snapshots, idx, sub, field),
            };
            if let Some(v) = value {
                stats.entry(sub.clone()).or_default().insert(field.clone(), v);
            }
        }
        out.push(StatPoint {
            timestamp: idx as i64,
            stats,
        });
    }
    out
}

/// Linear interpolation across ordinal positions for one subSource:field.
fn interpolate(snapshots: &[Snapshot], idx: usize, sub: &str, field: &str) -> Option<f64> {
    let earlier = snapshots[..idx]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, s)| lookup(&s.payload, sub, field).map(|v| (i, v)))?;
    let later = snapshots
        .iter()
        .enumerate()
        .skip(idx + 1)
        .find_map(|(i, s)| lookup(&s.payload, sub, field).map(|v| (i, v)))?;

    let (x0, y0) = (earlier.0 as f64, earlier.1);
    let (x1, y1) = (later.0 as f64, later.1);
    let slope = (y1 - y0) / (x1 - x0);
    Some(y0 + slope * (idx as f64 - x0))
}

/// Lookback window in ms from a value + unit pair ("sinceTime"/"sinceUnits").
/// Months and years use 30/365-day approximations; charts don't need more.
pub fn since_window_ms(value: f64, units: &str) -> Option<i64> {
    let unit_ms: i64 = match units {
        "minutes" => 60 * 1000,
        "hours" => 60 * 60 * 1000,
        "days" => 24 * 60 * 60 * 1000,
        "weeks" => 7 * 24 * 60 * 60 * 1000,
        "months" => 30 * 24 * 60 * 60 * 1000,
        "years" => 365 * 24 * 60 * 60 * 1000,
        _ => return None,
    };
    Some((value * unit_ms as f64) as i64)
}

pub fn fixed_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

fn day_key(timestamp_ms: i64, offset: &FixedOffset) -> String {
    match offset.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
        _ => String::new(),
    }
}

fn lookup(payload: &Payload, sub: &str, field: &str) -> Option<f64> {
    payload.get(sub).and_then(|m| m.get(field)).copied()
}

/// All distinct subSource:field pairs across a set of payloads.
fn field_union<'a>(payloads: impl Iterator<Item = &'a Payload>) -> BTreeSet<(String, String)> {
    let mut out = BTreeSet::new();
    for payload in payloads {
        for (sub, fields) in payload {
            for field in fields.keys() {
                out.insert((sub.clone(), field.clone()));
            }
        }
    }
    out
}

/// Catalog from the newest point only (raw/bucketed modes).
fn catalog_from_first(points: &[StatPoint]) -> BTreeMap<String, Vec<String>> {
    points
        .first()
        .map(|p| payload_catalog(&p.stats))
        .unwrap_or_default()
}

/// Catalog from the union of fields across all points: different points may
/// carry different subsets (delta/relative-time modes).
fn catalog_union(points: &[StatPoint]) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for p in points {
        for (sub, fields) in &p.stats {
            out.entry(sub.clone())
                .or_default()
                .extend(fields.keys().cloned());
        }
    }
    out.into_iter()
        .map(|(sub, fields)| (sub, fields.into_iter().collect()))
        .collect()
}

pub fn payload_catalog(payload: &Payload) -> BTreeMap<String, Vec<String>> {
    payload
        .iter()
        .map(|(sub, fields)| (sub.clone(), fields.keys().cloned().collect()))
        .collect()
}
