use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduling: SchedulingConfig,
    pub series: SeriesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Kill switch: when false, refresh-all passes are skipped entirely.
    /// Reads of stored data are unaffected.
    #[serde(default = "default_true")]
    pub enable_refresh: bool,
    /// External cadence of the scheduler loop (the loop itself decides
    /// per-source whether anything is actually due).
    pub tick_interval_secs: u64,
    /// Tolerance band for the due check, clamped to interval/2 per source.
    #[serde(default = "default_acceptable_variance_ms")]
    pub acceptable_variance_ms: u64,
    /// Upper bound on one adapter refresh call; a timeout counts as a failure.
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    /// Wipe every configured source's snapshots at startup (backfill resets).
    #[serde(default)]
    pub delete_all_on_start: bool,
}

fn default_true() -> bool {
    true
}

fn default_acceptable_variance_ms() -> u64 {
    10_000
}

fn default_adapter_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    /// Default bucket count when the request does not specify one.
    #[serde(default = "default_buckets")]
    pub default_buckets: u32,
    /// Bounded random pre-sample taken before bucketed/relative-time work.
    #[serde(default = "default_max_pre_sample")]
    pub max_pre_sample: u32,
    /// Fixed UTC offset (hours) used for calendar-day grouping in delta mode.
    #[serde(default)]
    pub timezone_offset_hours: i32,
}

fn default_buckets() -> u32 {
    200
}

fn default_max_pre_sample() -> u32 {
    10_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.scheduling.tick_interval_secs > 0,
            "scheduling.tick_interval_secs must be > 0, got {}",
            self.scheduling.tick_interval_secs
        );
        anyhow::ensure!(
            self.scheduling.adapter_timeout_secs > 0,
            "scheduling.adapter_timeout_secs must be > 0, got {}",
            self.scheduling.adapter_timeout_secs
        );
        anyhow::ensure!(
            self.series.default_buckets > 0,
            "series.default_buckets must be > 0, got {}",
            self.series.default_buckets
        );
        anyhow::ensure!(
            self.series.max_pre_sample > 0,
            "series.max_pre_sample must be > 0, got {}",
            self.series.max_pre_sample
        );
        anyhow::ensure!(
            (-12..=14).contains(&self.series.timezone_offset_hours),
            "series.timezone_offset_hours must be a valid UTC offset, got {}",
            self.series.timezone_offset_hours
        );
        Ok(())
    }
}
