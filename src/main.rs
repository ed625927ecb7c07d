use anyhow::Result;
use statdash::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let repo = Arc::new(
        snapshot_repo::SnapshotRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
        )
        .await?,
    );
    repo.init().await?;

    let adapters = sources::default_sources();

    if app_config.scheduling.delete_all_on_start {
        for adapter in &adapters {
            let source = adapter.source();
            let deleted = repo.delete_all(source).await?;
            tracing::info!(source = %source, deleted, "deleted on start");
        }
    }

    let scheduler = Arc::new(scheduler::Scheduler::new(
        repo.clone(),
        adapters,
        scheduler::SchedulerConfig {
            enable_refresh: app_config.scheduling.enable_refresh,
            acceptable_variance_ms: app_config.scheduling.acceptable_variance_ms as i64,
            adapter_timeout: std::time::Duration::from_secs(
                app_config.scheduling.adapter_timeout_secs,
            ),
        },
    ));

    let reconstructor = Arc::new(series::SeriesReconstructor::new(
        repo.clone(),
        series::ReconstructorConfig {
            max_pre_sample: app_config.series.max_pre_sample,
            timezone_offset_hours: app_config.series.timezone_offset_hours,
        },
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_handle = scheduler::spawn(
        scheduler.clone(),
        std::time::Duration::from_secs(app_config.scheduling.tick_interval_secs),
        shutdown_rx,
    );

    let app = routes::app(
        repo,
        scheduler,
        reconstructor,
        Arc::new(charts::catalog()),
        app_config.clone(),
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    tokio::signal::ctrl_c().await
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                let _ = scheduler_handle.await;
            }
        }
    }

    Ok(())
}
