use crate::cmd::{build_pipeline, ensure_valid, load_config, runtime};
use anyhow::Context;
use postline_core::io::ProcessLock;
use postline_core::paths;
use postline_engine::{delay_from_secs, DayDecision, ScheduleSettings, Scheduler};
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, immediate: Option<Option<u64>>) -> anyhow::Result<()> {
    let config = load_config(root)?;
    ensure_valid(&config)?;

    // One daemon per deployment root. The kernel drops the lock with the
    // process, however it exits.
    let _lock = ProcessLock::acquire(&paths::lock_path(root))
        .context("another scheduler is already running for this root")?;

    let pipeline = Arc::new(build_pipeline(root, &config, false)?);
    let settings = ScheduleSettings::from_config(&config.schedule)?;
    let offset = settings.offset;
    let immediate =
        immediate.map(|secs| secs.unwrap_or(config.pipeline.immediate_delay_secs));
    let socket = paths::control_path(root);

    let rt = runtime()?;
    rt.block_on(async move {
        let scheduler = Arc::new(Scheduler::new(pipeline, settings));

        #[cfg(unix)]
        let control = {
            let listener = postline_engine::control::bind(&socket)
                .with_context(|| format!("failed to bind control socket {}", socket.display()))?;
            tracing::info!(socket = %socket.display(), "control socket listening");
            tokio::spawn(postline_engine::control::serve(listener, Arc::clone(&scheduler)))
        };

        match scheduler.start() {
            DayDecision::Armed { id, fire_at } => {
                tracing::info!(job = %id, fire_at = %fire_at.with_timezone(&offset), "today's publication armed");
            }
            DayDecision::NotAllowedWeekday { weekday, .. } => {
                tracing::info!(weekday = ?weekday, "no publication today");
            }
            DayDecision::AlreadyPassed { .. } => {
                tracing::info!("today's publication window has passed");
            }
        }

        if let Some(secs) = immediate {
            let fire_at = scheduler.schedule_immediate(delay_from_secs(secs));
            tracing::info!(fire_at = %fire_at.with_timezone(&offset), "immediate publication armed");
        }

        let status = scheduler.status().await?;
        for line in status.render(&offset).lines() {
            tracing::info!("{line}");
        }

        shutdown_signal().await?;
        tracing::info!("shutdown requested");

        #[cfg(unix)]
        control.abort();
        scheduler.stop();
        if let Err(e) = std::fs::remove_file(&socket) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, socket = %socket.display(), "failed to remove control socket");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Resolves on Ctrl+C, or on SIGTERM where there is one.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    Ok(())
}
