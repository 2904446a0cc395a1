use crate::cmd::{daemon_request, load_config, runtime};
use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use postline_core::catalog::RotationCatalog;
use postline_core::guard::PublishGuard;
use postline_core::plan::ContentPlan;
use postline_core::store::{read_state, YamlStateStore};
use postline_engine::control::{ControlReply, ControlRequest};
use postline_engine::SchedulerStatus;
use std::path::Path;

/// Live status of the daemon serving `root`, if one answers.
fn live_scheduler(root: &Path) -> anyhow::Result<Option<SchedulerStatus>> {
    let rt = runtime()?;
    match daemon_request(&rt, root, &ControlRequest::Status)? {
        None => Ok(None),
        Some(ControlReply::Status(status)) => Ok(Some(status)),
        Some(ControlReply::Failed { message }) => {
            anyhow::bail!("scheduler could not report status: {message}")
        }
        Some(other) => anyhow::bail!("unexpected reply from scheduler: {other:?}"),
    }
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let catalog = RotationCatalog::standard();
    let state = read_state(&YamlStateStore::new(root), &catalog)
        .context("failed to read rotation state")?;

    let now = Utc::now();
    let guard = PublishGuard::from_hours(config.guard.min_interval_hours).can_publish(&state, now);
    let today = now.with_timezone(&config.schedule.offset()?).date_naive();
    let plan = ContentPlan::load(root).context("failed to load content plan")?;
    let override_today = plan.entry_for_date(today);

    let next = state.next_archetype(&catalog);
    let scheduler = live_scheduler(root)?;

    if json {
        let value = serde_json::json!({
            "channel": config.channel,
            "next_archetype": next,
            "current_index": state.current_index,
            "cycle_length": catalog.len(),
            "last_published_at": state.last_published_at,
            "publications": state.publication_count(),
            "history": state.history,
            "guard": guard,
            "plan_today": override_today,
            "scheduler": scheduler.as_ref().map(|s| serde_json::json!({
                "running": s.running,
                "next_job": s.next_job,
                "jobs": s.jobs,
            })),
        });
        return print_json(&value);
    }

    print!("{}", state.render_status(&catalog));
    println!("Guard: {guard}");
    match override_today {
        Some(entry) => println!(
            "Content plan for {today}: {} ({})",
            entry.topic,
            catalog.resolve_or_default(&entry.archetype).display_name
        ),
        None => println!("Content plan for {today}: none, rotation decides"),
    }
    println!();
    match &scheduler {
        Some(status) => print!("{}", status.render_jobs(&config.schedule.offset()?)),
        None => println!("Scheduler: not running"),
    }
    Ok(())
}
