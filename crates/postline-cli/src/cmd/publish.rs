use crate::cmd::{build_pipeline, daemon_request, ensure_valid, load_config, runtime};
use crate::output::print_json;
use anyhow::Context;
use postline_core::config::Config;
use postline_core::io::ProcessLock;
use postline_core::{paths, PostlineError};
use postline_engine::control::{ControlReply, ControlRequest, RunSummary};
use postline_engine::{RunOptions, RunOutcome, RunReport, SkipReason};
use std::path::Path;

pub fn run(root: &Path, force: bool, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    ensure_valid(&config)?;

    // A dry run records nothing, so it may run beside the daemon.
    if dry_run {
        return run_here(root, &config, RunOptions { force, dry_run }, json);
    }

    match ProcessLock::acquire(&paths::lock_path(root)) {
        Ok(_lock) => run_here(root, &config, RunOptions { force, dry_run }, json),
        Err(locked @ PostlineError::Locked { .. }) => {
            // A live daemon runs the pipeline for us; anything else holding
            // the lock is another publish.
            let rt = runtime()?;
            match daemon_request(&rt, root, &ControlRequest::Publish { force })? {
                Some(reply) => print_daemon_reply(reply, json),
                None => Err(locked)
                    .context("a scheduler or another publish is already running for this root"),
            }
        }
        Err(e) => Err(e).context("failed to take the scheduler lock"),
    }
}

fn run_here(root: &Path, config: &Config, options: RunOptions, json: bool) -> anyhow::Result<()> {
    let pipeline = build_pipeline(root, config, options.dry_run)?;

    let rt = runtime()?;
    let outcome = rt.block_on(pipeline.run(options))?;

    if json {
        return print_json(&outcome_json(&outcome));
    }

    match &outcome {
        RunOutcome::Published(report) => {
            println!(
                "Published {} ({}) as message {}",
                report.display_name,
                report.archetype,
                report.message_id.unwrap_or_default()
            );
            if let Some(poll) = report.poll_message_id {
                println!("Poll published as message {poll}");
            }
            if let Some(reason) = &report.poll_error {
                println!("Poll failed: {reason}");
            }
        }
        RunOutcome::DryRun(report) => {
            println!("Dry run: {} ({})", report.display_name, report.archetype);
            println!("{}", describe(report));
            println!("\n{}", report.text);
        }
        RunOutcome::Skipped(SkipReason::TooEarly { remaining_hours }) => {
            println!("Skipped: too early, wait another {remaining_hours:.1} hours (use --force to override)");
        }
        RunOutcome::Skipped(SkipReason::NoSources) => {
            println!("Skipped: no sources collected and no content plan entry for today");
        }
    }
    Ok(())
}

fn describe(report: &RunReport) -> String {
    format!(
        "plan override: {}, sources: {}, call to action: {}, personal experience: {}",
        if report.from_plan { "yes" } else { "no" },
        report.sources,
        if report.decorations.has_call_to_action() { "yes" } else { "no" },
        if report.decorations.personal_experience { "yes" } else { "no" },
    )
}

fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    let report_json = |status: &str, r: &RunReport| {
        serde_json::json!({
            "status": status,
            "archetype": r.archetype,
            "from_plan": r.from_plan,
            "decorations": r.decorations,
            "sources": r.sources,
            "text": r.text,
            "message_id": r.message_id,
            "poll_message_id": r.poll_message_id,
            "poll_error": r.poll_error,
            "published_at": r.published_at,
        })
    };
    match outcome {
        RunOutcome::Published(r) => report_json("published", r),
        RunOutcome::DryRun(r) => report_json("dry_run", r),
        RunOutcome::Skipped(reason) => serde_json::json!({
            "status": "skipped",
            "reason": reason.to_string(),
        }),
    }
}

fn print_daemon_reply(reply: ControlReply, json: bool) -> anyhow::Result<()> {
    let summary = match reply {
        ControlReply::Ran { outcome } => outcome,
        ControlReply::Failed { message } => anyhow::bail!("scheduler run failed: {message}"),
        other => anyhow::bail!("unexpected reply from scheduler: {other:?}"),
    };
    if json {
        return print_json(&summary);
    }

    match summary {
        RunSummary::Published {
            archetype,
            display_name,
            message_id,
            poll_message_id,
            poll_error,
        } => {
            println!(
                "Published {display_name} ({archetype}) as message {} via the running scheduler",
                message_id.unwrap_or_default()
            );
            if let Some(poll) = poll_message_id {
                println!("Poll published as message {poll}");
            }
            if let Some(reason) = poll_error {
                println!("Poll failed: {reason}");
            }
        }
        RunSummary::DryRun {
            archetype,
            display_name,
        } => println!("Dry run: {display_name} ({archetype})"),
        RunSummary::Skipped { reason } => println!("Skipped: {reason}"),
    }
    Ok(())
}
