use crate::cmd::{daemon_request, load_config, runtime};
use crate::output::print_json;
use postline_engine::control::{ControlReply, ControlRequest};
use std::path::Path;

/// Ask the running scheduler to arm a one-off publication.
pub fn run(root: &Path, delay_secs: Option<u64>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let delay_secs = delay_secs.unwrap_or(config.pipeline.immediate_delay_secs);

    let rt = runtime()?;
    let reply = daemon_request(&rt, root, &ControlRequest::ScheduleNow { delay_secs })?
        .ok_or_else(|| {
            anyhow::anyhow!("no scheduler is running for this root (start one with 'postline run')")
        })?;

    match reply {
        ControlReply::Scheduled { id, fire_at } => {
            if json {
                return print_json(&serde_json::json!({ "id": id, "fire_at": fire_at }));
            }
            println!(
                "Armed {id} for {}",
                fire_at
                    .with_timezone(&config.schedule.offset()?)
                    .format("%Y-%m-%d %H:%M:%S %:z")
            );
            Ok(())
        }
        ControlReply::Failed { message } => anyhow::bail!("scheduler refused: {message}"),
        other => anyhow::bail!("unexpected reply from scheduler: {other:?}"),
    }
}
