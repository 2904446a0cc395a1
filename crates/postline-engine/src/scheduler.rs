//! Daily scheduling of publication runs.
//!
//! Shortly after local midnight the scheduler decides whether today is a
//! publication day and, if so, arms a one-shot job at a random minute inside
//! the publication window. The job runs the pipeline exactly once.

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, RunOptions, RunOutcome};
use crate::timer::{delay_until, DailyTrigger, JobBoard, JobInfo};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use postline_core::config::ScheduleConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Id of the job armed by [`Scheduler::schedule_immediate`].
pub const IMMEDIATE_JOB_ID: &str = "immediate_post";

/// Longest delay accepted for an operator-requested run.
const MAX_IMMEDIATE_DELAY_SECS: u64 = 366 * 24 * 3600;

/// Delay for [`Scheduler::schedule_immediate`] from a user-supplied number
/// of seconds, capped at a little over a year.
pub fn delay_from_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_IMMEDIATE_DELAY_SECS) as i64)
}

/// Id of the daily job for `date`, e.g. `post_20260303`.
pub fn daily_job_id(date: NaiveDate) -> String {
    format!("post_{}", date.format("%Y%m%d"))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub allowed_weekdays: Vec<Weekday>,
    /// First hour of the window, inclusive.
    pub window_start_hour: u32,
    /// Last hour of the window, inclusive: a job may fire up to HH:59.
    pub window_end_hour: u32,
    pub daily_check_time: NaiveTime,
    pub offset: FixedOffset,
}

impl ScheduleSettings {
    pub fn from_config(config: &ScheduleConfig) -> postline_core::Result<Self> {
        Ok(Self {
            allowed_weekdays: config.allowed_weekdays.clone(),
            window_start_hour: config.window_start_hour,
            window_end_hour: config.window_end_hour,
            daily_check_time: config.check_time()?,
            offset: config.offset()?,
        })
    }

    fn window_minutes(&self) -> std::ops::Range<u32> {
        let start = self.window_start_hour.min(23) * 60;
        let end = (self.window_end_hour.min(23) + 1) * 60;
        start..end.max(start + 1)
    }
}

// ---------------------------------------------------------------------------
// Decisions and status
// ---------------------------------------------------------------------------

/// Result of one daily check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayDecision {
    NotAllowedWeekday { date: NaiveDate, weekday: Weekday },
    /// The randomly chosen time had already passed when the check ran.
    AlreadyPassed { date: NaiveDate, fire_at: DateTime<Utc> },
    Armed { id: String, fire_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobInfo>,
    pub next_job: Option<JobInfo>,
    /// Multi-line rotation report.
    pub rotation: String,
}

impl SchedulerStatus {
    pub fn render(&self, offset: &FixedOffset) -> String {
        let mut out = self.render_jobs(offset);
        out.push('\n');
        out.push_str(&self.rotation);
        out
    }

    /// The scheduler lines of [`render`](Self::render), without the rotation
    /// report.
    pub fn render_jobs(&self, offset: &FixedOffset) -> String {
        let mut out = format!(
            "Scheduler: {}\n",
            if self.running { "running" } else { "stopped" }
        );
        match &self.next_job {
            Some(job) => out.push_str(&format!(
                "Next job: {} at {}\n",
                job.id,
                job.fire_at.with_timezone(offset).format("%Y-%m-%d %H:%M %:z")
            )),
            None => out.push_str("Next job: none\n"),
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    settings: ScheduleSettings,
    clock: Arc<dyn Clock>,
    jobs: JobBoard,
    rng: Mutex<StdRng>,
    trigger: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, settings: ScheduleSettings) -> Self {
        let clock = Arc::clone(pipeline.clock());
        Self {
            pipeline,
            settings,
            clock,
            jobs: JobBoard::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            trigger: Mutex::new(None),
        }
    }

    /// Seed the window-minute draw, for reproducible schedules.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &JobBoard {
        &self.jobs
    }

    pub fn is_running(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Run the daily check now, then repeat it every day at the configured
    /// local check time. Calling `start` on a running scheduler is a no-op.
    pub fn start(self: &Arc<Self>) -> DayDecision {
        let decision = self.daily_check_at(self.clock.now());

        let mut trigger = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
        if trigger.is_none() {
            let me = Arc::clone(self);
            let daily = DailyTrigger::new(self.settings.daily_check_time, self.settings.offset);
            *trigger = Some(daily.spawn(Arc::clone(&self.clock), move || {
                let me = Arc::clone(&me);
                async move {
                    me.daily_check_at(me.clock.now());
                }
            }));
            tracing::info!(
                check_time = %self.settings.daily_check_time,
                offset = %self.settings.offset,
                "scheduler started"
            );
        }
        decision
    }

    /// Stop the daily trigger and drop every armed job. A run already in
    /// progress finishes on its own.
    pub fn stop(&self) {
        if let Some(handle) = self
            .trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        self.jobs.clear();
        tracing::info!("scheduler stopped");
    }

    /// Decide about the local day containing `now` and arm its job.
    ///
    /// Checking the same day again replaces the job rather than adding a
    /// second one.
    pub fn daily_check_at(self: &Arc<Self>, now: DateTime<Utc>) -> DayDecision {
        let local = now.with_timezone(&self.settings.offset);
        let date = local.date_naive();
        let weekday = date.weekday();

        if !self.settings.allowed_weekdays.contains(&weekday) {
            tracing::info!(date = %date, weekday = ?weekday, "not a publication day");
            return DayDecision::NotAllowedWeekday { date, weekday };
        }

        let minute = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen_range(self.settings.window_minutes())
        };
        let Some(fire_at) = self.local_instant(date, minute) else {
            tracing::warn!(date = %date, minute, "publication time does not exist in local calendar");
            return DayDecision::AlreadyPassed { date, fire_at: now };
        };

        if fire_at <= now {
            tracing::warn!(date = %date, fire_at = %fire_at, "publication time already passed today");
            return DayDecision::AlreadyPassed { date, fire_at };
        }

        let id = daily_job_id(date);
        self.arm_run(&id, fire_at, now);
        DayDecision::Armed { id, fire_at }
    }

    /// Arm a one-off run `delay` from now, replacing any earlier immediate
    /// job. Returns the due time.
    pub fn schedule_immediate(self: &Arc<Self>, delay: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        let fire_at = now + delay;
        self.arm_run(IMMEDIATE_JOB_ID, fire_at, now);
        fire_at
    }

    /// Run the pipeline now, outside the schedule.
    pub async fn run_now(&self, options: RunOptions) -> Result<RunOutcome, PipelineError> {
        tracing::info!(force = options.force, "operator-requested run");
        self.pipeline.run(options).await
    }

    pub async fn status(&self) -> Result<SchedulerStatus, PipelineError> {
        let state = self.pipeline.executor().snapshot().await?;
        let rotation = state.render_status(self.pipeline.executor().catalog());
        let jobs = self.jobs.jobs();
        Ok(SchedulerStatus {
            running: self.is_running(),
            next_job: jobs.first().cloned(),
            jobs,
            rotation,
        })
    }

    fn local_instant(&self, date: NaiveDate, minute_of_day: u32) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)?;
        self.settings
            .offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    fn arm_run(&self, id: &str, fire_at: DateTime<Utc>, now: DateTime<Utc>) {
        let pipeline = Arc::clone(&self.pipeline);
        let job_id = id.to_string();
        self.jobs.arm(id, fire_at, delay_until(now, fire_at), async move {
            match pipeline.run(RunOptions::default()).await {
                Ok(RunOutcome::Published(report)) => {
                    tracing::info!(job = %job_id, archetype = report.archetype, "scheduled publication done");
                }
                Ok(other) => {
                    tracing::info!(job = %job_id, outcome = ?other, "scheduled run produced no post");
                }
                Err(e) => {
                    tracing::error!(job = %job_id, error = %e, "scheduled run failed");
                }
            }
        });
    }
}
