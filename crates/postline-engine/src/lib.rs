//! `postline-engine` — runs the rotation: one pipeline run per publication,
//! armed by a daily scheduler.
//!
//! ```text
//! DailyTrigger (00:05 local)
//!     │
//!     ▼
//! Scheduler::daily_check_at ── weekday allowed? ──► JobBoard "post_YYYYMMDD"
//!                                                       │ fires in window
//!                                                       ▼
//!                                                  Pipeline::run
//!                                                       │
//!                                                       ▼
//!                                                  StateExecutor (single writer)
//! ```

pub mod clock;
pub mod control;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod scheduler;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ControlError, ExecutorError, PipelineError};
pub use executor::StateExecutor;
pub use pipeline::{
    Collaborators, Pipeline, PipelineSettings, PlanSource, RunOptions, RunOutcome, RunReport,
    SkipReason,
};
pub use scheduler::{
    delay_from_secs, DayDecision, ScheduleSettings, Scheduler, SchedulerStatus, IMMEDIATE_JOB_ID,
};
