//! One publication run: guard, plan, sources, archetype, decorations,
//! generation, publishing and the state update, in that order.

use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use crate::executor::StateExecutor;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use postline_channels::{
    ChannelError, GenerationRequest, Generator, OperatorNotifier, Publisher, SourceCollector, TopicOverride,
};
use postline_core::cadence::{self, Decorations};
use postline_core::catalog::Archetype;
use postline_core::guard::{GuardDecision, PublishGuard};
use postline_core::plan::{ContentPlan, PlannedEntry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Flags for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip the minimum-interval guard.
    pub force: bool,
    /// Generate but neither publish nor touch rotation state.
    pub dry_run: bool,
}

/// Where the operator calendar comes from. The file is re-read on every run
/// so edits apply without a restart.
#[derive(Debug, Clone)]
pub enum PlanSource {
    File(PathBuf),
    Fixed(ContentPlan),
}

impl PlanSource {
    fn load(&self) -> postline_core::Result<ContentPlan> {
        match self {
            PlanSource::File(root) => ContentPlan::load(root),
            PlanSource::Fixed(plan) => Ok(plan.clone()),
        }
    }
}

/// External collaborators of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub collector: Arc<dyn SourceCollector>,
    pub generator: Arc<dyn Generator>,
    pub publisher: Arc<dyn Publisher>,
    pub notifier: Option<Arc<dyn OperatorNotifier>>,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub guard: PublishGuard,
    pub timeout: Duration,
    /// Local offset used to decide which calendar day "today" is.
    pub offset: FixedOffset,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TooEarly { remaining_hours: f64 },
    NoSources,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooEarly { remaining_hours } => {
                write!(f, "too early: wait another {remaining_hours:.1} hours")
            }
            SkipReason::NoSources => write!(f, "no sources collected"),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub archetype: &'static str,
    pub display_name: &'static str,
    pub from_plan: bool,
    pub decorations: Decorations,
    pub sources: usize,
    pub text: String,
    pub message_id: Option<i64>,
    pub poll_message_id: Option<i64>,
    /// Set when the post went out but the planned poll did not.
    pub poll_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Published(RunReport),
    DryRun(RunReport),
    Skipped(SkipReason),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    executor: StateExecutor,
    collaborators: Collaborators,
    settings: PipelineSettings,
    plan: PlanSource,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Pipeline {
    pub fn new(
        executor: StateExecutor,
        collaborators: Collaborators,
        settings: PipelineSettings,
        plan: PlanSource,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            collaborators,
            settings,
            plan,
            clock,
            rng: Mutex::new(StdRng::from_entropy()),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Seed call-to-action selection, for reproducible runs.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn executor(&self) -> &StateExecutor {
        &self.executor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Calendar date in the configured local offset.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.settings.offset).date_naive()
    }

    /// Execute one run. Runs never overlap; a second caller waits for the
    /// first to finish. Failures are reported to the operator notifier when
    /// one is configured.
    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        let _running = self.run_lock.lock().await;

        let result = match tokio::time::timeout(self.settings.timeout, self.run_inner(options)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TimedOut {
                secs: self.settings.timeout.as_secs(),
            }),
        };

        match &result {
            Ok(RunOutcome::Published(report)) => {
                tracing::info!(archetype = report.archetype, message_id = ?report.message_id, "run complete");
            }
            Ok(RunOutcome::DryRun(report)) => {
                tracing::info!(archetype = report.archetype, "dry run complete");
            }
            Ok(RunOutcome::Skipped(reason)) => {
                tracing::info!(reason = %reason, "run skipped");
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                if !options.dry_run {
                    self.notify_failure(e).await;
                }
            }
        }
        result
    }

    async fn notify_failure(&self, error: &PipelineError) {
        self.notify(&format!("Publication failed: {error}")).await;
    }

    async fn notify(&self, text: &str) {
        let Some(notifier) = &self.collaborators.notifier else {
            return;
        };
        if let Err(e) = notifier.notify(text).await {
            tracing::warn!(error = %e, "operator notification failed");
        }
    }

    async fn run_inner(&self, options: RunOptions) -> Result<RunOutcome> {
        let catalog = *self.executor.catalog();
        let now = self.clock.now();
        let state = self.executor.snapshot().await?;

        if !options.force && !options.dry_run {
            if let GuardDecision::TooEarly { remaining_hours } =
                self.settings.guard.can_publish(&state, now)
            {
                return Ok(RunOutcome::Skipped(SkipReason::TooEarly { remaining_hours }));
            }
        }

        let plan = self.plan.load().map_err(PipelineError::Plan)?;
        let today = self.local_date(now);
        let entry: Option<PlannedEntry> = plan.entry_for_date(today).cloned();

        let archetype: &'static Archetype = match &entry {
            Some(e) => {
                tracing::info!(date = %today, topic = %e.topic, archetype = %e.archetype, "content plan override");
                catalog.resolve_or_default(&e.archetype)
            }
            None => state.next_archetype(&catalog),
        };

        let sources = match self
            .collaborators
            .collector
            .collect(
                entry.as_ref().map(|e| e.keywords.as_slice()),
                entry.as_ref().map(|e| e.topic.as_str()),
            )
            .await
        {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "source collection failed, continuing without sources");
                Vec::new()
            }
        };
        if sources.is_empty() && entry.is_none() {
            return Ok(RunOutcome::Skipped(SkipReason::NoSources));
        }

        let decorations = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            cadence::decorate(state.publication_count(), &mut *rng)
        };

        let request = GenerationRequest {
            sources,
            archetype: *archetype,
            decorations: decorations.clone(),
            topic_override: entry.as_ref().map(TopicOverride::from),
        };
        let post = self
            .collaborators
            .generator
            .generate(&request)
            .await
            .map_err(PipelineError::Generation)?;
        let text = post.render();

        let mut report = RunReport {
            archetype: archetype.key,
            display_name: archetype.display_name,
            from_plan: entry.is_some(),
            decorations,
            sources: request.sources.len(),
            text,
            message_id: None,
            poll_message_id: None,
            poll_error: None,
            published_at: None,
        };

        if options.dry_run {
            return Ok(RunOutcome::DryRun(report));
        }

        let publisher = &self.collaborators.publisher;
        match entry.as_ref().and_then(|e| e.poll()) {
            Some(poll) => {
                match publisher
                    .publish_with_poll(&report.text, poll.question, poll.options)
                    .await
                {
                    Ok(published) => {
                        report.message_id = Some(published.post_message_id);
                        report.poll_message_id = Some(published.poll_message_id);
                    }
                    // The post is live, so the publication still counts.
                    Err(ChannelError::PollFailed {
                        post_message_id,
                        source,
                    }) => {
                        tracing::warn!(message_id = post_message_id, error = %source, "poll failed after post");
                        report.message_id = Some(post_message_id);
                        report.poll_error = Some(source.to_string());
                    }
                    Err(e) => return Err(PipelineError::Publish(e)),
                }
            }
            None => {
                let published = publisher
                    .publish(&report.text)
                    .await
                    .map_err(PipelineError::Publish)?;
                report.message_id = Some(published.message_id);
            }
        }

        let published_at = self.clock.now();
        if let Err(e) = self.executor.mark_published(archetype.key, published_at).await {
            tracing::error!(
                error = %e,
                message_id = ?report.message_id,
                "post is live but rotation state was not recorded"
            );
            return Err(e.into());
        }
        report.published_at = Some(published_at);

        if let Some(reason) = &report.poll_error {
            self.notify(&format!(
                "Post {} was published but its poll failed: {reason}",
                report.message_id.unwrap_or_default()
            ))
            .await;
        }

        Ok(RunOutcome::Published(report))
    }
}
