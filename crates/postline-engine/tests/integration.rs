use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use postline_channels::{
    ChannelError, GeneratedPost, GenerationRequest, Generator, OperatorNotifier, PollPublished,
    Published, Publisher, Source, SourceCollector,
};
use postline_core::catalog::RotationCatalog;
use postline_core::guard::PublishGuard;
use postline_core::plan::{ContentPlan, PlannedEntry};
use postline_core::store::{MemoryStateStore, StateStore, YamlStateStore};
use postline_engine::scheduler::{daily_job_id, IMMEDIATE_JOB_ID};
use postline_engine::{
    Clock, Collaborators, DayDecision, ManualClock, Pipeline, PipelineError, PipelineSettings,
    PlanSource, RunOptions, RunOutcome, ScheduleSettings, Scheduler, SkipReason, StateExecutor,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn fake_error(message: &str) -> ChannelError {
    ChannelError::Api {
        service: "fake",
        message: message.to_string(),
    }
}

#[derive(Default)]
struct StubCollector {
    sources: Vec<Source>,
    fail: bool,
    calls: Mutex<Vec<(Option<Vec<String>>, Option<String>)>>,
}

impl StubCollector {
    fn with_sources(n: usize) -> Self {
        let sources = (0..n)
            .map(|i| Source {
                title: format!("Source {i}"),
                content: format!("Content {i}"),
                url: format!("https://news.example/{i}"),
                source_type: "stub".to_string(),
                published_at: None,
            })
            .collect();
        Self {
            sources,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl SourceCollector for StubCollector {
    async fn collect(
        &self,
        keywords: Option<&[String]>,
        topic: Option<&str>,
    ) -> Result<Vec<Source>, ChannelError> {
        self.calls
            .lock()
            .unwrap()
            .push((keywords.map(|k| k.to_vec()), topic.map(str::to_string)));
        if self.fail {
            return Err(fake_error("search down"));
        }
        Ok(self.sources.clone())
    }
}

#[derive(Default)]
struct RecordingGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
    fail: bool,
    delay: Option<std::time::Duration>,
}

#[async_trait::async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPost, ChannelError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(fake_error("model overloaded"));
        }
        Ok(GeneratedPost {
            text: format!("A {} post", request.archetype.display_name),
            tags: vec!["marketplace".to_string()],
        })
    }
}

#[derive(Default)]
struct RecordingPublisher {
    posts: Mutex<Vec<String>>,
    polls: Mutex<Vec<(String, Vec<String>)>>,
    fail: bool,
    fail_poll: bool,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, text: &str) -> Result<Published, ChannelError> {
        if self.fail {
            return Err(fake_error("chat not found"));
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(Published {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 100,
        })
    }

    async fn publish_with_poll(
        &self,
        text: &str,
        question: &str,
        options: &[String],
    ) -> Result<PollPublished, ChannelError> {
        let post = self.publish(text).await?;
        if self.fail_poll {
            return Err(ChannelError::PollFailed {
                post_message_id: post.message_id,
                source: Box::new(fake_error("poll rejected")),
            });
        }
        self.polls
            .lock()
            .unwrap()
            .push((question.to_string(), options.to_vec()));
        Ok(PollPublished {
            post_message_id: post.message_id,
            poll_message_id: post.message_id + 1,
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notes: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), ChannelError> {
        self.notes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn msk() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

/// A UTC instant given as Moscow wall-clock time.
fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    msk()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn entry(on: NaiveDate, archetype: &str, topic: &str) -> PlannedEntry {
    PlannedEntry {
        date: on,
        archetype: archetype.to_string(),
        topic: topic.to_string(),
        keywords: vec!["spring".to_string(), "sale".to_string()],
        structure: None,
        facts: None,
        tags: None,
        include_poll: false,
        poll_question: None,
        poll_options: None,
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    store: MemoryStateStore,
    clock: ManualClock,
    collector: Arc<StubCollector>,
    generator: Arc<RecordingGenerator>,
    publisher: Arc<RecordingPublisher>,
    notifier: Arc<RecordingNotifier>,
}

struct HarnessBuilder {
    now: DateTime<Utc>,
    plan: ContentPlan,
    collector: StubCollector,
    generator: RecordingGenerator,
    publisher: RecordingPublisher,
    timeout: std::time::Duration,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            // Tuesday, inside the publication window.
            now: local(2026, 3, 3, 10, 0),
            plan: ContentPlan::default(),
            collector: StubCollector::with_sources(2),
            generator: RecordingGenerator::default(),
            publisher: RecordingPublisher::default(),
            timeout: std::time::Duration::from_secs(30),
        }
    }

    fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn plan(mut self, entries: Vec<PlannedEntry>) -> Self {
        self.plan = ContentPlan::new(entries);
        self
    }

    fn collector(mut self, collector: StubCollector) -> Self {
        self.collector = collector;
        self
    }

    fn generator(mut self, generator: RecordingGenerator) -> Self {
        self.generator = generator;
        self
    }

    fn publisher(mut self, publisher: RecordingPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build(self) -> Harness {
        let store = MemoryStateStore::new();
        self.build_with_store(Box::new(store.clone()), store)
    }

    fn build_with_store(self, boxed: Box<dyn StateStore>, store: MemoryStateStore) -> Harness {
        let clock = ManualClock::new(self.now);
        let collector = Arc::new(self.collector);
        let generator = Arc::new(self.generator);
        let publisher = Arc::new(self.publisher);
        let notifier = Arc::new(RecordingNotifier::default());

        let executor = StateExecutor::new(boxed, RotationCatalog::standard()).unwrap();
        let pipeline = Pipeline::new(
            executor,
            Collaborators {
                collector: collector.clone(),
                generator: generator.clone(),
                publisher: publisher.clone(),
                notifier: Some(notifier.clone()),
            },
            PipelineSettings {
                guard: PublishGuard::default(),
                timeout: self.timeout,
                offset: msk(),
            },
            PlanSource::Fixed(self.plan),
            Arc::new(clock.clone()),
        )
        .with_rng_seed(7);

        Harness {
            pipeline: Arc::new(pipeline),
            store,
            clock,
            collector,
            generator,
            publisher,
            notifier,
        }
    }
}

fn published(outcome: RunOutcome) -> postline_engine::RunReport {
    match outcome {
        RunOutcome::Published(report) => report,
        other => panic!("expected a publication, got {other:?}"),
    }
}

fn schedule_settings() -> ScheduleSettings {
    ScheduleSettings {
        allowed_weekdays: vec![Weekday::Tue, Weekday::Thu],
        window_start_hour: 9,
        window_end_hour: 11,
        daily_check_time: chrono::NaiveTime::from_hms_opt(0, 5, 0).unwrap(),
        offset: msk(),
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_state_publishes_first_slot_and_advances() {
    let h = HarnessBuilder::new().build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.archetype, "useful");
    assert!(!report.from_plan);
    assert_eq!(report.message_id, Some(100));
    assert_eq!(report.text, "A Useful know-how post\n\n#marketplace");

    let state = h.store.snapshot().unwrap();
    assert_eq!(state.current_index, 1);
    assert_eq!(state.last_published_at, Some(local(2026, 3, 3, 10, 0)));
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].archetype, "useful");
    assert_eq!(h.publisher.posts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rotation_follows_sequence_and_wraps() {
    let h = HarnessBuilder::new().build();

    let mut keys = Vec::new();
    for _ in 0..5 {
        let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
        keys.push(report.archetype);
        h.clock.advance(Duration::hours(7));
    }
    assert_eq!(keys, ["useful", "useful", "case", "interactive", "useful"]);
    assert_eq!(h.store.snapshot().unwrap().current_index, 1);
}

#[tokio::test]
async fn guard_blocks_until_interval_elapsed() {
    let h = HarnessBuilder::new().build();
    published(h.pipeline.run(RunOptions::default()).await.unwrap());

    h.clock.advance(Duration::minutes(90));
    match h.pipeline.run(RunOptions::default()).await.unwrap() {
        RunOutcome::Skipped(SkipReason::TooEarly { remaining_hours }) => {
            assert!((remaining_hours - 4.5).abs() < 1e-9);
        }
        other => panic!("expected guard rejection, got {other:?}"),
    }
    assert_eq!(h.store.snapshot().unwrap().current_index, 1);

    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    published(h.pipeline.run(forced).await.unwrap());
    assert_eq!(h.store.snapshot().unwrap().current_index, 2);

    h.clock.advance(Duration::hours(6));
    published(h.pipeline.run(RunOptions::default()).await.unwrap());
}

#[tokio::test]
async fn cadence_drops_cta_every_third_and_adds_experience_every_fourth() {
    let h = HarnessBuilder::new().build();
    for _ in 0..4 {
        published(h.pipeline.run(RunOptions::default()).await.unwrap());
        h.clock.advance(Duration::hours(7));
    }

    let requests = h.generator.requests.lock().unwrap();
    let cta: Vec<bool> = requests
        .iter()
        .map(|r| r.decorations.call_to_action.is_some())
        .collect();
    let personal: Vec<bool> = requests
        .iter()
        .map(|r| r.decorations.personal_experience)
        .collect();
    assert_eq!(cta, [true, true, false, true]);
    assert_eq!(personal, [false, false, false, true]);
}

#[tokio::test]
async fn plan_override_pins_topic_and_consumes_a_slot() {
    let h = HarnessBuilder::new()
        .plan(vec![entry(date(2026, 3, 3), "checklist", "Spring sale preparation")])
        .build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.archetype, "checklist");
    assert!(report.from_plan);

    let requests = h.generator.requests.lock().unwrap();
    let o = requests[0].topic_override.as_ref().unwrap();
    assert_eq!(o.topic, "Spring sale preparation");
    assert_eq!(o.keywords, ["spring", "sale"]);

    let calls = h.collector.calls.lock().unwrap();
    assert_eq!(calls[0].1.as_deref(), Some("Spring sale preparation"));
    assert_eq!(
        calls[0].0.as_deref(),
        Some(&["spring".to_string(), "sale".to_string()][..])
    );

    let state = h.store.snapshot().unwrap();
    assert_eq!(state.current_index, 1);
    assert_eq!(state.history[0].archetype, "checklist");
}

#[tokio::test]
async fn plan_for_another_day_does_not_apply() {
    let h = HarnessBuilder::new()
        .plan(vec![entry(date(2026, 3, 5), "checklist", "Later")])
        .build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.archetype, "useful");
    assert!(h.generator.requests.lock().unwrap()[0].topic_override.is_none());
}

#[tokio::test]
async fn unknown_plan_type_falls_back_to_default_archetype() {
    let h = HarnessBuilder::new()
        .plan(vec![entry(date(2026, 3, 3), "chekclist", "Typo")])
        .build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.archetype, "useful");
    assert!(report.from_plan);
}

#[tokio::test]
async fn plan_poll_is_published_after_post() {
    let mut e = entry(date(2026, 3, 3), "interactive", "Do discounts still work?");
    e.include_poll = true;
    e.poll_question = Some("Do you run discounts?".to_string());
    e.poll_options = Some(vec!["Yes".to_string(), "No".to_string()]);
    let h = HarnessBuilder::new().plan(vec![e]).build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.message_id, Some(100));
    assert_eq!(report.poll_message_id, Some(101));

    let polls = h.publisher.polls.lock().unwrap();
    assert_eq!(polls.len(), 1);
    assert_eq!(polls[0].0, "Do you run discounts?");
}

#[tokio::test]
async fn failed_poll_still_records_the_live_post() {
    let mut e = entry(date(2026, 3, 3), "interactive", "Do discounts still work?");
    e.include_poll = true;
    e.poll_question = Some("Do you run discounts?".to_string());
    e.poll_options = Some(vec!["Yes".to_string(), "No".to_string()]);
    let h = HarnessBuilder::new()
        .plan(vec![e])
        .publisher(RecordingPublisher {
            fail_poll: true,
            ..RecordingPublisher::default()
        })
        .build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.message_id, Some(100));
    assert_eq!(report.poll_message_id, None);
    assert!(report.poll_error.as_deref().unwrap().contains("poll rejected"));

    let state = h.store.snapshot().unwrap();
    assert_eq!(state.current_index, 1);
    assert_eq!(state.last_published_at, Some(local(2026, 3, 3, 10, 0)));
    assert_eq!(state.history[0].archetype, "interactive");

    {
        let notes = h.notifier.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("Post 100 was published but its poll failed"));
    }

    // The guard now covers the live post.
    let again = h.pipeline.run(RunOptions::default()).await.unwrap();
    assert!(matches!(again, RunOutcome::Skipped(SkipReason::TooEarly { .. })));
    assert_eq!(h.publisher.posts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_sources_and_no_plan_skips_without_mutation() {
    let h = HarnessBuilder::new()
        .collector(StubCollector::with_sources(0))
        .build();

    let outcome = h.pipeline.run(RunOptions::default()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped(SkipReason::NoSources));
    assert!(h.generator.requests.lock().unwrap().is_empty());
    assert!(h.store.snapshot().is_none());
}

#[tokio::test]
async fn collector_failure_counts_as_no_sources() {
    let h = HarnessBuilder::new()
        .collector(StubCollector {
            fail: true,
            ..StubCollector::default()
        })
        .build();

    let outcome = h.pipeline.run(RunOptions::default()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped(SkipReason::NoSources));
}

#[tokio::test]
async fn plan_day_publishes_even_without_sources() {
    let h = HarnessBuilder::new()
        .collector(StubCollector::with_sources(0))
        .plan(vec![entry(date(2026, 3, 3), "case", "Client story")])
        .build();

    let report = published(h.pipeline.run(RunOptions::default()).await.unwrap());
    assert_eq!(report.archetype, "case");
    assert_eq!(report.sources, 0);
}

#[tokio::test]
async fn generation_failure_leaves_state_and_notifies() {
    let h = HarnessBuilder::new()
        .generator(RecordingGenerator {
            fail: true,
            ..RecordingGenerator::default()
        })
        .build();

    let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Generation(_)));
    assert!(h.store.snapshot().is_none());
    assert!(h.publisher.posts.lock().unwrap().is_empty());

    let notes = h.notifier.notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("model overloaded"));
}

#[tokio::test]
async fn publish_failure_leaves_state() {
    let h = HarnessBuilder::new()
        .publisher(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        })
        .build();

    let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Publish(_)));
    assert!(h.store.snapshot().is_none());
}

#[tokio::test]
async fn slow_run_times_out_without_mutation() {
    let h = HarnessBuilder::new()
        .generator(RecordingGenerator {
            delay: Some(std::time::Duration::from_secs(5)),
            ..RecordingGenerator::default()
        })
        .timeout(std::time::Duration::from_millis(50))
        .build();

    let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::TimedOut { .. }));
    assert!(h.store.snapshot().is_none());
    assert!(h.publisher.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_generates_without_publishing() {
    let h = HarnessBuilder::new().build();
    published(h.pipeline.run(RunOptions::default()).await.unwrap());
    let before = h.store.snapshot().unwrap();

    // Within the guard interval: a dry run still previews.
    h.clock.advance(Duration::minutes(10));
    let dry = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    match h.pipeline.run(dry).await.unwrap() {
        RunOutcome::DryRun(report) => {
            assert_eq!(report.archetype, "useful");
            assert_eq!(report.message_id, None);
        }
        other => panic!("expected dry run, got {other:?}"),
    }
    assert_eq!(h.store.snapshot().unwrap(), before);
    assert_eq!(h.publisher.posts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn corrupt_state_file_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rotation.yaml");
    std::fs::write(&path, "current_index: 9\n").unwrap();

    let h = HarnessBuilder::new()
        .build_with_store(Box::new(YamlStateStore::at(&path)), MemoryStateStore::new());

    let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::State(_)));
    assert!(h.generator.requests.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "current_index: 9\n");
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn daily_check_arms_job_inside_window() {
    let h = HarnessBuilder::new().at(local(2026, 3, 3, 0, 5)).build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    let (id, fire_at) = match scheduler.daily_check_at(h.clock.now()) {
        DayDecision::Armed { id, fire_at } => (id, fire_at),
        other => panic!("expected an armed job, got {other:?}"),
    };
    assert_eq!(id, "post_20260303");
    assert_eq!(id, daily_job_id(date(2026, 3, 3)));
    assert!(fire_at >= local(2026, 3, 3, 9, 0));
    assert!(fire_at < local(2026, 3, 3, 12, 0));

    let jobs = scheduler.jobs().jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].fire_at, fire_at);

    // What the job does when it fires.
    scheduler.stop();
    h.clock.set(fire_at);
    published(h.pipeline.run(RunOptions::default()).await.unwrap());
    let state = h.store.snapshot().unwrap();
    assert_eq!(state.current_index, 1);
    assert_eq!(state.last_published_at, Some(fire_at));
}

#[tokio::test]
async fn disallowed_weekday_arms_nothing() {
    let h = HarnessBuilder::new().at(local(2026, 3, 4, 0, 5)).build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    let decision = scheduler.daily_check_at(h.clock.now());
    assert_eq!(
        decision,
        DayDecision::NotAllowedWeekday {
            date: date(2026, 3, 4),
            weekday: Weekday::Wed
        }
    );
    let status = scheduler.status().await.unwrap();
    assert!(status.jobs.is_empty());
    assert!(status.next_job.is_none());
    assert!(status.render(&msk()).contains("Next job: none"));
}

#[tokio::test]
async fn repeated_check_keeps_one_job() {
    let h = HarnessBuilder::new().at(local(2026, 3, 5, 0, 5)).build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    scheduler.daily_check_at(h.clock.now());
    scheduler.daily_check_at(h.clock.now());
    let jobs = scheduler.jobs().jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "post_20260305");
    scheduler.stop();
}

#[tokio::test]
async fn check_after_window_arms_nothing() {
    let h = HarnessBuilder::new().at(local(2026, 3, 3, 13, 0)).build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    assert!(matches!(
        scheduler.daily_check_at(h.clock.now()),
        DayDecision::AlreadyPassed { .. }
    ));
    assert!(scheduler.jobs().jobs().is_empty());
}

#[tokio::test]
async fn immediate_job_runs_the_pipeline() {
    let h = HarnessBuilder::new().build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    scheduler.schedule_immediate(Duration::milliseconds(20));
    assert!(scheduler.jobs().contains(IMMEDIATE_JOB_ID));

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert_eq!(h.publisher.posts.lock().unwrap().len(), 1);
    assert!(!scheduler.jobs().contains(IMMEDIATE_JOB_ID));
    assert_eq!(h.store.snapshot().unwrap().current_index, 1);
}

#[tokio::test]
async fn start_checks_today_and_stop_clears_jobs() {
    let h = HarnessBuilder::new().at(local(2026, 3, 3, 0, 5)).build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));

    assert!(matches!(scheduler.start(), DayDecision::Armed { .. }));
    assert!(scheduler.is_running());

    let status = scheduler.status().await.unwrap();
    assert_eq!(status.next_job.as_ref().unwrap().id, "post_20260303");
    let text = status.render(&msk());
    assert!(text.contains("Scheduler: running"));
    assert!(text.contains("Next archetype: Useful know-how (useful)"));

    scheduler.stop();
    assert!(!scheduler.is_running());
    assert!(scheduler.jobs().jobs().is_empty());
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn control_socket_drives_the_running_scheduler() {
    use postline_engine::control::{self, ControlReply, ControlRequest, RunSummary};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let h = HarnessBuilder::new().build();
    let scheduler = Arc::new(Scheduler::new(h.pipeline.clone(), schedule_settings()));
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("control.sock");
    // A leftover socket file from an earlier daemon does not block binding.
    std::fs::write(&socket, "").unwrap();
    let listener = control::bind(&socket).unwrap();
    let server = tokio::spawn(control::serve(listener, Arc::clone(&scheduler)));

    let reply = control::request(&socket, &ControlRequest::ScheduleNow { delay_secs: 3600 })
        .await
        .unwrap();
    match reply {
        ControlReply::Scheduled { id, fire_at } => {
            assert_eq!(id, IMMEDIATE_JOB_ID);
            assert_eq!(fire_at, h.clock.now() + Duration::hours(1));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    match control::request(&socket, &ControlRequest::Status).await.unwrap() {
        ControlReply::Status(status) => {
            assert!(status.jobs.iter().any(|j| j.id == IMMEDIATE_JOB_ID));
            assert!(status.rotation.contains("Next archetype: Useful know-how (useful)"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    match control::request(&socket, &ControlRequest::Publish { force: true })
        .await
        .unwrap()
    {
        ControlReply::Ran {
            outcome:
                RunSummary::Published {
                    archetype,
                    message_id,
                    ..
                },
        } => {
            assert_eq!(archetype, "useful");
            assert_eq!(message_id, Some(100));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(h.publisher.posts.lock().unwrap().len(), 1);
    assert_eq!(h.store.snapshot().unwrap().current_index, 1);

    // Garbage gets a failure reply instead of a dropped connection.
    let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    stream.write_all(b"{\"op\":\"reboot\"}\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();
    let reply: ControlReply = serde_json::from_str(line.trim()).unwrap();
    assert!(matches!(reply, ControlReply::Failed { message } if message.contains("bad request")));

    server.abort();
    scheduler.stop();
}
