//! Tokio-backed timers: a repeating daily trigger and a board of one-shot
//! jobs keyed by id.

use crate::clock::Clock;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Wall-clock distance from `now` to `at`, clamped at zero.
pub fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>) -> std::time::Duration {
    (at - now).to_std().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// DailyTrigger
// ---------------------------------------------------------------------------

/// Fires once a day at a fixed local time.
#[derive(Debug, Clone, Copy)]
pub struct DailyTrigger {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let mut date = local.date_naive();
        loop {
            if let Some(candidate) = self.offset.from_local_datetime(&date.and_time(self.at)).single() {
                let candidate = candidate.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(d) => d,
                None => return now,
            };
        }
    }

    /// Run `tick` at every firing until the returned handle is aborted.
    pub fn spawn<F, Fut>(self, clock: Arc<dyn Clock>, mut tick: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut after = clock.now();
            loop {
                let next = self.next_after(after);
                tracing::debug!(next = %next, "daily trigger armed");
                tokio::time::sleep(delay_until(clock.now(), next)).await;
                tick().await;
                // The wall clock may lag the tokio timer slightly.
                after = next.max(clock.now());
            }
        })
    }
}

// ---------------------------------------------------------------------------
// JobBoard
// ---------------------------------------------------------------------------

/// An armed one-shot job as reported to status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub fire_at: DateTime<Utc>,
}

struct ArmedJob {
    fire_at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Board {
    jobs: HashMap<String, ArmedJob>,
    next_generation: u64,
}

/// One-shot jobs keyed by id. Arming an id that is already armed replaces
/// the earlier job. A job leaves the board the moment it fires, so a
/// replacement never interrupts a run already in progress.
#[derive(Clone, Default)]
pub struct JobBoard {
    inner: Arc<Mutex<Board>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Board> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm `job` to run after `delay`, reporting `fire_at` as its due time.
    /// Returns `true` when an earlier job with the same id was replaced.
    pub fn arm<Fut>(
        &self,
        id: impl Into<String>,
        fire_at: DateTime<Utc>,
        delay: std::time::Duration,
        job: Fut,
    ) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let mut board = self.lock();
        let generation = board.next_generation;
        board.next_generation += 1;

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut board = inner.lock().unwrap_or_else(|e| e.into_inner());
                if board.jobs.get(&task_id).map(|j| j.generation) == Some(generation) {
                    board.jobs.remove(&task_id);
                }
            }
            tracing::info!(job = %task_id, "job fired");
            job.await;
        });

        let replaced = board.jobs.insert(
            id.clone(),
            ArmedJob {
                fire_at,
                generation,
                handle,
            },
        );
        match replaced {
            Some(old) => {
                old.handle.abort();
                tracing::info!(job = %id, fire_at = %fire_at, previous = %old.fire_at, "job replaced");
                true
            }
            None => {
                tracing::info!(job = %id, fire_at = %fire_at, "job armed");
                false
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().jobs.contains_key(id)
    }

    /// Armed jobs, earliest first.
    pub fn jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .lock()
            .jobs
            .iter()
            .map(|(id, j)| JobInfo {
                id: id.clone(),
                fire_at: j.fire_at,
            })
            .collect();
        jobs.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn next_job(&self) -> Option<JobInfo> {
        self.jobs().into_iter().next()
    }

    /// Abort every armed job.
    pub fn clear(&self) {
        for (_, job) in self.lock().jobs.drain() {
            job.handle.abort();
        }
    }
}
