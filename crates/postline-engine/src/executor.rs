//! Single-writer access to the rotation state.
//!
//! Every read and every read-modify-write of [`RotationState`] runs on one
//! dedicated thread, in arrival order. Two publications finishing close
//! together therefore advance the rotation twice instead of racing on the
//! same snapshot. Async callers wait on a oneshot for their result.

use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use postline_core::catalog::RotationCatalog;
use postline_core::state::RotationState;
use postline_core::store::{read_state, StateStore};
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;

type StateOp = Box<dyn FnOnce(&dyn StateStore, &RotationCatalog) + Send + 'static>;

#[derive(Clone)]
pub struct StateExecutor {
    sender: mpsc::Sender<StateOp>,
    catalog: RotationCatalog,
}

impl StateExecutor {
    /// Take ownership of `store` and serve operations on a new thread. The
    /// thread exits once every clone of the executor is dropped.
    pub fn new(store: Box<dyn StateStore>, catalog: RotationCatalog) -> Result<Self, ExecutorError> {
        let (sender, receiver) = mpsc::channel::<StateOp>();

        thread::Builder::new()
            .name("postline-state".to_string())
            .spawn(move || {
                while let Ok(op) = receiver.recv() {
                    op(store.as_ref(), &catalog);
                }
                tracing::debug!("state executor stopped");
            })
            .map_err(|e| ExecutorError::Store(e.into()))?;

        Ok(Self { sender, catalog })
    }

    pub fn catalog(&self) -> &RotationCatalog {
        &self.catalog
    }

    /// Run `op` on the state thread and wait for its result.
    pub async fn run<F, T>(&self, op: F) -> Result<T, ExecutorError>
    where
        F: FnOnce(&dyn StateStore, &RotationCatalog) -> postline_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();

        let boxed: StateOp = Box::new(move |store, catalog| {
            let _ = response_tx.send(op(store, catalog));
        });

        self.sender
            .send(boxed)
            .map_err(|_| ExecutorError::ChannelClosed)?;

        let result = response_rx
            .await
            .map_err(|_| ExecutorError::ChannelClosed)?;

        Ok(result?)
    }

    /// Current state, created with defaults when nothing is persisted yet.
    pub async fn snapshot(&self) -> Result<RotationState, ExecutorError> {
        self.run(read_state).await
    }

    /// Record a successful publication and persist it. Returns the state as
    /// saved.
    pub async fn mark_published(
        &self,
        archetype: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<RotationState, ExecutorError> {
        let archetype = archetype.into();
        self.run(move |store, catalog| {
            let mut state = read_state(store, catalog)?;
            state.mark_published(catalog, &archetype, at);
            store.save(&state)?;
            tracing::info!(
                archetype = %archetype,
                next_index = state.current_index,
                total = state.total_published,
                "rotation advanced"
            );
            Ok(state)
        })
        .await
    }
}
