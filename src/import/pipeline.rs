//! Batch import of picked media.
//!
//! One session per picker result:
//! - Resolve every picked identifier in order, reporting progress per item
//! - Save everything that resolved in a single store transaction
//! - Append the saved items to the grid in one ordered update
//!
//! Cancellation is a flag checked before each item and before the save.
//! Nothing is persisted once it is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

use super::progress::{LoggingPresenter, ProgressPresenter};
use crate::dispatch::{MainContext, Priority};
use crate::layout::SnapshotSink;
use crate::models::{MediaHandle, PhotoStore};
use crate::scanner::MediaResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Collecting,
    Saving,
    Cancelled,
    Completed,
    Failed,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Cancelled | ImportState::Completed | ImportState::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("failed to commit imported media: {0}")]
    Commit(String),
    #[error("import task aborted")]
    Aborted,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Completed { saved: usize },
    /// `resolved` handles were collected and then dropped.
    Cancelled { resolved: usize },
    Failed { error: ImportError },
}

impl ImportOutcome {
    pub fn state(&self) -> ImportState {
        match self {
            ImportOutcome::Completed { .. } => ImportState::Completed,
            ImportOutcome::Cancelled { .. } => ImportState::Cancelled,
            ImportOutcome::Failed { .. } => ImportState::Failed,
        }
    }
}

/// Transient state of one import.
#[derive(Debug)]
pub struct ImportSession {
    total: usize,
    handles: Vec<MediaHandle>,
    state: ImportState,
    cancel: Arc<AtomicBool>,
}

impl ImportSession {
    pub fn new(total: usize, cancel: Arc<AtomicBool>) -> Self {
        Self {
            total,
            handles: Vec::with_capacity(total),
            state: ImportState::Collecting,
            cancel,
        }
    }

    /// Adds a resolved handle. Refuses once `total` handles are held.
    pub fn collect(&mut self, handle: MediaHandle) -> bool {
        if self.handles.len() >= self.total {
            warn!(total = self.total, "Import session full, dropping handle");
            return false;
        }
        self.handles.push(handle);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn advance(&mut self, next: ImportState) {
        trace!(from = ?self.state, to = ?next, "Import state");
        self.state = next;
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn handles(&self) -> &[MediaHandle] {
        &self.handles
    }

    fn take_handles(&mut self) -> Vec<MediaHandle> {
        std::mem::take(&mut self.handles)
    }
}

/// A running import.
pub struct ImportHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<ImportOutcome>,
}

impl ImportHandle {
    /// Requests cancellation. Takes effect at the next check point.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn outcome(self) -> ImportOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Import task failed");
                ImportOutcome::Failed {
                    error: ImportError::Aborted,
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct ImportPipeline {
    store: Arc<dyn PhotoStore>,
    resolver: Arc<dyn MediaResolver>,
    main: MainContext,
    sink: SnapshotSink,
    presenter: Arc<dyn ProgressPresenter>,
}

impl ImportPipeline {
    pub fn new(
        store: Arc<dyn PhotoStore>,
        resolver: Arc<dyn MediaResolver>,
        main: MainContext,
        sink: SnapshotSink,
    ) -> Self {
        Self {
            store,
            resolver,
            main,
            sink,
            presenter: Arc::new(LoggingPresenter),
        }
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn ProgressPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Starts importing `picked` on the current tokio runtime.
    pub fn begin_import(&self, picked: Vec<String>) -> ImportHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = self.clone();
        let flag = Arc::clone(&cancel);
        let task = tokio::spawn(async move { pipeline.run(picked, flag).await });
        ImportHandle { cancel, task }
    }

    /// Runs one session to a terminal state.
    pub async fn run(&self, picked: Vec<String>, cancel: Arc<AtomicBool>) -> ImportOutcome {
        let total = picked.len();
        let mut session = ImportSession::new(total, cancel);
        info!(total, "Starting import");
        self.present(move |p| p.show(total));

        for (i, identifier) in picked.into_iter().enumerate() {
            if session.is_cancelled() {
                return self.cancelled(&mut session);
            }

            let resolver = Arc::clone(&self.resolver);
            let id = identifier.clone();
            match task::spawn_blocking(move || resolver.resolve(&id)).await {
                Ok(Some(handle)) => {
                    session.collect(handle);
                }
                Ok(None) => debug!(identifier = %identifier, "Skipping item that did not resolve"),
                Err(e) => warn!(identifier = %identifier, error = %e, "Resolution task failed"),
            }

            let current = i + 1;
            self.present(move |p| p.update(current, total));
        }

        if session.is_cancelled() {
            return self.cancelled(&mut session);
        }
        self.commit(&mut session).await
    }

    /// Saves what the session collected and moves it to a terminal state.
    async fn commit(&self, session: &mut ImportSession) -> ImportOutcome {
        let total = session.total();
        if session.handles().is_empty() {
            session.advance(ImportState::Completed);
            info!("Nothing resolved, import complete");
            self.present(|p| {
                p.dismiss();
                p.show_completed(0);
            });
            return ImportOutcome::Completed { saved: 0 };
        }

        session.advance(ImportState::Saving);
        let handles = session.take_handles();
        let count = handles.len();
        let store = Arc::clone(&self.store);
        debug!(count, "Saving imported media");

        let outcome = match task::spawn_blocking(move || store.create_batch(&handles)).await {
            Ok(Ok(stored)) => {
                let saved = stored.len();
                self.sink.append(stored);
                info!(saved, total, "Import complete");
                self.present(move |p| {
                    p.dismiss();
                    p.show_completed(saved);
                });
                ImportOutcome::Completed { saved }
            }
            Ok(Err(e)) => {
                warn!(count, "Failed to save imported media: {:#}", e);
                self.present(|p| p.dismiss());
                ImportOutcome::Failed {
                    error: ImportError::Commit(format!("{:#}", e)),
                }
            }
            Err(e) => {
                warn!(count, error = %e, "Save task failed");
                self.present(|p| p.dismiss());
                ImportOutcome::Failed {
                    error: ImportError::Aborted,
                }
            }
        };
        session.advance(outcome.state());
        outcome
    }

    fn cancelled(&self, session: &mut ImportSession) -> ImportOutcome {
        session.advance(ImportState::Cancelled);
        let resolved = session.take_handles().len();
        info!(resolved, total = session.total(), "Import cancelled");
        self.present(|p| {
            p.dismiss();
            p.show_cancelled();
        });
        ImportOutcome::Cancelled { resolved }
    }

    /// Runs `call` against the presenter on the main context.
    fn present<F>(&self, call: F)
    where
        F: FnOnce(&dyn ProgressPresenter) + Send + 'static,
    {
        let presenter = Arc::clone(&self.presenter);
        self.main
            .post(Priority::UserInitiated, move || call(presenter.as_ref()));
    }
}
