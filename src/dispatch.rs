//! The main (UI-responsible) execution context.
//!
//! Background work never touches UI-facing state directly. It posts a job
//! here and the host's event loop calls [`MainContext::run_pending`] once per
//! frame.
//!
//! Jobs carry the scheduling class of the work that produced them. Interactive
//! jobs are always drained before background ones so hopping back to the main
//! context never demotes a user-initiated result.

use flume::{Receiver, Sender};
use tracing::trace;

/// Scheduling class of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    UserInteractive,
    UserInitiated,
    Default,
    Utility,
    Background,
}

impl Priority {
    /// True for the classes served by the interactive loader lane.
    pub fn is_interactive(self) -> bool {
        matches!(self, Priority::UserInteractive | Priority::UserInitiated)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::UserInitiated
    }
}

type MainJob = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle to the main-context job queue.
#[derive(Clone)]
pub struct MainContext {
    interactive_tx: Sender<MainJob>,
    interactive_rx: Receiver<MainJob>,
    background_tx: Sender<MainJob>,
    background_rx: Receiver<MainJob>,
}

impl MainContext {
    pub fn new() -> Self {
        let (interactive_tx, interactive_rx) = flume::unbounded();
        let (background_tx, background_rx) = flume::unbounded();
        Self {
            interactive_tx,
            interactive_rx,
            background_tx,
            background_rx,
        }
    }

    /// Queue `job` to run on the main context with the given class.
    pub fn post<F>(&self, priority: Priority, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = if priority.is_interactive() {
            &self.interactive_tx
        } else {
            &self.background_tx
        };
        // Both receivers live in `self`, so the channel cannot be disconnected.
        let _ = tx.send(Box::new(job));
    }

    /// Run every queued job. Must be called from the main context.
    ///
    /// Interactive jobs are drained first; between background jobs the
    /// interactive queue is checked again. Jobs posted while draining run in
    /// the same call. Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            while let Ok(job) = self.interactive_rx.try_recv() {
                job();
                ran += 1;
            }
            match self.background_rx.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        if ran > 0 {
            trace!(ran, "Ran main-context jobs");
        }
        ran
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.interactive_rx.len() + self.background_rx.len()
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}
