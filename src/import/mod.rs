//! Picker-driven import into the photo store.

pub mod pipeline;
pub mod progress;

pub use pipeline::{
    ImportError, ImportHandle, ImportOutcome, ImportPipeline, ImportSession, ImportState,
};
pub use progress::{LoggingPresenter, ProgressPresenter};
