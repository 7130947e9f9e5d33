use tracing::info;

/// Progress and notice UI for an import. Every call happens on the main
/// context.
pub trait ProgressPresenter: Send + Sync {
    fn show(&self, total: usize);
    fn update(&self, current: usize, total: usize);
    fn dismiss(&self);
    fn show_completed(&self, saved: usize);
    fn show_cancelled(&self);
}

/// Reports progress through the log, for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPresenter;

impl ProgressPresenter for LoggingPresenter {
    fn show(&self, total: usize) {
        info!(total, "Importing media");
    }

    fn update(&self, current: usize, total: usize) {
        info!("Imported {}/{}", current, total);
    }

    fn dismiss(&self) {}

    fn show_completed(&self, saved: usize) {
        info!(saved, "Import complete");
    }

    fn show_cancelled(&self) {
        info!("Import cancelled");
    }
}
