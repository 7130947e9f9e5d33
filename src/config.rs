//! Runtime configuration for the gallery engine.
//!
//! Everything has a working default; hosts override individual fields with the
//! builder-style setters and call [`GalleryConfig::validate`] before wiring
//! components together.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

/// Default cap on concurrent decode work across both loader lanes.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 600;

/// Column counts the grid can step through, in ascending order.
pub const DEFAULT_COLUMN_COUNTS: [u32; 11] = [1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21];

/// Column count used when the grid first appears.
pub const DEFAULT_INITIAL_COLUMNS: u32 = 9;

/// At or above this many columns visible cells are not re-decoded after a
/// density change.
pub const DEFAULT_DENSE_THRESHOLD: u32 = 5;

/// Number of recent gesture velocities averaged by the zoom controller.
pub const DEFAULT_VELOCITY_WINDOW: usize = 5;

/// Default thumbnail memory budget in megabytes.
pub const DEFAULT_THUMBNAIL_CACHE_MB: usize = 192;

#[derive(Debug, Clone)]
pub struct GalleryConfig {
    /// Permits in the bounded task limiter.
    pub max_concurrent_tasks: usize,
    /// Worker threads for the interactive loader lane.
    pub interactive_threads: usize,
    /// Worker threads for the background loader lane.
    pub background_threads: usize,
    /// Allowed column counts, ascending.
    pub column_counts: Vec<u32>,
    pub initial_columns: u32,
    pub dense_threshold: u32,
    pub velocity_window: usize,
    /// Delay between a density change and the visible-cell refresh.
    pub refresh_delay: Duration,
    /// Duration of the animated layout invalidation.
    pub layout_animation: Duration,
    pub thumbnail_cache_mb: usize,
    /// SQLite database location; `None` uses the XDG default.
    pub db_path: Option<PathBuf>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            interactive_threads: 4,
            background_threads: 2,
            column_counts: DEFAULT_COLUMN_COUNTS.to_vec(),
            initial_columns: DEFAULT_INITIAL_COLUMNS,
            dense_threshold: DEFAULT_DENSE_THRESHOLD,
            velocity_window: DEFAULT_VELOCITY_WINDOW,
            refresh_delay: Duration::from_millis(100),
            layout_animation: Duration::from_millis(300),
            thumbnail_cache_mb: DEFAULT_THUMBNAIL_CACHE_MB,
            db_path: None,
        }
    }
}

impl GalleryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent_tasks(mut self, permits: usize) -> Self {
        self.max_concurrent_tasks = permits;
        self
    }

    pub fn lane_threads(mut self, interactive: usize, background: usize) -> Self {
        self.interactive_threads = interactive;
        self.background_threads = background;
        self
    }

    pub fn column_counts(mut self, counts: Vec<u32>, initial: u32) -> Self {
        self.column_counts = counts;
        self.initial_columns = initial;
        self
    }

    pub fn dense_threshold(mut self, columns: u32) -> Self {
        self.dense_threshold = columns;
        self
    }

    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn thumbnail_cache_mb(mut self, mb: usize) -> Self {
        self.thumbnail_cache_mb = mb;
        self
    }

    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }

    /// Checks the invariants the grid and loader rely on.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            bail!("max_concurrent_tasks must be at least 1");
        }
        if self.interactive_threads == 0 || self.background_threads == 0 {
            bail!("each loader lane needs at least one thread");
        }
        if self.column_counts.is_empty() {
            bail!("column_counts must not be empty");
        }
        if self.column_counts.windows(2).any(|w| w[0] >= w[1]) {
            bail!("column_counts must be strictly ascending: {:?}", self.column_counts);
        }
        if self.column_counts.contains(&0) {
            bail!("column_counts must not contain 0");
        }
        if !self.column_counts.contains(&self.initial_columns) {
            bail!(
                "initial_columns {} is not one of {:?}",
                self.initial_columns,
                self.column_counts
            );
        }
        if self.velocity_window == 0 {
            bail!("velocity_window must be at least 1");
        }
        Ok(())
    }
}
