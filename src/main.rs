use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use photogrid::import::ImportPipeline;
use photogrid::layout::{CellSlot, CellState, GridController, GridSurface};
use photogrid::models::MediaStore;
use photogrid::scanner::{DirectoryPicker, FsResolver};
use photogrid::thumbnails::{CachingFetcher, FileImageFetcher, ImageLoader};
use photogrid::{GalleryConfig, MainContext};

/// Main-context turn interval (~60fps).
const FRAME: Duration = Duration::from_millis(16);

/// Cells the headless surface pretends are on screen.
const VISIBLE_CELLS: usize = 27;

const VIEWPORT_WIDTH: f32 = 1080.0;

/// How long to wait for the first screen of thumbnails.
const FIRST_SCREEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "photogrid", version, about = "Import a directory into the photo grid")]
struct Args {
    /// Directory to import media from
    dir: PathBuf,

    /// Photo store path (default: the user data directory)
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Stand-in for a real view: a fixed viewport showing the first cells.
struct HeadlessSurface {
    len: usize,
    loaded: HashSet<CellSlot>,
}

impl HeadlessSurface {
    fn new() -> Self {
        Self {
            len: 0,
            loaded: HashSet::new(),
        }
    }
}

impl GridSurface for HeadlessSurface {
    fn visible_cells(&self) -> Vec<(CellSlot, usize)> {
        (0..self.len.min(VISIBLE_CELLS)).map(|i| (i, i)).collect()
    }

    fn viewport_width(&self) -> f32 {
        VIEWPORT_WIDTH
    }

    fn invalidate_layout(&mut self, animated: bool, duration: Duration) {
        info!(animated, ?duration, "Layout invalidated");
    }

    fn cell_updated(&mut self, slot: CellSlot, cell: &CellState) {
        if cell.image().is_some() {
            self.loaded.insert(slot);
        } else {
            self.loaded.remove(&slot);
        }
    }

    fn snapshot_applied(&mut self, ids: &[i64]) {
        self.len = ids.len();
    }
}

fn open_store(config: &GalleryConfig) -> Result<MediaStore> {
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => MediaStore::default_db_path()?,
    };

    match MediaStore::open(&db_path) {
        Ok(store) => Ok(store),
        Err(e) => {
            warn!("Failed to open photo store: {:#}", e);
            MediaStore::handle_corruption(&db_path)
        }
    }
}

async fn run(args: Args) -> Result<()> {

    let mut config = GalleryConfig::default();
    if let Some(db) = args.db {
        config = config.db_path(db);
    }
    config.validate()?;

    let store = Arc::new(open_store(&config)?);
    let main = MainContext::new();
    let resolver = Arc::new(FsResolver::new());
    let fetcher = Arc::new(CachingFetcher::new(
        Arc::new(FileImageFetcher::without_previews()),
        config.thumbnail_cache_mb,
    ));
    let loader = ImageLoader::new(&config, fetcher, resolver.clone(), main.clone())?;

    let mut grid = GridController::new(&config, loader)?;
    let mut surface = HeadlessSurface::new();
    grid.load(store.as_ref(), &mut surface)?;
    info!(items = grid.len(), columns = grid.columns(), "Grid ready");

    let dir = args.dir;
    let picked = tokio::task::spawn_blocking(move || DirectoryPicker::new().pick(&dir))
        .await
        .context("Picker task panicked")??;

    let pipeline = ImportPipeline::new(store.clone(), resolver, main, grid.snapshot_sink());
    let import = pipeline.begin_import(picked);

    let cancel = import.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling import");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut frames = tokio::time::interval(FRAME);
    while !import.is_finished() {
        frames.tick().await;
        grid.pump(Instant::now(), &mut surface);
    }
    let outcome = import.outcome().await;
    grid.pump(Instant::now(), &mut surface);
    info!(?outcome, items = grid.len(), "Import finished");

    let visible = surface.visible_cells();
    for (slot, index) in &visible {
        grid.configure_cell(*slot, *index, &mut surface);
    }

    let deadline = Instant::now() + FIRST_SCREEN_TIMEOUT;
    while surface.loaded.len() < visible.len() && Instant::now() < deadline {
        frames.tick().await;
        grid.pump(Instant::now(), &mut surface);
    }
    info!(
        loaded = surface.loaded.len(),
        visible = visible.len(),
        "First screen of thumbnails"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("photogrid=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
