//! Square-cell grid controller.
//!
//! Owns the ordered item sequence and the state of every on-screen cell slot.
//! The host's rendering layer implements [`GridSurface`]; this controller
//! decides what each slot shows and when it should be re-requested.
//!
//! All mutation happens on the main context. Background work reaches the
//! grid in two ways:
//! - Image completions, delivered through the [`MainContext`] and applied in
//!   [`GridController::pump`]
//! - Snapshot updates, sent through a [`SnapshotSink`] and applied in the
//!   same place
//!
//! Each slot carries a generation id. Configuring or recycling a slot bumps
//! it, and a completion that carries an older generation is dropped so a
//! late decode never lands in a cell that now shows another item.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use flume::{Receiver, Sender};
use tracing::{debug, info, trace};

use super::zoom::{ColumnDensityController, PinchEvent, ZoomOutcome};
use crate::config::GalleryConfig;
use crate::dispatch::{MainContext, Priority};
use crate::models::{Badge, GridItem, PhotoStore, StoredItem};
use crate::thumbnails::{ImageLoader, LoadRequest, TargetSize, Thumbnail};
use crate::viewer::DetailViewer;

/// Host-side identity of a reusable cell view.
pub type CellSlot = usize;

/// Rendering collaborator: the "cell provider" side of the grid.
pub trait GridSurface {
    /// `(slot, item index)` for every cell currently on screen.
    fn visible_cells(&self) -> Vec<(CellSlot, usize)>;

    /// Width of the scrolling viewport in points.
    fn viewport_width(&self) -> f32;

    /// Pixels per point.
    fn display_scale(&self) -> f32 {
        1.0
    }

    /// Recompute the layout for a new column count.
    fn invalidate_layout(&mut self, animated: bool, duration: Duration);

    /// Slot contents changed and should be redrawn.
    fn cell_updated(&mut self, slot: CellSlot, cell: &CellState);

    /// The ordered sequence changed.
    fn snapshot_applied(&mut self, _ids: &[i64]) {}
}

/// What one cell slot currently shows.
#[derive(Debug, Clone, Default)]
pub struct CellState {
    generation: u64,
    index: Option<usize>,
    image: Option<Thumbnail>,
    badge: Option<Badge>,
}

impl CellState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn image(&self) -> Option<&Thumbnail> {
        self.image.as_ref()
    }

    pub fn badge(&self) -> Option<Badge> {
        self.badge
    }
}

/// A change to the ordered sequence computed off the main context.
#[derive(Debug, Clone)]
pub enum SnapshotUpdate {
    /// Append in order.
    Append(Vec<StoredItem>),
    /// Replace the whole sequence.
    Replace(Vec<StoredItem>),
}

/// Cloneable sender for snapshot updates.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    tx: Sender<SnapshotUpdate>,
}

impl SnapshotSink {
    /// A sink not tied to a grid, for hosts that apply updates themselves.
    pub fn channel() -> (Self, Receiver<SnapshotUpdate>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub fn append(&self, items: Vec<StoredItem>) {
        self.send(SnapshotUpdate::Append(items));
    }

    pub fn replace(&self, items: Vec<StoredItem>) {
        self.send(SnapshotUpdate::Replace(items));
    }

    fn send(&self, update: SnapshotUpdate) {
        if self.tx.send(update).is_err() {
            debug!("Grid dropped, snapshot update discarded");
        }
    }
}

/// A finished image load on its way back to a slot.
struct CellDelivery {
    slot: CellSlot,
    generation: u64,
    index: usize,
    item_id: i64,
    image: Option<Thumbnail>,
}

/// Side of one square cell in points.
pub fn cell_side(viewport_width: f32, columns: u32) -> f32 {
    viewport_width.max(0.0) / columns.max(1) as f32
}

/// Pixel size to request for a cell.
pub fn request_side(viewport_width: f32, columns: u32, display_scale: f32) -> u32 {
    let side = cell_side(viewport_width, columns) * display_scale.max(0.0);
    (side.round() as u32).max(1)
}

pub struct GridController {
    items: Vec<GridItem>,
    cells: HashMap<CellSlot, CellState>,
    zoom: ColumnDensityController,
    loader: ImageLoader,
    main: MainContext,
    delivery_tx: Sender<CellDelivery>,
    delivery_rx: Receiver<CellDelivery>,
    snapshot_tx: Sender<SnapshotUpdate>,
    snapshot_rx: Receiver<SnapshotUpdate>,
    pending_refresh: Option<Instant>,
    dense_threshold: u32,
    refresh_delay: Duration,
    layout_animation: Duration,
}

impl GridController {
    pub fn new(config: &GalleryConfig, loader: ImageLoader) -> Result<Self> {
        config.validate()?;
        let (delivery_tx, delivery_rx) = flume::unbounded();
        let (snapshot_tx, snapshot_rx) = flume::unbounded();

        Ok(Self {
            items: Vec::new(),
            cells: HashMap::new(),
            zoom: ColumnDensityController::from_config(config)?,
            main: loader.main_context().clone(),
            loader,
            delivery_tx,
            delivery_rx,
            snapshot_tx,
            snapshot_rx,
            pending_refresh: None,
            dense_threshold: config.dense_threshold,
            refresh_delay: config.refresh_delay,
            layout_animation: config.layout_animation,
        })
    }

    /// Rebuilds the sequence from the store, oldest first.
    pub fn load(&mut self, store: &dyn PhotoStore, surface: &mut dyn GridSurface) -> Result<()> {
        let stored = store.fetch_all()?;
        info!(count = stored.len(), "Loaded grid items");
        self.apply_snapshot(SnapshotUpdate::Replace(stored), surface);
        Ok(())
    }

    pub fn snapshot_sink(&self) -> SnapshotSink {
        SnapshotSink {
            tx: self.snapshot_tx.clone(),
        }
    }

    /// Item ids in display order.
    pub fn snapshot(&self) -> Vec<i64> {
        self.items.iter().map(GridItem::id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&GridItem> {
        self.items.get(index)
    }

    pub fn cell(&self, slot: CellSlot) -> Option<&CellState> {
        self.cells.get(&slot)
    }

    pub fn columns(&self) -> u32 {
        self.zoom.columns()
    }

    pub fn zoom(&self) -> &ColumnDensityController {
        &self.zoom
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.pending_refresh.is_some()
    }

    /// Binds `slot` to the item at `index`.
    pub fn configure_cell(&mut self, slot: CellSlot, index: usize, surface: &mut dyn GridSurface) {
        let Some(item) = self.items.get(index) else {
            self.recycle_cell(slot, surface);
            return;
        };

        let cell = self.cells.entry(slot).or_default();
        cell.generation += 1;
        cell.index = Some(index);
        cell.badge = item.reference().badge();
        cell.image = item.thumbnail().cloned();
        let generation = cell.generation;
        let needs_image = cell.image.is_none();
        surface.cell_updated(slot, cell);

        if !needs_image {
            trace!(slot, index, "Cell configured from cached thumbnail");
            return;
        }

        let side = request_side(
            surface.viewport_width(),
            self.zoom.columns(),
            surface.display_scale(),
        );
        let request = LoadRequest::new(item.reference().clone(), TargetSize::square(side))
            .with_priority(Priority::UserInteractive);
        let delivery_tx = self.delivery_tx.clone();
        let item_id = item.id();

        trace!(slot, index, generation, side, "Requesting cell image");
        self.loader.request(request, move |image| {
            let _ = delivery_tx.send(CellDelivery {
                slot,
                generation,
                index,
                item_id,
                image,
            });
        });
    }

    /// The slot scrolled off screen; any in-flight load for it goes stale.
    pub fn recycle_cell(&mut self, slot: CellSlot, surface: &mut dyn GridSurface) {
        let cell = self.cells.entry(slot).or_default();
        cell.generation += 1;
        if let Some(index) = cell.index.take() {
            if let Some(item) = self.items.get_mut(index) {
                item.clear_thumbnail();
            }
        }
        cell.image = None;
        cell.badge = None;
        surface.cell_updated(slot, cell);
    }

    /// Clears and re-requests every visible cell at the current size.
    pub fn reload_visible(&mut self, surface: &mut dyn GridSurface) {
        let visible = surface.visible_cells();
        debug!(count = visible.len(), columns = self.columns(), "Refreshing visible cells");
        for (slot, index) in visible {
            if let Some(item) = self.items.get_mut(index) {
                item.clear_thumbnail();
            }
            self.configure_cell(slot, index, surface);
        }
    }

    pub fn handle_pinch(
        &mut self,
        event: PinchEvent,
        now: Instant,
        surface: &mut dyn GridSurface,
    ) -> ZoomOutcome {
        let outcome = self.zoom.handle(event, now);
        if outcome.changed() {
            surface.invalidate_layout(true, self.layout_animation);
            self.pending_refresh = Some(now + self.refresh_delay);
        }
        outcome
    }

    pub fn scroll_did_end_decelerating(&mut self, surface: &mut dyn GridSurface) {
        if self.is_sparse() {
            self.reload_visible(surface);
        }
    }

    pub fn scroll_did_end_dragging(&mut self, will_decelerate: bool, surface: &mut dyn GridSurface) {
        if !will_decelerate && self.is_sparse() {
            self.reload_visible(surface);
        }
    }

    /// Runs a due density-change refresh.
    pub fn tick(&mut self, now: Instant, surface: &mut dyn GridSurface) {
        let Some(due) = self.pending_refresh else {
            return;
        };
        if now < due {
            return;
        }
        self.pending_refresh = None;

        if self.is_sparse() {
            self.reload_visible(surface);
        } else {
            trace!(columns = self.columns(), "Dense grid, skipping refresh");
        }
    }

    /// Main-context turn: run posted jobs, then apply what they produced.
    /// Returns the number of cell images applied.
    pub fn pump(&mut self, now: Instant, surface: &mut dyn GridSurface) -> usize {
        self.main.run_pending();

        while let Ok(update) = self.snapshot_rx.try_recv() {
            self.apply_snapshot(update, surface);
        }

        let mut applied = 0;
        while let Ok(delivery) = self.delivery_rx.try_recv() {
            if self.apply_delivery(delivery, surface) {
                applied += 1;
            }
        }

        self.tick(now, surface);
        applied
    }

    /// Opens the detail viewer for the item at `index`.
    pub fn select(&self, index: usize) -> Option<DetailViewer> {
        let item = self.items.get(index)?;
        Some(DetailViewer::open(&self.loader, item.reference().clone()))
    }

    fn is_sparse(&self) -> bool {
        self.columns() < self.dense_threshold
    }

    fn apply_delivery(&mut self, delivery: CellDelivery, surface: &mut dyn GridSurface) -> bool {
        let Some(cell) = self.cells.get_mut(&delivery.slot) else {
            return false;
        };
        if cell.generation != delivery.generation {
            trace!(
                slot = delivery.slot,
                stale = delivery.generation,
                current = cell.generation,
                "Discarding stale cell image"
            );
            return false;
        }
        let Some(image) = delivery.image else {
            return false;
        };

        if let Some(item) = self.items.get_mut(delivery.index) {
            if item.id() == delivery.item_id {
                item.set_thumbnail(image.clone());
            }
        }
        cell.image = Some(image);
        surface.cell_updated(delivery.slot, cell);
        true
    }

    fn apply_snapshot(&mut self, update: SnapshotUpdate, surface: &mut dyn GridSurface) {
        match update {
            SnapshotUpdate::Append(items) => {
                debug!(count = items.len(), "Appending grid items");
                self.items.extend(items.into_iter().map(GridItem::new));
            }
            SnapshotUpdate::Replace(items) => {
                self.items = items.into_iter().map(GridItem::new).collect();
                // Every slot now points at stale data.
                for cell in self.cells.values_mut() {
                    cell.generation += 1;
                    cell.index = None;
                    cell.image = None;
                    cell.badge = None;
                }
            }
        }
        surface.snapshot_applied(&self.snapshot());
    }
}
