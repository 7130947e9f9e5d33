//! Detail viewer for a single grid item.
//!
//! Opening the viewer requests the full-resolution image on the interactive
//! lane. The host polls it from the main context after each frame.

use flume::Receiver;
use tracing::{debug, trace};

use crate::dispatch::Priority;
use crate::models::MediaReference;
use crate::thumbnails::{ContentMode, ImageLoader, LoadRequest, TargetSize, Thumbnail};

/// Maximum zoom scale allowed
pub const MAX_SCALE: f64 = 3.0;
/// Minimum zoom scale allowed
pub const MIN_SCALE: f64 = 1.0;

#[derive(Debug, Clone)]
pub enum ViewerState {
    Loading,
    Ready(Thumbnail),
    /// Nothing could be decoded; the viewer shows an empty page.
    Failed,
}

pub struct DetailViewer {
    reference: MediaReference,
    state: ViewerState,
    scale: f64,
    inbox: Receiver<Option<Thumbnail>>,
}

impl DetailViewer {
    pub fn open(loader: &ImageLoader, reference: MediaReference) -> Self {
        let (tx, inbox) = flume::bounded(1);
        let request = LoadRequest::new(reference.clone(), TargetSize::Original)
            .with_mode(ContentMode::AspectFit)
            .with_priority(Priority::UserInitiated);

        debug!(identifier = %reference.identifier, "Opening detail viewer");
        loader.request(request, move |image| {
            let _ = tx.send(image);
        });

        Self {
            reference,
            state: ViewerState::Loading,
            scale: MIN_SCALE,
            inbox,
        }
    }

    /// Picks up the loaded image. Returns true when the state changed.
    pub fn poll(&mut self) -> bool {
        if !matches!(self.state, ViewerState::Loading) {
            return false;
        }
        match self.inbox.try_recv() {
            Ok(Some(image)) => {
                trace!(width = image.width(), height = image.height(), "Viewer image ready");
                self.state = ViewerState::Ready(image);
                true
            }
            Ok(None) | Err(flume::TryRecvError::Disconnected) => {
                self.state = ViewerState::Failed;
                true
            }
            Err(flume::TryRecvError::Empty) => false,
        }
    }

    pub fn reference(&self) -> &MediaReference {
        &self.reference
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn image(&self) -> Option<&Thumbnail> {
        match &self.state {
            ViewerState::Ready(image) => Some(image),
            _ => None,
        }
    }

    pub fn zoom_scale(&self) -> f64 {
        self.scale
    }

    pub fn set_zoom(&mut self, scale: f64) {
        if scale.is_finite() {
            self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        }
    }

    pub fn zoom_by(&mut self, factor: f64) {
        self.set_zoom(self.scale * factor);
    }

    pub fn reset_zoom(&mut self) {
        self.scale = MIN_SCALE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GalleryConfig;
    use crate::dispatch::MainContext;
    use crate::models::{MediaHandle, MediaKind};
    use crate::scanner::FsResolver;
    use crate::thumbnails::FileImageFetcher;
    use image::RgbaImage;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn loader() -> ImageLoader {
        ImageLoader::new(
            &GalleryConfig::default(),
            Arc::new(FileImageFetcher::new()),
            Arc::new(FsResolver::new()),
            MainContext::new(),
        )
        .unwrap()
    }

    fn wait(viewer: &mut DetailViewer, main: &MainContext) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !viewer.poll() && Instant::now() < deadline {
            main.run_pending();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_loads_full_resolution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbaImage::new(300, 200).save(&path).unwrap();

        let loader = loader();
        let reference = MediaReference::new(path.to_string_lossy(), 0, MediaKind::Image);
        let mut viewer = DetailViewer::open(&loader, reference);
        assert!(matches!(viewer.state(), ViewerState::Loading));

        wait(&mut viewer, loader.main_context());
        let image = viewer.image().unwrap();
        assert_eq!((image.width(), image.height()), (300, 200));
    }

    #[test]
    fn test_missing_file_fails() {
        let loader = ImageLoader::new(
            &GalleryConfig::default(),
            Arc::new(FileImageFetcher::new()),
            Arc::new(|_: &str| None::<MediaHandle>),
            MainContext::new(),
        )
        .unwrap();

        let reference = MediaReference::new("/gone.jpg", 0, MediaKind::Image);
        let mut viewer = DetailViewer::open(&loader, reference);
        wait(&mut viewer, loader.main_context());
        assert!(matches!(viewer.state(), ViewerState::Failed));
        assert!(viewer.image().is_none());
    }

    #[test]
    fn test_zoom_is_clamped() {
        let loader = loader();
        let reference = MediaReference::new("/x.jpg", 0, MediaKind::Image);
        let mut viewer = DetailViewer::open(&loader, reference);

        viewer.zoom_by(1.25);
        assert!((viewer.zoom_scale() - 1.25).abs() < 1e-9);
        viewer.zoom_by(10.0);
        assert_eq!(viewer.zoom_scale(), MAX_SCALE);
        viewer.zoom_by(0.01);
        assert_eq!(viewer.zoom_scale(), MIN_SCALE);
        viewer.set_zoom(2.0);
        viewer.reset_zoom();
        assert_eq!(viewer.zoom_scale(), MIN_SCALE);
    }
}
