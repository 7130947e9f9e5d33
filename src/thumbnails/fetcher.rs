//! Image fetching: the collaborator that turns a resolved handle into pixels.
//!
//! `FileImageFetcher` decodes from disk with the `image` crate. For sized
//! requests it first hands out a cheap nearest-neighbour preview marked as
//! degraded, then the final Catmull-Rom resample. Callers that only want the
//! final image (the loader) skip degraded deliveries.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use tracing::{debug, trace};

use crate::models::{MediaHandle, MediaKind};

/// Previews are this many times smaller than the requested size.
const PREVIEW_DIVISOR: u32 = 4;

/// Bytes per RGBA pixel.
const BYTES_PER_PIXEL: usize = 4;

/// A decoded image, cheap to clone.
#[derive(Clone)]
pub struct Thumbnail {
    pixels: Arc<RgbaImage>,
}

impl Thumbnail {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Estimated memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.width() as usize * self.height() as usize * BYTES_PER_PIXEL
    }

    /// True when both values share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Thumbnail) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSize {
    Pixels { width: u32, height: u32 },
    /// Full resolution.
    Original,
}

impl TargetSize {
    pub fn square(side: u32) -> Self {
        TargetSize::Pixels {
            width: side.max(1),
            height: side.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentMode {
    /// Scale to cover the target, cropping the overflow.
    AspectFill,
    /// Scale to fit inside the target.
    AspectFit,
}

/// One result handed out by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchDelivery {
    pub image: Thumbnail,
    /// Low-quality intermediate result.
    pub degraded: bool,
}

/// Image-fetch collaborator.
///
/// Implementations may call `deliver` several times; the first non-degraded
/// delivery is the real result and later ones are ignored. Returning without a non-degraded delivery
/// means there is nothing to show.
pub trait ImageFetcher: Send + Sync {
    fn fetch(
        &self,
        handle: &MediaHandle,
        target: TargetSize,
        mode: ContentMode,
        deliver: &mut dyn FnMut(FetchDelivery),
    ) -> Result<()>;
}

/// Decodes still images straight from their source files.
pub struct FileImageFetcher {
    previews: bool,
}

impl FileImageFetcher {
    pub fn new() -> Self {
        Self { previews: true }
    }

    /// A fetcher that only ever delivers the final image.
    pub fn without_previews() -> Self {
        Self { previews: false }
    }

    fn resample(
        img: &DynamicImage,
        width: u32,
        height: u32,
        mode: ContentMode,
        filter: FilterType,
    ) -> Thumbnail {
        let resized = match mode {
            ContentMode::AspectFill => img.resize_to_fill(width, height, filter),
            ContentMode::AspectFit => img.resize_exact(width, height, filter),
        };
        Thumbnail::new(resized.to_rgba8())
    }
}

impl Default for FileImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFetcher for FileImageFetcher {
    fn fetch(
        &self,
        handle: &MediaHandle,
        target: TargetSize,
        mode: ContentMode,
        deliver: &mut dyn FnMut(FetchDelivery),
    ) -> Result<()> {
        if handle.reference.kind == MediaKind::Video {
            trace!(source = ?handle.source, "No still frame for video");
            return Ok(());
        }

        let img = open_image(&handle.source)?;
        let (src_width, src_height) = img.dimensions();

        let (width, height) = match target {
            TargetSize::Original => {
                deliver(FetchDelivery {
                    image: Thumbnail::new(img.to_rgba8()),
                    degraded: false,
                });
                return Ok(());
            }
            TargetSize::Pixels { width, height } => match mode {
                ContentMode::AspectFill => fill_dimensions(src_width, src_height, width, height),
                ContentMode::AspectFit => fit_dimensions(src_width, src_height, width, height),
            },
        };

        debug!(
            source = ?handle.source,
            src_width, src_height, width, height, "Decoding thumbnail"
        );

        if self.previews && width >= PREVIEW_DIVISOR && height >= PREVIEW_DIVISOR {
            deliver(FetchDelivery {
                image: Self::resample(
                    &img,
                    width / PREVIEW_DIVISOR,
                    height / PREVIEW_DIVISOR,
                    mode,
                    FilterType::Nearest,
                ),
                degraded: true,
            });
        }

        // CatmullRom is a good quality/speed balance for downscaling.
        deliver(FetchDelivery {
            image: Self::resample(&img, width, height, mode, FilterType::CatmullRom),
            degraded: false,
        });
        Ok(())
    }
}

/// Decodes an image file. Animated GIFs yield their first frame.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    let format = image::guess_format(&bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes))
            .with_context(|| format!("Failed to decode GIF: {:?}", path))?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames: {:?}", path));
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(&bytes, fmt)
            .with_context(|| format!("Failed to decode image: {:?}", path)),
        None => image::load_from_memory(&bytes)
            .with_context(|| format!("Failed to decode image: {:?}", path)),
    }
}

/// Output size for an aspect-fill request.
///
/// The target box is kept, shrunk uniformly when the source is too small to
/// cover it, so sources are never upscaled.
fn fill_dimensions(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32) {
    let (width, height) = (width.max(1), height.max(1));
    if src_width == 0 || src_height == 0 {
        return (width, height);
    }

    let scale = (src_width as f64 / width as f64)
        .min(src_height as f64 / height as f64)
        .min(1.0);

    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Output size for an aspect-fit request, preserving the source ratio inside
/// the target box without upscaling.
fn fit_dimensions(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32) {
    let (width, height) = (width.max(1), height.max(1));
    if src_width == 0 || src_height == 0 {
        return (width, height);
    }

    let scale = (width as f64 / src_width as f64)
        .min(height as f64 / src_height as f64)
        .min(1.0);

    (
        ((src_width as f64 * scale).round() as u32).max(1),
        ((src_height as f64 * scale).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaReference;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]))
            .save(path)
            .unwrap();
    }

    fn handle(path: PathBuf, kind: MediaKind) -> MediaHandle {
        let reference = MediaReference::new(path.to_string_lossy(), 0, kind);
        MediaHandle::new(reference, path)
    }

    fn collect(
        fetcher: &FileImageFetcher,
        handle: &MediaHandle,
        target: TargetSize,
        mode: ContentMode,
    ) -> Result<Vec<FetchDelivery>> {
        let mut deliveries = Vec::new();
        fetcher.fetch(handle, target, mode, &mut |d| deliveries.push(d))?;
        Ok(deliveries)
    }

    #[test]
    fn test_fill_dimensions() {
        assert_eq!(fill_dimensions(1920, 1080, 300, 300), (300, 300));
        // Source too small to cover: shrink the box, keep it square.
        assert_eq!(fill_dimensions(200, 100, 300, 300), (100, 100));
        assert_eq!(fill_dimensions(0, 0, 64, 64), (64, 64));
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(1920, 1080, 480, 480), (480, 270));
        assert_eq!(fit_dimensions(100, 50, 480, 480), (100, 50));
        assert_eq!(fit_dimensions(1000, 4000, 300, 300), (75, 300));
    }

    #[test]
    fn test_sized_fetch_delivers_preview_then_final() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 640, 320);

        let fetcher = FileImageFetcher::new();
        let deliveries = collect(
            &fetcher,
            &handle(path, MediaKind::Image),
            TargetSize::square(64),
            ContentMode::AspectFill,
        )
        .unwrap();

        assert_eq!(deliveries.len(), 2);
        assert!(deliveries[0].degraded);
        assert_eq!(deliveries[0].image.width(), 16);
        assert!(!deliveries[1].degraded);
        assert_eq!(
            (deliveries[1].image.width(), deliveries[1].image.height()),
            (64, 64)
        );
    }

    #[test]
    fn test_without_previews_only_final() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tall.png");
        write_png(&path, 100, 400);

        let fetcher = FileImageFetcher::without_previews();
        let deliveries = collect(
            &fetcher,
            &handle(path, MediaKind::Image),
            TargetSize::square(200),
            ContentMode::AspectFit,
        )
        .unwrap();

        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            (deliveries[0].image.width(), deliveries[0].image.height()),
            (50, 200)
        );
    }

    #[test]
    fn test_original_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("full.png");
        write_png(&path, 33, 17);

        let deliveries = collect(
            &FileImageFetcher::new(),
            &handle(path, MediaKind::Image),
            TargetSize::Original,
            ContentMode::AspectFit,
        )
        .unwrap();

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].image.width(), 33);
        assert_eq!(deliveries[0].image.memory_bytes(), 33 * 17 * 4);
    }

    #[test]
    fn test_video_has_no_delivery() {
        let deliveries = collect(
            &FileImageFetcher::new(),
            &handle(PathBuf::from("/nonexistent/clip.mp4"), MediaKind::Video),
            TargetSize::square(64),
            ContentMode::AspectFill,
        )
        .unwrap();
        assert!(deliveries.is_empty());
    }

    #[test]
    fn test_missing_file_errors() {
        let result = collect(
            &FileImageFetcher::new(),
            &handle(PathBuf::from("/nonexistent/photo.jpg"), MediaKind::Image),
            TargetSize::square(64),
            ContentMode::AspectFill,
        );
        assert!(result.is_err());
    }
}
