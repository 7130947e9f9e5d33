//! Directory-backed media picker.
//!
//! Stands in for a system picker: lists the media under a directory and
//! returns their identifiers in a stable order. A still image with a `.mov`
//! of the same stem is one live photo; the video half is not listed on its
//! own.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::resolver::live_photo_companion;
use crate::models::MediaKind;

/// Which kinds of media the picker offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickerFilter {
    pub images: bool,
    pub videos: bool,
    pub live_photos: bool,
}

impl Default for PickerFilter {
    fn default() -> Self {
        Self {
            images: true,
            videos: true,
            live_photos: true,
        }
    }
}

/// Lists media files under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryPicker {
    filter: PickerFilter,
    recursive: bool,
    follow_symlinks: bool,
}

impl DirectoryPicker {
    pub fn new() -> Self {
        Self {
            filter: PickerFilter::default(),
            recursive: true,
            follow_symlinks: false,
        }
    }

    pub fn with_filter(mut self, filter: PickerFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Returns the identifiers of every matching file, sorted by path.
    pub fn pick(&self, dir: &Path) -> Result<Vec<String>> {
        if !dir.is_dir() {
            bail!("Not a directory: {:?}", dir);
        }

        let mut walker = WalkDir::new(dir).follow_links(self.follow_symlinks);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut files: Vec<(PathBuf, MediaKind)> = Vec::new();
        for entry in walker.into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if let Some(kind) = MediaKind::from_extension(ext) {
                files.push((path.to_path_buf(), kind));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        // Video halves of live photos.
        let companions: HashSet<PathBuf> = files
            .iter()
            .filter(|(_, kind)| *kind == MediaKind::Image)
            .filter_map(|(path, _)| live_photo_companion(path))
            .collect();

        let mut picked = Vec::with_capacity(files.len());
        for (path, kind) in files {
            if companions.contains(&path) {
                continue;
            }

            let wanted = match kind {
                MediaKind::Video => self.filter.videos,
                MediaKind::Image if live_photo_companion(&path).is_some() => {
                    self.filter.live_photos
                }
                MediaKind::Image => self.filter.images,
                MediaKind::Unknown => false,
            };
            if !wanted {
                continue;
            }

            match path.to_str() {
                Some(identifier) => picked.push(identifier.to_string()),
                None => debug!(?path, "Skipping non-UTF-8 path"),
            }
        }

        info!(count = picked.len(), "Picked media from {:?}", dir);
        Ok(picked)
    }
}

impl Default for DirectoryPicker {
    fn default() -> Self {
        Self::new()
    }
}
