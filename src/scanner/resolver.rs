//! Media resolution: turning a picked identifier into a decodable handle.
//!
//! The filesystem resolver treats identifiers as paths. It stats the file
//! and never opens it.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, trace};

use crate::models::{MediaHandle, MediaKind, MediaReference, MediaSubtype};

/// Video extensions that mark a still image as a live photo when they sit
/// next to it with the same stem.
const LIVE_COMPANION_EXTENSIONS: [&str; 2] = ["mov", "MOV"];

/// Media-resolution collaborator.
pub trait MediaResolver: Send + Sync {
    /// Returns `None` when the identifier no longer resolves.
    fn resolve(&self, identifier: &str) -> Option<MediaHandle>;
}

impl<F> MediaResolver for F
where
    F: Fn(&str) -> Option<MediaHandle> + Send + Sync,
{
    fn resolve(&self, identifier: &str) -> Option<MediaHandle> {
        self(identifier)
    }
}

/// Resolves path identifiers against the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsResolver {
    /// Base for relative identifiers.
    root: Option<PathBuf>,
}

impl FsResolver {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        let path = PathBuf::from(identifier);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl MediaResolver for FsResolver {
    fn resolve(&self, identifier: &str) -> Option<MediaHandle> {
        let path = self.path_for(identifier);

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let Some(kind) = MediaKind::from_extension(ext) else {
            debug!(identifier, "Unsupported media extension");
            return None;
        };

        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                debug!(identifier, "Not a regular file");
                return None;
            }
            Err(e) => {
                debug!(identifier, error = %e, "Failed to stat media");
                return None;
            }
        };

        let created_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut subtypes = MediaSubtype::NONE;
        if kind == MediaKind::Image && live_photo_companion(&path).is_some() {
            subtypes.insert(MediaSubtype::LIVE_PHOTO);
        }

        trace!(identifier, ?kind, "Resolved media");
        Some(MediaHandle::new(
            MediaReference::new(identifier, created_at, kind).with_subtypes(subtypes),
            path,
        ))
    }
}

/// The motion half of a live photo, if one exists next to `image`.
pub fn live_photo_companion(image: &Path) -> Option<PathBuf> {
    LIVE_COMPANION_EXTENSIONS
        .iter()
        .map(|ext| image.with_extension(ext))
        .find(|candidate| candidate.is_file())
}
