use std::ops::BitOr;
use std::path::PathBuf;

use crate::thumbnails::Thumbnail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Unknown,
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif" | "heic" => {
                Some(Self::Image)
            }
            "webm" | "mp4" | "mkv" | "avi" | "mov" | "m4v" => Some(Self::Video),
            _ => None,
        }
    }

    /// Stored representation.
    pub fn to_raw(self) -> i16 {
        match self {
            MediaKind::Unknown => 0,
            MediaKind::Image => 1,
            MediaKind::Video => 2,
        }
    }

    pub fn from_raw(value: i16) -> Self {
        match value {
            1 => MediaKind::Image,
            2 => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }
}

/// Bitmask of media subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MediaSubtype(u64);

impl MediaSubtype {
    pub const NONE: Self = Self(0);
    pub const PANORAMA: Self = Self(1 << 0);
    pub const HDR: Self = Self(1 << 1);
    pub const SCREENSHOT: Self = Self(1 << 2);
    pub const LIVE_PHOTO: Self = Self(1 << 3);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for MediaSubtype {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Overlay shown on a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Video,
    LivePhoto,
}

/// Identity of one external media item as the store records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    /// Opaque, stable identifier understood by the resolver.
    pub identifier: String,
    /// Unix seconds.
    pub created_at: i64,
    pub kind: MediaKind,
    pub subtypes: MediaSubtype,
}

impl MediaReference {
    pub fn new(identifier: impl Into<String>, created_at: i64, kind: MediaKind) -> Self {
        Self {
            identifier: identifier.into(),
            created_at,
            kind,
            subtypes: MediaSubtype::NONE,
        }
    }

    pub fn with_subtypes(mut self, subtypes: MediaSubtype) -> Self {
        self.subtypes = subtypes;
        self
    }

    pub fn is_live_photo(&self) -> bool {
        self.kind == MediaKind::Image && self.subtypes.contains(MediaSubtype::LIVE_PHOTO)
    }

    pub fn badge(&self) -> Option<Badge> {
        match self.kind {
            MediaKind::Video => Some(Badge::Video),
            MediaKind::Image if self.is_live_photo() => Some(Badge::LivePhoto),
            _ => None,
        }
    }
}

/// A media item resolved to something that can be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub reference: MediaReference,
    /// Where the pixels live.
    pub source: PathBuf,
}

impl MediaHandle {
    pub fn new(reference: MediaReference, source: PathBuf) -> Self {
        Self { reference, source }
    }

    pub fn identifier(&self) -> &str {
        &self.reference.identifier
    }
}

/// A reference persisted by the photo store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    /// Row id in the store.
    pub id: i64,
    pub reference: MediaReference,
}

/// One entry of the grid's ordered sequence.
#[derive(Debug, Clone)]
pub struct GridItem {
    pub item: StoredItem,
    thumbnail: Option<Thumbnail>,
}

impl GridItem {
    pub fn new(item: StoredItem) -> Self {
        Self {
            item,
            thumbnail: None,
        }
    }

    pub fn id(&self) -> i64 {
        self.item.id
    }

    pub fn reference(&self) -> &MediaReference {
        &self.item.reference
    }

    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnail.as_ref()
    }

    pub fn set_thumbnail(&mut self, thumbnail: Thumbnail) {
        self.thumbnail = Some(thumbnail);
    }

    pub fn clear_thumbnail(&mut self) {
        self.thumbnail = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("JPG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension("mov"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("txt"), None);
    }

    #[test]
    fn test_kind_raw_values() {
        for kind in [MediaKind::Unknown, MediaKind::Image, MediaKind::Video] {
            assert_eq!(MediaKind::from_raw(kind.to_raw()), kind);
        }
        assert_eq!(MediaKind::from_raw(42), MediaKind::Unknown);
    }

    #[test]
    fn test_subtype_bits() {
        let mut subtypes = MediaSubtype::HDR;
        assert!(!subtypes.contains(MediaSubtype::LIVE_PHOTO));
        subtypes.insert(MediaSubtype::LIVE_PHOTO);
        assert!(subtypes.contains(MediaSubtype::LIVE_PHOTO));
        assert!(subtypes.contains(MediaSubtype::HDR | MediaSubtype::LIVE_PHOTO));
        assert_eq!(subtypes.bits(), 0b1010);
    }

    #[test]
    fn test_badges() {
        let video = MediaReference::new("a.mp4", 0, MediaKind::Video);
        assert_eq!(video.badge(), Some(Badge::Video));

        let live = MediaReference::new("b.jpg", 0, MediaKind::Image)
            .with_subtypes(MediaSubtype::LIVE_PHOTO);
        assert_eq!(live.badge(), Some(Badge::LivePhoto));

        let still = MediaReference::new("c.jpg", 0, MediaKind::Image);
        assert_eq!(still.badge(), None);

        // Live bit on a video does not change its badge.
        let odd = MediaReference::new("d.mp4", 0, MediaKind::Video)
            .with_subtypes(MediaSubtype::LIVE_PHOTO);
        assert_eq!(odd.badge(), Some(Badge::Video));
    }
}
