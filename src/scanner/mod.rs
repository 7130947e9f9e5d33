//! Media discovery and resolution.
//!
//! - `DirectoryPicker` - Lists importable media under a directory
//! - `MediaResolver` / `FsResolver` - Identifier to `MediaHandle`

pub mod picker;
pub mod resolver;

pub use picker::{DirectoryPicker, PickerFilter};
pub use resolver::{live_photo_companion, FsResolver, MediaResolver};
