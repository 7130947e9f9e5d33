//! Headless photo-gallery engine.
//!
//! - `layout` - Square-cell grid controller and the pinch-driven column stepper
//! - `thumbnails` - Bounded, two-lane image loading with a memory cache
//! - `import` - Picker-driven batch import into the photo store
//! - `models` - Media references and the SQLite photo store
//! - `scanner` - Directory picker and filesystem media resolution
//! - `viewer` - Full-resolution detail view with clamped zoom
//!
//! The host's UI layer implements [`layout::GridSurface`] and
//! [`import::ProgressPresenter`] and drives [`dispatch::MainContext`] from its
//! event loop.

pub mod config;
pub mod dispatch;
pub mod import;
pub mod layout;
pub mod models;
pub mod scanner;
pub mod thumbnails;
pub mod viewer;

pub use config::GalleryConfig;
pub use dispatch::{MainContext, Priority};
pub use layout::{GridController, GridSurface};
pub use models::{MediaStore, PhotoStore};
