pub mod media_item;
pub mod media_store;

pub use media_item::*;
pub use media_store::*;
