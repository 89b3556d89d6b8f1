//! Mach-O image access.
//!
//! Thin wrapper over the `object` crate exposing exactly what the indexing
//! pipeline needs: the reflective metadata sections, ordinary symbols with
//! their nlist flags, exported symbols, the image start offset, and an
//! optional attached shared-cache context.

pub mod image;

pub use image::{MachImage, SectionBlob, SharedCacheContext};
