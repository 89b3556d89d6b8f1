//! # Interface Printer
//!
//! Pure read-over of the indexed definition graph into a structured chunk
//! stream. The printer owns no graph state; it holds shared read handles
//! and triggers each definition's lazy member indexing on first visit.
//!
//! ## Module Structure
//!
//! - **`chunks`**: the `(text, semantic type)` stream with coalescing
//! - **`render`**: walking the graph and emitting declarations

pub mod chunks;
pub mod render;

pub use chunks::{Chunk, InterfaceText, SemanticType};
pub use render::InterfacePrinter;
