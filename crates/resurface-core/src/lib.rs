//! # resurface-core
//!
//! Symbol indexing and declaration-surface reconstruction for Mach-O
//! images built by the Swift compiler.
//!
//! The crate reads an image's reflective metadata sections and symbol
//! tables and rebuilds a human-readable interface: every type context,
//! protocol, protocol conformance, associated type, and nominal member the
//! binary preserves, in a stable order.
//!
//! ## Pipeline
//!
//! 1. [`macho::MachImage`] parses the image: sections, symbols, exports.
//! 2. [`symbols::SymbolIndex`] demangles and classifies every symbol into
//!    multi-axis buckets.
//! 3. [`indexer::InterfaceIndexer::prepare`] fuses metadata records with
//!    the symbol index into a definition graph.
//! 4. [`printer::InterfacePrinter`] renders the graph as a structured
//!    chunk stream, indexing each definition lazily on first visit.
//!
//! Progress and diagnostics flow over the [`events::EventDispatcher`]
//! observer bus; nothing on a correctness path depends on it.

pub mod demangle;
pub mod error;
pub mod events;
pub mod indexer;
pub mod macho;
pub mod metadata;
pub mod printer;
pub mod symbols;
pub mod types;

// Re-export commonly used types
pub use error::{ResurfaceError, Result};
pub use events::{EventDispatcher, IndexEvent};
pub use indexer::{CancellationToken, InterfaceIndexer};
pub use macho::MachImage;
pub use printer::{InterfacePrinter, InterfaceText};
pub use symbols::SymbolIndex;
pub use types::{InterfaceIndexConfiguration, PrinterConfiguration};
