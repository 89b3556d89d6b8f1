//! Platform-agnostic data types shared across the crate.

pub mod config;
pub mod symbols;

pub use config::{InterfaceIndexConfiguration, PrinterConfiguration};
pub use symbols::{IndexedSymbol, Nlist, Symbol, SymbolType, TypeInfo, TypeInfoKind};
