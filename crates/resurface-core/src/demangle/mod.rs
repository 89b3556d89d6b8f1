//! # Symbol Demangling
//!
//! This module hosts the demangler the rest of the crate builds on: a
//! typed node tree ([`Node`]), a parser for the compact entity mangling
//! grammar ([`demangle`], [`demangle_type`]), and node printing including
//! the interface-type mode whose output is the canonical type-name key
//! format ([`interface_type_name`]).
//!
//! ## Module Structure
//!
//! - **`node`**: node kinds, tree construction, structural/identity views
//! - **`parser`**: mangled-string to tree
//! - **`printer`**: tree to text
//!
//! Demangling is pure: it allocates a fresh tree per call and touches no
//! shared state, so it is safe to call concurrently.

pub mod node;
pub mod parser;
pub mod printer;

pub use node::{Node, NodeKind, NodeRef, StructuralKey};
pub use parser::{demangle, demangle_type, is_language_symbol, MANGLING_PREFIX};
pub use printer::{interface_type_name, print, PrintOptions};
