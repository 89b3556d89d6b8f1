//! # Symbol Index
//!
//! Demangling-aware indexing of an image's symbol tables.
//!
//! ## Module Structure
//!
//! - **`classify`**: sorting demangled trees into global/member buckets
//! - **`index`**: storage, build, and the multi-axis query API
//!
//! The index is built once per image and is read-only afterwards; see the
//! concurrency notes on [`index::Storage`].

pub mod classify;
pub mod index;

pub use classify::{classify_global, classify_member, is_global, GlobalKind, MemberClassification, MemberKind};
pub use index::{MemberBucket, MemberStore, Storage, SymbolIndex, TypeMemberSymbols};
