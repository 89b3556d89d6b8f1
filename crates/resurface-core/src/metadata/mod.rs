//! # Metadata Record Readers
//!
//! Decoding of the reflective metadata sections into plain record structs.
//!
//! The indexer consumes records through the [`MetadataSource`] trait rather
//! than touching sections directly. This keeps the pipeline testable (tests
//! hand it synthetic record lists) and keeps the byte-level ABI knowledge in
//! one place ([`reader`]).
//!
//! ## Module Structure
//!
//! - **`records`**: decoded record structs
//! - **`reader`**: section-backed [`MetadataSource`] implementation

pub mod reader;
pub mod records;

use std::sync::Arc;

use crate::error::Result;

pub use reader::MachOMetadataSource;
pub use records::{
    AssociatedTypeEntry, AssociatedTypeRecord, ConformanceRecord, ContextKind, ContextRecord, FieldRecord, MethodKind,
    MethodRecord, OverrideRecord, ParentRef, ProtocolRecord, ResilientWitness, TypeRecord, WitnessRequirement,
};

/// Provider of the four record lists the indexer extracts in Phase 0.
///
/// Each method may fail independently; the indexer treats a failure as an
/// empty list plus an extraction-failure event, never as a fatal error.
pub trait MetadataSource
{
    /// Type context descriptors from the types section.
    fn types(&self) -> Result<Vec<TypeRecord>>;

    /// Protocol descriptors from the protocols section.
    fn protocols(&self) -> Result<Vec<ProtocolRecord>>;

    /// Protocol conformance descriptors from the conformances section.
    fn protocol_conformances(&self) -> Result<Vec<Arc<ConformanceRecord>>>;

    /// Associated type descriptors from the associated-types section.
    fn associated_types(&self) -> Result<Vec<Arc<AssociatedTypeRecord>>>;
}
