//! # Error Types
//!
//! General error handling for interface reconstruction.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! The error policy follows "progress over abort": section decode failures
//! and per-record failures are downgraded to events and log lines at the call
//! site; only a top-level indexing-phase failure (or cancellation) surfaces
//! from [`prepare`](crate::indexer::InterfaceIndexer::prepare).

use thiserror::Error;

/// Main error type for reconstruction operations
///
/// ## Error Categories
///
/// 1. **Image errors**: UnsupportedImage, MissingSection
/// 2. **Decode errors**: SectionDecode, BadRelativePointer
/// 3. **Demangling errors**: Demangle
/// 4. **Pipeline errors**: IndexingPhase, Cancelled
/// 5. **I/O errors**: Io, Object
#[derive(Error, Debug)]
pub enum ResurfaceError
{
    /// The file is not a Mach-O image we can work with
    ///
    /// This happens when:
    /// - The file is not Mach-O at all (ELF, PE, archive, ...)
    /// - The image is 32-bit (only 64-bit images carry the metadata
    ///   sections we read)
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// A metadata section required by the current operation is absent
    #[error("Missing section: {0}")]
    MissingSection(String),

    /// A metadata section exists but its records could not be decoded
    ///
    /// Extraction failures are section-local: the indexer substitutes an
    /// empty record list and keeps going, so this error normally only
    /// travels as far as the extraction-failure event.
    #[error("Failed to decode section {section}: {reason}")]
    SectionDecode
    {
        /// Section the decoder was walking
        section: String,
        /// What went wrong
        reason: String,
    },

    /// A relative pointer resolved outside the image bounds
    #[error("Relative pointer at offset 0x{offset:x} escapes the image")]
    BadRelativePointer
    {
        /// File offset of the relative pointer itself
        offset: u64,
    },

    /// A mangled symbol could not be parsed into a node tree
    ///
    /// During symbol ingestion these are logged and skipped; the symbol is
    /// retained in the offset table but never lands in a kind bucket.
    #[error("Failed to demangle {symbol}: {reason}")]
    Demangle
    {
        /// The raw mangled name
        symbol: String,
        /// Parser diagnostic
        reason: String,
    },

    /// An indexing phase failed with an uncaught error
    ///
    /// This is the only fatal condition in the pipeline. The failure event
    /// has already been emitted by the time this is returned.
    #[error("Indexing phase {phase} failed: {source}")]
    IndexingPhase
    {
        /// Name of the phase that failed
        phase: &'static str,
        /// The underlying error
        #[source]
        source: Box<ResurfaceError>,
    },

    /// The operation was cancelled
    ///
    /// Storage is left in the state reached at the last completed phase;
    /// no rollback is performed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Error reported by the `object` parser
    #[error("Object parse error: {0}")]
    Object(#[from] object::read::Error),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, ResurfaceError>`
pub type Result<T> = std::result::Result<T, ResurfaceError>;
