//! Indexer event types and the observer bus.
//!
//! Higher layers (CLI, future protocol clients) observe these events to
//! surface progress and diagnostics without polling indexer state. The bus
//! is fire-and-forget: dispatch never fails, handlers run synchronously on
//! the dispatching thread, and nothing on a correctness path depends on a
//! handler having run. Handlers must not block.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Indexing phase, in declared execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase
{
    Types,
    Protocols,
    Conformances,
    Extensions,
    Globals,
}

impl Phase
{
    /// Static name used in events and error messages.
    pub fn name(self) -> &'static str
    {
        match self {
            Phase::Types => "types",
            Phase::Protocols => "protocols",
            Phase::Conformances => "conformances",
            Phase::Extensions => "extensions",
            Phase::Globals => "globals",
        }
    }
}

/// State carried by a phase-transition event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseState
{
    Started,
    Completed,
    Failed(String),
}

/// Metadata section a record list is extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSection
{
    Types,
    Protocols,
    ProtocolConformances,
    AssociatedTypes,
}

impl MetadataSection
{
    /// Mach-O section name backing this record list.
    pub fn section_name(self) -> &'static str
    {
        match self {
            MetadataSection::Types => "__swift5_types",
            MetadataSection::Protocols => "__swift5_protos",
            MetadataSection::ProtocolConformances => "__swift5_proto",
            MetadataSection::AssociatedTypes => "__swift5_assocty",
        }
    }
}

/// Severity of a free-form diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel
{
    Info,
    Warning,
    Error,
}

/// Event emitted by the interface indexer.
#[derive(Debug, Clone)]
pub enum IndexEvent
{
    /// A phase started, completed, or failed.
    PhaseTransition
    {
        phase: Phase,
        state: PhaseState,
    },
    /// Record extraction from a metadata section began.
    ExtractionStarted
    {
        section: MetadataSection,
    },
    /// Record extraction finished with `count` records.
    ExtractionCompleted
    {
        section: MetadataSection,
        count: usize,
    },
    /// Record extraction failed; the record list was replaced with empty.
    ExtractionFailed
    {
        section: MetadataSection,
        error: String,
    },
    /// Type indexing pass began over `count` records.
    TypeIndexingStarted
    {
        count: usize,
    },
    TypeIndexingCompleted
    {
        indexed: usize,
    },
    ProtocolIndexingStarted
    {
        count: usize,
    },
    /// A single protocol record was linked into the graph.
    ProtocolProcessed
    {
        name: String,
    },
    ProtocolIndexingCompleted
    {
        indexed: usize,
    },
    ConformanceIndexingStarted
    {
        count: usize,
    },
    ConformanceIndexingCompleted
    {
        indexed: usize,
    },
    ExtensionIndexingStarted
    {
        count: usize,
    },
    ExtensionIndexingCompleted
    {
        indexed: usize,
    },
    /// A single record could not be turned into a definition.
    TypeProcessingFailed
    {
        name: String,
        error: String,
    },
    ProtocolProcessingFailed
    {
        name: String,
        error: String,
    },
    ConformanceProcessingFailed
    {
        type_name: String,
        error: String,
    },
    /// A name could not be extracted from a record; the record was skipped.
    NameExtractionWarning
    {
        section: MetadataSection,
        detail: String,
    },
    /// Free-form diagnostic.
    Diagnostic
    {
        level: DiagnosticLevel,
        message: String,
    },
}

impl IndexEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            IndexEvent::PhaseTransition { phase, state } => match state {
                PhaseState::Started => format!("phase {} started", phase.name()),
                PhaseState::Completed => format!("phase {} completed", phase.name()),
                PhaseState::Failed(err) => format!("phase {} failed: {err}", phase.name()),
            },
            IndexEvent::ExtractionStarted { section } => {
                format!("extracting {}", section.section_name())
            }
            IndexEvent::ExtractionCompleted { section, count } => {
                format!("extracted {count} records from {}", section.section_name())
            }
            IndexEvent::ExtractionFailed { section, error } => {
                format!("extraction of {} failed: {error}", section.section_name())
            }
            IndexEvent::TypeIndexingStarted { count } => format!("indexing {count} types"),
            IndexEvent::TypeIndexingCompleted { indexed } => format!("indexed {indexed} types"),
            IndexEvent::ProtocolIndexingStarted { count } => format!("indexing {count} protocols"),
            IndexEvent::ProtocolProcessed { name } => format!("protocol {name} processed"),
            IndexEvent::ProtocolIndexingCompleted { indexed } => {
                format!("indexed {indexed} protocols")
            }
            IndexEvent::ConformanceIndexingStarted { count } => {
                format!("indexing {count} conformances")
            }
            IndexEvent::ConformanceIndexingCompleted { indexed } => {
                format!("indexed {indexed} conformances")
            }
            IndexEvent::ExtensionIndexingStarted { count } => {
                format!("indexing {count} extension groups")
            }
            IndexEvent::ExtensionIndexingCompleted { indexed } => {
                format!("indexed {indexed} extensions")
            }
            IndexEvent::TypeProcessingFailed { name, error } => {
                format!("type {name} failed: {error}")
            }
            IndexEvent::ProtocolProcessingFailed { name, error } => {
                format!("protocol {name} failed: {error}")
            }
            IndexEvent::ConformanceProcessingFailed { type_name, error } => {
                format!("conformance for {type_name} failed: {error}")
            }
            IndexEvent::NameExtractionWarning { section, detail } => {
                format!("name extraction in {}: {detail}", section.section_name())
            }
            IndexEvent::Diagnostic { level, message } => {
                format!("{level:?}: {message}")
            }
        }
    }
}

impl fmt::Display for IndexEvent
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.describe())
    }
}

/// Observer callback registered with the dispatcher.
pub type EventHandler = Arc<dyn Fn(&IndexEvent) + Send + Sync>;

/// Fire-and-forget observer bus.
///
/// Cloning shares the handler list. Handlers registered after an event was
/// emitted do not see it; there is no replay buffer.
#[derive(Clone, Default)]
pub struct EventDispatcher
{
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventDispatcher
{
    /// Create a dispatcher with no observers.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Create a dispatcher that forwards every event to `tracing` at debug
    /// level (warnings and failures at warn).
    #[must_use]
    pub fn with_tracing() -> Self
    {
        let dispatcher = Self::new();
        dispatcher.subscribe(|event| match event {
            IndexEvent::ExtractionFailed { .. }
            | IndexEvent::TypeProcessingFailed { .. }
            | IndexEvent::ProtocolProcessingFailed { .. }
            | IndexEvent::ConformanceProcessingFailed { .. }
            | IndexEvent::NameExtractionWarning { .. } => {
                tracing::warn!(target: "resurface::events", "{event}");
            }
            _ => tracing::debug!(target: "resurface::events", "{event}"),
        });
        dispatcher
    }

    /// Register an observer. Handlers run synchronously on the emitting
    /// thread, in registration order.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&IndexEvent) + Send + Sync + 'static,
    {
        self.handlers.write().unwrap().push(Arc::new(handler));
    }

    /// Emit an event to every registered observer.
    pub fn emit(&self, event: IndexEvent)
    {
        let handlers = self.handlers.read().unwrap().clone();
        for handler in &handlers {
            handler(&event);
        }
    }
}

impl fmt::Debug for EventDispatcher
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("EventDispatcher").field("handlers", &count).finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_reaches_all_handlers_in_order()
    {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let first = seen.clone();
        dispatcher.subscribe(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = seen.clone();
        dispatcher.subscribe(move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        });

        dispatcher.emit(IndexEvent::TypeIndexingStarted { count: 3 });
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn describe_phase_transitions()
    {
        let started = IndexEvent::PhaseTransition {
            phase: Phase::Types,
            state: PhaseState::Started,
        };
        assert_eq!(started.describe(), "phase types started");

        let failed = IndexEvent::PhaseTransition {
            phase: Phase::Extensions,
            state: PhaseState::Failed("boom".into()),
        };
        assert_eq!(failed.describe(), "phase extensions failed: boom");
    }
}
