//! # Interface Indexer
//!
//! The per-image pipeline that fuses metadata records with the symbol
//! index into a definition graph: types with their nesting, protocols,
//! synthesized extensions, and the two flat global lists.
//!
//! [`InterfaceIndexer::prepare`] runs extraction plus five phases in
//! declared order (types → protocols → conformances → extensions →
//! globals), each wrapped in a started/completed-or-failed event pair.
//! Extraction and per-record failures are recoverable; the only fatal
//! condition is an uncaught phase error, which is re-thrown from
//! `prepare` after its failure event.
//!
//! ## Module Structure
//!
//! - **`definitions`**: the definition graph and member definition types
//! - **`builders`**: folding member symbols into declarations
//! - **`conformance`**: resilient-witness resolution and the bounded pool
//!
//! ## Concurrency
//!
//! Each storage field is guarded by its own mutex. A phase owns exclusive
//! write access to the fields it targets; cross-phase reads happen only
//! after the earlier phase completed. The one parallel section is the
//! conformance follow-up pass at the end of the extensions phase.

pub mod builders;
pub mod conformance;
pub mod definitions;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::{IndexMap, IndexSet};

use crate::demangle::{demangle, demangle_type, interface_type_name, Node, NodeKind, NodeRef, StructuralKey};
use crate::error::{ResurfaceError, Result};
use crate::events::{DiagnosticLevel, EventDispatcher, IndexEvent, MetadataSection, Phase, PhaseState};
use crate::metadata::{AssociatedTypeRecord, ConformanceRecord, ContextKind, MetadataSource, ParentRef, ProtocolRecord, TypeRecord};
use crate::symbols::{GlobalKind, MemberBucket, MemberKind, Storage};
use crate::types::InterfaceIndexConfiguration;

pub use definitions::{
    Accessor, AccessorKind, ExtensionContext, ExtensionDefinition, ExtensionKind, ExtensionName, FieldDefinition,
    FunctionDefinition, FunctionKind, MemberSet, ParentContext, ProtocolDefinition, SubscriptDefinition,
    TypeDefinition, TypeKind, TypeMembers, VariableDefinition,
};

/// Cooperative cancellation flag.
///
/// Cancellation propagates from [`InterfaceIndexer::prepare`] to every
/// suspendable child. A cancelled run leaves the storage in the state
/// reached at the last completed phase; nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken
{
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self)
    {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Error out if cancellation was requested.
    pub fn check(&self) -> Result<()>
    {
        if self.is_cancelled() {
            Err(ResurfaceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The member buckets that identify extension-hosted symbols. This list is
/// the authoritative outer iteration order for the extensions phase; it is
/// a fixed slice precisely so the grouping never depends on hash order.
const EXTENSION_MEMBER_KINDS: &[MemberKind] = &[
    MemberKind::Allocator { in_extension: true },
    MemberKind::Variable {
        in_extension: true,
        is_static: false,
        is_storage: false,
    },
    MemberKind::Variable {
        in_extension: true,
        is_static: true,
        is_storage: false,
    },
    MemberKind::Variable {
        in_extension: true,
        is_static: true,
        is_storage: true,
    },
    MemberKind::Function {
        in_extension: true,
        is_static: false,
    },
    MemberKind::Function {
        in_extension: true,
        is_static: true,
    },
    MemberKind::Subscript {
        in_extension: true,
        is_static: false,
    },
    MemberKind::Subscript {
        in_extension: true,
        is_static: true,
    },
];

/// Dedup key for synthesized extensions: target, kind, and signature.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SynthesisKey(StructuralKey, ExtensionKind, Option<StructuralKey>);

#[derive(Default)]
struct IndexerStorage
{
    all_type_definitions: Mutex<IndexMap<String, Arc<TypeDefinition>>>,
    root_type_definitions: Mutex<Vec<Arc<TypeDefinition>>>,
    all_protocol_definitions: Mutex<IndexMap<String, Arc<ProtocolDefinition>>>,
    root_protocol_definitions: Mutex<Vec<Arc<ProtocolDefinition>>>,
    type_extension_definitions: Mutex<Vec<Arc<ExtensionDefinition>>>,
    conformance_extension_definitions: Mutex<Vec<Arc<ExtensionDefinition>>>,
    protocol_conformances_by_type_name: Mutex<IndexMap<String, IndexMap<String, Arc<ConformanceRecord>>>>,
    conforming_types_by_protocol_name: Mutex<IndexMap<String, IndexSet<String>>>,
    associated_types_by_type_name: Mutex<IndexMap<String, IndexMap<String, Arc<AssociatedTypeRecord>>>>,
    global_variable_definitions: Mutex<Vec<VariableDefinition>>,
    global_function_definitions: Mutex<Vec<FunctionDefinition>>,
    synthesized: Mutex<IndexMap<SynthesisKey, Arc<ExtensionDefinition>>>,
}

/// The interface indexer. See the module docs for phase semantics.
pub struct InterfaceIndexer
{
    config: InterfaceIndexConfiguration,
    events: EventDispatcher,
    storage: IndexerStorage,
}

impl InterfaceIndexer
{
    pub fn new(config: InterfaceIndexConfiguration, events: EventDispatcher) -> Self
    {
        Self {
            config,
            events,
            storage: IndexerStorage::default(),
        }
    }

    /// Run extraction and all indexing phases.
    ///
    /// Idempotent: a second call (after success or a partial failure)
    /// rebuilds the storage from scratch and, over the same inputs, yields
    /// the same final state.
    pub fn prepare(&self, source: &dyn MetadataSource, symbols: &Storage, token: &CancellationToken) -> Result<()>
    {
        self.reset();

        let types = self.extract(MetadataSection::Types, || source.types());
        let protocols = self.extract(MetadataSection::Protocols, || source.protocols());
        let conformances = self.extract(MetadataSection::ProtocolConformances, || source.protocol_conformances());
        let associated_types = self.extract(MetadataSection::AssociatedTypes, || source.associated_types());

        self.run_phase(Phase::Types, token, || self.index_types(types))?;
        self.run_phase(Phase::Protocols, token, || self.index_protocols(protocols))?;
        self.run_phase(Phase::Conformances, token, || self.index_conformances(conformances, associated_types))?;
        self.run_phase(Phase::Extensions, token, || self.index_extensions(symbols, token))?;
        self.run_phase(Phase::Globals, token, || self.index_globals(symbols))?;
        Ok(())
    }

    fn reset(&self)
    {
        self.storage.all_type_definitions.lock().unwrap().clear();
        self.storage.root_type_definitions.lock().unwrap().clear();
        self.storage.all_protocol_definitions.lock().unwrap().clear();
        self.storage.root_protocol_definitions.lock().unwrap().clear();
        self.storage.type_extension_definitions.lock().unwrap().clear();
        self.storage.conformance_extension_definitions.lock().unwrap().clear();
        self.storage.protocol_conformances_by_type_name.lock().unwrap().clear();
        self.storage.conforming_types_by_protocol_name.lock().unwrap().clear();
        self.storage.associated_types_by_type_name.lock().unwrap().clear();
        self.storage.global_variable_definitions.lock().unwrap().clear();
        self.storage.global_function_definitions.lock().unwrap().clear();
        self.storage.synthesized.lock().unwrap().clear();
    }

    /// Phase 0: pull one record list, downgrading failure to an empty list.
    fn extract<T, F>(&self, section: MetadataSection, pull: F) -> Vec<T>
    where
        F: FnOnce() -> Result<Vec<T>>,
    {
        self.events.emit(IndexEvent::ExtractionStarted { section });
        match pull() {
            Ok(records) => {
                self.events.emit(IndexEvent::ExtractionCompleted {
                    section,
                    count: records.len(),
                });
                records
            }
            Err(err) => {
                self.events.emit(IndexEvent::ExtractionFailed {
                    section,
                    error: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    fn run_phase<F>(&self, phase: Phase, token: &CancellationToken, body: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        token.check()?;
        self.events.emit(IndexEvent::PhaseTransition {
            phase,
            state: PhaseState::Started,
        });
        match body() {
            Ok(()) => {
                self.events.emit(IndexEvent::PhaseTransition {
                    phase,
                    state: PhaseState::Completed,
                });
                Ok(())
            }
            Err(ResurfaceError::Cancelled) => Err(ResurfaceError::Cancelled),
            Err(err) => {
                self.events.emit(IndexEvent::PhaseTransition {
                    phase,
                    state: PhaseState::Failed(err.to_string()),
                });
                Err(ResurfaceError::IndexingPhase {
                    phase: phase.name(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn warn(&self, message: impl Into<String>)
    {
        self.events.emit(IndexEvent::Diagnostic {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        });
    }

    /// Phase 1: build type definitions and resolve their nesting.
    fn index_types(&self, records: Vec<TypeRecord>) -> Result<()>
    {
        self.events.emit(IndexEvent::TypeIndexingStarted { count: records.len() });

        let mut working: IndexMap<String, Arc<TypeDefinition>> = IndexMap::new();
        for record in records {
            if !self.config.show_c_imported_types && record.context.is_c_imported {
                continue;
            }
            let name = record.context.name.clone().unwrap_or_default();
            match TypeDefinition::from_record(record) {
                Some(definition) => {
                    working.insert(definition.type_name().to_string(), definition);
                }
                None => {
                    self.events.emit(IndexEvent::NameExtractionWarning {
                        section: MetadataSection::Types,
                        detail: format!("could not resolve a type name for record {name:?}"),
                    });
                }
            }
        }

        for definition in working.values() {
            self.link_type_parent(definition, &working);
        }

        let roots: Vec<Arc<TypeDefinition>> = working.values().filter(|d| d.is_root()).cloned().collect();

        for definition in working.values() {
            match definition.parent_context() {
                Some(ParentContext::Extension(context)) => {
                    let node = Node::new(NodeKind::Type, vec![context.extended_node.clone()]);
                    if let Some(extension) =
                        self.synthesized_extension(&node, context.generic_signature.clone(), MetadataSection::Types)
                    {
                        extension.adopt_type(definition);
                    }
                }
                Some(ParentContext::Symbol(symbol)) => {
                    let Some(payload) = demangle(symbol).ok().and_then(|root| root.first_child().cloned()) else {
                        self.events.emit(IndexEvent::NameExtractionWarning {
                            section: MetadataSection::Types,
                            detail: format!("could not demangle foreign parent symbol {symbol}"),
                        });
                        continue;
                    };
                    let node = Node::new(NodeKind::Type, vec![payload]);
                    if let Some(extension) = self.synthesized_extension(&node, None, MetadataSection::Types) {
                        extension.adopt_type(definition);
                    }
                }
                _ => {}
            }
        }

        let indexed = working.len();
        *self.storage.all_type_definitions.lock().unwrap() = working;
        *self.storage.root_type_definitions.lock().unwrap() = roots;
        self.events.emit(IndexEvent::TypeIndexingCompleted { indexed });
        Ok(())
    }

    /// Walk a definition's context chain to its first type, extension, or
    /// symbol terminator. Module contexts end the walk (the definition is a
    /// root); anonymous and opaque contexts are stepped over.
    fn link_type_parent(&self, definition: &Arc<TypeDefinition>, working: &IndexMap<String, Arc<TypeDefinition>>)
    {
        let mut current = definition.record().context.parent.clone();
        loop {
            match current {
                None => return,
                Some(ParentRef::Symbol(name)) => {
                    definition.set_parent_context(ParentContext::Symbol(name));
                    return;
                }
                Some(ParentRef::Context(record)) => match record.kind {
                    ContextKind::Module => return,
                    ContextKind::Anonymous | ContextKind::OpaqueType => {
                        current = record.parent.clone();
                    }
                    ContextKind::Extension => {
                        match ExtensionContext::resolve(&record) {
                            Some(context) => definition.set_parent_context(ParentContext::Extension(context)),
                            None => self.events.emit(IndexEvent::NameExtractionWarning {
                                section: MetadataSection::Types,
                                detail: format!(
                                    "could not resolve the extended context of the extension hosting {}",
                                    definition.type_name()
                                ),
                            }),
                        }
                        return;
                    }
                    _ => {
                        let parent_name = definitions::context_nominal_node(&record).map(|node| interface_type_name(&node));
                        match parent_name.as_deref().and_then(|name| working.get(name)) {
                            Some(parent) => TypeDefinition::set_parent(definition, parent),
                            None => definition.set_parent_context(ParentContext::Type(record)),
                        }
                        return;
                    }
                },
            }
        }
    }

    /// Phase 2: build protocol definitions and resolve their hosting.
    fn index_protocols(&self, records: Vec<ProtocolRecord>) -> Result<()>
    {
        self.events.emit(IndexEvent::ProtocolIndexingStarted { count: records.len() });
        let types = self.storage.all_type_definitions.lock().unwrap().clone();

        let mut all: IndexMap<String, Arc<ProtocolDefinition>> = IndexMap::new();
        let mut roots: Vec<Arc<ProtocolDefinition>> = Vec::new();

        for record in records {
            let raw_name = record.context.name.clone().unwrap_or_default();
            let Some(definition) = ProtocolDefinition::from_record(record) else {
                self.events.emit(IndexEvent::NameExtractionWarning {
                    section: MetadataSection::Protocols,
                    detail: format!("could not resolve a protocol name for record {raw_name:?}"),
                });
                continue;
            };

            self.link_protocol_parent(&definition, &types);
            if definition.is_root() {
                roots.push(definition.clone());
            }
            self.events.emit(IndexEvent::ProtocolProcessed {
                name: definition.name().to_string(),
            });
            all.insert(definition.name().to_string(), definition);
        }

        let indexed = all.len();
        *self.storage.all_protocol_definitions.lock().unwrap() = all;
        *self.storage.root_protocol_definitions.lock().unwrap() = roots;
        self.events.emit(IndexEvent::ProtocolIndexingCompleted { indexed });
        Ok(())
    }

    fn link_protocol_parent(&self, definition: &Arc<ProtocolDefinition>, types: &IndexMap<String, Arc<TypeDefinition>>)
    {
        let mut current = definition.record().context.parent.clone();
        loop {
            match current {
                None => return,
                Some(ParentRef::Symbol(_)) => return,
                Some(ParentRef::Context(record)) => match record.kind {
                    ContextKind::Module => return,
                    ContextKind::Anonymous | ContextKind::OpaqueType => {
                        current = record.parent.clone();
                    }
                    ContextKind::Extension => {
                        if let Some(context) = ExtensionContext::resolve(&record) {
                            definition.set_extension_context(context.clone());
                            let node = Node::new(NodeKind::Type, vec![context.extended_node.clone()]);
                            if let Some(extension) =
                                self.synthesized_extension(&node, context.generic_signature, MetadataSection::Protocols)
                            {
                                extension.adopt_protocol(definition);
                            }
                        } else {
                            self.events.emit(IndexEvent::NameExtractionWarning {
                                section: MetadataSection::Protocols,
                                detail: format!(
                                    "could not resolve the extended context of the extension hosting {}",
                                    definition.name()
                                ),
                            });
                        }
                        return;
                    }
                    _ => {
                        let parent_name = definitions::context_nominal_node(&record).map(|node| interface_type_name(&node));
                        if let Some(parent) = parent_name.as_deref().and_then(|name| types.get(name)) {
                            definition.set_parent(parent);
                            parent.adopt_protocol(definition);
                        }
                        return;
                    }
                },
            }
        }
    }

    /// Synthesize (or reuse) an extension for a nesting target. One
    /// definition exists per (target, kind, signature).
    fn synthesized_extension(
        &self,
        type_node: &NodeRef,
        generic_signature: Option<NodeRef>,
        section: MetadataSection,
    ) -> Option<Arc<ExtensionDefinition>>
    {
        let Some(kind) = extension_kind_for(type_node) else {
            self.events.emit(IndexEvent::NameExtractionWarning {
                section,
                detail: format!("extension target {} is not a nominal context", interface_type_name(type_node)),
            });
            return None;
        };
        let key = SynthesisKey(
            StructuralKey(type_node.clone()),
            kind,
            generic_signature.clone().map(StructuralKey),
        );
        let mut synthesized = self.storage.synthesized.lock().unwrap();
        if let Some(existing) = synthesized.get(&key) {
            return Some(existing.clone());
        }
        let extension = ExtensionDefinition::with_parts(
            ExtensionName {
                node: type_node.clone(),
                kind,
            },
            generic_signature,
            None,
            None,
            MemberSet::default(),
        );
        synthesized.insert(key, extension.clone());
        self.storage.type_extension_definitions.lock().unwrap().push(extension.clone());
        Some(extension)
    }

    /// Phase 3: fuse conformances and associated types into extensions.
    fn index_conformances(
        &self,
        conformances: Vec<Arc<ConformanceRecord>>,
        associated_types: Vec<Arc<AssociatedTypeRecord>>,
    ) -> Result<()>
    {
        self.events.emit(IndexEvent::ConformanceIndexingStarted {
            count: conformances.len(),
        });

        let mut by_type: IndexMap<String, IndexMap<String, Arc<ConformanceRecord>>> = IndexMap::new();
        let mut by_protocol: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut nodes_by_type: IndexMap<String, NodeRef> = IndexMap::new();

        for conformance in conformances {
            let Ok(node) = demangle_type(&conformance.type_mangling) else {
                self.events.emit(IndexEvent::ConformanceProcessingFailed {
                    type_name: conformance.type_mangling.clone(),
                    error: "could not demangle the conforming type reference".to_string(),
                });
                continue;
            };
            let type_node = Node::new(NodeKind::Type, vec![node]);
            let type_name = interface_type_name(&type_node);
            let protocol_name = conformance.protocol_name.clone();
            nodes_by_type.entry(type_name.clone()).or_insert(type_node);
            by_type.entry(type_name.clone()).or_default().insert(protocol_name.clone(), conformance);
            by_protocol.entry(protocol_name).or_default().insert(type_name);
        }

        let mut assoc_by_type: IndexMap<String, IndexMap<String, Arc<AssociatedTypeRecord>>> = IndexMap::new();
        for record in associated_types {
            let Ok(node) = demangle_type(&record.conforming_type_mangling) else {
                self.events.emit(IndexEvent::NameExtractionWarning {
                    section: MetadataSection::AssociatedTypes,
                    detail: format!("could not demangle {}", record.conforming_type_mangling),
                });
                continue;
            };
            let type_node = Node::new(NodeKind::Type, vec![node]);
            let type_name = interface_type_name(&type_node);
            nodes_by_type.entry(type_name.clone()).or_insert(type_node);
            assoc_by_type.entry(type_name).or_default().insert(record.protocol_name.clone(), record);
        }

        // Associated types are consumed exclusively by their matching
        // conformance; whatever is left over afterwards still yields an
        // extension of its own.
        let mut unconsumed = assoc_by_type.clone();
        let mut extensions: Vec<Arc<ExtensionDefinition>> = Vec::new();
        let mut indexed = 0usize;

        for (type_name, protocols) in &by_type {
            let Some(type_node) = nodes_by_type.get(type_name) else { continue };
            let Some(kind) = extension_kind_for(type_node) else {
                self.warn(format!("conforming type {type_name} is not a nominal context"));
                continue;
            };
            for (protocol_name, conformance) in protocols {
                let generic_signature = conformance
                    .conditional_requirements_mangling
                    .as_deref()
                    .and_then(|mangling| demangle_type(mangling).ok());
                let associated_type = unconsumed.get_mut(type_name).and_then(|by_protocol| by_protocol.shift_remove(protocol_name));
                extensions.push(ExtensionDefinition::with_parts(
                    ExtensionName {
                        node: type_node.clone(),
                        kind,
                    },
                    generic_signature,
                    Some(conformance.clone()),
                    associated_type,
                    MemberSet::default(),
                ));
                indexed += 1;
            }
        }

        for (type_name, by_protocol) in unconsumed {
            let Some(type_node) = nodes_by_type.get(&type_name) else { continue };
            let Some(kind) = extension_kind_for(type_node) else { continue };
            for (_, record) in by_protocol {
                extensions.push(ExtensionDefinition::with_parts(
                    ExtensionName {
                        node: type_node.clone(),
                        kind,
                    },
                    None,
                    None,
                    Some(record),
                    MemberSet::default(),
                ));
            }
        }

        *self.storage.protocol_conformances_by_type_name.lock().unwrap() = by_type;
        *self.storage.conforming_types_by_protocol_name.lock().unwrap() = by_protocol;
        *self.storage.associated_types_by_type_name.lock().unwrap() = assoc_by_type;
        *self.storage.conformance_extension_definitions.lock().unwrap() = extensions;
        self.events.emit(IndexEvent::ConformanceIndexingCompleted { indexed });
        Ok(())
    }

    /// Phase 4: synthesize extensions from extension-classified member
    /// symbols, then index the conformance extensions on the bounded pool.
    fn index_extensions(&self, symbols: &Storage, token: &CancellationToken) -> Result<()>
    {
        let groups = symbols.member_symbols_by_type_node(MemberBucket::Members, EXTENSION_MEMBER_KINDS, &HashSet::new());
        self.events.emit(IndexEvent::ExtensionIndexingStarted { count: groups.len() });

        let mut indexed = 0usize;
        for (node_key, group) in groups {
            token.check()?;
            let Some(info) = symbols.type_info(&group.type_name) else {
                self.warn(format!("no type info recorded for extension target {}", group.type_name));
                continue;
            };
            let kind = match info.kind {
                crate::types::TypeInfoKind::Enum => ExtensionKind::Type(TypeKind::Enum),
                crate::types::TypeInfoKind::Struct => ExtensionKind::Type(TypeKind::Struct),
                crate::types::TypeInfoKind::Class => ExtensionKind::Type(TypeKind::Class),
                crate::types::TypeInfoKind::Protocol => ExtensionKind::Protocol,
                crate::types::TypeInfoKind::TypeAlias => ExtensionKind::TypeAlias,
            };

            // Variables carrying a dependent generic signature split into
            // one extension per signature; everything else shares the
            // unsigned group.
            let mut partitions: IndexMap<Option<StructuralKey>, IndexMap<MemberKind, Vec<_>>> = IndexMap::new();
            for (member_kind, member_symbols) in &group.by_kind {
                let is_variable = matches!(member_kind, MemberKind::Variable { .. });
                for symbol in member_symbols {
                    let signature = if is_variable {
                        Node::find_first(symbol.node(), NodeKind::DependentGenericSignature).map(StructuralKey)
                    } else {
                        None
                    };
                    partitions.entry(signature).or_default().entry(*member_kind).or_default().push(symbol.clone());
                }
            }

            for (signature, by_kind) in partitions {
                let members =
                    builders::build_member_set_from_buckets(&by_kind, &HashSet::new(), &builders::MethodDescriptorLookup::new());
                let extension = ExtensionDefinition::with_parts(
                    ExtensionName {
                        node: node_key.node().clone(),
                        kind,
                    },
                    signature.map(|key| key.0),
                    None,
                    None,
                    members,
                );
                self.storage.type_extension_definitions.lock().unwrap().push(extension);
                indexed += 1;
            }
        }
        self.events.emit(IndexEvent::ExtensionIndexingCompleted { indexed });

        let conformance_extensions = self.storage.conformance_extension_definitions.lock().unwrap().clone();
        conformance::index_all(&conformance_extensions, symbols, token)
    }

    /// Phase 5: populate the flat global lists from the symbol index.
    fn index_globals(&self, symbols: &Storage) -> Result<()>
    {
        let globals = symbols.globals_by_kind();
        let lookup = builders::MethodDescriptorLookup::new();
        let no_fields = HashSet::new();

        let mut variable_symbols = Vec::new();
        for kind in [GlobalKind::Variable { is_storage: true }, GlobalKind::Variable { is_storage: false }] {
            if let Some(bucket) = globals.get(&kind) {
                variable_symbols.extend(bucket.iter().cloned());
            }
        }
        let variables = builders::build_variables(&variable_symbols, &no_fields, &lookup, true);

        let function_symbols: Vec<_> = globals.get(&GlobalKind::Function).cloned().unwrap_or_default();
        let functions = builders::build_functions(&function_symbols, &lookup, true);

        *self.storage.global_variable_definitions.lock().unwrap() = variables;
        *self.storage.global_function_definitions.lock().unwrap() = functions;
        Ok(())
    }

    // Storage accessors. All return clones of the shared handles; callers
    // never observe a partially written phase.

    pub fn all_type_definitions(&self) -> Vec<Arc<TypeDefinition>>
    {
        self.storage.all_type_definitions.lock().unwrap().values().cloned().collect()
    }

    pub fn root_type_definitions(&self) -> Vec<Arc<TypeDefinition>>
    {
        self.storage.root_type_definitions.lock().unwrap().clone()
    }

    pub fn all_protocol_definitions(&self) -> Vec<Arc<ProtocolDefinition>>
    {
        self.storage.all_protocol_definitions.lock().unwrap().values().cloned().collect()
    }

    pub fn root_protocol_definitions(&self) -> Vec<Arc<ProtocolDefinition>>
    {
        self.storage.root_protocol_definitions.lock().unwrap().clone()
    }

    pub fn type_extension_definitions(&self) -> Vec<Arc<ExtensionDefinition>>
    {
        self.storage.type_extension_definitions.lock().unwrap().clone()
    }

    pub fn conformance_extension_definitions(&self) -> Vec<Arc<ExtensionDefinition>>
    {
        self.storage.conformance_extension_definitions.lock().unwrap().clone()
    }

    pub fn protocol_conformances_by_type_name(&self) -> IndexMap<String, IndexMap<String, Arc<ConformanceRecord>>>
    {
        self.storage.protocol_conformances_by_type_name.lock().unwrap().clone()
    }

    pub fn conforming_types_by_protocol_name(&self) -> IndexMap<String, IndexSet<String>>
    {
        self.storage.conforming_types_by_protocol_name.lock().unwrap().clone()
    }

    pub fn associated_types_by_type_name(&self) -> IndexMap<String, IndexMap<String, Arc<AssociatedTypeRecord>>>
    {
        self.storage.associated_types_by_type_name.lock().unwrap().clone()
    }

    pub fn global_variable_definitions(&self) -> Vec<VariableDefinition>
    {
        self.storage.global_variable_definitions.lock().unwrap().clone()
    }

    pub fn global_function_definitions(&self) -> Vec<FunctionDefinition>
    {
        self.storage.global_function_definitions.lock().unwrap().clone()
    }

    /// The event bus this indexer emits on.
    pub fn events(&self) -> &EventDispatcher
    {
        &self.events
    }
}

/// Map a type node (or bare nominal) to the extension kind of its target.
fn extension_kind_for(node: &NodeRef) -> Option<ExtensionKind>
{
    let nominal = if node.kind() == NodeKind::Type {
        node.first_child()?
    } else {
        node
    };
    match nominal.kind() {
        NodeKind::Structure => Some(ExtensionKind::Type(TypeKind::Struct)),
        NodeKind::Enum => Some(ExtensionKind::Type(TypeKind::Enum)),
        NodeKind::Class => Some(ExtensionKind::Type(TypeKind::Class)),
        NodeKind::Protocol => Some(ExtensionKind::Protocol),
        NodeKind::TypeAlias => Some(ExtensionKind::TypeAlias),
        _ => None,
    }
}
