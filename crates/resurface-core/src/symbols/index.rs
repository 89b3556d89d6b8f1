//! The per-image symbol index.
//!
//! Turns the raw symbol table into a demangling-aware, multi-axis queryable
//! index. Built once per image ([`SymbolIndex::storage`] fills on first
//! use), thereafter read-only except for the observational `consumed` latch
//! on each [`IndexedSymbol`].
//!
//! Every consumer-visible map preserves insertion order: iteration over any
//! index map equals the order of first contact during the build, which makes
//! downstream output deterministic across runs.

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::classify::{classify_global, classify_member, is_global, GlobalKind, MemberClassification, MemberKind};
use crate::demangle::{demangle, is_language_symbol, NodeKind, NodeRef, StructuralKey};
use crate::macho::MachImage;
use crate::types::{IndexedSymbol, Symbol, TypeInfo};

/// kind → type name → type node → symbols, all insertion-ordered.
pub type MemberStore = IndexMap<MemberKind, IndexMap<String, IndexMap<StructuralKey, Vec<Arc<IndexedSymbol>>>>>;

/// Which member store a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberBucket
{
    /// Regular members.
    Members,
    /// Members reached through a method-descriptor symbol.
    MethodDescriptors,
    /// Members reached through a protocol-witness symbol.
    ProtocolWitnesses,
}

/// Members of one type, grouped per kind. Returned by the by-type-node query.
#[derive(Debug, Clone)]
pub struct TypeMemberSymbols
{
    /// Canonical interface name of the type.
    pub type_name: String,
    /// Symbols per member kind, in caller kind order then insertion order.
    pub by_kind: IndexMap<MemberKind, Vec<Arc<IndexedSymbol>>>,
}

/// The built index. See the module docs for the ordering guarantees.
#[derive(Default)]
pub struct Storage
{
    type_info_by_name: IndexMap<String, TypeInfo>,
    globals_by_kind: IndexMap<GlobalKind, Vec<Arc<IndexedSymbol>>>,
    opaque_type_descriptor_by_node: IndexMap<StructuralKey, Arc<IndexedSymbol>>,
    members_by_kind: MemberStore,
    method_descriptor_members: MemberStore,
    protocol_witness_members: MemberStore,
    all_by_kind: IndexMap<NodeKind, Vec<Arc<IndexedSymbol>>>,
    symbols_by_offset: IndexMap<u64, Vec<Symbol>>,
    demangled_node_by_symbol: IndexMap<Symbol, NodeRef>,
    symbol_by_name: IndexMap<String, Symbol>,
}

impl Storage
{
    /// Build the index from an image's symbol tables.
    pub fn build(image: &MachImage) -> Self
    {
        let mut storage = Storage::default();
        storage.collect(image);
        storage.classify();
        storage
    }

    /// Step 1: collect language symbols from the ordinary and exported
    /// tables, applying the shared-cache offset bias where it applies.
    fn collect(&mut self, image: &MachImage)
    {
        let cache = image.shared_cache();
        for symbol in image.symbols() {
            if !is_language_symbol(&symbol.name) {
                continue;
            }
            self.symbols_by_offset.entry(symbol.offset).or_default().push(symbol.clone());
            if let Some(cache) = cache {
                // Offsets of exactly 0 never index into the cache-adjusted
                // tables, so they get no second entry.
                if cache.is_file_representation && symbol.offset != 0 {
                    if let Some(adjusted) = symbol.offset.checked_sub(cache.shared_region_start) {
                        let biased = Symbol::new(adjusted, symbol.name.clone(), symbol.nlist);
                        self.symbols_by_offset.entry(adjusted).or_default().push(biased);
                    }
                }
            }
            // Last wins, but the map keeps the position of first contact.
            self.symbol_by_name.insert(symbol.name.clone(), symbol.clone());
        }

        for export in image.exports() {
            if !is_language_symbol(&export.name) || self.symbol_by_name.contains_key(&export.name) {
                continue;
            }
            let slid = Symbol::new(export.offset + image.image_start_offset(), export.name.clone(), None);
            self.symbols_by_offset.entry(export.offset).or_default().push(export.clone());
            self.symbols_by_offset.entry(slid.offset).or_default().push(slid);
            self.symbol_by_name.insert(export.name.clone(), export.clone());
        }
    }

    /// Step 2: demangle and classify each unique symbol.
    fn classify(&mut self)
    {
        let unique: Vec<Symbol> = self.symbol_by_name.values().cloned().collect();
        for symbol in unique {
            let root = match demangle(&symbol.name) {
                Ok(root) => root,
                Err(err) => {
                    tracing::debug!(symbol = %symbol.name, %err, "demangling failed; symbol kept offset-only");
                    continue;
                }
            };
            self.demangled_node_by_symbol.insert(symbol.clone(), root.clone());

            if root.kind() != NodeKind::Global {
                continue;
            }
            let Some(payload) = root.first_child().cloned() else {
                continue;
            };

            let indexed = IndexedSymbol::new(symbol.clone(), root.clone());
            self.all_by_kind.entry(payload.kind()).or_default().push(indexed.clone());

            if is_global(&payload) && !symbol.is_external() {
                if let Some(kind) = classify_global(&payload) {
                    self.globals_by_kind.entry(kind).or_default().push(indexed);
                }
                continue;
            }

            match payload.kind() {
                NodeKind::MethodDescriptor => {
                    if let Some(member) = payload.first_child().and_then(classify_member) {
                        self.type_info_by_name.entry(member.type_info.name.clone()).or_insert_with(|| member.type_info.clone());
                        Self::insert_member(&mut self.method_descriptor_members, &member, indexed);
                    }
                }
                NodeKind::ProtocolWitness => {
                    if let Some(member) = payload.first_child().and_then(classify_member) {
                        self.type_info_by_name.entry(member.type_info.name.clone()).or_insert_with(|| member.type_info.clone());
                        Self::insert_member(&mut self.protocol_witness_members, &member, indexed);
                    }
                }
                NodeKind::MergedFunction => {
                    // The classification node is the root's second child;
                    // malformed inputs may lack either child, so both
                    // accesses are guarded.
                    if let Some(member) = root.child(1).and_then(classify_member) {
                        self.type_info_by_name.entry(member.type_info.name.clone()).or_insert_with(|| member.type_info.clone());
                        Self::insert_member(&mut self.members_by_kind, &member, indexed);
                    }
                }
                NodeKind::OpaqueTypeDescriptor => {
                    let target = payload
                        .first_child()
                        .filter(|inner| inner.kind() == NodeKind::OpaqueReturnTypeOf)
                        .and_then(|inner| inner.first_child().cloned());
                    if let Some(target) = target {
                        if symbol.offset > 0 {
                            self.opaque_type_descriptor_by_node.insert(StructuralKey(target), indexed);
                        }
                    }
                }
                _ => {
                    if let Some(member) = classify_member(&payload) {
                        self.type_info_by_name.entry(member.type_info.name.clone()).or_insert_with(|| member.type_info.clone());
                        Self::insert_member(&mut self.members_by_kind, &member, indexed);
                    }
                }
            }
        }
    }

    fn insert_member(store: &mut MemberStore, member: &MemberClassification, indexed: Arc<IndexedSymbol>)
    {
        store
            .entry(member.kind)
            .or_default()
            .entry(member.type_name.clone())
            .or_default()
            .entry(StructuralKey(member.type_node.clone()))
            .or_default()
            .push(indexed);
    }

    fn store(&self, bucket: MemberBucket) -> &MemberStore
    {
        match bucket {
            MemberBucket::Members => &self.members_by_kind,
            MemberBucket::MethodDescriptors => &self.method_descriptor_members,
            MemberBucket::ProtocolWitnesses => &self.protocol_witness_members,
        }
    }

    /// Every indexed symbol, in classification order.
    pub fn all_symbols(&self) -> impl Iterator<Item = &Arc<IndexedSymbol>>
    {
        self.all_by_kind.values().flatten()
    }

    /// All root-payload buckets.
    pub fn symbols_by_kind(&self) -> &IndexMap<NodeKind, Vec<Arc<IndexedSymbol>>>
    {
        &self.all_by_kind
    }

    /// Symbols whose payload kind is one of `kinds`, in caller kind order.
    pub fn symbols_of_kinds(&self, kinds: &[NodeKind]) -> Vec<Arc<IndexedSymbol>>
    {
        let by_kind = self.symbols_by_kind();
        kinds
            .iter()
            .filter_map(|kind| by_kind.get(kind))
            .flatten()
            .cloned()
            .collect()
    }

    /// Nominal kind info recorded for a type name during classification.
    pub fn type_info(&self, name: &str) -> Option<&TypeInfo>
    {
        self.type_info_by_name.get(name)
    }

    /// Raw symbols recorded at an offset (file- or cache-relative).
    pub fn symbols_at_offset(&self, offset: u64) -> &[Symbol]
    {
        self.symbols_by_offset.get(&offset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Global symbols per kind, in insertion order.
    pub fn globals_by_kind(&self) -> &IndexMap<GlobalKind, Vec<Arc<IndexedSymbol>>>
    {
        &self.globals_by_kind
    }

    /// Opaque-type descriptors keyed by their target node.
    pub fn opaque_type_descriptors(&self) -> &IndexMap<StructuralKey, Arc<IndexedSymbol>>
    {
        &self.opaque_type_descriptor_by_node
    }

    /// Demangled tree for a symbol.
    ///
    /// Falls back to demangling on demand without touching shared state, so
    /// it is safe to call concurrently with other readers.
    pub fn demangled_node(&self, symbol: &Symbol) -> Option<NodeRef>
    {
        if let Some(node) = self.demangled_node_by_symbol.get(symbol) {
            return Some(node.clone());
        }
        demangle(&symbol.name).ok()
    }

    /// Member symbols of the given kinds across all types.
    pub fn member_symbols(&self, bucket: MemberBucket, kinds: &[MemberKind]) -> Vec<Arc<IndexedSymbol>>
    {
        let store = self.store(bucket);
        let mut result = Vec::new();
        for kind in kinds {
            if let Some(by_name) = store.get(kind) {
                for by_node in by_name.values() {
                    for symbols in by_node.values() {
                        result.extend(symbols.iter().cloned());
                    }
                }
            }
        }
        result
    }

    /// Member symbols of the given kinds for one type name.
    pub fn member_symbols_for_type(&self, bucket: MemberBucket, kinds: &[MemberKind], type_name: &str) -> Vec<Arc<IndexedSymbol>>
    {
        let store = self.store(bucket);
        let mut result = Vec::new();
        for kind in kinds {
            if let Some(by_node) = store.get(kind).and_then(|by_name| by_name.get(type_name)) {
                for symbols in by_node.values() {
                    result.extend(symbols.iter().cloned());
                }
            }
        }
        result
    }

    /// Member symbols of the given kinds for one `(type name, type node)`.
    pub fn member_symbols_for(
        &self,
        bucket: MemberBucket,
        kinds: &[MemberKind],
        type_name: &str,
        type_node: &NodeRef,
    ) -> Vec<Arc<IndexedSymbol>>
    {
        let key = StructuralKey(type_node.clone());
        let store = self.store(bucket);
        let mut result = Vec::new();
        for kind in kinds {
            if let Some(symbols) = store
                .get(kind)
                .and_then(|by_name| by_name.get(type_name))
                .and_then(|by_node| by_node.get(&key))
            {
                result.extend(symbols.iter().cloned());
            }
        }
        result
    }

    /// Per-kind member symbols for one `(type name, type node)`. The caller
    /// kind list drives the outer order.
    pub fn member_symbols_by_kind(
        &self,
        bucket: MemberBucket,
        kinds: &[MemberKind],
        type_name: &str,
        type_node: &NodeRef,
    ) -> IndexMap<MemberKind, Vec<Arc<IndexedSymbol>>>
    {
        let key = StructuralKey(type_node.clone());
        let store = self.store(bucket);
        let mut result = IndexMap::new();
        for kind in kinds {
            let symbols = store
                .get(kind)
                .and_then(|by_name| by_name.get(type_name))
                .and_then(|by_node| by_node.get(&key))
                .cloned()
                .unwrap_or_default();
            if !symbols.is_empty() {
                result.insert(*kind, symbols);
            }
        }
        result
    }

    /// All member symbols of the given kinds, grouped per owning type node.
    ///
    /// The caller kind list drives the outer iteration, which makes the
    /// resulting group order deterministic. Type names in `excluding` are
    /// skipped.
    pub fn member_symbols_by_type_node(
        &self,
        bucket: MemberBucket,
        kinds: &[MemberKind],
        excluding: &HashSet<String>,
    ) -> IndexMap<StructuralKey, TypeMemberSymbols>
    {
        let store = self.store(bucket);
        let mut result: IndexMap<StructuralKey, TypeMemberSymbols> = IndexMap::new();
        for kind in kinds {
            let Some(by_name) = store.get(kind) else { continue };
            for (type_name, by_node) in by_name {
                if excluding.contains(type_name) {
                    continue;
                }
                for (node_key, symbols) in by_node {
                    let entry = result.entry(node_key.clone()).or_insert_with(|| TypeMemberSymbols {
                        type_name: type_name.clone(),
                        by_kind: IndexMap::new(),
                    });
                    entry.by_kind.entry(*kind).or_default().extend(symbols.iter().cloned());
                }
            }
        }
        result
    }
}

/// Lazily built per-image symbol index.
///
/// The storage is computed once under the cell's lock and then published;
/// concurrent callers block until the first build finishes.
#[derive(Default)]
pub struct SymbolIndex
{
    storage: OnceCell<Storage>,
}

impl SymbolIndex
{
    /// Create an index with no storage built yet.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// The index storage for `image`, building it on first use.
    pub fn storage(&self, image: &MachImage) -> &Storage
    {
        self.storage.get_or_init(|| Storage::build(image))
    }

    /// The storage if it has already been built.
    pub fn built(&self) -> Option<&Storage>
    {
        self.storage.get()
    }
}
