//! Conformance-extension indexing.
//!
//! Resolves the resilient witnesses of a protocol conformance into member
//! symbols of the extension. Resolution tries, in order: a structural match
//! of the implementation symbol's protocol-conformance type node against
//! the extension's target, a textual type-name match, a primitive-name
//! rewrite, and finally the witness's requirement (a bound symbol, or an
//! element with a default implementation). Witnesses that survive none of
//! these are recorded as missing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::demangle::{demangle, interface_type_name, Node, NodeKind, NodeRef};
use crate::error::Result;
use crate::metadata::WitnessRequirement;
use crate::symbols::Storage;
use crate::types::{IndexedSymbol, Symbol};

use super::builders::{self, MethodDescriptorLookup};
use super::definitions::ExtensionDefinition;
use super::CancellationToken;

/// Standard-library types whose interface names appear both qualified and
/// shorthand. Consulted only after structural and textual matching fail.
const PRIMITIVE_ALIASES: &[(&str, &str)] = &[
    ("Swift.Int", "Int"),
    ("Swift.UInt", "UInt"),
    ("Swift.String", "String"),
    ("Swift.Bool", "Bool"),
    ("Swift.Double", "Double"),
    ("Swift.Float", "Float"),
    ("Swift.Optional", "Optional"),
    ("Swift.Array", "Array"),
    ("Swift.Dictionary", "Dictionary"),
];

fn primitive_alias(name: &str) -> Option<&'static str>
{
    PRIMITIVE_ALIASES
        .iter()
        .find_map(|(qualified, short)| (*qualified == name).then_some(*short).or((*short == name).then_some(*qualified)))
}

/// Index one conformance extension: resolve every resilient witness and
/// route the resolved symbols into the extension's member set.
pub(super) fn index_conformance(extension: &ExtensionDefinition, storage: &Storage)
{
    let Some(conformance) = extension.protocol_conformance().cloned() else {
        return;
    };
    if conformance.resilient_witnesses.is_empty() {
        return;
    }

    let target = extension.name().node.clone();
    let target_name = extension.name().type_name();
    let mut visited: HashSet<u64> = HashSet::new();
    let mut resolved: Vec<Arc<IndexedSymbol>> = Vec::new();

    for witness in &conformance.resilient_witnesses {
        match resolve_witness(storage, witness, &target, &target_name, &mut visited) {
            Some(symbol) => resolved.push(symbol),
            None => extension.push_missing_witness(witness.clone()),
        }
    }

    if resolved.is_empty() {
        return;
    }
    let lookup = MethodDescriptorLookup::new();
    extension.set_members(builders::collect_member_set(resolved, &lookup));
}

fn resolve_witness(
    storage: &Storage,
    witness: &crate::metadata::ResilientWitness,
    target: &NodeRef,
    target_name: &str,
    visited: &mut HashSet<u64>,
) -> Option<Arc<IndexedSymbol>>
{
    if let Some(offset) = witness.impl_offset {
        if let Some(found) = match_symbols_at(storage, offset, target, target_name, visited) {
            return Some(found);
        }
    }
    match &witness.requirement {
        WitnessRequirement::Symbol { name } => {
            let root = demangle(name).ok()?;
            Some(IndexedSymbol::new(Symbol::new(0, name.clone(), None), root))
        }
        WitnessRequirement::Element {
            default_impl_offset, ..
        } => {
            let offset = (*default_impl_offset)?;
            match_symbols_at(storage, offset, target, target_name, visited).or_else(|| {
                // A default implementation with no conformance of its own
                // still names the member; take the first demangleable
                // symbol at its offset.
                storage.symbols_at_offset(offset).iter().find_map(|symbol| {
                    let node = storage.demangled_node(symbol)?;
                    Some(IndexedSymbol::new(symbol.clone(), node))
                })
            })
        }
    }
}

fn match_symbols_at(
    storage: &Storage,
    offset: u64,
    target: &NodeRef,
    target_name: &str,
    visited: &mut HashSet<u64>,
) -> Option<Arc<IndexedSymbol>>
{
    for symbol in storage.symbols_at_offset(offset) {
        let Some(root) = storage.demangled_node(symbol) else { continue };
        let Some(conformance) = Node::find_first(&root, NodeKind::ProtocolConformance) else {
            continue;
        };
        if !visited.insert(conformance.identity()) {
            continue;
        }
        let Some(conformance_type) = conformance.child(0) else { continue };

        let structural = conformance_type.structurally_equals(target);
        let matched = structural || {
            let conformance_name = interface_type_name(conformance_type);
            conformance_name == target_name
                || primitive_alias(&conformance_name).map(|alias| alias == target_name).unwrap_or(false)
                || primitive_alias(target_name).map(|alias| alias == conformance_name).unwrap_or(false)
        };
        if matched {
            return Some(IndexedSymbol::new(symbol.clone(), root));
        }
    }
    None
}

/// Index conformance extensions on a bounded worker pool.
///
/// At most `max(1, min(4, active CPUs))` extensions are in flight at once,
/// which bounds shared-cache contention. Work is handed out through an
/// atomic cursor; `ExtensionDefinition::index` is idempotent, so a racing
/// duplicate claim would be harmless anyway.
pub(super) fn index_all(
    extensions: &[Arc<ExtensionDefinition>],
    storage: &Storage,
    token: &CancellationToken,
) -> Result<()>
{
    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(4).max(1);

    if workers == 1 || extensions.len() <= 1 {
        for extension in extensions {
            token.check()?;
            extension.index(storage);
        }
        return Ok(());
    }

    let cursor = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if token.is_cancelled() {
                    return;
                }
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(extension) = extensions.get(index) else {
                    return;
                };
                extension.index(storage);
            });
        }
    });
    token.check()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn primitive_aliases_map_both_directions()
    {
        assert_eq!(primitive_alias("Swift.Int"), Some("Int"));
        assert_eq!(primitive_alias("Int"), Some("Swift.Int"));
        assert_eq!(primitive_alias("main.Foo"), None);
    }
}
