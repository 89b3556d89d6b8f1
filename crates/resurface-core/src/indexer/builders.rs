//! Member definition builders.
//!
//! Each builder takes the indexed symbols of one member bucket and folds
//! them into declaration-shaped definitions: accessor symbols group under
//! their variable or subscript, allocators and functions map one-to-one.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::demangle::{Node, NodeKind, NodeRef, StructuralKey};
use crate::metadata::MethodRecord;
use crate::symbols::{MemberBucket, MemberKind, Storage};
use crate::types::IndexedSymbol;

use super::definitions::{
    Accessor, AccessorKind, FunctionDefinition, FunctionKind, MemberSet, SubscriptDefinition, VariableDefinition,
};

/// Member entity node → the method table entry backing it.
pub type MethodDescriptorLookup = IndexMap<StructuralKey, MethodRecord>;

/// Peel the outer wrappers of a demangled tree down to the member entity,
/// in a single walk: the global root, the merged-function marker, static,
/// method-descriptor, and protocol-witness wrappers.
pub fn member_entity(root: &NodeRef) -> Option<NodeRef>
{
    member_entity_flags(root).map(|(entity, _)| entity)
}

/// Like [`member_entity`], also reporting whether a static wrapper was
/// crossed.
pub fn member_entity_flags(root: &NodeRef) -> Option<(NodeRef, bool)>
{
    let mut node = if root.kind() == NodeKind::Global {
        let first = root.first_child()?;
        if first.kind() == NodeKind::MergedFunction {
            root.child(1)?.clone()
        } else {
            first.clone()
        }
    } else {
        root.clone()
    };

    let mut is_static = false;
    loop {
        node = match node.kind() {
            NodeKind::Static => {
                is_static = true;
                node.first_child()?.clone()
            }
            NodeKind::MethodDescriptor => node.first_child()?.clone(),
            NodeKind::ProtocolWitness => node.child(0)?.clone(),
            _ => return Some((node, is_static)),
        };
    }
}

fn declared_name(name: &NodeRef) -> Option<String>
{
    match name.kind() {
        NodeKind::PrivateDeclName => name.first_child().and_then(|inner| inner.text()).map(str::to_string),
        _ => name.text().map(str::to_string),
    }
}

fn accessor_of(indexed: &Arc<IndexedSymbol>, entity: &NodeRef, lookup: &MethodDescriptorLookup) -> Option<Accessor>
{
    let kind = match entity.kind() {
        NodeKind::Getter => AccessorKind::Getter,
        NodeKind::Setter => AccessorKind::Setter,
        NodeKind::ModifyAccessor => AccessorKind::Modify,
        NodeKind::ReadAccessor => AccessorKind::Read,
        _ => return None,
    };
    let symbol = indexed.symbol().clone();
    let offset = symbol.offset;
    Some(Accessor {
        kind,
        method_descriptor: lookup.get(&StructuralKey(entity.clone())).cloned(),
        symbol,
        offset,
    })
}

/// Build variable definitions from a bucket of variable-classified symbols.
///
/// Symbols group by the identifier of their first `variable` descendant.
/// Accessors whose name matches a declared field are dropped (the field
/// record already describes the storage). Each surviving group emits one
/// definition whose representative node is the first getter form, or the
/// bare stored declaration when no accessor exists.
pub fn build_variables(
    symbols: &[Arc<IndexedSymbol>],
    known_field_names: &HashSet<String>,
    lookup: &MethodDescriptorLookup,
    is_global_or_static: bool,
) -> Vec<VariableDefinition>
{
    let mut groups: IndexMap<String, Vec<(Arc<IndexedSymbol>, NodeRef)>> = IndexMap::new();
    for indexed in symbols {
        let root = indexed.node().clone();
        let Some(entity) = member_entity(&root) else { continue };
        let Some(variable) = Node::find_first(&entity, NodeKind::Variable) else { continue };
        let Some(name) = variable.child(1).and_then(declared_name) else { continue };
        groups.entry(name).or_default().push((indexed.clone(), entity));
    }

    let mut definitions = Vec::new();
    for (name, mut group) in groups {
        if known_field_names.contains(&name) {
            group.retain(|(_, entity)| !entity.kind().is_accessor());
        }
        let representative = group
            .iter()
            .find(|(_, entity)| entity.kind() == NodeKind::Getter)
            .or_else(|| group.iter().find(|(_, entity)| entity.kind() == NodeKind::Variable));
        let Some((_, node)) = representative else { continue };
        let node = node.clone();
        let offset = group.first().map(|(indexed, _)| indexed.offset()).unwrap_or(0);
        let accessors = group
            .iter()
            .filter_map(|(indexed, entity)| accessor_of(indexed, entity, lookup))
            .collect();
        definitions.push(VariableDefinition {
            name,
            node,
            accessors,
            is_global_or_static,
            offset,
        });
    }
    definitions
}

/// Build subscript definitions. Symbols group by their `subscript`
/// descendant node (structural key); a group without a getter form has no
/// readable declaration and is skipped.
pub fn build_subscripts(
    symbols: &[Arc<IndexedSymbol>],
    lookup: &MethodDescriptorLookup,
    is_static: bool,
) -> Vec<SubscriptDefinition>
{
    let mut groups: IndexMap<StructuralKey, Vec<(Arc<IndexedSymbol>, NodeRef)>> = IndexMap::new();
    for indexed in symbols {
        let root = indexed.node().clone();
        let Some(entity) = member_entity(&root) else { continue };
        let Some(subscript) = Node::find_first(&entity, NodeKind::Subscript) else { continue };
        groups.entry(StructuralKey(subscript)).or_default().push((indexed.clone(), entity));
    }

    let mut definitions = Vec::new();
    for (key, group) in groups {
        if !group.iter().any(|(_, entity)| entity.kind() == NodeKind::Getter) {
            continue;
        }
        let accessors = group
            .iter()
            .filter_map(|(indexed, entity)| accessor_of(indexed, entity, lookup))
            .collect();
        definitions.push(SubscriptDefinition {
            node: key.0,
            accessors,
            is_static,
        });
    }
    definitions
}

/// Build allocator definitions: one per symbol, always static-scope.
pub fn build_allocators(symbols: &[Arc<IndexedSymbol>], lookup: &MethodDescriptorLookup) -> Vec<FunctionDefinition>
{
    init_like(symbols, lookup, FunctionKind::Allocator, true)
}

/// Build constructor definitions: one per symbol.
pub fn build_constructors(symbols: &[Arc<IndexedSymbol>], lookup: &MethodDescriptorLookup) -> Vec<FunctionDefinition>
{
    init_like(symbols, lookup, FunctionKind::Constructor, false)
}

fn init_like(
    symbols: &[Arc<IndexedSymbol>],
    lookup: &MethodDescriptorLookup,
    kind: FunctionKind,
    is_global_or_static: bool,
) -> Vec<FunctionDefinition>
{
    symbols
        .iter()
        .filter_map(|indexed| {
            let root = indexed.node().clone();
            let entity = member_entity(&root)?;
            let symbol = indexed.symbol().clone();
            let offset = symbol.offset;
            Some(FunctionDefinition {
                name: "init".to_string(),
                method_descriptor: lookup.get(&StructuralKey(entity.clone())).cloned(),
                node: entity,
                symbol,
                offset,
                kind,
                is_global_or_static,
            })
        })
        .collect()
}

/// Build function definitions: one per symbol. A symbol without a
/// `function` descendant carrying an identifier is skipped.
pub fn build_functions(
    symbols: &[Arc<IndexedSymbol>],
    lookup: &MethodDescriptorLookup,
    is_global_or_static: bool,
) -> Vec<FunctionDefinition>
{
    symbols
        .iter()
        .filter_map(|indexed| {
            let root = indexed.node().clone();
            let entity = member_entity(&root)?;
            let function = Node::find_first(&entity, NodeKind::Function)?;
            let name = function.child(1).and_then(declared_name)?;
            let symbol = indexed.symbol().clone();
            let offset = symbol.offset;
            Some(FunctionDefinition {
                name,
                method_descriptor: lookup.get(&StructuralKey(entity.clone())).cloned(),
                node: entity,
                symbol,
                offset,
                kind: FunctionKind::Function,
                is_global_or_static,
            })
        })
        .collect()
}

/// The non-extension member buckets a type or protocol indexes, in the
/// order the builders consume them (storage variants ahead of computed).
const TYPE_MEMBER_KINDS: &[MemberKind] = &[
    MemberKind::Allocator { in_extension: false },
    MemberKind::Constructor { in_extension: false },
    MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: true,
    },
    MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: false,
    },
    MemberKind::Variable {
        in_extension: false,
        is_static: true,
        is_storage: true,
    },
    MemberKind::Variable {
        in_extension: false,
        is_static: true,
        is_storage: false,
    },
    MemberKind::Function {
        in_extension: false,
        is_static: false,
    },
    MemberKind::Function {
        in_extension: false,
        is_static: true,
    },
    MemberKind::Subscript {
        in_extension: false,
        is_static: false,
    },
    MemberKind::Subscript {
        in_extension: false,
        is_static: true,
    },
];

/// Index the non-extension member buckets of one type and fold them
/// through the builders.
pub fn build_member_set(
    storage: &Storage,
    type_name: &str,
    type_node: &NodeRef,
    known_field_names: &HashSet<String>,
    lookup: &MethodDescriptorLookup,
) -> MemberSet
{
    let by_kind = storage.member_symbols_by_kind(MemberBucket::Members, TYPE_MEMBER_KINDS, type_name, type_node);
    build_member_set_from_buckets(&by_kind, known_field_names, lookup)
}

/// Fold pre-bucketed symbols through the builders. The static axis comes
/// from the bucket kinds themselves; the caller's kind order drives group
/// order.
pub fn build_member_set_from_buckets(
    by_kind: &IndexMap<MemberKind, Vec<Arc<IndexedSymbol>>>,
    known_field_names: &HashSet<String>,
    lookup: &MethodDescriptorLookup,
) -> MemberSet
{
    let collect = |pred: &dyn Fn(&MemberKind) -> bool| -> Vec<Arc<IndexedSymbol>> {
        by_kind
            .iter()
            .filter(|(kind, _)| pred(kind))
            .flat_map(|(_, symbols)| symbols.iter().cloned())
            .collect()
    };

    MemberSet {
        variables: build_variables(
            &collect(&|k| matches!(k, MemberKind::Variable { is_static: false, .. })),
            known_field_names,
            lookup,
            false,
        ),
        static_variables: build_variables(
            &collect(&|k| matches!(k, MemberKind::Variable { is_static: true, .. })),
            known_field_names,
            lookup,
            true,
        ),
        functions: build_functions(&collect(&|k| matches!(k, MemberKind::Function { is_static: false, .. })), lookup, false),
        static_functions: build_functions(&collect(&|k| matches!(k, MemberKind::Function { is_static: true, .. })), lookup, true),
        subscripts: build_subscripts(&collect(&|k| matches!(k, MemberKind::Subscript { is_static: false, .. })), lookup, false),
        static_subscripts: build_subscripts(&collect(&|k| matches!(k, MemberKind::Subscript { is_static: true, .. })), lookup, true),
        allocators: build_allocators(&collect(&|k| matches!(k, MemberKind::Allocator { .. })), lookup),
        constructors: build_constructors(&collect(&|k| matches!(k, MemberKind::Constructor { .. })), lookup),
    }
}

/// Route loose classified symbols into a member set in a single tree walk
/// per symbol. Used by conformance-extension indexing, where symbols arrive
/// from witness resolution rather than from a bucket query.
pub fn collect_member_set(symbols: Vec<Arc<IndexedSymbol>>, lookup: &MethodDescriptorLookup) -> MemberSet
{
    let mut variables = Vec::new();
    let mut static_variables = Vec::new();
    let mut functions = Vec::new();
    let mut static_functions = Vec::new();
    let mut subscripts = Vec::new();
    let mut static_subscripts = Vec::new();
    let mut allocators = Vec::new();
    let mut constructors = Vec::new();

    for indexed in symbols {
        let Some((entity, is_static)) = member_entity_flags(indexed.node()) else {
            continue;
        };
        let target = match entity.kind() {
            NodeKind::Getter | NodeKind::Setter | NodeKind::ModifyAccessor | NodeKind::ReadAccessor => {
                entity.first_child().map(|inner| inner.kind())
            }
            other => Some(other),
        };
        match target {
            Some(NodeKind::Variable) => {
                if is_static {
                    static_variables.push(indexed);
                } else {
                    variables.push(indexed);
                }
            }
            Some(NodeKind::Subscript) => {
                if is_static {
                    static_subscripts.push(indexed);
                } else {
                    subscripts.push(indexed);
                }
            }
            Some(NodeKind::Function) => {
                if is_static {
                    static_functions.push(indexed);
                } else {
                    functions.push(indexed);
                }
            }
            Some(NodeKind::Allocator) => allocators.push(indexed),
            Some(NodeKind::Constructor) => constructors.push(indexed),
            _ => {}
        }
    }

    let no_fields = HashSet::new();
    MemberSet {
        variables: build_variables(&variables, &no_fields, lookup, false),
        static_variables: build_variables(&static_variables, &no_fields, lookup, true),
        functions: build_functions(&functions, lookup, false),
        static_functions: build_functions(&static_functions, lookup, true),
        subscripts: build_subscripts(&subscripts, lookup, false),
        static_subscripts: build_subscripts(&static_subscripts, lookup, true),
        allocators: build_allocators(&allocators, lookup),
        constructors: build_constructors(&constructors, lookup),
    }
}
