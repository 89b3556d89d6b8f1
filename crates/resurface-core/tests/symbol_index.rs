//! Tests for the symbol index: collection, classification, and queries.

use std::collections::HashSet;
use std::path::PathBuf;

use resurface_core::demangle::{demangle, NodeKind};
use resurface_core::macho::{MachImage, SharedCacheContext};
use resurface_core::symbols::{GlobalKind, MemberBucket, MemberKind, Storage};
use resurface_core::types::{Nlist, Symbol, SymbolType, TypeInfoKind};

fn nlist(external: bool) -> Option<Nlist>
{
    Some(Nlist {
        external,
        symbol_type: SymbolType::Section,
    })
}

fn image_with(symbols: Vec<Symbol>) -> MachImage
{
    MachImage::from_parts(PathBuf::from("/tmp/test.bin"), Vec::new(), symbols, Vec::new(), 0x1_0000_0000)
}

#[test]
fn test_stored_global_variable_goes_to_globals_only()
{
    let image = image_with(vec![Symbol::new(0x1000, "$s4main9someValueSivp", nlist(false))]);
    let storage = Storage::build(&image);

    let globals = storage.globals_by_kind();
    let bucket = globals.get(&GlobalKind::Variable { is_storage: true }).unwrap();
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket[0].symbol().name, "$s4main9someValueSivp");

    // No member bucket is populated.
    assert!(storage.member_symbols(MemberBucket::Members, &all_member_kinds()).is_empty());
}

#[test]
fn test_external_global_is_not_classified_as_global()
{
    let image = image_with(vec![Symbol::new(0x1000, "$s4main9someValueSivp", nlist(true))]);
    let storage = Storage::build(&image);

    assert!(storage.globals_by_kind().is_empty());
    // The payload still lands in the root-kind buckets.
    assert_eq!(storage.symbols_of_kinds(&[NodeKind::Variable]).len(), 1);
}

#[test]
fn test_static_extension_function_classification()
{
    // global → static → function(extension(main, Foo), ...)
    let image = image_with(vec![Symbol::new(0x2000, "$s4main3FooV4mainE3bazyyFZ", nlist(false))]);
    let storage = Storage::build(&image);

    let kind = MemberKind::Function {
        in_extension: true,
        is_static: true,
    };
    let symbols = storage.member_symbols_for_type(MemberBucket::Members, &[kind], "main.Foo");
    assert_eq!(symbols.len(), 1);

    let info = storage.type_info("main.Foo").unwrap();
    assert_eq!(info.kind, TypeInfoKind::Struct);
}

#[test]
fn test_member_type_node_prints_to_type_name()
{
    let image = image_with(vec![Symbol::new(0x2100, "$s4main3FooV3barSivg", nlist(false))]);
    let storage = Storage::build(&image);

    let kind = MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: false,
    };
    let groups = storage.member_symbols_by_type_node(MemberBucket::Members, &[kind], &HashSet::new());
    assert_eq!(groups.len(), 1);
    let (node_key, members) = groups.iter().next().unwrap();
    assert_eq!(members.type_name, "main.Foo");
    assert_eq!(resurface_core::demangle::interface_type_name(node_key.node()), "main.Foo");
}

#[test]
fn test_method_descriptor_and_witness_buckets()
{
    let image = image_with(vec![
        Symbol::new(0x3000, "$s4main3FooC3bazyyFTq", nlist(false)),
        Symbol::new(0x3100, "$s4main3FooV3barSivg4main3FooV4main1PPTW", nlist(false)),
    ]);
    let storage = Storage::build(&image);

    let function_kind = MemberKind::Function {
        in_extension: false,
        is_static: false,
    };
    let variable_kind = MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: false,
    };
    assert_eq!(
        storage.member_symbols(MemberBucket::MethodDescriptors, &[function_kind]).len(),
        1
    );
    assert_eq!(
        storage.member_symbols(MemberBucket::ProtocolWitnesses, &[variable_kind]).len(),
        1
    );
    // Neither lands in the regular member store.
    assert!(storage.member_symbols(MemberBucket::Members, &all_member_kinds()).is_empty());
}

#[test]
fn test_merged_function_classifies_by_second_child()
{
    let image = image_with(vec![Symbol::new(0x3200, "$s4main3FooV3bazyyFTm", nlist(false))]);
    let storage = Storage::build(&image);

    let kind = MemberKind::Function {
        in_extension: false,
        is_static: false,
    };
    assert_eq!(storage.member_symbols_for_type(MemberBucket::Members, &[kind], "main.Foo").len(), 1);
}

#[test]
fn test_opaque_type_descriptor_requires_positive_offset()
{
    let image = image_with(vec![
        Symbol::new(0x4000, "$s4main3fooyyFQrMQ", nlist(false)),
        Symbol::new(0, "$s4main3baryyFQrMQ", nlist(false)),
    ]);
    let storage = Storage::build(&image);

    assert_eq!(storage.opaque_type_descriptors().len(), 1);
    let (_, indexed) = storage.opaque_type_descriptors().iter().next().unwrap();
    assert_eq!(indexed.offset(), 0x4000);
}

#[test]
fn test_demangling_failure_keeps_symbol_offset_only()
{
    let image = image_with(vec![Symbol::new(0x5000, "$sZZnotamangling", nlist(false))]);
    let storage = Storage::build(&image);

    assert_eq!(storage.symbols_at_offset(0x5000).len(), 1);
    assert!(storage.all_symbols().next().is_none());
}

#[test]
fn test_non_language_symbols_are_ignored()
{
    let image = image_with(vec![Symbol::new(0x6000, "_ZN4main3fooEv", nlist(false))]);
    let storage = Storage::build(&image);

    assert!(storage.symbols_at_offset(0x6000).is_empty());
    assert!(storage.all_symbols().next().is_none());
}

#[test]
fn test_shared_cache_offset_bias()
{
    let image = MachImage::from_parts(
        PathBuf::from("/tmp/cached.bin"),
        Vec::new(),
        vec![
            Symbol::new(0x1_8000_1000, "$s4main9someValueSivp", nlist(false)),
            Symbol::new(0, "$s4main5otherSivp", nlist(false)),
        ],
        Vec::new(),
        0x1_8000_0000,
    )
    .with_shared_cache(SharedCacheContext {
        shared_region_start: 0x1_8000_0000,
        is_file_representation: true,
    });
    let storage = Storage::build(&image);

    // Both the raw and the cache-relative form are recorded.
    assert_eq!(storage.symbols_at_offset(0x1_8000_1000).len(), 1);
    assert_eq!(storage.symbols_at_offset(0x1000).len(), 1);

    // Offset 0 never indexes into the adjusted tables: exactly one entry,
    // at 0 itself (an adjusted copy would collide with the region start).
    assert_eq!(storage.symbols_at_offset(0).len(), 1);
}

#[test]
fn test_exported_symbols_record_two_offsets()
{
    let image = MachImage::from_parts(
        PathBuf::from("/tmp/exports.bin"),
        Vec::new(),
        Vec::new(),
        vec![Symbol::new(0x500, "$s4main3fooyyF", None)],
        0x1_0000_0000,
    );
    let storage = Storage::build(&image);

    assert_eq!(storage.symbols_at_offset(0x500).len(), 1);
    assert_eq!(storage.symbols_at_offset(0x1_0000_0500).len(), 1);
}

#[test]
fn test_exported_symbol_already_seen_is_skipped()
{
    let image = MachImage::from_parts(
        PathBuf::from("/tmp/exports.bin"),
        Vec::new(),
        vec![Symbol::new(0x500, "$s4main3fooyyF", nlist(false))],
        vec![Symbol::new(0x500, "$s4main3fooyyF", None)],
        0x1_0000_0000,
    );
    let storage = Storage::build(&image);

    // No slid duplicate was added for the already-seen name.
    assert!(storage.symbols_at_offset(0x1_0000_0500).is_empty());
    assert_eq!(storage.symbols_at_offset(0x500).len(), 1);
}

#[test]
fn test_each_symbol_lands_in_exactly_one_outer_bucket()
{
    let image = image_with(vec![
        Symbol::new(0x100, "$s4main9someValueSivp", nlist(false)),
        Symbol::new(0x200, "$s4main3FooV3barSivg", nlist(false)),
        Symbol::new(0x300, "$s4main3FooC3bazyyFTq", nlist(false)),
        Symbol::new(0x400, "$s4main3FooV3barSivg4main3FooV4main1PPTW", nlist(false)),
        Symbol::new(0x500, "$s4main3fooyyFQrMQ", nlist(false)),
    ]);
    let storage = Storage::build(&image);

    let globals: usize = storage.globals_by_kind().values().map(Vec::len).sum();
    let members = storage.member_symbols(MemberBucket::Members, &all_member_kinds()).len();
    let descriptors = storage.member_symbols(MemberBucket::MethodDescriptors, &all_member_kinds()).len();
    let witnesses = storage.member_symbols(MemberBucket::ProtocolWitnesses, &all_member_kinds()).len();
    let opaque = storage.opaque_type_descriptors().len();

    assert_eq!(globals, 1);
    assert_eq!(members, 1);
    assert_eq!(descriptors, 1);
    assert_eq!(witnesses, 1);
    assert_eq!(opaque, 1);
}

#[test]
fn test_insertion_order_is_deterministic_across_builds()
{
    let symbols = vec![
        Symbol::new(0x100, "$s4main3ZooV3barSivg", nlist(false)),
        Symbol::new(0x200, "$s4main3AaaV3barSivg", nlist(false)),
        Symbol::new(0x300, "$s4main3MmmV3barSivg", nlist(false)),
    ];

    let first = Storage::build(&image_with(symbols.clone()));
    let second = Storage::build(&image_with(symbols));

    let kind = MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: false,
    };
    let names = |storage: &Storage| -> Vec<String> {
        storage
            .member_symbols_by_type_node(MemberBucket::Members, &[kind], &HashSet::new())
            .values()
            .map(|group| group.type_name.clone())
            .collect()
    };
    let first_names = names(&first);
    assert_eq!(first_names, names(&second));
    // Symbol-table order, not alphabetical order.
    assert_eq!(first_names, vec!["main.Zoo", "main.Aaa", "main.Mmm"]);
}

#[test]
fn test_member_symbols_round_trip_in_insertion_order()
{
    let image = image_with(vec![
        Symbol::new(0x100, "$s4main3FooV3barSivg", nlist(false)),
        Symbol::new(0x200, "$s4main3FooV3barSivs", nlist(false)),
    ]);
    let storage = Storage::build(&image);

    let kind = MemberKind::Variable {
        in_extension: false,
        is_static: false,
        is_storage: false,
    };
    let node = demangle("$s4main3FooV3barSivg")
        .unwrap()
        .child(0)
        .unwrap()
        .clone();
    // Reconstruct the type node the classifier derived.
    let variable = node.child(0).unwrap();
    let nominal = variable.child(0).unwrap().clone();
    let type_node = resurface_core::demangle::Node::new(NodeKind::Type, vec![nominal]);

    let symbols = storage.member_symbols_for(MemberBucket::Members, &[kind], "main.Foo", &type_node);
    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].offset(), 0x100);
    assert_eq!(symbols[1].offset(), 0x200);
}

#[test]
fn test_demangled_node_falls_back_to_on_demand()
{
    let image = image_with(Vec::new());
    let storage = Storage::build(&image);

    let unknown = Symbol::new(0x9999, "$s4main3fooyyF", None);
    let node = storage.demangled_node(&unknown).unwrap();
    assert_eq!(node.kind(), NodeKind::Global);
}

#[test]
fn test_consumed_latch()
{
    let image = image_with(vec![Symbol::new(0x100, "$s4main9someValueSivp", nlist(false))]);
    let storage = Storage::build(&image);

    let bucket = storage.globals_by_kind().get(&GlobalKind::Variable { is_storage: true }).unwrap();
    let indexed = &bucket[0];
    assert!(!indexed.is_consumed());
    let _ = indexed.symbol();
    assert!(indexed.is_consumed());
}

fn all_member_kinds() -> Vec<MemberKind>
{
    let mut kinds = vec![MemberKind::Deallocator, MemberKind::Destructor];
    for in_extension in [false, true] {
        kinds.push(MemberKind::Allocator { in_extension });
        kinds.push(MemberKind::Constructor { in_extension });
        for is_static in [false, true] {
            kinds.push(MemberKind::Function { in_extension, is_static });
            kinds.push(MemberKind::Subscript { in_extension, is_static });
            for is_storage in [false, true] {
                kinds.push(MemberKind::Variable {
                    in_extension,
                    is_static,
                    is_storage,
                });
            }
        }
    }
    kinds
}
