//! Tests for the interface indexer: phases, nesting, extension synthesis,
//! conformance fusion, and idempotence.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use resurface_core::demangle::NodeKind;
use resurface_core::error::{ResurfaceError, Result};
use resurface_core::events::{EventDispatcher, IndexEvent, Phase, PhaseState};
use resurface_core::indexer::{CancellationToken, ExtensionKind, InterfaceIndexer, TypeKind};
use resurface_core::macho::MachImage;
use resurface_core::metadata::{
    AssociatedTypeEntry, AssociatedTypeRecord, ConformanceRecord, ContextKind, ContextRecord, MetadataSource,
    ParentRef, ProtocolRecord, ResilientWitness, TypeRecord, WitnessRequirement,
};
use resurface_core::symbols::Storage;
use resurface_core::types::{InterfaceIndexConfiguration, Nlist, Symbol, SymbolType};

#[derive(Default)]
struct FakeSource
{
    types: Vec<TypeRecord>,
    protocols: Vec<ProtocolRecord>,
    conformances: Vec<Arc<ConformanceRecord>>,
    associated_types: Vec<Arc<AssociatedTypeRecord>>,
    fail_types: bool,
}

impl MetadataSource for FakeSource
{
    fn types(&self) -> Result<Vec<TypeRecord>>
    {
        if self.fail_types {
            return Err(ResurfaceError::SectionDecode {
                section: "__swift5_types".to_string(),
                reason: "synthetic failure".to_string(),
            });
        }
        Ok(self.types.clone())
    }

    fn protocols(&self) -> Result<Vec<ProtocolRecord>>
    {
        Ok(self.protocols.clone())
    }

    fn protocol_conformances(&self) -> Result<Vec<Arc<ConformanceRecord>>>
    {
        Ok(self.conformances.clone())
    }

    fn associated_types(&self) -> Result<Vec<Arc<AssociatedTypeRecord>>>
    {
        Ok(self.associated_types.clone())
    }
}

fn type_record(kind: ContextKind, name: &str, parent: ParentRef) -> TypeRecord
{
    TypeRecord {
        context: ContextRecord::nominal(kind, name, parent),
        fields: Vec::new(),
        methods: Vec::new(),
        overrides: Vec::new(),
        default_overrides: Vec::new(),
    }
}

fn nlist() -> Option<Nlist>
{
    Some(Nlist {
        external: false,
        symbol_type: SymbolType::Section,
    })
}

fn storage_with(symbols: Vec<Symbol>) -> Storage
{
    let image = MachImage::from_parts(PathBuf::from("/tmp/test.bin"), Vec::new(), symbols, Vec::new(), 0x1_0000_0000);
    Storage::build(&image)
}

fn indexer() -> InterfaceIndexer
{
    InterfaceIndexer::new(InterfaceIndexConfiguration::default(), EventDispatcher::new())
}

#[test]
fn test_nested_type_links_under_its_parent()
{
    let module = ContextRecord::module("main");
    let outer = ContextRecord::nominal(ContextKind::Struct, "Outer", ParentRef::Context(module.clone()));
    let source = FakeSource {
        types: vec![
            TypeRecord {
                context: outer.clone(),
                fields: Vec::new(),
                methods: Vec::new(),
                overrides: Vec::new(),
                default_overrides: Vec::new(),
            },
            type_record(ContextKind::Struct, "Inner", ParentRef::Context(outer)),
        ],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    let roots = indexer.root_type_definitions();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].type_name(), "main.Outer");

    let children = roots[0].type_children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].type_name(), "main.Outer.Inner");
    assert!(children[0].parent().is_some());
    assert!(children[0].parent_context().is_none());

    // Root invariants: every definition has parent or parent_context or
    // neither, never both.
    for definition in indexer.all_type_definitions() {
        let has_parent = definition.parent().is_some();
        let has_context = definition.parent_context().is_some();
        assert!(!(has_parent && has_context));
    }
}

#[test]
fn test_type_nested_in_extension_synthesizes_one()
{
    let module = ContextRecord::module("main");
    let extension = ContextRecord::extension("4main3FooV", ParentRef::Context(module));
    let source = FakeSource {
        types: vec![type_record(ContextKind::Struct, "Inner", ParentRef::Context(extension))],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    assert!(indexer.root_type_definitions().is_empty());

    let extensions = indexer.type_extension_definitions();
    assert_eq!(extensions.len(), 1);
    assert_eq!(extensions[0].name().type_name(), "main.Foo");
    assert_eq!(extensions[0].name().kind, ExtensionKind::Type(TypeKind::Struct));

    let nested = extensions[0].types();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].type_name(), "main.Foo.Inner");
}

#[test]
fn test_protocol_nested_in_extension_is_not_a_root()
{
    let module = ContextRecord::module("main");
    let extension = ContextRecord::extension("4main3FooV", ParentRef::Context(module.clone()));
    let source = FakeSource {
        types: vec![type_record(ContextKind::Struct, "Foo", ParentRef::Context(module))],
        protocols: vec![ProtocolRecord {
            context: ContextRecord::nominal(ContextKind::Protocol, "Hidden", ParentRef::Context(extension)),
            num_requirements: 0,
            associated_type_names: Vec::new(),
        }],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    assert!(indexer.root_protocol_definitions().is_empty());
    assert_eq!(indexer.all_protocol_definitions().len(), 1);

    let extensions = indexer.type_extension_definitions();
    assert_eq!(extensions.len(), 1);
    let hosted = extensions[0].protocols();
    assert_eq!(hosted.len(), 1);
    assert_eq!(hosted[0].name(), "main.Foo.Hidden");
}

#[test]
fn test_protocol_nested_in_known_type_is_adopted()
{
    let module = ContextRecord::module("main");
    let foo = ContextRecord::nominal(ContextKind::Class, "Foo", ParentRef::Context(module));
    let source = FakeSource {
        types: vec![TypeRecord {
            context: foo.clone(),
            fields: Vec::new(),
            methods: Vec::new(),
            overrides: Vec::new(),
            default_overrides: Vec::new(),
        }],
        protocols: vec![ProtocolRecord {
            context: ContextRecord::nominal(ContextKind::Protocol, "Inner", ParentRef::Context(foo)),
            num_requirements: 1,
            associated_type_names: Vec::new(),
        }],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    let roots = indexer.root_type_definitions();
    assert_eq!(roots.len(), 1);
    let hosted = roots[0].protocol_children();
    assert_eq!(hosted.len(), 1);
    assert_eq!(hosted[0].name(), "main.Foo.Inner");
    assert!(indexer.root_protocol_definitions().is_empty());
}

#[test]
fn test_c_imported_types_are_skipped_by_default()
{
    let module = ContextRecord::module("main");
    let mut imported = ContextRecord::nominal(ContextKind::Struct, "CType", ParentRef::Context(module.clone()));
    Arc::get_mut(&mut imported).unwrap().is_c_imported = true;

    let records = vec![
        TypeRecord {
            context: imported,
            fields: Vec::new(),
            methods: Vec::new(),
            overrides: Vec::new(),
            default_overrides: Vec::new(),
        },
        type_record(ContextKind::Struct, "Native", ParentRef::Context(module)),
    ];

    let source = FakeSource {
        types: records.clone(),
        ..FakeSource::default()
    };
    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();
    assert_eq!(indexer.all_type_definitions().len(), 1);

    let source = FakeSource {
        types: records,
        ..FakeSource::default()
    };
    let showing = InterfaceIndexer::new(
        InterfaceIndexConfiguration {
            show_c_imported_types: true,
        },
        EventDispatcher::new(),
    );
    showing.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();
    assert_eq!(showing.all_type_definitions().len(), 2);
}

#[test]
fn test_conformance_consumes_matching_associated_type_exclusively()
{
    let conformance_p = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: Vec::new(),
        offset: 0,
    });
    let conformance_q = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.Q".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: Vec::new(),
        offset: 0,
    });
    let associated = Arc::new(AssociatedTypeRecord {
        conforming_type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        entries: vec![AssociatedTypeEntry {
            name: "Element".to_string(),
            substituted_type_mangling: "Si".to_string(),
        }],
    });

    let source = FakeSource {
        conformances: vec![conformance_p, conformance_q],
        associated_types: vec![associated],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    let extensions = indexer.conformance_extension_definitions();
    assert_eq!(extensions.len(), 2);

    let carrying: Vec<_> = extensions.iter().filter(|ext| ext.associated_type().is_some()).collect();
    assert_eq!(carrying.len(), 1);
    assert_eq!(
        carrying[0].protocol_conformance().unwrap().protocol_name,
        "main.P"
    );
}

#[test]
fn test_unconsumed_associated_type_still_yields_an_extension()
{
    let associated = Arc::new(AssociatedTypeRecord {
        conforming_type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        entries: Vec::new(),
    });
    let source = FakeSource {
        associated_types: vec![associated],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    let extensions = indexer.conformance_extension_definitions();
    assert_eq!(extensions.len(), 1);
    assert!(extensions[0].protocol_conformance().is_none());
    assert!(extensions[0].associated_type().is_some());
    assert_eq!(extensions[0].name().type_name(), "main.Foo");
}

#[test]
fn test_conditional_conformance_carries_a_signature()
{
    let conformance = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: Some("SiSbRsl".to_string()),
        resilient_witnesses: Vec::new(),
        offset: 0,
    });
    let source = FakeSource {
        conformances: vec![conformance],
        ..FakeSource::default()
    };

    let indexer = indexer();
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    let extensions = indexer.conformance_extension_definitions();
    assert_eq!(extensions.len(), 1);
    let signature = extensions[0].generic_signature().unwrap();
    assert_eq!(signature.kind(), NodeKind::DependentGenericSignature);
}

#[test]
fn test_extension_members_synthesize_extensions()
{
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main3FooV4mainE3bazyyF", nlist()),
        Symbol::new(0x200, "$s4main3FooV4mainE4quxxSivg", nlist()),
    ]);

    let indexer = indexer();
    indexer.prepare(&FakeSource::default(), &storage, &CancellationToken::new()).unwrap();

    let extensions = indexer.type_extension_definitions();
    assert_eq!(extensions.len(), 1);
    let extension = &extensions[0];
    assert_eq!(extension.name().type_name(), "main.Foo");

    let members = extension.members();
    assert_eq!(members.functions.len(), 1);
    assert_eq!(members.functions[0].name, "baz");
    assert_eq!(members.variables.len(), 1);
    assert_eq!(members.variables[0].name, "quxx");
}

#[test]
fn test_globals_phase_populates_flat_lists()
{
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main9someValueSivp", nlist()),
        Symbol::new(0x200, "$s4main3fooyyF", nlist()),
    ]);

    let indexer = indexer();
    indexer.prepare(&FakeSource::default(), &storage, &CancellationToken::new()).unwrap();

    let variables = indexer.global_variable_definitions();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "someValue");
    assert!(variables[0].is_global_or_static);

    let functions = indexer.global_function_definitions();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].name, "foo");
    assert!(functions[0].is_global_or_static);
}

#[test]
fn test_type_member_indexing_is_lazy_and_idempotent()
{
    let module = ContextRecord::module("main");
    let source = FakeSource {
        types: vec![type_record(ContextKind::Struct, "Foo", ParentRef::Context(module))],
        ..FakeSource::default()
    };
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main3FooV3barSivg", nlist()),
        Symbol::new(0x200, "$s4main3FooV3bazyyF", nlist()),
    ]);

    let indexer = indexer();
    indexer.prepare(&source, &storage, &CancellationToken::new()).unwrap();

    let roots = indexer.root_type_definitions();
    let definition = &roots[0];
    assert!(!definition.is_indexed());

    let members = definition.index(&storage);
    assert!(definition.is_indexed());
    assert_eq!(members.members.variables.len(), 1);
    assert_eq!(members.members.variables[0].name, "bar");
    assert_eq!(members.members.functions.len(), 1);
    assert_eq!(members.members.functions[0].name, "baz");

    // A second call performs no work and returns the same data.
    let again = definition.index(&storage);
    assert_eq!(again.members.variables.len(), 1);
}

#[test]
fn test_class_method_descriptor_reaches_functions()
{
    let module = ContextRecord::module("main");
    let mut record = type_record(ContextKind::Class, "Foo", ParentRef::Context(module));
    record.methods.push(resurface_core::metadata::MethodRecord {
        kind: resurface_core::metadata::MethodKind::Method,
        is_instance: true,
        impl_offset: Some(0x900),
    });
    let source = FakeSource {
        types: vec![record],
        ..FakeSource::default()
    };

    // The implementation symbol at 0x900 demangles to a protocol witness
    // whose conformance names the class itself.
    let storage = storage_with(vec![
        Symbol::new(0x900, "$s4main3FooC3bazyyF4main3FooC4main1PPTW", nlist()),
        Symbol::new(0x910, "$s4main3FooC3bazyyF", nlist()),
    ]);

    let indexer = indexer();
    indexer.prepare(&source, &storage, &CancellationToken::new()).unwrap();

    let roots = indexer.root_type_definitions();
    let definition = &roots[0];
    let members = definition.index(&storage);
    assert_eq!(members.members.functions.len(), 1);
    assert!(members.members.functions[0].method_descriptor.is_some());
}

#[test]
fn test_extraction_failure_is_non_fatal()
{
    let events: Arc<Mutex<Vec<IndexEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let dispatcher = EventDispatcher::new();
    dispatcher.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    let source = FakeSource {
        fail_types: true,
        ..FakeSource::default()
    };
    let indexer = InterfaceIndexer::new(InterfaceIndexConfiguration::default(), dispatcher);
    indexer.prepare(&source, &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    assert!(indexer.all_type_definitions().is_empty());
    let seen = events.lock().unwrap();
    assert!(seen.iter().any(|event| matches!(event, IndexEvent::ExtractionFailed { .. })));
    // All five phases still completed.
    let completed = seen
        .iter()
        .filter(|event| matches!(event, IndexEvent::PhaseTransition { state: PhaseState::Completed, .. }))
        .count();
    assert_eq!(completed, 5);
}

#[test]
fn test_phases_run_in_declared_order()
{
    let events: Arc<Mutex<Vec<Phase>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let dispatcher = EventDispatcher::new();
    dispatcher.subscribe(move |event| {
        if let IndexEvent::PhaseTransition {
            phase,
            state: PhaseState::Started,
        } = event
        {
            sink.lock().unwrap().push(*phase);
        }
    });

    let indexer = InterfaceIndexer::new(InterfaceIndexConfiguration::default(), dispatcher);
    indexer.prepare(&FakeSource::default(), &storage_with(Vec::new()), &CancellationToken::new()).unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![Phase::Types, Phase::Protocols, Phase::Conformances, Phase::Extensions, Phase::Globals]
    );
}

#[test]
fn test_prepare_is_idempotent()
{
    let module = ContextRecord::module("main");
    let source = FakeSource {
        types: vec![
            type_record(ContextKind::Struct, "Foo", ParentRef::Context(module.clone())),
            type_record(ContextKind::Class, "Bar", ParentRef::Context(module)),
        ],
        ..FakeSource::default()
    };
    let storage = storage_with(vec![Symbol::new(0x100, "$s4main3FooV4mainE3bazyyF", nlist())]);

    let indexer = indexer();
    let token = CancellationToken::new();
    indexer.prepare(&source, &storage, &token).unwrap();
    let first_types: Vec<String> = indexer.all_type_definitions().iter().map(|d| d.type_name().to_string()).collect();
    let first_extensions = indexer.type_extension_definitions().len();

    indexer.prepare(&source, &storage, &token).unwrap();
    let second_types: Vec<String> = indexer.all_type_definitions().iter().map(|d| d.type_name().to_string()).collect();

    assert_eq!(first_types, second_types);
    assert_eq!(indexer.type_extension_definitions().len(), first_extensions);
}

#[test]
fn test_cancellation_before_any_phase()
{
    let token = CancellationToken::new();
    token.cancel();

    let indexer = indexer();
    let result = indexer.prepare(&FakeSource::default(), &storage_with(Vec::new()), &token);
    assert!(matches!(result, Err(ResurfaceError::Cancelled)));
    assert!(indexer.all_type_definitions().is_empty());
}

#[test]
fn test_conformance_witness_resolution_ladder()
{
    use resurface_core::demangle::{demangle_type, Node};
    use resurface_core::indexer::{ExtensionDefinition, ExtensionName, MemberSet};

    // (a) structural match
    let structural = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: vec![ResilientWitness {
            requirement: WitnessRequirement::Element {
                name: None,
                default_impl_offset: None,
            },
            impl_offset: Some(0x700),
        }],
        offset: 0,
    });
    let storage = storage_with(vec![Symbol::new(
        0x700,
        "$s4main3FooV3bazyyF4main3FooV4main1PPTW",
        nlist(),
    )]);

    let nominal = demangle_type("4main3FooV").unwrap();
    let node = Node::new(NodeKind::Type, vec![nominal]);
    let extension = ExtensionDefinition::with_parts(
        ExtensionName {
            node,
            kind: ExtensionKind::Type(TypeKind::Struct),
        },
        None,
        Some(structural),
        None,
        MemberSet::default(),
    );
    extension.index(&storage);
    assert_eq!(extension.members().functions.len(), 1);
    assert!(extension.missing_symbol_witnesses().is_empty());

    // (b) textual match: the target node is the bare nominal, so the
    // structural comparison against the type-wrapped conformance node
    // fails, but the printed names agree.
    let textual = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: vec![ResilientWitness {
            requirement: WitnessRequirement::Element {
                name: None,
                default_impl_offset: None,
            },
            impl_offset: Some(0x700),
        }],
        offset: 0,
    });
    let bare = demangle_type("4main3FooV").unwrap();
    let extension = ExtensionDefinition::with_parts(
        ExtensionName {
            node: bare,
            kind: ExtensionKind::Type(TypeKind::Struct),
        },
        None,
        Some(textual),
        None,
        MemberSet::default(),
    );
    extension.index(&storage);
    assert_eq!(extension.members().functions.len(), 1);

    // (c) unresolvable: no symbol anywhere, no requirement fallback.
    let missing = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: vec![ResilientWitness {
            requirement: WitnessRequirement::Element {
                name: None,
                default_impl_offset: None,
            },
            impl_offset: Some(0xDEAD),
        }],
        offset: 0,
    });
    let nominal = demangle_type("4main3FooV").unwrap();
    let node = Node::new(NodeKind::Type, vec![nominal]);
    let extension = ExtensionDefinition::with_parts(
        ExtensionName {
            node,
            kind: ExtensionKind::Type(TypeKind::Struct),
        },
        None,
        Some(missing),
        None,
        MemberSet::default(),
    );
    extension.index(&storage);
    assert!(extension.members().is_empty());
    assert_eq!(extension.missing_symbol_witnesses().len(), 1);
}

#[test]
fn test_witness_requirement_symbol_fallback()
{
    use resurface_core::demangle::{demangle_type, Node};
    use resurface_core::indexer::{ExtensionDefinition, ExtensionName, MemberSet};

    let conformance = Arc::new(ConformanceRecord {
        type_mangling: "4main3FooV".to_string(),
        protocol_name: "main.P".to_string(),
        conditional_requirements_mangling: None,
        resilient_witnesses: vec![ResilientWitness {
            requirement: WitnessRequirement::Symbol {
                name: "$s4main3FooV3bazyyF".to_string(),
            },
            impl_offset: None,
        }],
        offset: 0,
    });

    let storage = storage_with(Vec::new());
    let nominal = demangle_type("4main3FooV").unwrap();
    let node = Node::new(NodeKind::Type, vec![nominal]);
    let extension = ExtensionDefinition::with_parts(
        ExtensionName {
            node,
            kind: ExtensionKind::Type(TypeKind::Struct),
        },
        None,
        Some(conformance),
        None,
        MemberSet::default(),
    );
    extension.index(&storage);
    assert_eq!(extension.members().functions.len(), 1);
    assert_eq!(extension.members().functions[0].name, "baz");
}
