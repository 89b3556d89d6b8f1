//! Tests for the printer: chunk stream shape and rendered declarations.

use std::path::PathBuf;
use std::sync::Arc;

use resurface_core::events::EventDispatcher;
use resurface_core::indexer::{CancellationToken, InterfaceIndexer};
use resurface_core::macho::MachImage;
use resurface_core::metadata::{
    AssociatedTypeRecord, ConformanceRecord, ContextKind, ContextRecord, FieldRecord, MetadataSource, ParentRef,
    ProtocolRecord, TypeRecord,
};
use resurface_core::printer::{InterfacePrinter, SemanticType};
use resurface_core::symbols::Storage;
use resurface_core::types::{InterfaceIndexConfiguration, Nlist, PrinterConfiguration, Symbol, SymbolType};
use resurface_core::Result;

#[derive(Default)]
struct FakeSource
{
    types: Vec<TypeRecord>,
    protocols: Vec<ProtocolRecord>,
}

impl MetadataSource for FakeSource
{
    fn types(&self) -> Result<Vec<TypeRecord>>
    {
        Ok(self.types.clone())
    }

    fn protocols(&self) -> Result<Vec<ProtocolRecord>>
    {
        Ok(self.protocols.clone())
    }

    fn protocol_conformances(&self) -> Result<Vec<Arc<ConformanceRecord>>>
    {
        Ok(Vec::new())
    }

    fn associated_types(&self) -> Result<Vec<Arc<AssociatedTypeRecord>>>
    {
        Ok(Vec::new())
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

fn prepared(source: &FakeSource, storage: &Storage) -> InterfaceIndexer
{
    let indexer = InterfaceIndexer::new(InterfaceIndexConfiguration::default(), EventDispatcher::new());
    indexer.prepare(source, storage, &CancellationToken::new()).unwrap();
    indexer
}

fn struct_record(name: &str, fields: Vec<FieldRecord>) -> TypeRecord
{
    TypeRecord {
        context: ContextRecord::nominal(ContextKind::Struct, name, ParentRef::Context(ContextRecord::module("main"))),
        fields,
        methods: Vec::new(),
        overrides: Vec::new(),
        default_overrides: Vec::new(),
    }
}

#[test]
fn test_struct_with_fields_and_members_renders()
{
    let source = FakeSource {
        types: vec![struct_record(
            "Foo",
            vec![
                FieldRecord {
                    name: "count".to_string(),
                    mangled_type_name: Some("Si".to_string()),
                    is_variable: true,
                    is_indirect_case: false,
                },
                FieldRecord {
                    name: "label".to_string(),
                    mangled_type_name: Some("SS".to_string()),
                    is_variable: false,
                    is_indirect_case: false,
                },
            ],
        )],
        ..FakeSource::default()
    };
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main3FooV3sumSivg", nlist()),
        Symbol::new(0x200, "$s4main3FooV5resetyyF", nlist()),
    ]);

    let indexer = prepared(&source, &storage);
    let printer = InterfacePrinter::new(PrinterConfiguration::default());
    let text = printer.print(&indexer, &storage).plain();

    assert!(text.contains("struct Foo {"), "missing struct header in:\n{text}");
    assert!(text.contains("var count: Swift.Int"), "missing var field in:\n{text}");
    assert!(text.contains("let label: Swift.String"), "missing let field in:\n{text}");
    assert!(text.contains("var sum: Swift.Int { get }"), "missing computed var in:\n{text}");
    assert!(text.contains("func reset"), "missing func in:\n{text}");
}

#[test]
fn test_enum_cases_render_with_case_keyword()
{
    let record = TypeRecord {
        context: ContextRecord::nominal(ContextKind::Enum, "Mode", ParentRef::Context(ContextRecord::module("main"))),
        fields: vec![
            FieldRecord {
                name: "fast".to_string(),
                mangled_type_name: None,
                is_variable: false,
                is_indirect_case: false,
            },
            FieldRecord {
                name: "chained".to_string(),
                mangled_type_name: None,
                is_variable: false,
                is_indirect_case: true,
            },
        ],
        methods: Vec::new(),
        overrides: Vec::new(),
        default_overrides: Vec::new(),
    };
    let source = FakeSource {
        types: vec![record],
        ..FakeSource::default()
    };
    let storage = storage_with(Vec::new());

    let indexer = prepared(&source, &storage);
    let text = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage).plain();

    assert!(text.contains("enum Mode {"));
    assert!(text.contains("case fast"));
    assert!(text.contains("indirect case chained"));
}

#[test]
fn test_protocol_renders_associated_types()
{
    let source = FakeSource {
        protocols: vec![ProtocolRecord {
            context: ContextRecord::nominal(ContextKind::Protocol, "Storer", ParentRef::Context(ContextRecord::module("main"))),
            num_requirements: 2,
            associated_type_names: vec!["Element".to_string(), "Index".to_string()],
        }],
        ..FakeSource::default()
    };
    let storage = storage_with(Vec::new());

    let indexer = prepared(&source, &storage);
    let text = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage).plain();

    assert!(text.contains("protocol Storer {"));
    assert!(text.contains("associatedtype Element"));
    assert!(text.contains("associatedtype Index"));
}

#[test]
fn test_extension_members_render_under_extension_header()
{
    let storage = storage_with(vec![Symbol::new(0x100, "$s4main3FooV4mainE3bazyyF", nlist())]);
    let indexer = prepared(&FakeSource::default(), &storage);
    let text = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage).plain();

    assert!(text.contains("extension main.Foo {"), "missing extension header in:\n{text}");
    assert!(text.contains("func baz"), "missing extension member in:\n{text}");
}

#[test]
fn test_globals_render_at_top_level()
{
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main9someValueSivp", nlist()),
        Symbol::new(0x200, "$s4main3fooyyF", nlist()),
    ]);
    let indexer = prepared(&FakeSource::default(), &storage);
    let text = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage).plain();

    assert!(text.contains("var someValue: Swift.Int"));
    assert!(text.contains("func foo"));
}

#[test]
fn test_offset_comments_flag()
{
    let storage = storage_with(vec![Symbol::new(0x4000, "$s4main9someValueSivp", nlist())]);
    let indexer = prepared(&FakeSource::default(), &storage);

    let without = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage).plain();
    assert!(!without.contains("// 0x"));

    let with = InterfacePrinter::new(PrinterConfiguration {
        emit_offset_comments: true,
        ..PrinterConfiguration::default()
    })
    .print(&indexer, &storage)
    .plain();
    assert!(with.contains("// 0x4000"));
}

#[test]
fn test_chunk_stream_is_coalesced()
{
    let storage = storage_with(vec![Symbol::new(0x100, "$s4main9someValueSivp", nlist())]);
    let indexer = prepared(&FakeSource::default(), &storage);
    let text = InterfacePrinter::new(PrinterConfiguration::default()).print(&indexer, &storage);

    let chunks = text.chunks();
    assert!(!chunks.is_empty());
    for window in chunks.windows(2) {
        assert_ne!(window[0].semantic, window[1].semantic, "adjacent chunks share a semantic type");
    }
    assert!(chunks.iter().any(|chunk| chunk.semantic == SemanticType::Keyword));
}

#[test]
fn test_printing_twice_is_stable()
{
    let storage = storage_with(vec![
        Symbol::new(0x100, "$s4main3FooV3barSivg", nlist()),
        Symbol::new(0x200, "$s4main3fooyyF", nlist()),
    ]);
    let source = FakeSource {
        types: vec![struct_record("Foo", Vec::new())],
        ..FakeSource::default()
    };
    let indexer = prepared(&source, &storage);

    let printer = InterfacePrinter::new(PrinterConfiguration::default());
    let first = printer.print(&indexer, &storage).plain();
    let second = printer.print(&indexer, &storage).plain();
    assert_eq!(first, second);
}
