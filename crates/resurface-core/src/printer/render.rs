//! Rendering the indexed graph into the chunk stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::demangle::{print as print_node, Node, NodeKind, NodeRef, PrintOptions, StructuralKey};
use crate::indexer::{
    ExtensionDefinition, ExtensionKind, FunctionDefinition, InterfaceIndexer, ProtocolDefinition, SubscriptDefinition,
    TypeDefinition, TypeKind, VariableDefinition,
};
use crate::symbols::Storage;
use crate::types::{PrinterConfiguration, TypeInfoKind};

use super::chunks::{InterfaceText, SemanticType};

/// Soft cap on the per-node text cache. On overflow the whole map is
/// cleared in one shot, retaining its capacity.
const NODE_CACHE_CAP: usize = 50_000;

/// Mutex-guarded cache of rendered node text, keyed structurally.
#[derive(Default)]
struct NodeTextCache
{
    map: Mutex<HashMap<StructuralKey, String>>,
}

impl NodeTextCache
{
    fn render(&self, node: &NodeRef, options: PrintOptions) -> String
    {
        let key = StructuralKey(node.clone());
        if let Some(text) = self.map.lock().unwrap().get(&key) {
            return text.clone();
        }
        let text = print_node(node, options);
        let mut map = self.map.lock().unwrap();
        if map.len() >= NODE_CACHE_CAP {
            map.clear();
        }
        map.insert(key, text.clone());
        text
    }
}

/// Renders the definition graph as a structured text stream.
///
/// The printer holds shared read references into the graph and indexes each
/// definition lazily the first time it visits it.
pub struct InterfacePrinter
{
    config: PrinterConfiguration,
    cache: NodeTextCache,
}

impl InterfacePrinter
{
    #[must_use]
    pub fn new(config: PrinterConfiguration) -> Self
    {
        Self {
            config,
            cache: NodeTextCache::default(),
        }
    }

    /// Render everything the indexer produced.
    pub fn print(&self, indexer: &InterfaceIndexer, storage: &Storage) -> InterfaceText
    {
        let mut out = InterfaceText::new();

        for definition in indexer.root_type_definitions() {
            self.render_type(&mut out, &definition, storage, 0);
            out.standard("\n");
        }
        for protocol in indexer.root_protocol_definitions() {
            self.render_protocol(&mut out, &protocol, storage, 0);
            out.standard("\n");
        }
        for extension in indexer.type_extension_definitions() {
            self.render_extension(&mut out, &extension, storage);
            out.standard("\n");
        }
        for extension in indexer.conformance_extension_definitions() {
            self.render_extension(&mut out, &extension, storage);
            out.standard("\n");
        }

        let globals_v = indexer.global_variable_definitions();
        let globals_f = indexer.global_function_definitions();
        for variable in &globals_v {
            self.render_variable(&mut out, variable, 0, false);
        }
        for function in &globals_f {
            self.render_function(&mut out, function, 0, false);
        }

        out
    }

    fn indent(&self, out: &mut InterfaceText, depth: usize)
    {
        for _ in 0..depth {
            out.standard("    ");
        }
    }

    fn type_text(&self, node: &NodeRef) -> String
    {
        self.cache.render(node, PrintOptions::default())
    }

    fn offset_comment(&self, out: &mut InterfaceText, offset: u64, depth: usize)
    {
        if self.config.emit_offset_comments && offset != 0 {
            self.indent(out, depth);
            out.standard(format!("// 0x{offset:x}\n"));
        }
    }

    fn render_type(&self, out: &mut InterfaceText, definition: &Arc<TypeDefinition>, storage: &Storage, depth: usize)
    {
        let members = definition.index(storage);

        self.offset_comment(out, definition.record().context.offset, depth);
        self.indent(out, depth);
        out.keyword(definition.kind().keyword());
        let info_kind = match definition.kind() {
            TypeKind::Enum => TypeInfoKind::Enum,
            TypeKind::Struct => TypeInfoKind::Struct,
            TypeKind::Class => TypeInfoKind::Class,
        };
        let simple_name = definition.record().context.name.clone().unwrap_or_default();
        out.push(
            simple_name,
            SemanticType::Type {
                kind: Some(info_kind),
                name: Some(definition.type_name().to_string()),
            },
        );
        out.standard(" {\n");

        for field in &members.fields {
            self.indent(out, depth + 1);
            if definition.kind() == TypeKind::Enum {
                if field.is_indirect_case {
                    out.keyword("indirect");
                }
                out.keyword("case");
                out.push(&field.name, SemanticType::Variable);
                if let Some(ty) = &field.type_node {
                    out.standard("(");
                    out.push(self.type_text(ty), SemanticType::Type { kind: None, name: None });
                    out.standard(")");
                }
            } else {
                if field.is_lazy {
                    out.keyword("lazy");
                }
                if field.is_weak {
                    out.keyword("weak");
                }
                out.keyword(if field.is_variable { "var" } else { "let" });
                out.push(&field.name, SemanticType::Variable);
                if let Some(ty) = &field.type_node {
                    out.standard(": ");
                    out.push(self.type_text(ty), SemanticType::Type { kind: None, name: None });
                }
            }
            out.standard("\n");
        }
        if self.config.print_type_layout && definition.kind() != TypeKind::Enum && !members.fields.is_empty() {
            self.indent(out, depth + 1);
            out.standard(format!("// layout: {} stored fields\n", members.fields.len()));
        }
        if self.config.print_enum_layout && definition.kind() == TypeKind::Enum && !members.fields.is_empty() {
            self.indent(out, depth + 1);
            out.standard(format!("// layout: {} cases\n", members.fields.len()));
        }

        self.render_member_set(out, &members.members, storage, depth + 1);

        if members.has_destructor || members.has_deallocator {
            self.indent(out, depth + 1);
            out.push("deinit", SemanticType::Keyword);
            out.standard("\n");
        }

        for child in definition.type_children() {
            self.render_type(out, &child, storage, depth + 1);
        }
        for protocol in definition.protocol_children() {
            self.render_protocol(out, &protocol, storage, depth + 1);
        }

        self.indent(out, depth);
        out.standard("}\n");
    }

    fn render_protocol(&self, out: &mut InterfaceText, protocol: &Arc<ProtocolDefinition>, storage: &Storage, depth: usize)
    {
        let members = protocol.index(storage);

        self.offset_comment(out, protocol.record().context.offset, depth);
        self.indent(out, depth);
        out.keyword("protocol");
        let simple_name = protocol.record().context.name.clone().unwrap_or_default();
        out.push(
            simple_name,
            SemanticType::Type {
                kind: Some(TypeInfoKind::Protocol),
                name: Some(protocol.name().to_string()),
            },
        );
        out.standard(" {\n");

        for name in &protocol.record().associated_type_names {
            self.indent(out, depth + 1);
            out.keyword("associatedtype");
            out.push(name, SemanticType::Type { kind: None, name: None });
            out.standard("\n");
        }

        self.render_member_set(out, members, storage, depth + 1);

        self.indent(out, depth);
        out.standard("}\n");
    }

    fn render_extension(&self, out: &mut InterfaceText, extension: &Arc<ExtensionDefinition>, storage: &Storage)
    {
        extension.index(storage);

        out.keyword("extension");
        let kind = match extension.name().kind {
            ExtensionKind::Type(TypeKind::Enum) => Some(TypeInfoKind::Enum),
            ExtensionKind::Type(TypeKind::Struct) => Some(TypeInfoKind::Struct),
            ExtensionKind::Type(TypeKind::Class) => Some(TypeInfoKind::Class),
            ExtensionKind::Protocol => Some(TypeInfoKind::Protocol),
            ExtensionKind::TypeAlias => Some(TypeInfoKind::TypeAlias),
        };
        let target = extension.name().type_name();
        out.push(
            &target,
            SemanticType::Type {
                kind,
                name: Some(target.clone()),
            },
        );
        if let Some(conformance) = extension.protocol_conformance() {
            out.standard(" : ");
            out.push(
                &conformance.protocol_name,
                SemanticType::Type {
                    kind: Some(TypeInfoKind::Protocol),
                    name: Some(conformance.protocol_name.clone()),
                },
            );
        }
        if let Some(signature) = extension.generic_signature() {
            out.standard(" ");
            out.push(self.type_text(signature), SemanticType::Other);
        }
        out.standard(" {\n");

        if let Some(associated) = extension.associated_type() {
            for entry in &associated.entries {
                self.indent(out, 1);
                out.keyword("typealias");
                out.push(&entry.name, SemanticType::Type { kind: None, name: None });
                out.standard(" = ");
                out.push(&entry.substituted_type_mangling, SemanticType::Other);
                out.standard("\n");
            }
        }

        let members = extension.members();
        self.render_member_set(out, &members, storage, 1);

        for child in extension.types() {
            self.render_type(out, &child, storage, 1);
        }
        for protocol in extension.protocols() {
            self.render_protocol(out, &protocol, storage, 1);
        }

        if self.config.print_stripped_symbolic_item {
            for witness in extension.missing_symbol_witnesses() {
                self.indent(out, 1);
                out.standard(format!("// stripped witness: {witness:?}\n"));
            }
        }

        out.standard("}\n");
    }

    fn render_member_set(&self, out: &mut InterfaceText, members: &crate::indexer::MemberSet, _storage: &Storage, depth: usize)
    {
        for allocator in &members.allocators {
            self.render_function(out, allocator, depth, false);
        }
        for constructor in &members.constructors {
            self.render_function(out, constructor, depth, false);
        }
        for variable in &members.variables {
            self.render_variable(out, variable, depth, false);
        }
        for variable in &members.static_variables {
            self.render_variable(out, variable, depth, true);
        }
        for function in &members.functions {
            self.render_function(out, function, depth, false);
        }
        for function in &members.static_functions {
            self.render_function(out, function, depth, true);
        }
        for subscript in &members.subscripts {
            self.render_subscript(out, subscript, depth, false);
        }
        for subscript in &members.static_subscripts {
            self.render_subscript(out, subscript, depth, true);
        }
    }

    fn render_variable(&self, out: &mut InterfaceText, variable: &VariableDefinition, depth: usize, is_static: bool)
    {
        self.offset_comment(out, variable.offset, depth);
        self.indent(out, depth);
        if is_static {
            out.keyword("static");
        }
        out.keyword("var");
        out.push(&variable.name, SemanticType::Variable);

        let inner = Node::find_first(&variable.node, NodeKind::Variable);
        if let Some(ty) = inner.as_ref().and_then(|v| v.child(2)) {
            out.standard(": ");
            out.push(self.type_text(ty), SemanticType::Type { kind: None, name: None });
        }

        let has_getter = variable.accessors.iter().any(|a| a.kind == crate::indexer::AccessorKind::Getter);
        let has_setter = variable
            .accessors
            .iter()
            .any(|a| matches!(a.kind, crate::indexer::AccessorKind::Setter | crate::indexer::AccessorKind::Modify));
        match (has_getter, has_setter) {
            (true, true) => out.standard(" { get set }"),
            (true, false) => out.standard(" { get }"),
            (false, true) => out.standard(" { set }"),
            (false, false) => {}
        }
        out.standard("\n");
    }

    fn render_function(&self, out: &mut InterfaceText, function: &FunctionDefinition, depth: usize, is_static: bool)
    {
        self.offset_comment(out, function.offset, depth);
        self.indent(out, depth);
        if is_static {
            out.keyword("static");
        }
        match function.kind {
            crate::indexer::FunctionKind::Function => {
                out.keyword("func");
                out.push(&function.name, SemanticType::FunctionDeclaration);
            }
            _ => {
                out.push("init", SemanticType::FunctionDeclaration);
            }
        }
        if let Some(signature) = self.signature_of(&function.node) {
            out.push(signature, SemanticType::Other);
        } else {
            out.standard("()");
        }
        out.standard("\n");
    }

    fn render_subscript(&self, out: &mut InterfaceText, subscript: &SubscriptDefinition, depth: usize, is_static: bool)
    {
        self.offset_comment(out, subscript.accessors.first().map(|a| a.offset).unwrap_or(0), depth);
        self.indent(out, depth);
        if is_static {
            out.keyword("static");
        }
        out.push("subscript", SemanticType::Keyword);
        if let Some(signature) = self.signature_of(&subscript.node) {
            out.push(signature, SemanticType::Other);
        }
        let has_setter = subscript
            .accessors
            .iter()
            .any(|a| matches!(a.kind, crate::indexer::AccessorKind::Setter | crate::indexer::AccessorKind::Modify));
        out.standard(if has_setter { " { get set }" } else { " { get }" });
        out.standard("\n");
    }

    /// The `(params) -> ret` portion of a function-like node.
    fn signature_of(&self, node: &NodeRef) -> Option<String>
    {
        let carrier = Node::find_first(node, NodeKind::Function)
            .or_else(|| Node::find_first(node, NodeKind::Subscript))
            .or_else(|| Node::find_first(node, NodeKind::Allocator))
            .or_else(|| Node::find_first(node, NodeKind::Constructor))?;
        let signature = carrier
            .children()
            .iter()
            .find(|child| matches!(child.kind(), NodeKind::Type | NodeKind::Tuple | NodeKind::FunctionType))?;
        Some(self.cache.render(signature, PrintOptions::default()))
    }
}
