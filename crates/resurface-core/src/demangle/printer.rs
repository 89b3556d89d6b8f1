//! Node-tree printing.
//!
//! Two modes are exposed. The full mode renders any entity for diagnostics
//! and interface output. The interface-type mode renders *type* nodes
//! exactly as type names appear in interface output, ignoring
//! accessor/attribute decorations; its output is the canonical key format
//! for every type-name lookup in the crate, so it must be deterministic and
//! reproducible across runs for equal inputs.

use std::fmt::Write;

use super::node::{Node, NodeKind, NodeRef};

/// Printing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions
{
    /// Render only the interface type name (canonical key format).
    pub interface_type_only: bool,
}

impl PrintOptions
{
    /// The canonical-key mode.
    pub fn interface_type() -> Self
    {
        Self {
            interface_type_only: true,
        }
    }
}

/// Render a node with the given options.
pub fn print(node: &NodeRef, options: PrintOptions) -> String
{
    let mut out = String::new();
    write_node(&mut out, node, options);
    out
}

/// Canonical interface type name for a type node, e.g. `main.Outer.Inner`.
pub fn interface_type_name(node: &NodeRef) -> String
{
    print(node, PrintOptions::interface_type())
}

fn write_node(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    match node.kind() {
        NodeKind::Global => {
            for child in node.children() {
                write_node(out, child, options);
            }
        }
        NodeKind::Module | NodeKind::Identifier => out.push_str(node.text().unwrap_or_default()),
        NodeKind::PrefixOperator | NodeKind::InfixOperator | NodeKind::PostfixOperator => {
            out.push_str(node.text().unwrap_or_default());
        }
        NodeKind::PrivateDeclName => {
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::Type => {
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::Structure | NodeKind::Enum | NodeKind::Class | NodeKind::Protocol | NodeKind::TypeAlias => {
            write_nominal(out, node, options);
        }
        NodeKind::Extension => write_extension(out, node, options),
        NodeKind::Tuple => write_tuple(out, node, options),
        NodeKind::FunctionType => {
            write_parameter_list(out, node.child(0), options);
            out.push_str(" -> ");
            match node.child(1) {
                Some(ret) => write_node(out, ret, options),
                None => out.push_str("()"),
            }
        }
        NodeKind::Weak => {
            out.push_str("weak ");
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::Variable => {
            write_qualified_name(out, node, options);
            if let Some(ty) = node.child(2) {
                out.push_str(" : ");
                write_node(out, ty, options);
            }
        }
        NodeKind::Function => {
            write_qualified_name(out, node, options);
            if let Some(signature) = node.child(2) {
                write_node(out, signature, options);
            }
        }
        NodeKind::Subscript => {
            if let Some(context) = node.child(0) {
                write_node(out, context, options);
            }
            out.push_str(".subscript");
            if let Some(signature) = node.child(1) {
                write_node(out, signature, options);
            }
        }
        NodeKind::Getter => write_accessor(out, node, "getter", options),
        NodeKind::Setter => write_accessor(out, node, "setter", options),
        NodeKind::ModifyAccessor => write_accessor(out, node, "modify", options),
        NodeKind::ReadAccessor => write_accessor(out, node, "read", options),
        NodeKind::Static => {
            out.push_str("static ");
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::Allocator => write_initializer(out, node, "__allocating_init", options),
        NodeKind::Constructor => write_initializer(out, node, "init", options),
        NodeKind::Destructor => {
            if let Some(context) = node.child(0) {
                write_node(out, context, options);
            }
            out.push_str(".deinit");
        }
        NodeKind::Deallocator => {
            if let Some(context) = node.child(0) {
                write_node(out, context, options);
            }
            out.push_str(".__deallocating_deinit");
        }
        NodeKind::MethodDescriptor => {
            out.push_str("method descriptor for ");
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::ProtocolWitness => {
            out.push_str("protocol witness for ");
            if let Some(entity) = node.child(0) {
                write_node(out, entity, options);
            }
            if let Some(conformance) = node.child(1) {
                out.push_str(" in ");
                write_node(out, conformance, options);
            }
        }
        NodeKind::ProtocolConformance => {
            if let Some(ty) = node.child(0) {
                write_node(out, ty, options);
            }
            out.push_str(" : ");
            if let Some(proto) = node.child(1) {
                write_node(out, proto, options);
            }
        }
        NodeKind::MergedFunction => out.push_str("merged "),
        NodeKind::OpaqueTypeDescriptor => {
            out.push_str("opaque type descriptor for ");
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::OpaqueReturnTypeOf => {
            out.push_str("opaque return type of ");
            if let Some(inner) = node.first_child() {
                write_node(out, inner, options);
            }
        }
        NodeKind::DependentGenericSignature => write_signature(out, node, options),
        NodeKind::RequirementKinds => write_requirement(out, node, options),
        NodeKind::LabelList => {}
    }
}

fn write_nominal(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    if let Some(context) = node.child(0) {
        write_node(out, context, options);
        out.push('.');
    }
    if let Some(name) = node.child(1) {
        write_node(out, name, options);
    }
    // Children past the name are generic arguments.
    if node.children().len() > 2 {
        out.push('<');
        for (index, argument) in node.children()[2..].iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            write_node(out, argument, options);
        }
        out.push('>');
    }
}

fn write_extension(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    if options.interface_type_only {
        // Type-name keys never include the defining module of an extension.
        if let Some(extended) = node.child(1) {
            write_node(out, extended, options);
        }
        return;
    }
    out.push_str("(extension in ");
    if let Some(module) = node.child(0) {
        write_node(out, module, options);
    }
    out.push_str("):");
    if let Some(extended) = node.child(1) {
        write_node(out, extended, options);
    }
    if let Some(signature) = node.child(2) {
        out.push(' ');
        write_node(out, signature, options);
    }
}

fn write_tuple(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    out.push('(');
    let mut first = true;
    write_tuple_elements(out, node, options, &mut first);
    out.push(')');
}

fn write_tuple_elements(out: &mut String, node: &NodeRef, options: PrintOptions, first: &mut bool)
{
    for element in node.children() {
        if element.kind() == NodeKind::Tuple {
            write_tuple_elements(out, element, options, first);
            continue;
        }
        if !*first {
            out.push_str(", ");
        }
        *first = false;
        write_node(out, element, options);
    }
}

fn write_parameter_list(out: &mut String, params: Option<&NodeRef>, options: PrintOptions)
{
    match params {
        Some(node) if node.kind() == NodeKind::Tuple => write_tuple(out, node, options),
        Some(node) => {
            out.push('(');
            write_node(out, node, options);
            out.push(')');
        }
        None => out.push_str("()"),
    }
}

fn write_qualified_name(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    if let Some(context) = node.child(0) {
        write_node(out, context, options);
        out.push('.');
    }
    if let Some(name) = node.child(1) {
        write_node(out, name, options);
    }
}

fn write_accessor(out: &mut String, node: &NodeRef, label: &str, options: PrintOptions)
{
    if let Some(inner) = node.first_child() {
        write_node(out, inner, options);
    }
    let _ = write!(out, ".{label}");
}

fn write_initializer(out: &mut String, node: &NodeRef, label: &str, options: PrintOptions)
{
    if let Some(context) = node.child(0) {
        write_node(out, context, options);
    }
    let _ = write!(out, ".{label}");
    write_parameter_list(out, node.child(1), options);
}

fn write_signature(out: &mut String, node: &NodeRef, options: PrintOptions)
{
    out.push_str("where ");
    for (index, requirement) in node.children().iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        write_node(out, requirement, options);
    }
}

fn write_requirement(out: &mut String, node: &Node, options: PrintOptions)
{
    let relation = match node.text() {
        Some("conformance") => " : ",
        _ => " == ",
    };
    if let Some(subject) = node.child(0) {
        write_node(out, subject, options);
    }
    out.push_str(relation);
    if let Some(constraint) = node.child(1) {
        write_node(out, constraint, options);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::demangle::parser::{demangle, demangle_type};
    use crate::demangle::Node;

    #[test]
    fn interface_type_name_is_the_dotted_path()
    {
        let nominal = demangle_type("4main5OuterV5InnerV").unwrap();
        let type_node = Node::new(NodeKind::Type, vec![nominal]);
        assert_eq!(interface_type_name(&type_node), "main.Outer.Inner");
    }

    #[test]
    fn interface_mode_ignores_extension_module()
    {
        let root = demangle("$s4main3FooV4mainE3bazyyF").unwrap();
        let function = root.child(0).unwrap();
        let extension = function.child(0).unwrap().clone();
        assert_eq!(interface_type_name(&extension), "main.Foo");
    }

    #[test]
    fn full_mode_renders_function_signature()
    {
        let root = demangle("$s4main3fooSiSbF").unwrap();
        let text = print(&root, PrintOptions::default());
        assert_eq!(text, "main.foo(Swift.Int) -> Swift.Bool");
    }

    #[test]
    fn signature_prints_requirements()
    {
        let signature = demangle_type("SiSbRsl").unwrap();
        let text = print(&signature, PrintOptions::default());
        assert_eq!(text, "where Swift.Int == Swift.Bool");
    }
}
