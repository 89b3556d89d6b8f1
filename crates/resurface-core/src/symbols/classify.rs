//! Demangled-tree classification.
//!
//! Sorts the payload node of a `global`-rooted tree into the buckets the
//! symbol index stores: global functions and variables, or members of a
//! nominal type keyed by `{kind × static × extension × storage}`.

use crate::demangle::{interface_type_name, Node, NodeKind, NodeRef};
use crate::types::{TypeInfo, TypeInfoKind};

/// Kind of a global (module-scope) symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind
{
    Function,
    Variable
    {
        is_storage: bool,
    },
}

/// Kind of a type member, with its classification axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind
{
    Allocator
    {
        in_extension: bool,
    },
    Deallocator,
    Constructor
    {
        in_extension: bool,
    },
    Destructor,
    Subscript
    {
        in_extension: bool,
        is_static: bool,
    },
    Variable
    {
        in_extension: bool,
        is_static: bool,
        is_storage: bool,
    },
    Function
    {
        in_extension: bool,
        is_static: bool,
    },
}

impl MemberKind
{
    /// Whether this kind was classified out of an extension context.
    pub fn in_extension(self) -> bool
    {
        match self {
            MemberKind::Allocator { in_extension }
            | MemberKind::Constructor { in_extension }
            | MemberKind::Subscript { in_extension, .. }
            | MemberKind::Variable { in_extension, .. }
            | MemberKind::Function { in_extension, .. } => in_extension,
            MemberKind::Deallocator | MemberKind::Destructor => false,
        }
    }
}

/// A fully classified member: its kind plus the owning type.
#[derive(Debug, Clone)]
pub struct MemberClassification
{
    pub kind: MemberKind,
    /// Canonical interface name of the owning type.
    pub type_name: String,
    /// `type`-wrapped owning nominal, the structural lookup key.
    pub type_node: NodeRef,
    /// Owning type's name and nominal kind.
    pub type_info: TypeInfo,
}

/// The global predicate: a payload is module-scope when it is a function,
/// variable, or accessor whose (inner) variable hangs directly off a module.
pub fn is_global(payload: &NodeRef) -> bool
{
    match payload.kind() {
        NodeKind::Function | NodeKind::Variable => {
            matches!(payload.first_child().map(|c| c.kind()), Some(NodeKind::Module))
        }
        NodeKind::Getter | NodeKind::Setter => payload
            .first_child()
            .filter(|inner| inner.kind() == NodeKind::Variable)
            .map(is_global)
            .unwrap_or(false),
        _ => false,
    }
}

/// Classify a module-scope payload into a [`GlobalKind`].
///
/// Accessors recurse into their variable child; the variable position
/// decides storage-ness. A variable reached directly (its parent is not an
/// accessor) is the stored declaration; one reached through an accessor is
/// not counted as storage, which keeps a stored property from being counted
/// once per accessor.
pub fn classify_global(payload: &NodeRef) -> Option<GlobalKind>
{
    match payload.kind() {
        NodeKind::Function => Some(GlobalKind::Function),
        NodeKind::Variable => Some(GlobalKind::Variable { is_storage: true }),
        NodeKind::Getter | NodeKind::Setter => {
            let inner = payload.first_child()?;
            (inner.kind() == NodeKind::Variable).then_some(GlobalKind::Variable { is_storage: false })
        }
        _ => None,
    }
}

/// Classify a member payload, peeling outer wrappers.
///
/// Returns `None` when the terminal context is not a nominal type (for
/// example a module-scope entity that failed the global predicate, or a
/// context chain ending in an opaque context).
pub fn classify_member(payload: &NodeRef) -> Option<MemberClassification>
{
    classify_member_inner(payload, false, false)
}

fn classify_member_inner(payload: &NodeRef, is_static: bool, is_storage: bool) -> Option<MemberClassification>
{
    match payload.kind() {
        NodeKind::Static => {
            let inner = payload.first_child()?;
            if inner.kind().is_member() {
                classify_member_inner(inner, true, is_storage)
            } else {
                None
            }
        }
        NodeKind::Allocator => {
            let (target, in_extension) = resolve_owner(payload.first_child()?)?;
            finish(MemberKind::Allocator { in_extension }, &target)
        }
        NodeKind::Constructor => {
            let (target, in_extension) = resolve_owner(payload.first_child()?)?;
            finish(MemberKind::Constructor { in_extension }, &target)
        }
        NodeKind::Destructor => {
            let (target, _) = resolve_owner(payload.first_child()?)?;
            finish(MemberKind::Destructor, &target)
        }
        NodeKind::Deallocator => {
            let (target, _) = resolve_owner(payload.first_child()?)?;
            finish(MemberKind::Deallocator, &target)
        }
        NodeKind::Function => {
            let (target, in_extension) = resolve_owner(payload.first_child()?)?;
            finish(
                MemberKind::Function {
                    in_extension,
                    is_static,
                },
                &target,
            )
        }
        NodeKind::Variable => {
            // A variable reached directly is the stored declaration; the
            // accessor branch below reaches here with the flag cleared.
            let (target, in_extension) = resolve_owner(payload.first_child()?)?;
            finish(
                MemberKind::Variable {
                    in_extension,
                    is_static,
                    is_storage: is_storage || is_stored_declaration(payload),
                },
                &target,
            )
        }
        NodeKind::Subscript => {
            let (target, in_extension) = resolve_owner(payload.first_child()?)?;
            finish(
                MemberKind::Subscript {
                    in_extension,
                    is_static,
                },
                &target,
            )
        }
        NodeKind::Getter | NodeKind::Setter | NodeKind::ModifyAccessor | NodeKind::ReadAccessor => {
            let inner = payload.first_child()?;
            match inner.kind() {
                NodeKind::Variable => {
                    let (target, in_extension) = resolve_owner(inner.first_child()?)?;
                    finish(
                        MemberKind::Variable {
                            in_extension,
                            is_static,
                            is_storage: false,
                        },
                        &target,
                    )
                }
                NodeKind::Subscript => {
                    let (target, in_extension) = resolve_owner(inner.first_child()?)?;
                    finish(
                        MemberKind::Subscript {
                            in_extension,
                            is_static,
                        },
                        &target,
                    )
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Whether a variable node is the stored declaration rather than the target
/// of an accessor: its parent (if any) must not be an accessor holding it as
/// first child.
fn is_stored_declaration(variable: &NodeRef) -> bool
{
    match variable.parent() {
        Some(parent) => !parent.kind().is_accessor(),
        None => true,
    }
}

/// Resolve the owning context of a member down to the nominal it belongs
/// to. An extension context unwraps to its extended nominal.
fn resolve_owner(context: &NodeRef) -> Option<(NodeRef, bool)>
{
    match context.kind() {
        NodeKind::Extension => {
            let extended = context.child(1)?;
            extended.kind().is_nominal().then(|| (extended.clone(), true))
        }
        kind if kind.is_nominal() => Some((context.clone(), false)),
        _ => None,
    }
}

fn finish(kind: MemberKind, target: &NodeRef) -> Option<MemberClassification>
{
    let info_kind = match target.kind() {
        NodeKind::Enum => TypeInfoKind::Enum,
        NodeKind::Structure => TypeInfoKind::Struct,
        NodeKind::Class => TypeInfoKind::Class,
        NodeKind::Protocol => TypeInfoKind::Protocol,
        NodeKind::TypeAlias => TypeInfoKind::TypeAlias,
        _ => return None,
    };
    let type_node = Node::new(NodeKind::Type, vec![target.clone()]);
    let type_name = interface_type_name(&type_node);
    Some(MemberClassification {
        kind,
        type_name: type_name.clone(),
        type_node,
        type_info: TypeInfo {
            name: type_name,
            kind: info_kind,
        },
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::demangle::demangle;

    fn payload(mangled: &str) -> NodeRef
    {
        demangle(mangled).unwrap().child(0).unwrap().clone()
    }

    #[test]
    fn global_stored_variable_is_storage()
    {
        let node = payload("$s4main9someValueSivp");
        assert!(is_global(&node));
        assert_eq!(classify_global(&node), Some(GlobalKind::Variable { is_storage: true }));
    }

    #[test]
    fn global_getter_is_not_storage()
    {
        let node = payload("$s4main9someValueSivg");
        assert!(is_global(&node));
        assert_eq!(classify_global(&node), Some(GlobalKind::Variable { is_storage: false }));
    }

    #[test]
    fn static_function_in_extension()
    {
        let node = payload("$s4main3FooV4mainE3bazyyFZ");
        let member = classify_member(&node).unwrap();
        assert_eq!(
            member.kind,
            MemberKind::Function {
                in_extension: true,
                is_static: true,
            }
        );
        assert_eq!(member.type_name, "main.Foo");
    }

    #[test]
    fn stored_member_variable()
    {
        let node = payload("$s4main3FooV3barSivp");
        let member = classify_member(&node).unwrap();
        assert_eq!(
            member.kind,
            MemberKind::Variable {
                in_extension: false,
                is_static: false,
                is_storage: true,
            }
        );
    }

    #[test]
    fn getter_is_not_storage()
    {
        let node = payload("$s4main3FooV3barSivg");
        let member = classify_member(&node).unwrap();
        assert_eq!(
            member.kind,
            MemberKind::Variable {
                in_extension: false,
                is_static: false,
                is_storage: false,
            }
        );
    }

    #[test]
    fn module_scope_function_is_not_a_member()
    {
        let node = payload("$s4main3fooyyF");
        assert!(classify_member(&node).is_none());
    }
}
