//! Demangled node trees.
//!
//! A [`Node`] is an immutable ordered tree with a typed kind, an optional
//! text payload (terminals only), and a non-owning parent back-reference.
//! Two separate demanglings of the same mangled name produce trees with
//! distinct identity but equal structure, so the tree exposes two views:
//!
//! - **structural**: kind + text + children, recursively. This is the view
//!   map keys use ([`StructuralKey`]), stable across runs.
//! - **identity**: a token assigned at creation ([`Node::identity`]), used
//!   for visited sets that must not conflate equal-looking reparses.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

/// Grammatical role of a demangled node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind
{
    Global,
    Function,
    Variable,
    Subscript,
    Allocator,
    Deallocator,
    Constructor,
    Destructor,
    Getter,
    Setter,
    ModifyAccessor,
    ReadAccessor,
    Static,
    Extension,
    Module,
    Protocol,
    Enum,
    Structure,
    Class,
    TypeAlias,
    MethodDescriptor,
    ProtocolWitness,
    ProtocolConformance,
    MergedFunction,
    OpaqueTypeDescriptor,
    OpaqueReturnTypeOf,
    Type,
    DependentGenericSignature,
    RequirementKinds,
    LabelList,
    Identifier,
    PrivateDeclName,
    PrefixOperator,
    InfixOperator,
    PostfixOperator,
    Tuple,
    FunctionType,
    Weak,
}

impl NodeKind
{
    /// Kinds the member classifier accepts as member payloads.
    pub fn is_member(self) -> bool
    {
        matches!(
            self,
            NodeKind::Allocator
                | NodeKind::Constructor
                | NodeKind::Deallocator
                | NodeKind::Destructor
                | NodeKind::Function
                | NodeKind::Variable
                | NodeKind::Subscript
                | NodeKind::Getter
                | NodeKind::Setter
                | NodeKind::ModifyAccessor
                | NodeKind::ReadAccessor
                | NodeKind::Static
        )
    }

    /// Nominal type-context kinds.
    pub fn is_nominal(self) -> bool
    {
        matches!(
            self,
            NodeKind::Enum | NodeKind::Structure | NodeKind::Class | NodeKind::Protocol | NodeKind::TypeAlias
        )
    }

    /// Property accessor kinds.
    pub fn is_accessor(self) -> bool
    {
        matches!(
            self,
            NodeKind::Getter | NodeKind::Setter | NodeKind::ModifyAccessor | NodeKind::ReadAccessor
        )
    }
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a demangled node.
pub type NodeRef = Arc<Node>;

/// A single element of a demangled tree.
pub struct Node
{
    kind: NodeKind,
    text: Option<String>,
    children: Vec<NodeRef>,
    parent: OnceCell<Weak<Node>>,
    identity: u64,
}

impl Node
{
    /// Build an interior node from its children.
    ///
    /// Each child's parent back-reference is pointed at the new node. A
    /// child can only ever have one parent; trees are built bottom-up and
    /// never share subtrees across parents.
    pub fn new(kind: NodeKind, children: Vec<NodeRef>) -> NodeRef
    {
        Self::build(kind, None, children)
    }

    /// Build a terminal node carrying a text payload.
    pub fn with_text(kind: NodeKind, text: impl Into<String>) -> NodeRef
    {
        Self::build(kind, Some(text.into()), Vec::new())
    }

    /// Build an interior node carrying both a text payload and children.
    ///
    /// Only requirement nodes use this shape: the payload names the
    /// requirement relation, the children are its subject and constraint.
    pub fn with_text_and_children(kind: NodeKind, text: impl Into<String>, children: Vec<NodeRef>) -> NodeRef
    {
        Self::build(kind, Some(text.into()), children)
    }

    fn build(kind: NodeKind, text: Option<String>, children: Vec<NodeRef>) -> NodeRef
    {
        let node = Arc::new(Node {
            kind,
            text,
            children,
            parent: OnceCell::new(),
            identity: NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed),
        });
        for child in &node.children {
            let _ = child.parent.set(Arc::downgrade(&node));
        }
        node
    }

    /// Grammatical role.
    pub fn kind(&self) -> NodeKind
    {
        self.kind
    }

    /// Terminal payload, if any.
    pub fn text(&self) -> Option<&str>
    {
        self.text.as_deref()
    }

    /// Ordered children.
    pub fn children(&self) -> &[NodeRef]
    {
        &self.children
    }

    /// Child at `index`, if present.
    pub fn child(&self, index: usize) -> Option<&NodeRef>
    {
        self.children.get(index)
    }

    /// First child, if present.
    pub fn first_child(&self) -> Option<&NodeRef>
    {
        self.children.first()
    }

    /// Parent node, if this node has been adopted and the parent is alive.
    pub fn parent(&self) -> Option<NodeRef>
    {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Identity token assigned at creation. Never reused within a process.
    pub fn identity(&self) -> u64
    {
        self.identity
    }

    /// First descendant of `node` (preorder, self included) with the given kind.
    pub fn find_first(node: &NodeRef, kind: NodeKind) -> Option<NodeRef>
    {
        if node.kind == kind {
            return Some(node.clone());
        }
        node.children.iter().find_map(|child| Node::find_first(child, kind))
    }

    /// Whether any descendant (self included) has the given kind.
    pub fn contains_kind(&self, kind: NodeKind) -> bool
    {
        self.kind == kind || self.children.iter().any(|child| child.contains_kind(kind))
    }

    /// Structural equality: kind, text, and children, recursively.
    pub fn structurally_equals(&self, other: &Node) -> bool
    {
        if self.kind != other.kind || self.text != other.text || self.children.len() != other.children.len() {
            return false;
        }
        self.children
            .iter()
            .zip(other.children.iter())
            .all(|(a, b)| a.structurally_equals(b))
    }

    /// Feed the structural shape of this node into a hasher.
    pub fn structural_hash<H: Hasher>(&self, state: &mut H)
    {
        self.kind.hash(state);
        self.text.hash(state);
        self.children.len().hash(state);
        for child in &self.children {
            child.structural_hash(state);
        }
    }
}

impl fmt::Debug for Node
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:?}", self.kind)?;
        if let Some(text) = &self.text {
            write!(f, "({text:?})")?;
        }
        if !self.children.is_empty() {
            f.debug_list().entries(self.children.iter()).finish()?;
        }
        Ok(())
    }
}

/// Map-key wrapper giving a [`NodeRef`] structural hash and equality.
///
/// Distinct-identity reparses of the same mangled name collapse to the same
/// key, which is what every consumer-visible index map wants.
#[derive(Clone)]
pub struct StructuralKey(pub NodeRef);

impl StructuralKey
{
    /// The wrapped node.
    pub fn node(&self) -> &NodeRef
    {
        &self.0
    }
}

impl PartialEq for StructuralKey
{
    fn eq(&self, other: &Self) -> bool
    {
        self.0.structurally_equals(&other.0)
    }
}

impl Eq for StructuralKey {}

impl Hash for StructuralKey
{
    fn hash<H: Hasher>(&self, state: &mut H)
    {
        self.0.structural_hash(state);
    }
}

impl fmt::Debug for StructuralKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample() -> NodeRef
    {
        Node::new(
            NodeKind::Structure,
            vec![
                Node::with_text(NodeKind::Module, "main"),
                Node::with_text(NodeKind::Identifier, "Foo"),
            ],
        )
    }

    #[test]
    fn structural_equality_ignores_identity()
    {
        let a = sample();
        let b = sample();
        assert_ne!(a.identity(), b.identity());
        assert!(a.structurally_equals(&b));
        assert_eq!(StructuralKey(a), StructuralKey(b));
    }

    #[test]
    fn parent_back_reference_is_set_once()
    {
        let node = sample();
        let module = node.child(0).unwrap().clone();
        let parent = module.parent().unwrap();
        assert!(Arc::ptr_eq(&parent, &node));
    }

    #[test]
    fn structural_inequality_on_text()
    {
        let a = sample();
        let b = Node::new(
            NodeKind::Structure,
            vec![
                Node::with_text(NodeKind::Module, "main"),
                Node::with_text(NodeKind::Identifier, "Bar"),
            ],
        );
        assert!(!a.structurally_equals(&b));
    }
}
