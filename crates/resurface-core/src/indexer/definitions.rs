//! The definition graph.
//!
//! Definitions are created during the indexing phases with their members
//! unindexed; member indexing happens lazily the first time the printer
//! visits a definition, latched by a once-cell so it runs exactly once.
//!
//! Children are held by owning handles, parent back-references by weak
//! handles. The graph is a DAG with upward references; nothing here may
//! form an ownership cycle.

use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::OnceCell;

use crate::demangle::{demangle, demangle_type, interface_type_name, Node, NodeKind, NodeRef};
use crate::metadata::{
    AssociatedTypeRecord, ConformanceRecord, ContextKind, ContextRecord, MethodRecord, ParentRef, ProtocolRecord,
    ResilientWitness, TypeRecord,
};
use crate::symbols::Storage;
use crate::types::Symbol;

use super::builders::{self, MethodDescriptorLookup};

/// Nominal kind of an indexed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    Enum,
    Struct,
    Class,
}

impl TypeKind
{
    /// Declaration keyword for this kind.
    pub fn keyword(self) -> &'static str
    {
        match self {
            TypeKind::Enum => "enum",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
        }
    }
}

/// A non-nested parent resolved during the context walk.
#[derive(Debug, Clone)]
pub enum ParentContext
{
    /// Parent is an extension context.
    Extension(ExtensionContext),
    /// Parent is a type context not described in this image's type section.
    Type(Arc<ContextRecord>),
    /// The chain terminated at a bound symbol in another image.
    Symbol(String),
}

/// Resolved information about an extension context record.
#[derive(Debug, Clone)]
pub struct ExtensionContext
{
    /// The extension's context record.
    pub record: Arc<ContextRecord>,
    /// Demangled extended nominal.
    pub extended_node: NodeRef,
    /// Demangled generic signature, if the extension is constrained.
    pub generic_signature: Option<NodeRef>,
}

impl ExtensionContext
{
    /// Resolve an extension context record by demangling its extended
    /// context and generic signature manglings.
    pub fn resolve(record: &Arc<ContextRecord>) -> Option<Self>
    {
        let mangling = record.extended_context_mangling.as_deref()?;
        let extended_node = demangle_type(mangling).ok()?;
        let generic_signature = record
            .generic_signature_mangling
            .as_deref()
            .and_then(|mangling| demangle_type(mangling).ok());
        Some(Self {
            record: record.clone(),
            extended_node,
            generic_signature,
        })
    }
}

/// Accessor kind recorded on a member definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind
{
    Getter,
    Setter,
    Modify,
    Read,
}

/// One accessor implementation of a variable or subscript.
#[derive(Debug, Clone)]
pub struct Accessor
{
    pub kind: AccessorKind,
    pub symbol: Symbol,
    /// Method table entry backing this accessor, when the owner is a class.
    pub method_descriptor: Option<MethodRecord>,
    pub offset: u64,
}

/// A reconstructed variable declaration.
#[derive(Debug, Clone)]
pub struct VariableDefinition
{
    pub name: String,
    /// Representative demangled node (the storage or getter form).
    pub node: NodeRef,
    pub accessors: Vec<Accessor>,
    pub is_global_or_static: bool,
    /// Offset of the first symbol in the group.
    pub offset: u64,
}

/// A reconstructed subscript declaration.
#[derive(Debug, Clone)]
pub struct SubscriptDefinition
{
    /// The structural `subscript` node shared by the group.
    pub node: NodeRef,
    pub accessors: Vec<Accessor>,
    pub is_static: bool,
}

/// Kind of a reconstructed function-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind
{
    Function,
    Allocator,
    Constructor,
}

/// A reconstructed function, initializer, or allocator.
#[derive(Debug, Clone)]
pub struct FunctionDefinition
{
    pub name: String,
    pub node: NodeRef,
    pub symbol: Symbol,
    pub offset: u64,
    pub kind: FunctionKind,
    pub is_global_or_static: bool,
    pub method_descriptor: Option<MethodRecord>,
}

/// A field read out of the type's field descriptor.
#[derive(Debug, Clone)]
pub struct FieldDefinition
{
    pub name: String,
    /// Demangled field type, when the record carried a mangled name.
    pub type_node: Option<NodeRef>,
    /// Lazy storage (the storage-prefix is stripped from `name`).
    pub is_lazy: bool,
    /// The type tree contains a weak wrapper.
    pub is_weak: bool,
    /// `var` rather than `let`.
    pub is_variable: bool,
    /// Indirect enum case.
    pub is_indirect_case: bool,
}

/// Members indexed for a type, protocol, or extension.
#[derive(Debug, Clone, Default)]
pub struct MemberSet
{
    pub variables: Vec<VariableDefinition>,
    pub static_variables: Vec<VariableDefinition>,
    pub functions: Vec<FunctionDefinition>,
    pub static_functions: Vec<FunctionDefinition>,
    pub subscripts: Vec<SubscriptDefinition>,
    pub static_subscripts: Vec<SubscriptDefinition>,
    pub allocators: Vec<FunctionDefinition>,
    pub constructors: Vec<FunctionDefinition>,
}

impl MemberSet
{
    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool
    {
        self.variables.is_empty()
            && self.static_variables.is_empty()
            && self.functions.is_empty()
            && self.static_functions.is_empty()
            && self.subscripts.is_empty()
            && self.static_subscripts.is_empty()
            && self.allocators.is_empty()
            && self.constructors.is_empty()
    }
}

/// Fully indexed members of a type definition.
#[derive(Debug, Clone, Default)]
pub struct TypeMembers
{
    pub fields: Vec<FieldDefinition>,
    pub members: MemberSet,
    pub has_deallocator: bool,
    pub has_destructor: bool,
}

const LAZY_STORAGE_PREFIX: &str = "$__lazy_storage_$_";

/// A nominal type described by the image's type section.
pub struct TypeDefinition
{
    record: TypeRecord,
    type_name: String,
    /// `type`-wrapped nominal node, the structural lookup key.
    type_node: NodeRef,
    kind: TypeKind,
    parent: Mutex<Weak<TypeDefinition>>,
    type_children: Mutex<Vec<Arc<TypeDefinition>>>,
    protocol_children: Mutex<Vec<Arc<ProtocolDefinition>>>,
    parent_context: OnceCell<ParentContext>,
    indexed: OnceCell<TypeMembers>,
}

impl TypeDefinition
{
    /// Build a definition from a type record. Returns `None` when the
    /// context chain cannot be rendered into a type node (the caller emits
    /// a name-extraction warning).
    pub fn from_record(record: TypeRecord) -> Option<Arc<Self>>
    {
        let kind = match record.context.kind {
            ContextKind::Enum => TypeKind::Enum,
            ContextKind::Struct => TypeKind::Struct,
            ContextKind::Class => TypeKind::Class,
            _ => return None,
        };
        let nominal = context_nominal_node(&record.context)?;
        let type_node = Node::new(NodeKind::Type, vec![nominal]);
        let type_name = interface_type_name(&type_node);
        Some(Arc::new(Self {
            record,
            type_name,
            type_node,
            kind,
            parent: Mutex::new(Weak::new()),
            type_children: Mutex::new(Vec::new()),
            protocol_children: Mutex::new(Vec::new()),
            parent_context: OnceCell::new(),
            indexed: OnceCell::new(),
        }))
    }

    pub fn record(&self) -> &TypeRecord
    {
        &self.record
    }

    pub fn type_name(&self) -> &str
    {
        &self.type_name
    }

    pub fn type_node(&self) -> &NodeRef
    {
        &self.type_node
    }

    pub fn kind(&self) -> TypeKind
    {
        self.kind
    }

    /// Nesting parent, if linked and still alive.
    pub fn parent(&self) -> Option<Arc<TypeDefinition>>
    {
        self.parent.lock().unwrap().upgrade()
    }

    /// Non-nested parent context, if one was recorded.
    pub fn parent_context(&self) -> Option<&ParentContext>
    {
        self.parent_context.get()
    }

    /// Whether this definition is a root of the printed tree.
    pub fn is_root(&self) -> bool
    {
        self.parent().is_none() && self.parent_context().is_none()
    }

    /// Nested type children, in linking order.
    pub fn type_children(&self) -> Vec<Arc<TypeDefinition>>
    {
        self.type_children.lock().unwrap().clone()
    }

    /// Nested protocol children, in linking order.
    pub fn protocol_children(&self) -> Vec<Arc<ProtocolDefinition>>
    {
        self.protocol_children.lock().unwrap().clone()
    }

    /// Link `child` under `parent`: a weak back-reference on the child, an
    /// owning handle on the parent.
    pub(crate) fn set_parent(child: &Arc<TypeDefinition>, parent: &Arc<TypeDefinition>)
    {
        *child.parent.lock().unwrap() = Arc::downgrade(parent);
        parent.type_children.lock().unwrap().push(child.clone());
    }

    pub(crate) fn set_parent_context(&self, context: ParentContext)
    {
        let _ = self.parent_context.set(context);
    }

    pub(crate) fn adopt_protocol(&self, protocol: &Arc<ProtocolDefinition>)
    {
        self.protocol_children.lock().unwrap().push(protocol.clone());
    }

    /// Whether the members have been indexed yet.
    pub fn is_indexed(&self) -> bool
    {
        self.indexed.get().is_some()
    }

    /// Index the members. Idempotent: the work runs once under the cell's
    /// lock, every later call returns the published result.
    pub fn index(&self, storage: &Storage) -> &TypeMembers
    {
        self.indexed.get_or_init(|| self.index_members(storage))
    }

    fn index_members(&self, storage: &Storage) -> TypeMembers
    {
        let fields: Vec<FieldDefinition> = self
            .record
            .fields
            .iter()
            .map(|field| {
                let type_node = field.mangled_type_name.as_deref().and_then(|m| demangle_type(m).ok());
                let is_weak = type_node
                    .as_ref()
                    .map(|node| node.contains_kind(NodeKind::Weak))
                    .unwrap_or(false);
                let (name, is_lazy) = match field.name.strip_prefix(LAZY_STORAGE_PREFIX) {
                    Some(stripped) => (stripped.to_string(), true),
                    None => (field.name.clone(), false),
                };
                FieldDefinition {
                    name,
                    type_node,
                    is_lazy,
                    is_weak,
                    is_variable: field.is_variable,
                    is_indirect_case: field.is_indirect_case,
                }
            })
            .collect();

        let lookup = if self.kind == TypeKind::Class {
            self.method_descriptor_lookup(storage)
        } else {
            MethodDescriptorLookup::new()
        };

        let known_field_names: std::collections::HashSet<String> = fields.iter().map(|f| f.name.clone()).collect();
        let members = builders::build_member_set(storage, &self.type_name, &self.type_node, &known_field_names, &lookup);

        let has_deallocator = !storage
            .member_symbols_for_type(
                crate::symbols::MemberBucket::Members,
                &[crate::symbols::MemberKind::Deallocator],
                &self.type_name,
            )
            .is_empty();
        let has_destructor = !storage
            .member_symbols_for_type(
                crate::symbols::MemberBucket::Members,
                &[crate::symbols::MemberKind::Destructor],
                &self.type_name,
            )
            .is_empty();

        TypeMembers {
            fields,
            members,
            has_deallocator,
            has_destructor,
        }
    }

    /// Resolve the class's method, override, and default-override tables
    /// into a lookup from member entity node to descriptor.
    ///
    /// For each table entry the implementation symbols at its offset are
    /// demangled; the first whose protocol-conformance child structurally
    /// matches this class's type node (skipping already-visited conformance
    /// nodes by identity) contributes an entry.
    fn method_descriptor_lookup(&self, storage: &Storage) -> MethodDescriptorLookup
    {
        let mut lookup = MethodDescriptorLookup::new();
        let mut visited: std::collections::HashSet<u64> = std::collections::HashSet::new();

        let mut resolve = |impl_offset: Option<u64>, descriptor: &MethodRecord| {
            let Some(offset) = impl_offset else { return };
            for symbol in storage.symbols_at_offset(offset) {
                let Some(root) = storage.demangled_node(symbol) else { continue };
                let Some(conformance) = Node::find_first(&root, NodeKind::ProtocolConformance) else {
                    continue;
                };
                if !visited.insert(conformance.identity()) {
                    continue;
                }
                let matches = conformance
                    .child(0)
                    .map(|ty| ty.structurally_equals(&self.type_node))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                if let Some(entity) = builders::member_entity(&root) {
                    lookup.insert(crate::demangle::StructuralKey(entity), descriptor.clone());
                    break;
                }
            }
        };

        for method in &self.record.methods {
            resolve(method.impl_offset, method);
        }
        let as_method = |impl_offset: Option<u64>| MethodRecord {
            kind: crate::metadata::MethodKind::Method,
            is_instance: true,
            impl_offset,
        };
        for entry in self.record.overrides.iter().chain(&self.record.default_overrides) {
            let descriptor = as_method(entry.impl_offset);
            resolve(entry.impl_offset, &descriptor);
        }
        lookup
    }
}

impl std::fmt::Debug for TypeDefinition
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("TypeDefinition")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("is_indexed", &self.is_indexed())
            .finish()
    }
}

/// A protocol described by the image's protocol section.
pub struct ProtocolDefinition
{
    record: ProtocolRecord,
    name: String,
    type_node: NodeRef,
    parent: Mutex<Weak<TypeDefinition>>,
    extension_context: OnceCell<ExtensionContext>,
    indexed: OnceCell<MemberSet>,
}

impl ProtocolDefinition
{
    /// Build a definition from a protocol record.
    pub fn from_record(record: ProtocolRecord) -> Option<Arc<Self>>
    {
        if record.context.kind != ContextKind::Protocol {
            return None;
        }
        let nominal = context_nominal_node(&record.context)?;
        let type_node = Node::new(NodeKind::Type, vec![nominal]);
        let name = interface_type_name(&type_node);
        Some(Arc::new(Self {
            record,
            name,
            type_node,
            parent: Mutex::new(Weak::new()),
            extension_context: OnceCell::new(),
            indexed: OnceCell::new(),
        }))
    }

    pub fn record(&self) -> &ProtocolRecord
    {
        &self.record
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn type_node(&self) -> &NodeRef
    {
        &self.type_node
    }

    pub fn parent(&self) -> Option<Arc<TypeDefinition>>
    {
        self.parent.lock().unwrap().upgrade()
    }

    pub fn extension_context(&self) -> Option<&ExtensionContext>
    {
        self.extension_context.get()
    }

    pub fn is_root(&self) -> bool
    {
        self.parent().is_none() && self.extension_context().is_none()
    }

    pub(crate) fn set_parent(&self, parent: &Arc<TypeDefinition>)
    {
        *self.parent.lock().unwrap() = Arc::downgrade(parent);
    }

    pub(crate) fn set_extension_context(&self, context: ExtensionContext)
    {
        let _ = self.extension_context.set(context);
    }

    /// Index the protocol's members (extensions on the protocol itself).
    pub fn index(&self, storage: &Storage) -> &MemberSet
    {
        self.indexed.get_or_init(|| {
            let known = std::collections::HashSet::new();
            let lookup = MethodDescriptorLookup::new();
            builders::build_member_set(storage, &self.name, &self.type_node, &known, &lookup)
        })
    }
}

impl std::fmt::Debug for ProtocolDefinition
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ProtocolDefinition").field("name", &self.name).finish()
    }
}

/// Kind axis of an extension target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind
{
    Type(TypeKind),
    Protocol,
    TypeAlias,
}

/// The combined key naming an extension target: the extended type node plus
/// its kind. All extensions of the same target share this name, whatever
/// mix of generic and non-generic, storage-bearing and computed members
/// they carry.
#[derive(Debug, Clone)]
pub struct ExtensionName
{
    /// The extended type node (`type`-wrapped nominal).
    pub node: NodeRef,
    pub kind: ExtensionKind,
}

impl ExtensionName
{
    /// Canonical interface name of the extended type.
    pub fn type_name(&self) -> String
    {
        interface_type_name(&self.node)
    }
}

/// A reconstructed extension: synthesized from nesting, conformances,
/// associated types, or extension-classified member symbols.
pub struct ExtensionDefinition
{
    name: ExtensionName,
    generic_signature: Option<NodeRef>,
    protocol_conformance: Option<Arc<ConformanceRecord>>,
    associated_type: Option<Arc<AssociatedTypeRecord>>,
    types: Mutex<Vec<Arc<TypeDefinition>>>,
    protocols: Mutex<Vec<Arc<ProtocolDefinition>>>,
    members: Mutex<MemberSet>,
    missing_symbol_witnesses: Mutex<Vec<ResilientWitness>>,
    indexed: OnceCell<()>,
}

impl ExtensionDefinition
{
    pub fn new(name: ExtensionName) -> Arc<Self>
    {
        Arc::new(Self {
            name,
            generic_signature: None,
            protocol_conformance: None,
            associated_type: None,
            types: Mutex::new(Vec::new()),
            protocols: Mutex::new(Vec::new()),
            members: Mutex::new(MemberSet::default()),
            missing_symbol_witnesses: Mutex::new(Vec::new()),
            indexed: OnceCell::new(),
        })
    }

    /// Builder-style constructor used by the indexing phases.
    pub fn with_parts(
        name: ExtensionName,
        generic_signature: Option<NodeRef>,
        protocol_conformance: Option<Arc<ConformanceRecord>>,
        associated_type: Option<Arc<AssociatedTypeRecord>>,
        members: MemberSet,
    ) -> Arc<Self>
    {
        Arc::new(Self {
            name,
            generic_signature,
            protocol_conformance,
            associated_type,
            types: Mutex::new(Vec::new()),
            protocols: Mutex::new(Vec::new()),
            members: Mutex::new(members),
            missing_symbol_witnesses: Mutex::new(Vec::new()),
            indexed: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &ExtensionName
    {
        &self.name
    }

    pub fn generic_signature(&self) -> Option<&NodeRef>
    {
        self.generic_signature.as_ref()
    }

    pub fn protocol_conformance(&self) -> Option<&Arc<ConformanceRecord>>
    {
        self.protocol_conformance.as_ref()
    }

    pub fn associated_type(&self) -> Option<&Arc<AssociatedTypeRecord>>
    {
        self.associated_type.as_ref()
    }

    pub fn types(&self) -> Vec<Arc<TypeDefinition>>
    {
        self.types.lock().unwrap().clone()
    }

    pub fn protocols(&self) -> Vec<Arc<ProtocolDefinition>>
    {
        self.protocols.lock().unwrap().clone()
    }

    pub fn members(&self) -> MemberSet
    {
        self.members.lock().unwrap().clone()
    }

    /// Conformance members whose implementation could not be located.
    pub fn missing_symbol_witnesses(&self) -> Vec<ResilientWitness>
    {
        self.missing_symbol_witnesses.lock().unwrap().clone()
    }

    pub(crate) fn adopt_type(&self, child: &Arc<TypeDefinition>)
    {
        self.types.lock().unwrap().push(child.clone());
    }

    pub(crate) fn adopt_protocol(&self, child: &Arc<ProtocolDefinition>)
    {
        self.protocols.lock().unwrap().push(child.clone());
    }

    pub(crate) fn push_missing_witness(&self, witness: ResilientWitness)
    {
        self.missing_symbol_witnesses.lock().unwrap().push(witness);
    }

    pub(crate) fn set_members(&self, members: MemberSet)
    {
        *self.members.lock().unwrap() = members;
    }

    pub fn is_indexed(&self) -> bool
    {
        self.indexed.get().is_some()
    }

    /// Index the extension. Only meaningful when a protocol conformance
    /// with resilient witnesses is attached; idempotent either way.
    pub fn index(&self, storage: &Storage)
    {
        self.indexed.get_or_init(|| {
            super::conformance::index_conformance(self, storage);
        });
    }
}

impl std::fmt::Debug for ExtensionDefinition
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ExtensionDefinition")
            .field("target", &self.name.type_name())
            .field("kind", &self.name.kind)
            .field("has_conformance", &self.protocol_conformance.is_some())
            .finish()
    }
}

/// Build the nominal node for a context record by walking its parent chain.
///
/// Anonymous and opaque contexts are invisible in names and are skipped.
/// Extension parents splice in the extended nominal. Symbol-terminated
/// chains demangle the symbol and use its payload as the parent.
pub fn context_nominal_node(context: &ContextRecord) -> Option<NodeRef>
{
    let kind = match context.kind {
        ContextKind::Module => {
            return Some(Node::with_text(NodeKind::Module, context.name.as_deref()?));
        }
        ContextKind::Extension => {
            return demangle_type(context.extended_context_mangling.as_deref()?).ok();
        }
        ContextKind::Class => NodeKind::Class,
        ContextKind::Struct => NodeKind::Structure,
        ContextKind::Enum => NodeKind::Enum,
        ContextKind::Protocol => NodeKind::Protocol,
        ContextKind::Anonymous | ContextKind::OpaqueType => return None,
    };

    let parent_node = parent_nominal_node(context.parent.as_ref()?)?;
    let name = context.name.as_deref()?;
    Some(Node::new(kind, vec![parent_node, Node::with_text(NodeKind::Identifier, name)]))
}

fn parent_nominal_node(parent: &ParentRef) -> Option<NodeRef>
{
    match parent {
        ParentRef::Symbol(name) => {
            let root = demangle(name).ok()?;
            root.first_child().cloned()
        }
        ParentRef::Context(record) => {
            match record.kind {
                // Invisible contexts defer to their own parent.
                ContextKind::Anonymous | ContextKind::OpaqueType => parent_nominal_node(record.parent.as_ref()?),
                _ => context_nominal_node(record),
            }
        }
    }
}
