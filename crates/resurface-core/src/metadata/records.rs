//! Decoded metadata records.
//!
//! These are the plain-data results of walking the reflective metadata
//! sections. The indexer consumes them through the
//! [`MetadataSource`](super::MetadataSource) trait, so everything here is
//! constructible without an image (tests build records directly).

use std::sync::Arc;

/// Kind of a context descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind
{
    Module,
    Extension,
    Anonymous,
    Protocol,
    OpaqueType,
    Class,
    Struct,
    Enum,
}

impl ContextKind
{
    /// Whether this context introduces a nominal type.
    pub fn is_type(self) -> bool
    {
        matches!(self, ContextKind::Class | ContextKind::Struct | ContextKind::Enum)
    }
}

/// Parent reference of a context descriptor.
///
/// The chain usually ends at a module context, but an indirect parent slot
/// bound against another image terminates in a raw symbol name instead.
#[derive(Debug, Clone)]
pub enum ParentRef
{
    Context(Arc<ContextRecord>),
    Symbol(String),
}

/// A decoded context descriptor.
#[derive(Debug, Clone)]
pub struct ContextRecord
{
    /// Context kind.
    pub kind: ContextKind,
    /// Declared name; absent for anonymous and extension contexts.
    pub name: Option<String>,
    /// Parent context, if any.
    pub parent: Option<ParentRef>,
    /// Virtual address of the descriptor in the image (0 for synthetic
    /// records).
    pub offset: u64,
    /// Whether the context was imported from C/Objective-C.
    pub is_c_imported: bool,
    /// For extension contexts: the mangled name of the extended context.
    pub extended_context_mangling: Option<String>,
    /// For extension contexts: the mangled generic signature, if constrained.
    pub generic_signature_mangling: Option<String>,
}

impl ContextRecord
{
    /// A module context with the given name.
    pub fn module(name: impl Into<String>) -> Arc<Self>
    {
        Arc::new(Self {
            kind: ContextKind::Module,
            name: Some(name.into()),
            parent: None,
            offset: 0,
            is_c_imported: false,
            extended_context_mangling: None,
            generic_signature_mangling: None,
        })
    }

    /// A nominal type context under `parent`.
    pub fn nominal(kind: ContextKind, name: impl Into<String>, parent: ParentRef) -> Arc<Self>
    {
        Arc::new(Self {
            kind,
            name: Some(name.into()),
            parent: Some(parent),
            offset: 0,
            is_c_imported: false,
            extended_context_mangling: None,
            generic_signature_mangling: None,
        })
    }

    /// An extension context extending the type named by `mangling`.
    pub fn extension(mangling: impl Into<String>, parent: ParentRef) -> Arc<Self>
    {
        Arc::new(Self {
            kind: ContextKind::Extension,
            name: None,
            parent: Some(parent),
            offset: 0,
            is_c_imported: false,
            extended_context_mangling: Some(mangling.into()),
            generic_signature_mangling: None,
        })
    }

    /// Name of the module at the root of this context chain, if the chain
    /// ends in a module.
    pub fn module_name(&self) -> Option<&str>
    {
        let mut current = self;
        loop {
            match (&current.kind, &current.parent) {
                (ContextKind::Module, _) => return current.name.as_deref(),
                (_, Some(ParentRef::Context(parent))) => current = parent,
                _ => return None,
            }
        }
    }
}

/// A field of a nominal type.
#[derive(Debug, Clone)]
pub struct FieldRecord
{
    /// Declared field name (lazy-storage prefix not yet stripped).
    pub name: String,
    /// Mangled name of the field's type, when recorded.
    pub mangled_type_name: Option<String>,
    /// `var` as opposed to `let`.
    pub is_variable: bool,
    /// Indirect enum case.
    pub is_indirect_case: bool,
}

/// Kind of a class method table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind
{
    Method,
    Init,
    Getter,
    Setter,
    ModifyCoroutine,
    ReadCoroutine,
}

/// A class vtable entry.
#[derive(Debug, Clone)]
pub struct MethodRecord
{
    pub kind: MethodKind,
    pub is_instance: bool,
    /// Virtual address of the implementation, if not stripped.
    pub impl_offset: Option<u64>,
}

/// A class override-table entry (also used for default overrides).
#[derive(Debug, Clone)]
pub struct OverrideRecord
{
    pub impl_offset: Option<u64>,
}

/// A decoded type context descriptor with its member tables.
#[derive(Debug, Clone)]
pub struct TypeRecord
{
    /// The underlying context; kind is always Class, Struct, or Enum.
    pub context: Arc<ContextRecord>,
    /// Reflected fields.
    pub fields: Vec<FieldRecord>,
    /// Class vtable entries (empty for value types).
    pub methods: Vec<MethodRecord>,
    /// Class override entries.
    pub overrides: Vec<OverrideRecord>,
    /// Class default-override entries.
    pub default_overrides: Vec<OverrideRecord>,
}

/// A decoded protocol descriptor.
#[derive(Debug, Clone)]
pub struct ProtocolRecord
{
    /// The underlying context; kind is always Protocol.
    pub context: Arc<ContextRecord>,
    /// Number of requirements in the requirement signature.
    pub num_requirements: u32,
    /// Names of the protocol's associated types.
    pub associated_type_names: Vec<String>,
}

/// Requirement side of a resilient witness.
#[derive(Debug, Clone)]
pub enum WitnessRequirement
{
    /// The requirement is known through a bound symbol.
    Symbol
    {
        name: String,
    },
    /// The requirement is a table element, possibly with a default
    /// implementation.
    Element
    {
        name: Option<String>,
        default_impl_offset: Option<u64>,
    },
}

/// A resilient witness: a requirement plus an indirect implementation.
#[derive(Debug, Clone)]
pub struct ResilientWitness
{
    pub requirement: WitnessRequirement,
    /// Virtual address of the implementation, if present.
    pub impl_offset: Option<u64>,
}

/// A decoded protocol conformance descriptor.
#[derive(Debug, Clone)]
pub struct ConformanceRecord
{
    /// Mangled reference to the conforming type.
    pub type_mangling: String,
    /// Dotted name of the conformed-to protocol.
    pub protocol_name: String,
    /// Mangled conditional-requirement signature, if the conformance is
    /// conditional.
    pub conditional_requirements_mangling: Option<String>,
    /// Resilient witness entries.
    pub resilient_witnesses: Vec<ResilientWitness>,
    /// Virtual address of the descriptor (0 for synthetic records).
    pub offset: u64,
}

/// One entry of an associated type record.
#[derive(Debug, Clone)]
pub struct AssociatedTypeEntry
{
    /// Associated type name as declared in the protocol.
    pub name: String,
    /// Mangled substituted type.
    pub substituted_type_mangling: String,
}

/// A decoded associated type descriptor.
#[derive(Debug, Clone)]
pub struct AssociatedTypeRecord
{
    /// Mangled reference to the conforming type.
    pub conforming_type_mangling: String,
    /// Dotted name of the protocol providing the associated types.
    pub protocol_name: String,
    /// The substitutions.
    pub entries: Vec<AssociatedTypeEntry>,
}
