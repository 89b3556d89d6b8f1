//! Symbol table entry types.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::demangle::NodeRef;

/// nlist entry type, reduced to the distinctions the index cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType
{
    /// Defined in a section of this image.
    Section,
    /// Referenced here, defined elsewhere.
    Undefined,
    /// Absolute address, not subject to sliding.
    Absolute,
    /// Anything else (indirect, prebound, ...).
    Other,
}

/// Flags carried over from the image's nlist entry.
///
/// Symbols recovered from the export trie have no nlist entry, so the
/// [`Symbol`] field holding this is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nlist
{
    /// External (globally visible) symbol.
    pub external: bool,
    /// Entry type.
    pub symbol_type: SymbolType,
}

/// A raw symbol table entry: offset, mangled name, and optional nlist flags.
///
/// Equality and hashing cover all three fields so a file-relative and a
/// cache-relative insertion of the same entry stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol
{
    /// File offset of the symbol (0 for undefined entries).
    pub offset: u64,
    /// Raw mangled name as it appears in the string table.
    pub name: String,
    /// nlist flags, absent for exported-trie entries.
    pub nlist: Option<Nlist>,
}

impl Symbol
{
    /// Construct a symbol with nlist flags.
    pub fn new(offset: u64, name: impl Into<String>, nlist: Option<Nlist>) -> Self
    {
        Self {
            offset,
            name: name.into(),
            nlist,
        }
    }

    /// Whether the nlist entry marks this symbol external.
    pub fn is_external(&self) -> bool
    {
        self.nlist.map(|n| n.external).unwrap_or(false)
    }

    /// Whether the nlist entry marks this symbol undefined.
    pub fn is_undefined(&self) -> bool
    {
        self.nlist
            .map(|n| n.symbol_type == SymbolType::Undefined)
            .unwrap_or(false)
    }
}

impl fmt::Display for Symbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} @ 0x{:x}", self.name, self.offset)
    }
}

/// A symbol paired with its demangled tree, as stored in the index buckets.
///
/// The `consumed` flag is observational only: it latches `true` the first
/// time any accessor surfaces the wrapped value, and nothing reads it back
/// on a correctness path.
#[derive(Debug)]
pub struct IndexedSymbol
{
    symbol: Symbol,
    node: NodeRef,
    consumed: AtomicBool,
}

impl IndexedSymbol
{
    /// Wrap a symbol and its demangled root.
    pub fn new(symbol: Symbol, node: NodeRef) -> Arc<Self>
    {
        Arc::new(Self {
            symbol,
            node,
            consumed: AtomicBool::new(false),
        })
    }

    /// The wrapped symbol, latching the consumed flag.
    pub fn symbol(&self) -> &Symbol
    {
        self.consumed.store(true, Ordering::Relaxed);
        &self.symbol
    }

    /// The demangled root node, latching the consumed flag.
    pub fn node(&self) -> &NodeRef
    {
        self.consumed.store(true, Ordering::Relaxed);
        &self.node
    }

    /// File offset of the wrapped symbol (does not latch).
    pub fn offset(&self) -> u64
    {
        self.symbol.offset
    }

    /// Peek at the symbol without latching. Used by the index build itself.
    pub(crate) fn symbol_unconsumed(&self) -> &Symbol
    {
        &self.symbol
    }

    /// Peek at the node without latching. Used by the index build itself.
    pub(crate) fn node_unconsumed(&self) -> &NodeRef
    {
        &self.node
    }

    /// Whether any accessor has surfaced this symbol yet.
    pub fn is_consumed(&self) -> bool
    {
        self.consumed.load(Ordering::Relaxed)
    }
}

/// Nominal kind attached to a type name discovered during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeInfoKind
{
    Enum,
    Struct,
    Class,
    Protocol,
    TypeAlias,
}

/// A type name paired with its nominal kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo
{
    /// Canonical dotted type name, e.g. `Module.Outer.Inner`.
    pub name: String,
    /// Nominal kind.
    pub kind: TypeInfoKind,
}
