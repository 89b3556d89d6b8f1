//! Configuration for the indexer and the printer.

/// Options recognized by the interface indexer.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceIndexConfiguration
{
    /// Include type descriptors that were imported from C/Objective-C.
    ///
    /// Off by default: C-imported contexts describe declarations that
    /// already have a canonical interface elsewhere.
    pub show_c_imported_types: bool,
}

impl Default for InterfaceIndexConfiguration
{
    fn default() -> Self
    {
        Self {
            show_c_imported_types: false,
        }
    }
}

/// Options recognized by the interface printer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrinterConfiguration
{
    /// Prefix each declaration with a `// 0x...` file-offset comment.
    pub emit_offset_comments: bool,
    /// Print struct/class field layout records.
    pub print_type_layout: bool,
    /// Print enum case layout records.
    pub print_enum_layout: bool,
    /// Print members whose implementation symbol was stripped.
    pub print_stripped_symbolic_item: bool,
}
