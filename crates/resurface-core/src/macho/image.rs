//! Mach-O image parsing and section loading.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol};

use crate::error::{ResurfaceError, Result};
use crate::types::{Nlist, Symbol, SymbolType};

/// Context describing the shared cache an image was loaded from.
///
/// When an image is read from its on-disk file form inside a shared cache,
/// per-symbol offsets must additionally be recorded relative to
/// `shared_region_start` so cache-relative references resolve. Offsets of
/// exactly 0 are exempt: those entries never index into the adjusted tables.
#[derive(Debug, Clone, Copy)]
pub struct SharedCacheContext
{
    /// Base address of the shared region.
    pub shared_region_start: u64,
    /// Whether the image bytes are the on-disk file representation (as
    /// opposed to the already-slid in-memory mapping).
    pub is_file_representation: bool,
}

/// A loaded section: owned bytes plus its virtual address.
#[derive(Clone)]
pub struct SectionBlob
{
    /// Section name (e.g. `__swift5_types`).
    pub name: String,
    /// Virtual address of the first byte.
    pub address: u64,
    /// Section contents.
    pub data: Arc<[u8]>,
}

impl SectionBlob
{
    /// Whether `address` falls inside this section.
    pub fn contains(&self, address: u64) -> bool
    {
        address >= self.address && address < self.address + self.data.len() as u64
    }
}

impl fmt::Debug for SectionBlob
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("SectionBlob")
            .field("name", &self.name)
            .field("address", &format_args!("0x{:x}", self.address))
            .field("len", &self.data.len())
            .finish()
    }
}

/// A parsed Mach-O image with its sections and symbol tables loaded.
///
/// All bytes are copied out of the input at parse time, so the image owns
/// everything it hands out and no lifetimes leak into consumers.
pub struct MachImage
{
    path: PathBuf,
    sections: Vec<SectionBlob>,
    symbols: Vec<Symbol>,
    exports: Vec<Symbol>,
    image_start_offset: u64,
    shared_cache: Option<SharedCacheContext>,
}

impl MachImage
{
    /// Read and parse an image from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::parse(&data, path)
    }

    /// Parse an image from a byte buffer.
    pub fn parse(data: &[u8], path: &Path) -> Result<Self>
    {
        let file = object::File::parse(data)?;
        if !matches!(
            file,
            object::File::MachO64(_)
        ) {
            return Err(ResurfaceError::UnsupportedImage(format!(
                "{}: only 64-bit Mach-O images carry the metadata sections we read",
                path.display()
            )));
        }

        let mut sections = Vec::new();
        for section in file.sections() {
            let name = match section.name() {
                Ok(name) => name.to_string(),
                Err(_) => continue,
            };
            let data = match section.uncompressed_data() {
                Ok(data) => Arc::<[u8]>::from(data.into_owned()),
                Err(err) => {
                    tracing::debug!(section = %name, %err, "skipping unreadable section");
                    continue;
                }
            };
            sections.push(SectionBlob {
                name,
                address: section.address(),
                data,
            });
        }

        let mut symbols = Vec::new();
        for symbol in file.symbols() {
            let Ok(name) = symbol.name() else { continue };
            let symbol_type = if symbol.is_undefined() {
                SymbolType::Undefined
            } else {
                match symbol.section() {
                    object::SymbolSection::Absolute => SymbolType::Absolute,
                    object::SymbolSection::Section(_) => SymbolType::Section,
                    _ => SymbolType::Other,
                }
            };
            symbols.push(Symbol::new(
                symbol.address(),
                name,
                Some(Nlist {
                    external: symbol.is_global(),
                    symbol_type,
                }),
            ));
        }

        let exports = file
            .exports()?
            .into_iter()
            .filter_map(|export| {
                let name = std::str::from_utf8(export.name()).ok()?;
                Some(Symbol::new(export.address(), name, None))
            })
            .collect();

        let image_start_offset = file
            .segments()
            .find(|segment| matches!(segment.name(), Ok(Some("__TEXT"))))
            .map(|segment| segment.address())
            .unwrap_or_else(|| file.relative_address_base());

        Ok(Self {
            path: path.to_path_buf(),
            sections,
            symbols,
            exports,
            image_start_offset,
            shared_cache: None,
        })
    }

    /// Build an image directly from pre-collected pieces. Used by tests and
    /// by callers that extract images out of a shared cache themselves.
    pub fn from_parts(
        path: PathBuf,
        sections: Vec<SectionBlob>,
        symbols: Vec<Symbol>,
        exports: Vec<Symbol>,
        image_start_offset: u64,
    ) -> Self
    {
        Self {
            path,
            sections,
            symbols,
            exports,
            image_start_offset,
            shared_cache: None,
        }
    }

    /// Attach a shared-cache context.
    #[must_use]
    pub fn with_shared_cache(mut self, context: SharedCacheContext) -> Self
    {
        self.shared_cache = Some(context);
        self
    }

    /// Path the image was loaded from.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Ordinary symbol table entries, in table order.
    pub fn symbols(&self) -> &[Symbol]
    {
        &self.symbols
    }

    /// Exported symbols, in trie order.
    pub fn exports(&self) -> &[Symbol]
    {
        &self.exports
    }

    /// Virtual address the image is linked at.
    pub fn image_start_offset(&self) -> u64
    {
        self.image_start_offset
    }

    /// Shared-cache context, if one was attached.
    pub fn shared_cache(&self) -> Option<SharedCacheContext>
    {
        self.shared_cache
    }

    /// Look up a loaded section by name.
    pub fn section(&self, name: &str) -> Option<&SectionBlob>
    {
        self.sections.iter().find(|section| section.name == name)
    }

    /// The section containing `address`, if any.
    pub fn section_containing(&self, address: u64) -> Option<&SectionBlob>
    {
        self.sections.iter().find(|section| section.contains(address))
    }

    /// Read `len` bytes at a virtual address, if they fall inside one section.
    pub fn read_bytes(&self, address: u64, len: usize) -> Option<&[u8]>
    {
        let section = self.section_containing(address)?;
        let start = (address - section.address) as usize;
        let end = start.checked_add(len)?;
        section.data.get(start..end)
    }

    /// Read a nul-terminated UTF-8 string at a virtual address.
    pub fn read_cstring(&self, address: u64) -> Option<String>
    {
        let section = self.section_containing(address)?;
        let start = (address - section.address) as usize;
        let rest = section.data.get(start..)?;
        let end = rest.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&rest[..end]).ok().map(str::to_string)
    }
}

impl fmt::Debug for MachImage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("MachImage")
            .field("path", &self.path)
            .field("sections", &self.sections.len())
            .field("symbols", &self.symbols.len())
            .field("exports", &self.exports.len())
            .finish()
    }
}
