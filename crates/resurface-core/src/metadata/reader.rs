//! Section-backed record decoding.
//!
//! Walks the four reflective metadata sections and decodes their records
//! into the plain structs of [`records`](super::records). The layout
//! decoded here is the subset of the metadata ABI the reconstruction
//! pipeline consumes; every relative pointer is bounds-checked against the
//! loaded sections, and malformed records fail the whole section decode
//! (the indexer downgrades that to an empty list plus an event).
//!
//! Relative pointers are i32 offsets relative to their own location. A
//! parent pointer with the low bit set is indirect: it names a pointer slot
//! bound against another image, and resolves to the symbol registered at
//! that slot's address.

use std::sync::Arc;

use super::records::{
    AssociatedTypeEntry, AssociatedTypeRecord, ConformanceRecord, ContextKind, ContextRecord, FieldRecord, MethodKind,
    MethodRecord, OverrideRecord, ParentRef, ProtocolRecord, ResilientWitness, TypeRecord, WitnessRequirement,
};
use super::MetadataSource;
use crate::error::{ResurfaceError, Result};
use crate::macho::MachImage;

const TYPES_SECTION: &str = "__swift5_types";
const PROTOCOLS_SECTION: &str = "__swift5_protos";
const CONFORMANCES_SECTION: &str = "__swift5_proto";
const ASSOCIATED_TYPES_SECTION: &str = "__swift5_assocty";

// Context descriptor flag bits.
const KIND_MASK: u32 = 0x1F;
const FLAG_C_IMPORTED: u32 = 0x20;
const FLAG_GENERIC_SIGNATURE: u32 = 0x80;

// Method table entry flag bits.
const METHOD_KIND_MASK: u32 = 0x0F;
const METHOD_FLAG_INSTANCE: u32 = 0x10;

// Parent chains in hostile images can be circular.
const MAX_PARENT_DEPTH: usize = 64;

/// [`MetadataSource`] reading records out of a parsed image.
pub struct MachOMetadataSource<'a>
{
    image: &'a MachImage,
}

impl<'a> MachOMetadataSource<'a>
{
    pub fn new(image: &'a MachImage) -> Self
    {
        Self { image }
    }

    fn decode_error(&self, section: &str, reason: impl Into<String>) -> ResurfaceError
    {
        ResurfaceError::SectionDecode {
            section: section.to_string(),
            reason: reason.into(),
        }
    }

    fn read_u32(&self, address: u64) -> Result<u32>
    {
        let bytes = self
            .image
            .read_bytes(address, 4)
            .ok_or(ResurfaceError::BadRelativePointer { offset: address })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&self, address: u64) -> Result<i32>
    {
        Ok(self.read_u32(address)? as i32)
    }

    /// Resolve a relative pointer stored at `address`. Returns `None` for a
    /// zero (absent) pointer.
    fn resolve_relative(&self, address: u64) -> Result<Option<u64>>
    {
        let value = self.read_i32(address)?;
        if value == 0 {
            return Ok(None);
        }
        let target = address
            .checked_add_signed(value as i64)
            .ok_or(ResurfaceError::BadRelativePointer { offset: address })?;
        Ok(Some(target))
    }

    fn read_relative_cstring(&self, address: u64) -> Result<Option<String>>
    {
        match self.resolve_relative(address)? {
            None => Ok(None),
            Some(target) => self
                .image
                .read_cstring(target)
                .map(Some)
                .ok_or(ResurfaceError::BadRelativePointer { offset: address }),
        }
    }

    /// Walk an array-of-relative-pointers section.
    fn record_addresses(&self, section: &str) -> Result<Vec<u64>>
    {
        let blob = self
            .image
            .section(section)
            .ok_or_else(|| ResurfaceError::MissingSection(section.to_string()))?;
        if blob.data.len() % 4 != 0 {
            return Err(self.decode_error(section, "section size is not a multiple of 4"));
        }
        let mut addresses = Vec::with_capacity(blob.data.len() / 4);
        for index in 0..blob.data.len() / 4 {
            let slot = blob.address + index as u64 * 4;
            if let Some(target) = self.resolve_relative(slot)? {
                addresses.push(target);
            }
        }
        Ok(addresses)
    }

    fn decode_context(&self, section: &str, address: u64, depth: usize) -> Result<Arc<ContextRecord>>
    {
        if depth > MAX_PARENT_DEPTH {
            return Err(self.decode_error(section, format!("context chain deeper than {MAX_PARENT_DEPTH}")));
        }

        let flags = self.read_u32(address)?;
        let kind = match flags & KIND_MASK {
            0 => ContextKind::Module,
            1 => ContextKind::Extension,
            2 => ContextKind::Anonymous,
            3 => ContextKind::Protocol,
            4 => ContextKind::OpaqueType,
            16 => ContextKind::Class,
            17 => ContextKind::Struct,
            18 => ContextKind::Enum,
            other => return Err(self.decode_error(section, format!("unknown context kind {other}"))),
        };

        let parent = self.decode_parent(section, address + 4, depth)?;
        let name = self.read_relative_cstring(address + 8)?;

        let (name, extended_context_mangling) = if kind == ContextKind::Extension {
            (None, name)
        } else {
            (name, None)
        };

        let generic_signature_mangling = if kind == ContextKind::Extension && flags & FLAG_GENERIC_SIGNATURE != 0 {
            self.read_relative_cstring(address + 12)?
        } else {
            None
        };

        Ok(Arc::new(ContextRecord {
            kind,
            name,
            parent,
            offset: address,
            is_c_imported: flags & FLAG_C_IMPORTED != 0,
            extended_context_mangling,
            generic_signature_mangling,
        }))
    }

    fn decode_parent(&self, section: &str, slot: u64, depth: usize) -> Result<Option<ParentRef>>
    {
        let value = self.read_i32(slot)?;
        if value == 0 {
            return Ok(None);
        }
        let indirect = value & 1 != 0;
        let target = slot
            .checked_add_signed((value & !1) as i64)
            .ok_or(ResurfaceError::BadRelativePointer { offset: slot })?;
        if indirect {
            // Bound pointer slot: the parent lives in another image. The
            // symbol registered at the slot names it.
            let symbol = self
                .image
                .symbols()
                .iter()
                .find(|symbol| symbol.offset == target && symbol.offset != 0)
                .map(|symbol| symbol.name.clone());
            return match symbol {
                Some(name) => Ok(Some(ParentRef::Symbol(name))),
                None => Ok(None),
            };
        }
        Ok(Some(ParentRef::Context(self.decode_context(section, target, depth + 1)?)))
    }

    fn decode_type(&self, address: u64) -> Result<TypeRecord>
    {
        let section = TYPES_SECTION;
        let context = self.decode_context(section, address, 0)?;
        if !context.kind.is_type() {
            return Err(self.decode_error(section, format!("record at 0x{address:x} is not a type context")));
        }

        let fields = match self.resolve_relative(address + 12)? {
            Some(descriptor) => self.decode_field_descriptor(section, descriptor)?,
            None => Vec::new(),
        };

        let (methods, overrides, default_overrides) = if context.kind == ContextKind::Class {
            self.decode_method_tables(section, address + 16)?
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        Ok(TypeRecord {
            context,
            fields,
            methods,
            overrides,
            default_overrides,
        })
    }

    fn decode_field_descriptor(&self, section: &str, address: u64) -> Result<Vec<FieldRecord>>
    {
        let count = self.read_u32(address)?;
        if count > 0x10000 {
            return Err(self.decode_error(section, format!("implausible field count {count}")));
        }
        let mut fields = Vec::with_capacity(count as usize);
        let mut cursor = address + 4;
        for _ in 0..count {
            let flags = self.read_u32(cursor)?;
            let mangled_type_name = self.read_relative_cstring(cursor + 4)?;
            let name = self
                .read_relative_cstring(cursor + 8)?
                .ok_or_else(|| self.decode_error(section, "field record without a name"))?;
            fields.push(FieldRecord {
                name,
                mangled_type_name,
                is_variable: flags & 0x2 != 0,
                is_indirect_case: flags & 0x1 != 0,
            });
            cursor += 12;
        }
        Ok(fields)
    }

    fn decode_method_tables(&self, section: &str, address: u64) -> Result<(Vec<MethodRecord>, Vec<OverrideRecord>, Vec<OverrideRecord>)>
    {
        let num_methods = self.read_u32(address)?;
        if num_methods > 0x10000 {
            return Err(self.decode_error(section, format!("implausible method count {num_methods}")));
        }
        let mut cursor = address + 4;
        let mut methods = Vec::with_capacity(num_methods as usize);
        for _ in 0..num_methods {
            let flags = self.read_u32(cursor)?;
            let kind = match flags & METHOD_KIND_MASK {
                0 => MethodKind::Method,
                1 => MethodKind::Init,
                2 => MethodKind::Getter,
                3 => MethodKind::Setter,
                4 => MethodKind::ModifyCoroutine,
                5 => MethodKind::ReadCoroutine,
                other => return Err(self.decode_error(section, format!("unknown method kind {other}"))),
            };
            let impl_offset = self.resolve_relative(cursor + 4)?;
            methods.push(MethodRecord {
                kind,
                is_instance: flags & METHOD_FLAG_INSTANCE != 0,
                impl_offset,
            });
            cursor += 8;
        }

        let mut decode_overrides = |cursor: &mut u64| -> Result<Vec<OverrideRecord>> {
            let count = self.read_u32(*cursor)?;
            if count > 0x10000 {
                return Err(self.decode_error(section, format!("implausible override count {count}")));
            }
            *cursor += 4;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let impl_offset = self.resolve_relative(*cursor)?;
                entries.push(OverrideRecord { impl_offset });
                *cursor += 4;
            }
            Ok(entries)
        };

        let overrides = decode_overrides(&mut cursor)?;
        let default_overrides = decode_overrides(&mut cursor)?;
        Ok((methods, overrides, default_overrides))
    }

    fn decode_protocol(&self, address: u64) -> Result<ProtocolRecord>
    {
        let section = PROTOCOLS_SECTION;
        let context = self.decode_context(section, address, 0)?;
        if context.kind != ContextKind::Protocol {
            return Err(self.decode_error(section, format!("record at 0x{address:x} is not a protocol context")));
        }
        let associated_type_names = self
            .read_relative_cstring(address + 12)?
            .map(|names| names.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let num_requirements = self.read_u32(address + 16)?;
        Ok(ProtocolRecord {
            context,
            num_requirements,
            associated_type_names,
        })
    }

    fn decode_conformance(&self, address: u64) -> Result<Arc<ConformanceRecord>>
    {
        let section = CONFORMANCES_SECTION;
        let type_mangling = self
            .read_relative_cstring(address)?
            .ok_or_else(|| self.decode_error(section, "conformance without a type reference"))?;
        let protocol_name = self
            .read_relative_cstring(address + 4)?
            .ok_or_else(|| self.decode_error(section, "conformance without a protocol name"))?;
        let flags = self.read_u32(address + 8)?;
        let mut cursor = address + 12;

        let conditional_requirements_mangling = if flags & 0x1 != 0 {
            let mangling = self.read_relative_cstring(cursor)?;
            cursor += 4;
            mangling
        } else {
            None
        };

        let mut resilient_witnesses = Vec::new();
        if flags & 0x2 != 0 {
            let count = self.read_u32(cursor)?;
            if count > 0x10000 {
                return Err(self.decode_error(section, format!("implausible witness count {count}")));
            }
            cursor += 4;
            for _ in 0..count {
                let requirement = match self.resolve_relative(cursor)? {
                    None => WitnessRequirement::Element {
                        name: None,
                        default_impl_offset: None,
                    },
                    Some(record) => self.decode_witness_requirement(section, record)?,
                };
                let impl_offset = self.resolve_relative(cursor + 4)?;
                resilient_witnesses.push(ResilientWitness {
                    requirement,
                    impl_offset,
                });
                cursor += 8;
            }
        }

        Ok(Arc::new(ConformanceRecord {
            type_mangling,
            protocol_name,
            conditional_requirements_mangling,
            resilient_witnesses,
            offset: address,
        }))
    }

    fn decode_witness_requirement(&self, section: &str, address: u64) -> Result<WitnessRequirement>
    {
        let kind = self.read_u32(address)?;
        let name = self.read_relative_cstring(address + 4)?;
        let default_impl_offset = self.resolve_relative(address + 8)?;
        match kind {
            1 => {
                let name = name.ok_or_else(|| self.decode_error(section, "symbol requirement without a name"))?;
                Ok(WitnessRequirement::Symbol { name })
            }
            0 => Ok(WitnessRequirement::Element {
                name,
                default_impl_offset,
            }),
            other => Err(self.decode_error(section, format!("unknown requirement kind {other}"))),
        }
    }

    fn decode_associated_types(&self) -> Result<Vec<Arc<AssociatedTypeRecord>>>
    {
        let section = ASSOCIATED_TYPES_SECTION;
        let blob = self
            .image
            .section(section)
            .ok_or_else(|| ResurfaceError::MissingSection(section.to_string()))?;
        let mut records = Vec::new();
        let mut cursor = blob.address;
        let end = blob.address + blob.data.len() as u64;
        while cursor < end {
            let conforming_type_mangling = self
                .read_relative_cstring(cursor)?
                .ok_or_else(|| self.decode_error(section, "associated type record without a conforming type"))?;
            let protocol_name = self
                .read_relative_cstring(cursor + 4)?
                .ok_or_else(|| self.decode_error(section, "associated type record without a protocol"))?;
            let count = self.read_u32(cursor + 8)?;
            let record_size = self.read_u32(cursor + 12)?;
            if record_size < 8 || count > 0x10000 {
                return Err(self.decode_error(section, "malformed associated type header"));
            }
            let mut entries = Vec::with_capacity(count as usize);
            let mut entry_cursor = cursor + 16;
            for _ in 0..count {
                let name = self
                    .read_relative_cstring(entry_cursor)?
                    .ok_or_else(|| self.decode_error(section, "associated type entry without a name"))?;
                let substituted_type_mangling = self
                    .read_relative_cstring(entry_cursor + 4)?
                    .ok_or_else(|| self.decode_error(section, "associated type entry without a substitution"))?;
                entries.push(AssociatedTypeEntry {
                    name,
                    substituted_type_mangling,
                });
                entry_cursor += record_size as u64;
            }
            records.push(Arc::new(AssociatedTypeRecord {
                conforming_type_mangling,
                protocol_name,
                entries,
            }));
            cursor = entry_cursor;
        }
        Ok(records)
    }
}

impl MetadataSource for MachOMetadataSource<'_>
{
    fn types(&self) -> Result<Vec<TypeRecord>>
    {
        self.record_addresses(TYPES_SECTION)?
            .into_iter()
            .map(|address| self.decode_type(address))
            .collect()
    }

    fn protocols(&self) -> Result<Vec<ProtocolRecord>>
    {
        self.record_addresses(PROTOCOLS_SECTION)?
            .into_iter()
            .map(|address| self.decode_protocol(address))
            .collect()
    }

    fn protocol_conformances(&self) -> Result<Vec<Arc<ConformanceRecord>>>
    {
        self.record_addresses(CONFORMANCES_SECTION)?
            .into_iter()
            .map(|address| self.decode_conformance(address))
            .collect()
    }

    fn associated_types(&self) -> Result<Vec<Arc<AssociatedTypeRecord>>>
    {
        self.decode_associated_types()
    }
}
