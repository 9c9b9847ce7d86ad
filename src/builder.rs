//! Device memory image assembly.
//!
//! [`Eeprom`] merges independently-addressed segments into one flat byte
//! image the way the loader's segment collection does: segments are sorted
//! by address, gaps between them are zero-filled, and bit-level parameter
//! writes patch an existing byte rather than widening the buffer.
//! [`ImageBuilder`] drives this plus the three fixed tables (address,
//! association, communication-object) and the pointer bytes that locate them.

pub mod tables;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::LayoutError;
use crate::program::{self, Parameter, ProgramContext};
use tables::{AddressTable, AssociationTable, ComObjectTable, ComObjectTableEntry};

/// Offsets (relative to the image's lead bytes) of the three table
/// pointers, patched in after the tables themselves are appended.
pub const ADDRESS_TABLE_PTR_OFFSET: usize = 0x278;
pub const ASSOCIATION_TABLE_PTR_OFFSET: usize = 0x27A;
pub const COM_OBJECT_TABLE_PTR_OFFSET: usize = 0x27C;

/// A named, independently-addressed block of device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    address: u32,
    content: Vec<u8>,
}

/// Accumulates segments and serializes them into one flat, gap-filled image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Eeprom {
    lead_bytes: Vec<u8>,
    segments: Vec<Segment>,
}

impl Eeprom {
    /// Starts an image with `lead_bytes` occupying address `0..lead_bytes.len()`.
    pub fn new(lead_bytes: Vec<u8>) -> Self {
        Self { lead_bytes, segments: Vec::new() }
    }

    /// Adds or replaces the segment at `address`.
    pub fn add_segment(&mut self, address: u32, content: Vec<u8>) {
        self.segments.retain(|s| s.address != address);
        self.segments.push(Segment { address, content });
    }

    /// Serializes the lead bytes followed by every segment in address order,
    /// zero-filling any gap between the end of one region and the start of
    /// the next.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.lead_bytes.clone();
        let mut sorted: Vec<&Segment> = self.segments.iter().collect();
        sorted.sort_by_key(|s| s.address);
        for segment in sorted {
            let start = segment.address as usize;
            if start > out.len() {
                out.resize(start, 0);
            } else if start < out.len() {
                // Overlapping segment: truncate back to the overlap start
                // before writing, matching last-writer-wins semantics.
                out.truncate(start);
            }
            out.extend_from_slice(&segment.content);
        }
        out
    }

    /// Patches a parameter's value directly into the lead bytes at
    /// `byte_offset` (relative to the start of the image), honoring
    /// sub-byte placement (`bit_offset + size <= 8`) or whole-byte
    /// placement (`size` a multiple of 8, `bit_offset == 0`).
    pub fn set_parameter(&mut self, parameter: &Parameter, byte_offset: u32, value: i64) -> Result<(), LayoutError> {
        parameter.validate()?;
        let mem = match &parameter.memory {
            Some(mem) => mem,
            None => return Ok(()),
        };
        let start = byte_offset as usize;
        if mem.size < 8 {
            if self.lead_bytes.len() <= start {
                self.lead_bytes.resize(start + 1, 0);
            }
            let mask = ((1u16 << mem.size) - 1) as u8;
            let shift = 8 - mem.bit_offset as u8 - mem.size as u8;
            self.lead_bytes[start] &= !(mask << shift);
            self.lead_bytes[start] |= ((value as u8) & mask) << shift;
        } else {
            let byte_count = (mem.size / 8) as usize;
            if self.lead_bytes.len() < start + byte_count {
                self.lead_bytes.resize(start + byte_count, 0);
            }
            let bytes = (value as u64).to_be_bytes();
            let src_start = bytes.len() - byte_count;
            self.lead_bytes[start..start + byte_count].copy_from_slice(&bytes[src_start..]);
        }
        Ok(())
    }

    /// Overwrites the little-endian 16-bit pointer at `offset` within the
    /// lead bytes.
    pub fn patch_pointer(&mut self, offset: usize, value: u16) {
        if self.lead_bytes.len() < offset + 2 {
            self.lead_bytes.resize(offset + 2, 0);
        }
        self.lead_bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }
}

/// Configuration shared by every image this builder produces.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub com_table_max_entries: usize,
    pub association_table_max_entries: usize,
    pub address_table_max_entries: usize,
    pub mask_version: String,
    pub ram_base: u32,
}

impl ImageBuilder {
    pub fn new(mask_version: impl Into<String>, ram_base: u32) -> Self {
        Self {
            // No documented hard limit; matches the loader's own guessed cap.
            com_table_max_entries: 1024,
            association_table_max_entries: 1024,
            address_table_max_entries: 256,
            mask_version: mask_version.into(),
            ram_base,
        }
    }

    /// Assembles one device's image.
    ///
    /// `device_addresses` lists the device's own individual address followed
    /// by every group address it uses, in address-table order.
    /// `associations` maps each address-table index to the communication
    /// objects bound to it, as `(com_number, read_flagged)` pairs.
    /// `program_candidates`/`device_overrides` are handed straight to
    /// [`ComObjectTable::build`].
    ///
    /// Before patching `parameter_values` into the image, `parameters`'
    /// dynamic tree (if any) is walked against each parameter reference's
    /// current value: a parameter reference inside a `Choose`/`When` branch
    /// that isn't taken is forced back to its parameter's default, and
    /// assignments produced by taken branches are applied to the references
    /// they target, before either ends up in the emitted image.
    pub fn build(
        &self,
        lead_bytes: Vec<u8>,
        device_addresses: &[crate::address::KnxAddress],
        associations: &BTreeMap<u8, Vec<(u8, bool)>>,
        program_candidates: &BTreeMap<u32, Vec<ComObjectTableEntry>>,
        device_overrides: &BTreeMap<u32, ComObjectTableEntry>,
        parameters: &ProgramContext,
        parameter_values: &BTreeMap<String, (u32, i64)>,
    ) -> Result<Vec<u8>, LayoutError> {
        let mut eeprom = Eeprom::new(lead_bytes);

        let mut address_table = AddressTable::new(self.address_table_max_entries);
        for addr in device_addresses {
            address_table.add(*addr)?;
        }

        let mut association_table = AssociationTable::new(self.association_table_max_entries);
        for (&ga_index, objects) in associations {
            association_table.add(ga_index, objects.clone())?;
        }

        let mut com_object_table = ComObjectTable::build(
            program_candidates,
            device_overrides,
            &self.mask_version,
            self.ram_base,
            self.com_table_max_entries,
        )?;

        let mut resolved_values = parameter_values.clone();
        if !parameters.dynamic_tree.is_empty() {
            let mut env: HashMap<String, i64> =
                parameters.parameter_refs.iter().map(|(id, r)| (id.clone(), r.value)).collect();
            let eval = program::evaluate(&parameters.dynamic_tree, &env);
            program::apply_assignments(&mut env, &eval.assignments);
            let active: HashSet<&str> = eval.active_parameter_refs.iter().map(String::as_str).collect();

            for (ref_id, param_ref) in &parameters.parameter_refs {
                let parameter = match parameters.parameters.get(&param_ref.parameter_id) {
                    Some(parameter) => parameter,
                    None => continue,
                };
                let effective_value = if active.contains(ref_id.as_str()) {
                    env.get(ref_id).copied().unwrap_or(param_ref.value)
                } else {
                    parameter.default_value
                };
                if let Some(entry) = resolved_values.get_mut(&param_ref.parameter_id) {
                    entry.1 = effective_value;
                }
            }
        }

        for (param_id, &(byte_offset, value)) in &resolved_values {
            if let Some(parameter) = parameters.parameters.get(param_id) {
                eeprom.set_parameter(parameter, byte_offset, value)?;
            }
        }

        let address_bytes = address_table.bytes();
        let association_bytes = association_table.bytes();
        let com_object_bytes = com_object_table.bytes()?;

        let address_ptr = eeprom.bytes().len() as u16;
        eeprom.add_segment(address_ptr as u32, address_bytes);
        let association_ptr = eeprom.bytes().len() as u16;
        eeprom.add_segment(association_ptr as u32, association_bytes);
        let com_object_ptr = eeprom.bytes().len() as u16;
        eeprom.add_segment(com_object_ptr as u32, com_object_bytes);

        eeprom.patch_pointer(ADDRESS_TABLE_PTR_OFFSET, address_ptr);
        eeprom.patch_pointer(ASSOCIATION_TABLE_PTR_OFFSET, association_ptr);
        eeprom.patch_pointer(COM_OBJECT_TABLE_PTR_OFFSET, com_object_ptr);

        Ok(eeprom.bytes())
    }
}
