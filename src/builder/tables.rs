//! Address, association and communication-object table construction.
//!
//! Each table mirrors a fixed wire layout: a one-byte entry count followed
//! by fixed-width entries. Construction order matters — the association
//! table's entries are emitted read-flagged objects first, then sorted by
//! com-object number when serialized, and the com-object table advances a
//! RAM pointer across entries with natural alignment.

use std::collections::BTreeMap;

use flagset::FlagSet;

use crate::address::KnxAddress;
use crate::error::LayoutError;
use crate::program::{flags_as_byte, ComObjectFlag, Priority};

/// Device individual address plus the group addresses it communicates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTable {
    entries: Vec<KnxAddress>,
    max_entries: usize,
}

impl AddressTable {
    /// Creates an empty table. Entry 0 is conventionally the device's own
    /// individual address.
    pub fn new(max_entries: usize) -> Self {
        Self { entries: Vec::new(), max_entries }
    }

    /// Appends an address, returning its index.
    pub fn add(&mut self, address: KnxAddress) -> Result<u8, LayoutError> {
        if self.entries.len() >= self.max_entries {
            return Err(LayoutError::TableOverflow {
                table: "Address_Table",
                entries: self.entries.len() + 1,
                max_entries: self.max_entries,
            });
        }
        self.entries.push(address);
        Ok((self.entries.len() - 1) as u8)
    }

    /// Serializes: one count byte, then 2 big-endian bytes per address.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 2 * self.entries.len());
        out.push(self.entries.len() as u8);
        for addr in &self.entries {
            out.extend_from_slice(&addr.value().to_be_bytes());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps address-table indices to communication-object numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationTable {
    entries: Vec<(u8, u8)>,
    max_entries: usize,
}

impl AssociationTable {
    pub fn new(max_entries: usize) -> Self {
        Self { entries: Vec::new(), max_entries }
    }

    /// Associates one address-table index with a set of communication
    /// objects, read-flagged ones first (matching the order a device
    /// evaluates a freshly bound group address against its objects).
    pub fn add(&mut self, ga_index: u8, mut objects: Vec<(u8, bool)>) -> Result<(), LayoutError> {
        objects.sort_by_key(|(_, read)| !*read);
        for (com_number, _) in objects {
            if self.entries.len() >= self.max_entries {
                return Err(LayoutError::TableOverflow {
                    table: "Association_Table",
                    entries: self.entries.len() + 1,
                    max_entries: self.max_entries,
                });
            }
            self.entries.push((ga_index, com_number));
        }
        Ok(())
    }

    /// Serializes: one count byte, then `(ga_index, com_number)` pairs
    /// sorted by communication-object number.
    pub fn bytes(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|(_, com_number)| *com_number);
        let mut out = Vec::with_capacity(1 + 2 * sorted.len());
        out.push(sorted.len() as u8);
        for (ga_index, com_number) in sorted {
            out.push(ga_index);
            out.push(com_number);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The RAM address size a com-object table entry uses, determined by mask
/// version (device generation).
pub fn address_size_for_mask(mask_version: &str) -> Result<u8, LayoutError> {
    match mask_version {
        "MV-0010" | "MV-0011" | "MV-0012" | "MV-0013" | "MV-0020" | "MV-0021" | "MV-0025" => Ok(1),
        "MV-0700" | "MV-0701" | "MV-0705" => Ok(2),
        other => Err(LayoutError::UnknownMaskVersion(other.to_string())),
    }
}

/// Maps a communication object's bit size to its compiled type-size code.
pub fn type_size_code(size_bits: u16) -> Result<u8, LayoutError> {
    match size_bits {
        1 => Ok(0),
        2 => Ok(1),
        3 => Ok(2),
        4 => Ok(3),
        5 => Ok(4),
        6 => Ok(5),
        7 => Ok(6),
        8 => Ok(7),
        16 => Ok(8),
        24 => Ok(9),
        32 => Ok(10),
        48 => Ok(11),
        64 => Ok(12),
        80 => Ok(13),
        112 => Ok(14),
        120 => Ok(15),
        other => Err(LayoutError::TableOverflow {
            // Reused variant: no datapoint-size entry exists for `other` bits.
            table: "Com_Object_Table.Type_Map",
            entries: other as usize,
            max_entries: 0,
        }),
    }
}

/// A resolved communication-object table entry: flags, priority and size
/// already overlaid from any reference/instance overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComObjectTableEntry {
    pub number: u32,
    pub flags: FlagSet<ComObjectFlag>,
    pub priority: Priority,
    pub size_bits: u16,
}

/// The per-device communication-object configuration table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComObjectTable {
    entries: Vec<ComObjectTableEntry>,
    addresses: Vec<u32>,
    address_size: u8,
    ram_base: u32,
}

impl ComObjectTable {
    /// Builds the table for one device instance.
    ///
    /// `program_candidates` holds every communication-object definition the
    /// owning application program declares, grouped by object number — when
    /// a device instance does not override a number, the largest-size
    /// candidate for it wins (widest definition governs unconfigured
    /// instances, matching how the source this is grounded on resolves
    /// shared numbers).
    pub fn build(
        program_candidates: &BTreeMap<u32, Vec<ComObjectTableEntry>>,
        device_overrides: &BTreeMap<u32, ComObjectTableEntry>,
        mask_version: &str,
        ram_base: u32,
        max_entries: usize,
    ) -> Result<Self, LayoutError> {
        let address_size = address_size_for_mask(mask_version)?;
        let mut entries = Vec::new();
        for (&number, candidates) in program_candidates {
            if entries.len() >= max_entries {
                return Err(LayoutError::TableOverflow {
                    table: "Com_Object_Table",
                    entries: entries.len() + 1,
                    max_entries,
                });
            }
            let entry = device_overrides.get(&number).copied().or_else(|| {
                candidates.iter().copied().max_by_key(|c| c.size_bits)
            });
            if let Some(entry) = entry {
                entries.push(entry);
            }
        }
        Ok(Self { entries, addresses: Vec::new(), address_size, ram_base })
    }

    /// Serializes the table: count byte, RAM base pointer, then per-entry
    /// `(ram_address, flags_byte, type_size_code)`.
    pub fn bytes(&mut self) -> Result<Vec<u8>, LayoutError> {
        let mut out = vec![self.entries.len() as u8];
        let mut ram_address = self.ram_base;
        self.write_address(&mut out, ram_address);
        ram_address += if self.address_size == 2 {
            self.entries.len() as u32
        } else {
            self.entries.len() as u32 / 2
        };
        self.addresses.clear();
        for entry in &self.entries {
            let size_bytes = (entry.size_bits as u32 + 7) / 8;
            let misalign = if size_bytes == 0 { 0 } else { ram_address % size_bytes };
            if misalign != 0 {
                ram_address += size_bytes - misalign;
            }
            self.addresses.push(ram_address);
            Self::write_address_to(&mut out, ram_address, self.address_size);
            out.push(flags_as_byte(entry.flags, entry.priority, false));
            out.push(type_size_code(entry.size_bits)?);
            ram_address += size_bytes;
        }
        Ok(out)
    }

    fn write_address(&self, out: &mut Vec<u8>, address: u32) {
        Self::write_address_to(out, address, self.address_size);
    }

    fn write_address_to(out: &mut Vec<u8>, address: u32, size: u8) {
        if size == 2 {
            out.extend_from_slice(&(address as u16).to_be_bytes());
        } else {
            out.push(address as u8);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
