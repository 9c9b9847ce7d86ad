//! Datapoint types: the catalog of value encodings a communication object's
//! payload can carry.
//!
//! A datapoint type is identified by a string id (`DPT-n` or `DPST-n-m`), has
//! a fixed total size in bits, and an ordered list of format [`Field`]s. The
//! catalog here is a small built-in table standing in for the project
//! archive's `knx_master.xml`, which this crate does not parse (see the
//! external interfaces notes).

use phf::phf_map;

/// One field within a datapoint type's layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A single boolean bit.
    Bit,
    /// An unsigned integer field.
    UnsignedInteger,
    /// A signed (two's complement) integer field.
    SignedInteger,
    /// A floating-point field (e.g. the KNX 2-byte float encoding).
    Float,
    /// A fixed-length string field with a named character encoding.
    String {
        /// Encoding name, e.g. `"ASCII"` or `"ISO-8859-1"`.
        encoding: &'static str,
    },
    /// An enumeration mapping raw values to display text.
    Enumeration(&'static [(u32, &'static str)]),
    /// An alias that resolves to another named format, cloned at a new bit
    /// offset within the owning datapoint type.
    RefType(&'static str),
    /// A format tag from the catalog with no known realization. Carries the
    /// raw tag so callers can report it; construction logs a warning.
    Unknown(String),
}

/// One named, positioned occurrence of a [`Field`] within a datapoint type.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatField {
    /// Bit offset of this field within the datapoint's payload.
    pub bit_start: u16,
    /// Size of this field in bits.
    pub size: u16,
    /// The field's kind.
    pub field: Field,
}

/// A datapoint type: fixed size plus an ordered list of format fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DatapointType {
    /// Catalog id, e.g. `"DPST-1-1"`.
    pub id: &'static str,
    /// Total size in bits.
    pub size: u16,
    /// Ordered format fields.
    pub fields: &'static [FormatField],
}

macro_rules! dpt {
    ($id:expr, $size:expr, [$($field:expr),* $(,)?]) => {
        DatapointType { id: $id, size: $size, fields: &[$($field),*] }
    };
}

/// Built-in catalog of the well-known 1-bit/1-byte/2-byte datapoint types,
/// looked up by id the way the teacher looks up machine/section kinds by
/// name. Not exhaustive: the project archive's full `knx_master.xml` carries
/// several hundred entries this crate does not attempt to reproduce.
pub static CATALOG: phf::Map<&'static str, DatapointType> = phf_map! {
    "DPST-1-1" => dpt!("DPST-1-1", 1, [FormatField { bit_start: 0, size: 1, field: Field::Bit }]),
    "DPST-1-2" => dpt!("DPST-1-2", 1, [FormatField { bit_start: 0, size: 1, field: Field::Bit }]),
    "DPST-5-1" => dpt!("DPST-5-1", 8, [FormatField { bit_start: 0, size: 8, field: Field::UnsignedInteger }]),
    "DPST-5-10" => dpt!("DPST-5-10", 8, [FormatField { bit_start: 0, size: 8, field: Field::UnsignedInteger }]),
    "DPST-6-1" => dpt!("DPST-6-1", 8, [FormatField { bit_start: 0, size: 8, field: Field::SignedInteger }]),
    "DPST-7-1" => dpt!("DPST-7-1", 16, [FormatField { bit_start: 0, size: 16, field: Field::UnsignedInteger }]),
    "DPST-8-1" => dpt!("DPST-8-1", 16, [FormatField { bit_start: 0, size: 16, field: Field::SignedInteger }]),
    "DPST-9-1" => dpt!("DPST-9-1", 16, [FormatField { bit_start: 0, size: 16, field: Field::Float }]),
    "DPST-9-7" => dpt!("DPST-9-7", 16, [FormatField { bit_start: 0, size: 16, field: Field::Float }]),
    "DPST-16-0" => dpt!("DPST-16-0", 112, [FormatField { bit_start: 0, size: 112, field: Field::String { encoding: "ASCII" } }]),
    "DPST-20-102" => dpt!("DPST-20-102", 8, [FormatField {
        bit_start: 0, size: 8,
        field: Field::Enumeration(&[(0, "auto"), (1, "comfort"), (2, "standby"), (3, "economy"), (4, "building protection")]),
    }]),
};

/// Looks up a built-in datapoint type by its catalog id.
///
/// Returns `None` if `id` is absent from [`CATALOG`]; every entry in the
/// catalog is hand-built from known field kinds, so a lookup hit never needs
/// a fallback. The "tag not recognized" case belongs to [`field_for_tag`],
/// which classifies individual format tags rather than whole catalog ids.
pub fn lookup(id: &str) -> Option<&'static DatapointType> {
    CATALOG.get(id)
}

/// Classifies a format-node tag name the way the master-data loader this is
/// grounded on dispatches on a parsed format child's tag (`bit`,
/// `unsignedinteger`, `signedinteger`, `float`, `string`, `enumeration`):
/// known tags resolve to their matching [`Field`] kind. Any other tag is
/// reported with [`warn_unknown_field`] and resolves to [`Field::Unknown`]
/// instead of the loader's hard failure on an unrecognized tag.
pub fn field_for_tag(tag: &str) -> Field {
    match tag {
        "bit" => Field::Bit,
        "unsignedinteger" => Field::UnsignedInteger,
        "signedinteger" => Field::SignedInteger,
        "float" => Field::Float,
        "string" => Field::String { encoding: "ASCII" },
        "enumeration" => Field::Enumeration(&[]),
        other => {
            warn_unknown_field(other);
            Field::Unknown(other.to_string())
        }
    }
}

fn warn_unknown_field(tag: &str) {
    log::warn!("datapoint catalog: unrecognized format tag `{tag}`, using Field::Unknown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_dpt() {
        let dpt = lookup("DPST-1-1").expect("DPST-1-1 is built in");
        assert_eq!(dpt.size, 1);
        assert_eq!(dpt.fields.len(), 1);
        assert_eq!(dpt.fields[0].field, Field::Bit);
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(lookup("DPST-999-999").is_none());
    }

    #[test]
    fn enumeration_field_carries_choices() {
        let dpt = lookup("DPST-20-102").unwrap();
        match &dpt.fields[0].field {
            Field::Enumeration(choices) => assert_eq!(choices.len(), 5),
            other => panic!("expected Enumeration, got {other:?}"),
        }
    }

    #[test]
    fn field_for_tag_resolves_known_tags() {
        assert_eq!(field_for_tag("bit"), Field::Bit);
        assert_eq!(field_for_tag("unsignedinteger"), Field::UnsignedInteger);
        assert_eq!(field_for_tag("signedinteger"), Field::SignedInteger);
        assert_eq!(field_for_tag("float"), Field::Float);
    }

    #[test]
    fn field_for_tag_reports_unknown_tags_instead_of_failing() {
        match field_for_tag("choose") {
            Field::Unknown(tag) => assert_eq!(tag, "choose"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
