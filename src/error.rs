//! Error types shared across the codec, builder and decoder.
//!
//! Each subsystem gets its own flat enum, following the propagation rule in
//! the design notes: [`ParseError`] is sometimes recoverable (a checksum
//! mismatch is reported but does not stop decoding), while [`LayoutError`]
//! and [`ConfigError`] always abort the operation that raised them.

use thiserror::Error;

/// Errors raised while decoding or encoding a telegram.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No child class matched the discriminating bits at `offset`.
    #[error("unknown sub-type at byte {offset} (value 0x{value:02x})")]
    UnknownSubtype {
        /// Byte offset the discriminator was read from.
        offset: usize,
        /// The raw discriminator value that had no match.
        value: u8,
    },
    /// The telegram's checksum byte did not clear the running XOR to zero.
    #[error("checksum error: running xor is 0x{computed:02x}, expected 0x00")]
    ChecksumError {
        /// The accumulated XOR of all bytes including the checksum byte.
        computed: u8,
    },
    /// Fewer bytes were supplied than the header or payload length demands.
    #[error("truncated telegram: need at least {needed} bytes, got {got}")]
    TruncatedTelegram {
        /// Minimum byte count required to continue decoding.
        needed: usize,
        /// Byte count actually supplied.
        got: usize,
    },
    /// A field's decoded value has no valid interpretation (e.g. an
    /// enumerated mapping with no matching entry).
    #[error("field `{field}` out of range: {value}")]
    FieldOutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The raw value that was out of range.
        value: u32,
    },
    /// The payload length implies a telegram longer than the wire format
    /// permits (23 bytes plus checksum).
    #[error("payload length {length} would overlong the telegram")]
    OverlongPayload {
        /// The requested payload length in bytes.
        length: usize,
    },
    /// An address string did not parse as `a.l.d` or `a/b/c`.
    #[error("invalid address string: {0:?}")]
    InvalidAddress(String),
}

/// Errors raised while laying out a device image.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A table grew past its configured maximum entry count.
    #[error("table `{table}` overflowed: {entries} entries exceeds max {max_entries}")]
    TableOverflow {
        /// Name of the table that overflowed.
        table: &'static str,
        /// Number of entries that were attempted.
        entries: usize,
        /// The configured maximum.
        max_entries: usize,
    },
    /// A multi-byte parameter did not start on a byte boundary.
    #[error("parameter `{parameter}` is misaligned: bit_offset {bit_offset} with size {size}")]
    MisalignedParameter {
        /// Id of the misaligned parameter.
        parameter: String,
        /// The parameter's configured bit offset.
        bit_offset: u16,
        /// The parameter's configured bit size.
        size: u16,
    },
    /// The mask version has no known com-object address size.
    #[error("unknown mask version `{0}`")]
    UnknownMaskVersion(String),
}

/// Errors raised by missing or conflicting configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No device instance is registered for the given address.
    #[error("no device configured for address {0}")]
    NoDeviceForAddress(String),
    /// The signal decoder was driven without a sample rate.
    #[error("sample rate not configured")]
    MissingSampleRate,
}
