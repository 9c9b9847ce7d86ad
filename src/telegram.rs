//! Telegram codec: the wire format for EIB/KNX data telegrams.
//!
//! A telegram's class is determined by a cascade of bit-field matches
//! starting at byte 0; see the discrimination tree in the module-level
//! tables below. Decoding walks the tree from the root; encoding writes the
//! fields of a concrete variant into a 23-byte scratch buffer, truncates it
//! to the variant's length, and appends the checksum byte.

mod fields;

use num_derive::{FromPrimitive, ToPrimitive};

use crate::address::{GroupAddress, IndividualAddress, KnxAddress};
use crate::error::ParseError;
use fields::{checksum, or_u16, or_u8, read_u16, read_u8, BUF_LEN};

/// Telegram priority. The conceptual rank ordering (`System` is highest)
/// matches `spec.md`'s data model; the wire encoding is not numerically
/// sequential with it, so conversion goes through [`Priority::from_wire_bits`]
/// / [`Priority::to_wire_bits`] rather than a direct cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Priority {
    /// System management traffic; highest priority on the bus.
    System = 0,
    /// Alarm traffic.
    Alert = 1,
    /// Time-critical application traffic.
    High = 2,
    /// Ordinary application traffic; lowest priority.
    Low = 3,
}

impl Priority {
    /// Decodes the 2-bit wire encoding (`spec.md` §4.1's `priority` field).
    pub fn from_wire_bits(bits: u8) -> Priority {
        match bits & 0x3 {
            0b00 => Priority::System,
            0b01 => Priority::High,
            0b10 => Priority::Alert,
            _ => Priority::Low,
        }
    }

    /// Encodes to the 2-bit wire representation.
    pub fn to_wire_bits(self) -> u8 {
        match self {
            Priority::System => 0b00,
            Priority::High => 0b01,
            Priority::Alert => 0b10,
            Priority::Low => 0b11,
        }
    }
}

/// Fields common to every `DataRequest` telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Transmission priority.
    pub priority: Priority,
    /// The wire's repeat bit: `true` means this is the original
    /// transmission, `false` means it is a repetition.
    pub not_repeated: bool,
    /// Sending device.
    pub src: IndividualAddress,
    /// Destination: a device for point-to-point services, a group for
    /// group-oriented ones.
    pub dst: KnxAddress,
    /// Routing counter (hop count), defaults to `0b110` (6).
    pub route: u8,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            priority: Priority::Low,
            not_repeated: true,
            src: IndividualAddress::from(0),
            dst: KnxAddress::Group(GroupAddress::from(0)),
            route: 0b110,
        }
    }
}

impl Header {
    fn write(&self, buf: &mut [u8; BUF_LEN]) {
        or_u8(buf, 0, 6, 2, 0b10); // DataRequest marker
        or_u8(buf, 0, 2, 2, self.priority.to_wire_bits());
        or_u8(buf, 0, 4, 1, 1); // reserved_0, always 1
        or_u8(buf, 0, 5, 1, self.not_repeated as u8);
        or_u16(buf, 1, self.src.value());
        or_u16(buf, 3, self.dst.value());
        or_u8(buf, 5, 7, 1, self.dst.is_group() as u8);
        or_u8(buf, 5, 4, 3, self.route);
    }

    fn read(bytes: &[u8]) -> Header {
        let priority = Priority::from_wire_bits(read_u8(bytes, 0, 2, 2));
        let not_repeated = read_u8(bytes, 0, 5, 1) == 1;
        let src = IndividualAddress::from(read_u16(bytes, 1));
        let is_group = read_u8(bytes, 5, 7, 1) == 1;
        let raw_dst = read_u16(bytes, 3);
        let dst = if is_group {
            KnxAddress::Group(GroupAddress::from(raw_dst))
        } else {
            KnxAddress::Individual(IndividualAddress::from(raw_dst))
        };
        let route = read_u8(bytes, 5, 4, 3);
        Header { priority, not_repeated, src, dst, route }
    }
}

/// A group-oriented read/write payload (`Send_Value`/`Get_Value_Response`).
///
/// `bit_length` mirrors the wire's 4-bit `length` nibble: values `1..=6`
/// pack `value` into the low bits of byte 7; `7` and above store
/// `ceil(bit_length / 8)` big-endian bytes starting at byte 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupValue {
    /// Significant bit count, `0..=64`.
    pub bit_length: u8,
    /// The value, right-aligned.
    pub value: u64,
}

impl GroupValue {
    /// Number of payload bytes this value occupies beyond the common 7-byte
    /// header (the `Value_Field.as_bytes` rule from the codec this is
    /// ported from).
    fn payload_len(&self) -> usize {
        Self::payload_len_for(self.bit_length)
    }

    fn payload_len_for(bit_length: u8) -> usize {
        match bit_length {
            0 => 0,
            1..=6 => 1,
            n => 1 + (n as usize + 7) / 8,
        }
    }

    fn write(&self, buf: &mut [u8; BUF_LEN]) {
        if self.bit_length < 7 {
            or_u8(buf, 7, 0, 6, self.value as u8);
        } else {
            let size = (self.bit_length as usize + 7) / 8;
            let bytes = self.value.to_be_bytes();
            let start = bytes.len() - size;
            buf[8..8 + size].copy_from_slice(&bytes[start..]);
        }
    }

    fn read(bytes: &[u8], bit_length: u8) -> GroupValue {
        if bit_length < 7 {
            GroupValue { bit_length, value: read_u8(bytes, 7, 0, 6) as u64 }
        } else {
            let size = (bit_length as usize + 7) / 8;
            let mut acc = 0u64;
            for &b in &bytes[8..8 + size] {
                acc = (acc << 8) | b as u64;
            }
            GroupValue { bit_length, value: acc }
        }
    }
}

/// A decoded `DataRequest` telegram, tagged by service.
#[derive(Debug, Clone, PartialEq)]
pub enum DataRequest {
    /// Opens a point-to-point connection.
    Connect(Header),
    /// Closes a point-to-point connection.
    Disconnect(Header),
    /// Acknowledges a numbered packet.
    Ack { header: Header, pno: u8 },
    /// Negative-acknowledges a numbered packet.
    Nack { header: Header, pno: u8 },
    /// Requests a group value.
    GetValue(Header),
    /// Answers a group value request.
    GetValueResponse { header: Header, value: GroupValue },
    /// Writes a group value.
    SendValue { header: Header, value: GroupValue },
    /// Assigns a device's individual address.
    PhysicalAddressSet { header: Header, area: u8, line: u8, number: u8 },
    /// Requests the individual address of the (single) unconfigured device
    /// on the bus.
    PhysicalAddressRequest(Header),
    /// Answers a physical address request.
    PhysicalAddressResponse(Header),
    /// Requests the individual address by device serial number.
    PhysicalAddressSerialRequest(Header),
    /// Answers a serial-number physical address request.
    PhysicalAddressSerialResponse(Header),
    /// Assigns an individual address by device serial number.
    PhysicalAddressSerialSet { header: Header, area: u8, line: u8, number: u8 },
    /// Reports application-layer status.
    AppStatus(Header),
    /// Assigns a system id (mask version) to a device.
    SystemIdSet(Header),
    /// Requests a device's system id.
    SystemIdRequest(Header),
    /// Answers a system id request.
    SystemIdResponse(Header),
    /// Requests a memory read.
    MemoryReadRequest { header: Header, pno: u8, count: u8, address: u16 },
    /// Answers a memory read request.
    MemoryReadResponse { header: Header, pno: u8, address: u16, data: Vec<u8> },
    /// Reports an unsolicited memory value.
    MemoryReadValue { header: Header, pno: u8, address: u16, data: Vec<u8> },
    /// Requests an A/D converter sample.
    AdcValueRequest { header: Header, pno: u8, channel: u8, samples: u8 },
    /// Answers an A/D converter sample request.
    AdcValueResponse { header: Header, pno: u8, channel: u8, samples: u8, result: u16 },
    /// Requests a device's mask version.
    MaskReadRequest { header: Header, pno: u8 },
    /// Answers a mask version request.
    MaskReadResponse { header: Header, pno: u8 },
    /// Resets a device.
    Reset { header: Header, pno: u8 },
    /// Resets a device into its bootloader.
    ResetIntoBootloader { header: Header, pno: u8, erase: u8, channel: u8 },
}

impl DataRequest {
    fn header(&self) -> &Header {
        use DataRequest::*;
        match self {
            Connect(h) | Disconnect(h) | GetValue(h) | PhysicalAddressRequest(h)
            | PhysicalAddressResponse(h) | PhysicalAddressSerialRequest(h)
            | PhysicalAddressSerialResponse(h) | AppStatus(h) | SystemIdSet(h)
            | SystemIdRequest(h) | SystemIdResponse(h) => h,
            Ack { header, .. }
            | Nack { header, .. }
            | GetValueResponse { header, .. }
            | SendValue { header, .. }
            | PhysicalAddressSet { header, .. }
            | PhysicalAddressSerialSet { header, .. }
            | MemoryReadRequest { header, .. }
            | MemoryReadResponse { header, .. }
            | MemoryReadValue { header, .. }
            | AdcValueRequest { header, .. }
            | AdcValueResponse { header, .. }
            | MaskReadRequest { header, .. }
            | MaskReadResponse { header, .. }
            | Reset { header, .. }
            | ResetIntoBootloader { header, .. } => header,
        }
    }
}

/// A complete telegram: one of the three root classes discriminated by byte
/// 0 bits 6-7.
#[derive(Debug, Clone, PartialEq)]
pub enum Telegram {
    /// `0b00` at byte 0 bits 6-7. Carries no further field schema in this
    /// core (the source project leaves it as an opaque placeholder leaf).
    ExtendedDataRequest,
    /// `0b11` at byte 0 bits 6-7. Same status as [`Telegram::ExtendedDataRequest`].
    PollDataRequest,
    /// `0b10` at byte 0 bits 6-7: the fully modeled data-request subtree.
    Data(DataRequest),
}

/// Result of decoding: the telegram plus whether its checksum matched.
///
/// A checksum mismatch does not abort decoding — the telegram's fields are
/// still returned — per the propagation rule for transmission noise.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The decoded telegram.
    pub telegram: Telegram,
    /// `true` if the trailing checksum byte matched the computed value.
    pub checksum_valid: bool,
}

fn require(bytes: &[u8], needed: usize) -> Result<(), ParseError> {
    if bytes.len() < needed {
        Err(ParseError::TruncatedTelegram { needed, got: bytes.len() })
    } else {
        Ok(())
    }
}

/// Decodes a telegram from its wire bytes.
///
/// Structural mismatches (an unrecognized sub-type id, or too few bytes for
/// the fields the discriminated class requires) are hard errors. A checksum
/// mismatch is reported via [`Decoded::checksum_valid`] instead, so noisy
/// captures can still be inspected.
pub fn decode(bytes: &[u8]) -> Result<Decoded, ParseError> {
    require(bytes, 7)?;
    let root = read_u8(bytes, 0, 6, 2);
    let telegram = match root {
        0b00 => Telegram::ExtendedDataRequest,
        0b11 => Telegram::PollDataRequest,
        0b10 => Telegram::Data(decode_data_request(bytes)?),
        other => return Err(ParseError::UnknownSubtype { offset: 0, value: other }),
    };
    let size = telegram_size(&telegram);
    require(bytes, size + 1)?;
    let expected = checksum(&bytes[..size]);
    let checksum_valid = expected == bytes[size];
    Ok(Decoded { telegram, checksum_valid })
}

/// Decodes a telegram, treating a checksum mismatch as a hard error.
pub fn decode_strict(bytes: &[u8]) -> Result<Telegram, ParseError> {
    let decoded = decode(bytes)?;
    if !decoded.checksum_valid {
        let size = telegram_size(&decoded.telegram);
        let computed = checksum(&bytes[..size]) ^ bytes[size];
        return Err(ParseError::ChecksumError { computed });
    }
    Ok(decoded.telegram)
}

fn decode_data_request(bytes: &[u8]) -> Result<DataRequest, ParseError> {
    require(bytes, 7)?;
    let header = Header::read(bytes);
    let class = read_u8(bytes, 6, 6, 2);
    match class {
        0b10 => {
            // Unnumbered control packet.
            require(bytes, 7)?;
            match read_u8(bytes, 6, 0, 2) {
                0b00 => Ok(DataRequest::Connect(header)),
                0b01 => Ok(DataRequest::Disconnect(header)),
                other => Err(ParseError::UnknownSubtype { offset: 6, value: other }),
            }
        }
        0b11 => {
            // Numbered control packet.
            require(bytes, 7)?;
            let pno = read_u8(bytes, 6, 2, 4);
            match read_u8(bytes, 6, 0, 2) {
                0b10 => Ok(DataRequest::Ack { header, pno }),
                0b11 => Ok(DataRequest::Nack { header, pno }),
                other => Err(ParseError::UnknownSubtype { offset: 6, value: other }),
            }
        }
        0b00 => decode_unnumbered_data(bytes, header),
        0b01 => decode_numbered_data(bytes, header),
        other => Err(ParseError::UnknownSubtype { offset: 6, value: other }),
    }
}

fn decode_unnumbered_data(bytes: &[u8], header: Header) -> Result<DataRequest, ParseError> {
    match read_u8(bytes, 6, 0, 2) {
        0b00 => {
            require(bytes, 8)?;
            let bit_length = read_u8(bytes, 5, 0, 4);
            match read_u8(bytes, 7, 6, 2) {
                0b00 => Ok(DataRequest::GetValue(header)),
                0b01 => {
                    require(bytes, 7 + GroupValue::payload_len_for(bit_length))?;
                    Ok(DataRequest::GetValueResponse { header, value: GroupValue::read(bytes, bit_length) })
                }
                0b10 => {
                    require(bytes, 7 + GroupValue::payload_len_for(bit_length))?;
                    Ok(DataRequest::SendValue { header, value: GroupValue::read(bytes, bit_length) })
                }
                0b11 => {
                    require(bytes, 10)?;
                    Ok(DataRequest::PhysicalAddressSet {
                        header,
                        area: read_u8(bytes, 8, 4, 4),
                        line: read_u8(bytes, 8, 0, 4),
                        number: read_u8(bytes, 9, 0, 8),
                    })
                }
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        0b01 => {
            require(bytes, 8)?;
            match read_u8(bytes, 7, 0, 8) {
                0x00 => Ok(DataRequest::PhysicalAddressRequest(header)),
                0x40 => Ok(DataRequest::PhysicalAddressResponse(header)),
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        0b11 => {
            require(bytes, 8)?;
            match read_u8(bytes, 7, 0, 8) {
                0xDC => Ok(DataRequest::PhysicalAddressSerialRequest(header)),
                0xDD => Ok(DataRequest::PhysicalAddressSerialResponse(header)),
                0xDE => {
                    require(bytes, 10)?;
                    Ok(DataRequest::PhysicalAddressSerialSet {
                        header,
                        area: read_u8(bytes, 8, 4, 4),
                        line: read_u8(bytes, 8, 0, 4),
                        number: read_u8(bytes, 9, 0, 8),
                    })
                }
                0xDF => Ok(DataRequest::AppStatus(header)),
                0xE0 => Ok(DataRequest::SystemIdSet(header)),
                0xE1 => Ok(DataRequest::SystemIdRequest(header)),
                0xE2 => Ok(DataRequest::SystemIdResponse(header)),
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        other => Err(ParseError::UnknownSubtype { offset: 6, value: other }),
    }
}

fn decode_numbered_data(bytes: &[u8], header: Header) -> Result<DataRequest, ParseError> {
    require(bytes, 7)?;
    let pno = read_u8(bytes, 6, 2, 4);
    match read_u8(bytes, 6, 0, 2) {
        0b01 => {
            require(bytes, 9)?;
            match read_u8(bytes, 7, 6, 2) {
                0b10 => Ok(DataRequest::AdcValueRequest {
                    header,
                    pno,
                    channel: read_u8(bytes, 7, 0, 6),
                    samples: read_u8(bytes, 8, 0, 8),
                }),
                0b11 => {
                    require(bytes, 11)?;
                    Ok(DataRequest::AdcValueResponse {
                        header,
                        pno,
                        channel: read_u8(bytes, 7, 0, 6),
                        samples: read_u8(bytes, 8, 0, 8),
                        result: read_u16(bytes, 9),
                    })
                }
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        0b10 => {
            require(bytes, 10)?;
            let address = read_u16(bytes, 8);
            match read_u8(bytes, 7, 6, 2) {
                0b00 => Ok(DataRequest::MemoryReadRequest { header, pno, count: read_u8(bytes, 7, 0, 4), address }),
                0b01 => {
                    let count = read_u8(bytes, 7, 0, 4) as usize;
                    require(bytes, 10 + count)?;
                    Ok(DataRequest::MemoryReadResponse { header, pno, address, data: bytes[10..10 + count].to_vec() })
                }
                0b10 => {
                    let count = read_u8(bytes, 7, 0, 4) as usize;
                    require(bytes, 10 + count)?;
                    Ok(DataRequest::MemoryReadValue { header, pno, address, data: bytes[10..10 + count].to_vec() })
                }
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        0b11 => {
            require(bytes, 8)?;
            match read_u8(bytes, 7, 0, 8) {
                0x00 => Ok(DataRequest::MaskReadRequest { header, pno }),
                0x40 => Ok(DataRequest::MaskReadResponse { header, pno }),
                0x80 => Ok(DataRequest::Reset { header, pno }),
                0x81 => {
                    require(bytes, 10)?;
                    Ok(DataRequest::ResetIntoBootloader {
                        header,
                        pno,
                        erase: read_u8(bytes, 8, 0, 8),
                        channel: read_u8(bytes, 9, 0, 8),
                    })
                }
                other => Err(ParseError::UnknownSubtype { offset: 7, value: other }),
            }
        }
        other => Err(ParseError::UnknownSubtype { offset: 6, value: other }),
    }
}

/// Total telegram length in bytes, excluding the trailing checksum byte.
fn telegram_size(telegram: &Telegram) -> usize {
    use DataRequest::*;
    match telegram {
        Telegram::ExtendedDataRequest | Telegram::PollDataRequest => 7,
        Telegram::Data(data) => match data {
            Connect(_) | Disconnect(_) | Ack { .. } | Nack { .. } | GetValue(_) => 7,
            GetValueResponse { value, .. } | SendValue { value, .. } => 7 + value.payload_len(),
            PhysicalAddressSet { .. } | PhysicalAddressSerialSet { .. } => 10,
            PhysicalAddressRequest(_)
            | PhysicalAddressResponse(_)
            | PhysicalAddressSerialRequest(_)
            | PhysicalAddressSerialResponse(_)
            | AppStatus(_)
            | SystemIdSet(_)
            | SystemIdRequest(_)
            | SystemIdResponse(_)
            | MaskReadRequest { .. }
            | MaskReadResponse { .. } => 8,
            MemoryReadRequest { .. } => 10,
            MemoryReadResponse { data, .. } | MemoryReadValue { data, .. } => 10 + data.len(),
            AdcValueRequest { .. } => 9,
            AdcValueResponse { .. } => 11,
            Reset { .. } => 8,
            ResetIntoBootloader { .. } => 10,
        },
    }
}

/// Encodes a telegram to its wire bytes, including the trailing checksum.
pub fn encode(telegram: &Telegram) -> Vec<u8> {
    let mut buf = [0u8; BUF_LEN];
    match telegram {
        Telegram::ExtendedDataRequest => or_u8(&mut buf, 0, 6, 2, 0b00),
        Telegram::PollDataRequest => or_u8(&mut buf, 0, 6, 2, 0b11),
        Telegram::Data(data) => encode_data_request(&mut buf, data),
    }
    let size = telegram_size(telegram);
    let mut out = buf[..size].to_vec();
    let csum = checksum(&out);
    out.push(csum);
    out
}

fn encode_data_request(buf: &mut [u8; BUF_LEN], data: &DataRequest) {
    use DataRequest::*;
    data.header().write(buf);
    match data {
        Connect(_) => {
            or_u8(buf, 6, 6, 2, 0b10);
            or_u8(buf, 6, 0, 2, 0b00);
        }
        Disconnect(_) => {
            or_u8(buf, 6, 6, 2, 0b10);
            or_u8(buf, 6, 0, 2, 0b01);
        }
        Ack { pno, .. } => {
            or_u8(buf, 6, 6, 2, 0b11);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b10);
        }
        Nack { pno, .. } => {
            or_u8(buf, 6, 6, 2, 0b11);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b11);
        }
        GetValue(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b00);
            or_u8(buf, 7, 6, 2, 0b00);
        }
        GetValueResponse { value, .. } => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b00);
            or_u8(buf, 7, 6, 2, 0b01);
            or_u8(buf, 5, 0, 4, value.bit_length);
            value.write(buf);
        }
        SendValue { value, .. } => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b00);
            or_u8(buf, 7, 6, 2, 0b10);
            or_u8(buf, 5, 0, 4, value.bit_length);
            value.write(buf);
        }
        PhysicalAddressSet { area, line, number, .. } => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b00);
            or_u8(buf, 7, 6, 2, 0b11);
            or_u8(buf, 8, 4, 4, *area);
            or_u8(buf, 8, 0, 4, *line);
            or_u8(buf, 9, 0, 8, *number);
        }
        PhysicalAddressRequest(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b01);
            or_u8(buf, 7, 0, 8, 0x00);
        }
        PhysicalAddressResponse(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b01);
            or_u8(buf, 7, 0, 8, 0x40);
        }
        PhysicalAddressSerialRequest(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xDC);
        }
        PhysicalAddressSerialResponse(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xDD);
        }
        PhysicalAddressSerialSet { area, line, number, .. } => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xDE);
            or_u8(buf, 8, 4, 4, *area);
            or_u8(buf, 8, 0, 4, *line);
            or_u8(buf, 9, 0, 8, *number);
        }
        AppStatus(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xDF);
        }
        SystemIdSet(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xE0);
        }
        SystemIdRequest(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xE1);
        }
        SystemIdResponse(_) => {
            or_u8(buf, 6, 6, 2, 0b00);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0xE2);
        }
        MemoryReadRequest { pno, count, address, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b10);
            or_u8(buf, 7, 6, 2, 0b00);
            or_u8(buf, 7, 0, 4, *count);
            or_u16(buf, 8, *address);
        }
        MemoryReadResponse { pno, address, data, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b10);
            or_u8(buf, 7, 6, 2, 0b01);
            or_u8(buf, 7, 0, 4, data.len() as u8);
            or_u16(buf, 8, *address);
            buf[10..10 + data.len()].copy_from_slice(data);
        }
        MemoryReadValue { pno, address, data, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b10);
            or_u8(buf, 7, 6, 2, 0b10);
            or_u8(buf, 7, 0, 4, data.len() as u8);
            or_u16(buf, 8, *address);
            buf[10..10 + data.len()].copy_from_slice(data);
        }
        AdcValueRequest { pno, channel, samples, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b01);
            or_u8(buf, 7, 6, 2, 0b10);
            or_u8(buf, 7, 0, 6, *channel);
            or_u8(buf, 8, 0, 8, *samples);
        }
        AdcValueResponse { pno, channel, samples, result, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b01);
            or_u8(buf, 7, 6, 2, 0b11);
            or_u8(buf, 7, 0, 6, *channel);
            or_u8(buf, 8, 0, 8, *samples);
            or_u16(buf, 9, *result);
        }
        MaskReadRequest { pno, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0x00);
        }
        MaskReadResponse { pno, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0x40);
        }
        Reset { pno, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0x80);
        }
        ResetIntoBootloader { pno, erase, channel, .. } => {
            or_u8(buf, 6, 6, 2, 0b01);
            or_u8(buf, 6, 2, 4, *pno);
            or_u8(buf, 6, 0, 2, 0b11);
            or_u8(buf, 7, 0, 8, 0x81);
            or_u8(buf, 8, 0, 8, *erase);
            or_u8(buf, 9, 0, 8, *channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            priority: Priority::Low,
            not_repeated: true,
            src: IndividualAddress::new(1, 1, 3),
            dst: KnxAddress::Group(GroupAddress::new(0, 0, 1)),
            route: 0b110,
        }
    }

    #[test]
    fn send_value_round_trips_short_form() {
        let telegram = Telegram::Data(DataRequest::SendValue {
            header: sample_header(),
            value: GroupValue { bit_length: 1, value: 1 },
        });
        let bytes = encode(&telegram);
        assert_eq!(bytes.len(), 8);
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.checksum_valid);
        assert_eq!(decoded.telegram, telegram);
    }

    #[test]
    fn send_value_round_trips_long_form() {
        let telegram = Telegram::Data(DataRequest::SendValue {
            header: sample_header(),
            value: GroupValue { bit_length: 16, value: 0xABCD },
        });
        let bytes = encode(&telegram);
        assert_eq!(bytes.len(), 11);
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.checksum_valid);
        assert_eq!(decoded.telegram, telegram);
    }

    #[test]
    fn connect_and_disconnect_round_trip() {
        for t in [DataRequest::Connect(sample_header()), DataRequest::Disconnect(sample_header())] {
            let telegram = Telegram::Data(t);
            let bytes = encode(&telegram);
            assert_eq!(bytes.len(), 8);
            assert_eq!(decode(&bytes).unwrap().telegram, telegram);
        }
    }

    #[test]
    fn ack_carries_pno() {
        let telegram = Telegram::Data(DataRequest::Ack { header: sample_header(), pno: 3 });
        let bytes = encode(&telegram);
        assert_eq!(decode(&bytes).unwrap().telegram, telegram);
    }

    #[test]
    fn memory_read_response_round_trips_with_data() {
        let telegram = Telegram::Data(DataRequest::MemoryReadResponse {
            header: sample_header(),
            pno: 1,
            address: 0x0100,
            data: vec![0xDE, 0xAD, 0xBE],
        });
        let bytes = encode(&telegram);
        assert_eq!(bytes.len(), 14);
        assert_eq!(decode(&bytes).unwrap().telegram, telegram);
    }

    #[test]
    fn reset_into_bootloader_round_trips() {
        let telegram = Telegram::Data(DataRequest::ResetIntoBootloader {
            header: sample_header(),
            pno: 0,
            erase: 0xAA,
            channel: 5,
        });
        let bytes = encode(&telegram);
        assert_eq!(bytes.len(), 11);
        assert_eq!(decode(&bytes).unwrap().telegram, telegram);
    }

    #[test]
    fn corrupted_checksum_is_reported_not_fatal() {
        let telegram = Telegram::Data(DataRequest::GetValue(sample_header()));
        let mut bytes = encode(&telegram);
        *bytes.last_mut().unwrap() ^= 0xFF;
        let decoded = decode(&bytes).unwrap();
        assert!(!decoded.checksum_valid);
        assert_eq!(decoded.telegram, telegram);
        assert!(decode_strict(&bytes).is_err());
    }

    #[test]
    fn truncated_telegram_is_rejected() {
        let bytes = [0x00u8; 4];
        assert!(matches!(decode(&bytes), Err(ParseError::TruncatedTelegram { .. })));
    }

    #[test]
    fn unknown_control_subtype_is_rejected() {
        // byte0 = DataRequest, byte6 top bits = unnumbered control, low bits
        // set to an id neither Connect nor Disconnect defines.
        let mut buf = [0u8; BUF_LEN];
        or_u8(&mut buf, 0, 6, 2, 0b10);
        or_u8(&mut buf, 6, 6, 2, 0b10);
        or_u8(&mut buf, 6, 0, 2, 0b11);
        let bytes = buf[..7].to_vec();
        let mut with_csum = bytes.clone();
        with_csum.push(checksum(&bytes));
        assert!(matches!(decode(&with_csum), Err(ParseError::UnknownSubtype { .. })));
    }
}
