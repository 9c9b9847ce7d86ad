//! Individual and group addresses.
//!
//! An [`IndividualAddress`] identifies a device (`area.line.device`, 4/4/8
//! bits); a [`GroupAddress`] identifies a multicast endpoint
//! (`main/middle/sub`, 5/3/8 bits). Both are newtypes over `u16` so they sort
//! and compare by their numeric value.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A device's individual address, rendered `area.line.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndividualAddress(u16);

impl IndividualAddress {
    /// The conventional sender address injected by test scaffolds, `1.1.254`.
    pub const SENDER: Self = Self::new(1, 1, 254);

    /// Builds an address from its area/line/device parts.
    pub const fn new(area: u8, line: u8, device: u8) -> Self {
        let value = ((area as u16 & 0xF) << 12) | ((line as u16 & 0xF) << 8) | device as u16;
        Self(value)
    }

    /// The 16-bit value as carried on the wire.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// The 4-bit area part.
    pub const fn area(self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// The 4-bit line part.
    pub const fn line(self) -> u8 {
        ((self.0 >> 8) & 0xF) as u8
    }

    /// The 8-bit device part.
    pub const fn device(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u16> for IndividualAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<IndividualAddress> for u16 {
    fn from(addr: IndividualAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl FromStr for IndividualAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_three(s, '.').ok_or_else(|| ParseError::InvalidAddress(s.to_owned()))?;
        Ok(Self::new(parts.0, parts.1, parts.2))
    }
}

/// A multicast group address, rendered `main/middle/sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupAddress(u16);

impl GroupAddress {
    /// Builds an address from its main/middle/sub parts.
    pub const fn new(main: u8, middle: u8, sub: u8) -> Self {
        let value = ((main as u16 & 0x1F) << 11) | ((middle as u16 & 0x7) << 8) | sub as u16;
        Self(value)
    }

    /// The 16-bit value as carried on the wire.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// The 5-bit main part.
    pub const fn main(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    /// The 3-bit middle part.
    pub const fn middle(self) -> u8 {
        ((self.0 >> 8) & 0x7) as u8
    }

    /// The 8-bit sub part.
    pub const fn sub(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u16> for GroupAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<GroupAddress> for u16 {
    fn from(addr: GroupAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl FromStr for GroupAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_three(s, '/').ok_or_else(|| ParseError::InvalidAddress(s.to_owned()))?;
        Ok(Self::new(parts.0, parts.1, parts.2))
    }
}

/// Either kind of address, as carried in a telegram's destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnxAddress {
    /// A device address.
    Individual(IndividualAddress),
    /// A multicast group address.
    Group(GroupAddress),
}

impl KnxAddress {
    /// The 16-bit value as carried on the wire, regardless of kind.
    pub fn value(self) -> u16 {
        match self {
            KnxAddress::Individual(a) => a.value(),
            KnxAddress::Group(a) => a.value(),
        }
    }

    /// True if this is a group address.
    pub fn is_group(self) -> bool {
        matches!(self, KnxAddress::Group(_))
    }
}

impl fmt::Display for KnxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxAddress::Individual(a) => a.fmt(f),
            KnxAddress::Group(a) => a.fmt(f),
        }
    }
}

impl FromStr for KnxAddress {
    type Err = ParseError;

    /// Discriminates by separator: `.` parses an individual address, `/` a
    /// group address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('.') {
            s.parse().map(KnxAddress::Individual)
        } else if s.contains('/') {
            s.parse().map(KnxAddress::Group)
        } else {
            Err(ParseError::InvalidAddress(s.to_owned()))
        }
    }
}

fn split_three(s: &str, sep: char) -> Option<(u8, u8, u8)> {
    let mut parts = s.split(sep);
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    let c = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_round_trip() {
        let a: IndividualAddress = "1.2.3".parse().unwrap();
        assert_eq!(a.area(), 1);
        assert_eq!(a.line(), 2);
        assert_eq!(a.device(), 3);
        assert_eq!(a.to_string(), "1.2.3");
    }

    #[test]
    fn group_round_trip() {
        let a: GroupAddress = "1/2/3".parse().unwrap();
        assert_eq!(a.main(), 1);
        assert_eq!(a.middle(), 2);
        assert_eq!(a.sub(), 3);
        assert_eq!(a.to_string(), "1/2/3");
    }

    #[test]
    fn knx_address_discriminates_by_separator() {
        assert!(matches!(
            "1.1.254".parse::<KnxAddress>().unwrap(),
            KnxAddress::Individual(_)
        ));
        assert!(matches!(
            "0/0/1".parse::<KnxAddress>().unwrap(),
            KnxAddress::Group(_)
        ));
    }

    #[test]
    fn ordering_is_numeric() {
        let a: GroupAddress = "0/0/1".parse().unwrap();
        let b: GroupAddress = "0/0/2".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn sender_constant() {
        assert_eq!(IndividualAddress::SENDER.to_string(), "1.1.254");
    }

    #[test]
    fn invalid_address_is_rejected() {
        assert!("not-an-address".parse::<KnxAddress>().is_err());
    }
}
