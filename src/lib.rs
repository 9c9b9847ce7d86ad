//! knxcore is a library for the KNX/EIB field-bus core tooling: a bit-exact
//! telegram codec, a device-image builder, and a signal decoder for sampled
//! bus waveforms.
//!
//! # Limitations
//!
//! The project archive (ZIP/XML), the pickled program store and the report
//! renderer are not implemented here; this crate consumes their already
//! parsed records (see [`program::ProgramContext`]).
//!
//! # Examples
//!
//! See [`telegram`], [`builder`] and [`decoder`].

#![warn(missing_docs)]

pub mod address;
pub mod builder;
pub mod datapoint;
pub mod decoder;
pub mod error;
pub mod program;
pub mod telegram;

pub use address::{GroupAddress, IndividualAddress, KnxAddress};
pub use builder::{Eeprom, ImageBuilder};
pub use decoder::{DecodedSpan, DecoderConfig, SpanKind, TimingProfile};
pub use error::{ConfigError, LayoutError, ParseError};
pub use program::{ComObjectFlag, ProgramContext};
pub use telegram::{DataRequest, Priority, Telegram};
