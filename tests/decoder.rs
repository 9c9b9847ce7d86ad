//! End-to-end scenarios for the signal decoder.

use knxcore::address::{GroupAddress, IndividualAddress, KnxAddress};
use knxcore::decoder::{decode, BITS_PER_BYTE_CELL, NOMINAL_BIT_TIME_US};
use knxcore::decoder::{DecoderConfig, SpanKind, TimingProfile};
use knxcore::telegram::{self, DataRequest, Header, Priority, Telegram};

const SAMPLE_RATE: u64 = 1_000_000;

/// Same bit-cell encoding the unit tests in `src/decoder.rs` use: a `0` bit
/// is a brief low pulse at its nominal position, a `1` bit leaves the line
/// high. `force_parity` lets a test inject a flipped parity bit.
fn build_samples(bytes: &[u8], force_parity: Option<bool>) -> Vec<(u64, bool)> {
    let bit_samples = (NOMINAL_BIT_TIME_US * SAMPLE_RATE as f64 / 1_000_000.0).round() as i64;
    let pulse_width = (bit_samples / 4).max(1);
    let lead_in = bit_samples * 2;
    let trailing = bit_samples * 4;
    let total = lead_in + bytes.len() as i64 * bit_samples * BITS_PER_BYTE_CELL as i64 + trailing;
    let mut levels = vec![true; total as usize];
    let pulse_at = |levels: &mut Vec<bool>, pos: i64| {
        for s in pos..(pos + pulse_width).min(levels.len() as i64) {
            levels[s as usize] = false;
        }
    };

    let mut cursor = lead_in;
    for (byte_idx, &byte) in bytes.iter().enumerate() {
        pulse_at(&mut levels, cursor);
        let mut bit_ref = cursor;
        let mut ones = 0u32;
        for n in 0..8 {
            let bit = (byte >> n) & 1;
            if bit == 1 {
                ones += 1;
            } else {
                pulse_at(&mut levels, bit_ref + bit_samples);
            }
            bit_ref += bit_samples;
        }
        let is_last = byte_idx == bytes.len() - 1;
        let computed_parity = (ones % 2) == 1;
        let parity_bit = if is_last { force_parity.unwrap_or(computed_parity) } else { computed_parity };
        if !parity_bit {
            pulse_at(&mut levels, bit_ref + bit_samples);
        }
        bit_ref += bit_samples;
        bit_ref += bit_samples * 2;
        cursor = bit_ref;
    }
    levels.into_iter().enumerate().map(|(i, level)| (i as u64, level)).collect()
}

fn default_config() -> DecoderConfig {
    DecoderConfig { sample_rate_hz: SAMPLE_RATE, timing: TimingProfile::Default, inverted_signal: false }
}

#[test]
fn square_wave_byte_decodes_with_correct_even_parity() {
    let samples = build_samples(&[0x55], None);
    let spans = decode(samples, &default_config());
    assert!(spans.iter().any(|s| matches!(s.kind, SpanKind::DataByte(0x55))));
    assert!(!spans.iter().any(|s| matches!(s.kind, SpanKind::ParityError)));
}

#[test]
fn trailing_zero_byte_is_classified_as_busy_nak() {
    let samples = build_samples(&[0x00], None);
    let spans = decode(samples, &default_config());
    assert!(spans.iter().any(|s| matches!(s.kind, SpanKind::BusyNak)));
}

#[test]
fn memory_read_response_round_trip_has_the_documented_length() {
    let telegram = Telegram::Data(DataRequest::MemoryReadResponse {
        header: Header {
            priority: Priority::System,
            not_repeated: true,
            src: IndividualAddress::new(1, 1, 1),
            dst: KnxAddress::Individual(IndividualAddress::new(1, 1, 2)),
            route: 0b110,
        },
        pno: 2,
        address: 0x1000,
        data: vec![1, 2, 3, 4],
    });
    let bytes = telegram::encode(&telegram);
    assert_eq!(bytes.len(), 15);

    let samples = build_samples(&bytes, None);
    let spans = decode(samples, &default_config());
    let data_bytes: Vec<u8> = spans
        .iter()
        .filter_map(|s| if let SpanKind::DataByte(b) = s.kind { Some(b) } else { None })
        .collect();
    assert_eq!(data_bytes, &bytes[..bytes.len() - 1]);
    assert!(spans.iter().any(|s| matches!(s.kind, SpanKind::Checksum(_))));

    let decoded = telegram::decode(&bytes).unwrap();
    assert!(decoded.checksum_valid);
    match decoded.telegram {
        Telegram::Data(DataRequest::MemoryReadResponse { data, .. }) => assert_eq!(data.len(), 4),
        other => panic!("expected MemoryReadResponse, got {other:?}"),
    }
}

#[test]
fn ack_short_frame_is_distinguished_from_a_random_byte() {
    let ack = decode(build_samples(&[0xCC], None), &default_config());
    assert!(ack.iter().any(|s| matches!(s.kind, SpanKind::Ack)));

    let random = decode(build_samples(&[0x42], None), &default_config());
    assert!(random.iter().any(|s| matches!(s.kind, SpanKind::RandomByte(0x42))));
    assert!(random.iter().any(|s| matches!(s.kind, SpanKind::DataByte(0x42))));
}
