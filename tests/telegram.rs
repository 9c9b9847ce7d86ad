//! End-to-end scenarios for the telegram codec.

use knxcore::address::{GroupAddress, IndividualAddress, KnxAddress};
use knxcore::telegram::{self, DataRequest, GroupValue, Header, Priority, Telegram};

fn header(src: &str, dst: KnxAddress, priority: Priority) -> Header {
    Header { priority, not_repeated: true, src: src.parse().unwrap(), dst, route: 0b110 }
}

#[test]
fn send_value_encodes_to_the_documented_byte_sequence() {
    let telegram = Telegram::Data(DataRequest::SendValue {
        header: header("0.1.3", KnxAddress::Group(GroupAddress::new(0, 0, 1)), Priority::Low),
        value: GroupValue { bit_length: 1, value: 1 },
    });
    let bytes = telegram::encode(&telegram);
    assert_eq!(bytes[0], 0xBC);
    assert_eq!(bytes.len(), 9);
    assert_eq!(*bytes.last().unwrap(), 0x20);
}

#[test]
fn decoding_the_documented_byte_sequence_yields_value_read_group() {
    let bytes = [0xBCu8, 0x01, 0x03, 0x00, 0x01, 0xE1, 0x00, 0x80, 0x21];
    let decoded = telegram::decode(&bytes).unwrap();
    assert!(decoded.checksum_valid);
    match decoded.telegram {
        Telegram::Data(DataRequest::SendValue { header, value }) => {
            assert_eq!(header.priority, Priority::Low);
            assert!(header.not_repeated);
            assert!(header.dst.is_group());
            assert_eq!(value.bit_length, 1);
            assert_eq!(value.value, 0);
        }
        other => panic!("expected SendValue, got {other:?}"),
    }
}

#[test]
fn memory_read_response_round_trips_and_reports_expected_length() {
    let telegram = Telegram::Data(DataRequest::MemoryReadResponse {
        header: header("1.1.1", KnxAddress::Individual(IndividualAddress::new(1, 1, 2)), Priority::System),
        pno: 2,
        address: 0x1000,
        data: vec![1, 2, 3, 4],
    });
    let bytes = telegram::encode(&telegram);
    assert_eq!(bytes.len(), 15);
    let decoded = telegram::decode(&bytes).unwrap();
    assert!(decoded.checksum_valid);
    assert_eq!(decoded.telegram, telegram);
}

#[test]
fn address_round_trips_preserve_component_widths() {
    let individual: IndividualAddress = "1.2.3".parse().unwrap();
    assert_eq!((individual.area(), individual.line(), individual.device()), (1, 2, 3));
    let group: GroupAddress = "1/2/3".parse().unwrap();
    assert_eq!((group.main(), group.middle(), group.sub()), (1, 2, 3));
}

#[test]
fn encoded_telegrams_always_clear_the_checksum() {
    let telegram = Telegram::Data(DataRequest::GetValue(header(
        "1.1.254",
        KnxAddress::Group(GroupAddress::new(1, 2, 3)),
        Priority::High,
    )));
    let bytes = telegram::encode(&telegram);
    let running = bytes.iter().fold(0xFFu8, |acc, &b| acc ^ b);
    assert_eq!(running, 0);
}
