//! Edge case tests for framing
//!
//! Boundary conditions: empty payloads, maximum lengths, stream drift,
//! marker collisions and malformed length fields.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use frame_link::core::checksum::{checksum16, crc16, CheckKind};
use frame_link::core::fixed_head::{ByteOrder, FixedHeadProtocol, LengthWidth};
use frame_link::core::head_tail::HeadTailProtocol;
use frame_link::core::packet::Packet;
use frame_link::core::protocol::FramingProtocol;
use frame_link::error::ProtocolError;

fn head_tail(check: CheckKind) -> FramingProtocol {
    HeadTailProtocol::new(&b"##"[..], &b"$$"[..], 0, check)
        .unwrap()
        .into()
}

// ============================================================================
// Checksums
// ============================================================================

#[test]
fn test_crc16_check_value() {
    assert_eq!(crc16(&[b"123456789"]), 0x4B37);
    // Parts are folded in order, as if concatenated.
    assert_eq!(crc16(&[b"1234", b"56789"]), 0x4B37);
}

#[test]
fn test_checksum16_wraps() {
    let data = vec![0xFFu8; 300];
    assert_eq!(checksum16(&[&data[..]]), (0xFFu32 * 300 % 0x1_0000) as u16);
}

#[test]
fn test_check_wire_byte_order() {
    // Sum goes big-endian, CRC-16/MODBUS low byte first.
    assert_eq!(CheckKind::Sum.compute(&[&[0x01, 0x02]]), vec![0x00, 0x03]);
    assert_eq!(CheckKind::Crc16.compute(&[b"123456789"]), vec![0x37, 0x4B]);
    assert!(CheckKind::None.compute(&[b"anything"]).is_empty());
}

// ============================================================================
// Fixed head
// ============================================================================

#[test]
fn test_empty_body_frame() {
    let protocol = FramingProtocol::fixed_head_default();
    let wire = protocol.build_frame(&[0x09], b"").unwrap().to_bytes();
    assert_eq!(wire.len(), protocol.min_frame_len());

    let mut buf = BytesMut::from(&wire[..]);
    let packet = protocol.get_frame(&mut buf).unwrap().unwrap();
    assert_eq!(packet.split(), (&[0x09][..], &b""[..]));
}

#[test]
fn test_exact_wire_layout() {
    let protocol = FramingProtocol::fixed_head_default();
    let wire = protocol.build_frame(&[0x01], b"hi").unwrap().to_bytes();
    let crc = crc16(&[&[0x01], &[0x00, 0x02], b"hi"]).to_le_bytes();
    assert_eq!(
        wire,
        vec![0xAA, 0x55, 0x01, 0x00, 0x02, b'h', b'i', crc[0], crc[1]]
    );
}

#[test]
fn test_little_endian_length_field() {
    let protocol = FixedHeadProtocol::new(
        Bytes::from_static(&[0x7E]),
        0,
        LengthWidth::U32,
        ByteOrder::LittleEndian,
        CheckKind::None,
    );
    let wire = protocol.build_frame(&[], &[0u8; 258]).unwrap().to_bytes();
    assert_eq!(&wire[..5], &[0x7E, 0x02, 0x01, 0x00, 0x00]);
}

#[test]
fn test_u8_length_overflow() {
    let protocol = FixedHeadProtocol::new(
        Bytes::from_static(&[0x7E]),
        1,
        LengthWidth::U8,
        ByteOrder::BigEndian,
        CheckKind::Sum,
    );
    assert!(protocol.build_frame(&[0x01], &[0u8; 255]).is_ok());
    match protocol.build_frame(&[0x01], &[0u8; 256]) {
        Err(ProtocolError::LengthOverflow { len, bits }) => {
            assert_eq!((len, bits), (256, 8));
        }
        other => panic!("expected length overflow, got {other:?}"),
    }
}

#[test]
fn test_body_above_max_is_rejected_on_build() {
    let protocol = FixedHeadProtocol::new(
        Bytes::from_static(&[0xAA, 0x55]),
        1,
        LengthWidth::U32,
        ByteOrder::BigEndian,
        CheckKind::None,
    )
    .with_max_body_len(8);
    assert!(matches!(
        protocol.build_frame(&[0x01], &[0u8; 9]),
        Err(ProtocolError::OversizedPacket(9))
    ));
}

#[test]
fn test_malformed_length_field_is_a_fault() {
    let protocol = FramingProtocol::from(
        FixedHeadProtocol::new(
            Bytes::from_static(&[0xAA, 0x55]),
            1,
            LengthWidth::U32,
            ByteOrder::BigEndian,
            CheckKind::Crc16,
        )
        .with_max_body_len(1024),
    );
    let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00][..]);
    let err = protocol.get_frame(&mut buf).unwrap_err();
    assert!(err.is_framing_fault());
    assert!(buf.is_empty());
}

#[test]
fn test_drift_is_discarded_before_next_head() {
    let protocol = FramingProtocol::fixed_head_default();
    let mut buf = BytesMut::from(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80][..]);
    assert!(protocol.get_frame(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());

    // Drift ending in the first head byte loses that byte too.
    let mut buf = BytesMut::from(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0xAA][..]);
    assert!(protocol.get_frame(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());

    // The next whole frame still decodes.
    let next = protocol.build_frame(&[0x01], b"ok").unwrap().to_bytes();
    buf.extend_from_slice(&next);
    assert_eq!(protocol.get_frame(&mut buf).unwrap().unwrap().body(), b"ok");
}

#[test]
fn test_unaddressable_length_is_a_fault() {
    let protocol = FixedHeadProtocol::new(
        Bytes::from_static(&[0xAA]),
        0,
        LengthWidth::U64,
        ByteOrder::BigEndian,
        CheckKind::None,
    )
    .with_max_body_len(usize::MAX);
    let mut buf = BytesMut::from(&[0xAA][..]);
    buf.extend_from_slice(&u64::MAX.to_be_bytes());
    buf.extend_from_slice(&[0x01, 0x02]);

    let err = protocol.get_frame(&mut buf).unwrap_err();
    assert!(err.is_framing_fault());
    assert!(buf.is_empty());
}

#[test]
fn test_head_tail_drift_is_discarded_entirely() {
    let protocol = head_tail(CheckKind::None);
    let mut buf = BytesMut::from(&b"garbage#"[..]);
    assert!(protocol.get_frame(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());
}

#[test]
fn test_corrupted_check_byte() {
    let protocol = FramingProtocol::fixed_head_default();
    let mut wire = protocol.build_frame(&[0x01], b"payload").unwrap().to_bytes();
    let last = wire.len() - 1;
    wire[last] = wire[last].wrapping_add(1);

    let mut buf = BytesMut::from(&wire[..]);
    match protocol.get_frame(&mut buf) {
        Err(ProtocolError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected.len(), 2);
            assert_ne!(expected, actual);
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

// ============================================================================
// Head/tail
// ============================================================================

#[test]
fn test_head_tail_multi_frame_stream() {
    let protocol = head_tail(CheckKind::Sum);
    let mut buf = BytesMut::new();
    for body in [&b"first"[..], b"", b"third"] {
        protocol.build_frame(b"", body).unwrap().encode_into(&mut buf);
    }

    let packets = protocol.get_frames(&mut buf).unwrap();
    let bodies: Vec<&[u8]> = packets.iter().map(Packet::body).collect();
    assert_eq!(bodies, vec![&b"first"[..], b"", b"third"]);
}

#[test]
fn test_head_tail_out_of_order_markers() {
    let protocol = head_tail(CheckKind::None);
    let mut buf = BytesMut::from(&b"$$junk##data$$"[..]);
    assert!(matches!(
        protocol.get_frame(&mut buf),
        Err(ProtocolError::MarkersOutOfOrder)
    ));
}

#[test]
fn test_head_tail_body_containing_tail_is_cut_short() {
    let protocol = head_tail(CheckKind::None);
    let wire = protocol.build_frame(b"", b"price $$ 5").unwrap().to_bytes();
    let mut buf = BytesMut::from(&wire[..]);
    let packet = protocol.get_frame(&mut buf).unwrap().unwrap();
    assert_eq!(packet.body(), b"price ");
}

#[test]
fn test_head_tail_display() {
    let protocol = head_tail(CheckKind::Crc16);
    match protocol.build_frame(b"", b"text").unwrap() {
        Packet::HeadTail(packet) => assert_eq!(packet.to_string(), "##text$$"),
        other => panic!("expected head/tail packet, got {other:?}"),
    }
}

#[test]
fn test_head_tail_type_tag_width() {
    let protocol: FramingProtocol = HeadTailProtocol::new(&b"<"[..], &b">"[..], 2, CheckKind::None)
        .unwrap()
        .into();
    assert!(matches!(
        protocol.build_frame(b"A", b"x"),
        Err(ProtocolError::TypeLengthMismatch {
            expected: 2,
            actual: 1
        })
    ));

    let mut buf = BytesMut::from(&b"<ABbody>"[..]);
    let packet = protocol.get_frame(&mut buf).unwrap().unwrap();
    assert_eq!(packet.split(), (&b"AB"[..], &b"body"[..]));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_classification() {
    assert!(ProtocolError::MarkersOutOfOrder.is_framing_fault());
    assert!(ProtocolError::OversizedPacket(1).is_framing_fault());
    assert!(!ProtocolError::ConnectionClosed.is_framing_fault());
    assert!(!ProtocolError::Timeout.is_framing_fault());
    assert!(!ProtocolError::TypeLengthMismatch {
        expected: 1,
        actual: 2
    }
    .is_framing_fault());
}

#[test]
fn test_error_display() {
    let err = ProtocolError::TypeLengthMismatch {
        expected: 1,
        actual: 3,
    };
    assert!(!err.to_string().is_empty());
    assert_eq!(
        ProtocolError::ConnectionClosed.to_string(),
        "the connection has been closed"
    );
}
