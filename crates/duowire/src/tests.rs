//! Tests for packet classification and frame decoding.

use crate::frame;
use crate::frame::HEADER_LEN;
use crate::frame::Header;
use crate::Class;
use crate::Error;
use crate::Flags;
use crate::Kind;
use crate::Packet;

#[test]
fn test_request_flags() {
    let call = Packet::request("echo", 7, b"hi".to_vec(), true);
    assert_eq!(call.class(), Some(Class::Request));
    assert!(call.expects_response());
    assert!(!call.is_response());

    let message = Packet::request("echo", 8, Vec::new(), false);
    assert_eq!(message.class(), Some(Class::Request));
    assert!(!message.expects_response());
}

#[test]
fn test_responses_have_no_command() {
    let ok = Packet::response(3, b"done".to_vec());
    assert_eq!(ok.class(), Some(Class::Response));
    assert!(ok.command.is_empty());
    assert!(!ok.is_failure());

    let failed = Packet::failure(3, "boom");
    assert_eq!(failed.class(), Some(Class::Failure));
    assert!(failed.is_failure());
    assert_eq!(failed.payload, b"boom");
    assert!(failed.command.is_empty());
}

#[test]
fn test_error_flag_on_request_is_not_a_failure() {
    let mut call = Packet::request("x", 1, Vec::new(), true);
    call.flags = call.flags | Flags::ERROR;
    assert!(!call.is_failure());
    assert_eq!(call.class(), Some(Class::Request));
}

#[test]
fn test_ping_classes() {
    assert_eq!(Packet::ping(1, vec![0; 4]).class(), Some(Class::Ping));
    assert_eq!(Packet::pong(1, vec![0; 4]).class(), Some(Class::Pong));

    let mut odd = Packet::ping(1, Vec::new());
    odd.flags = Flags::NONE;
    assert_eq!(odd.class(), None);
}

#[test]
fn test_sub_flags_depend_on_kind() {
    // The same bit means response on RPC and ping on Ping.
    assert_eq!(Flags::RESPONSE.bits(), Flags::PING.bits());
    let ping = Packet::ping(1, Vec::new());
    assert!(!ping.is_response());
    assert!(!ping.expects_response());
}

#[test]
fn test_kind_bits() {
    assert_eq!(Kind::from_bits(0x51), Some(Kind::Rpc));
    assert_eq!(Kind::from_bits(0x22), Some(Kind::Ping));
    assert_eq!(Kind::from_bits(0x13), None);
    assert_eq!(Flags::from_bits(0x5f).bits(), 0x50);
}

#[test]
fn test_frame_layout() {
    let packet = Packet::request("ab", 0x0102, vec![9, 8, 7], true);
    let bytes = frame::encode(&packet).unwrap();

    assert_eq!(bytes.len(), HEADER_LEN + 2 + 3);
    assert_eq!(bytes[0], 0x41);
    assert_eq!(&bytes[1..9], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    assert_eq!(&bytes[9..11], &[0, 2]);
    assert_eq!(&bytes[11..15], &[0, 0, 0, 3]);
    assert_eq!(&bytes[15..], b"ab\x09\x08\x07");
}

#[test]
fn test_frame_decode_drops_client_id() {
    let packet = Packet::pong(42, b"xyz".to_vec()).with_client_id(99);
    let decoded = frame::decode(&frame::encode(&packet).unwrap()).unwrap();

    assert_eq!(decoded.client_id, 0);
    assert_eq!(decoded.with_client_id(99), packet);
}

#[test]
fn test_decode_truncated_header() {
    let err = frame::decode(&[0x01, 0x00]).unwrap_err();
    assert_eq!(err, Error::Truncated { needed: HEADER_LEN, available: 2 });
}

#[test]
fn test_decode_truncated_body() {
    let mut bytes = frame::encode(&Packet::response(1, vec![1, 2, 3, 4])).unwrap();
    bytes.truncate(bytes.len() - 1);
    match frame::decode(&bytes) {
        Err(Error::Truncated { needed, .. }) => assert_eq!(needed, HEADER_LEN + 4),
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[test]
fn test_decode_trailing_bytes() {
    let mut bytes = frame::encode(&Packet::response(1, vec![1])).unwrap();
    bytes.push(0xff);
    assert_eq!(
        frame::decode(&bytes).unwrap_err(),
        Error::LengthMismatch { expected: 1, found: 2 }
    );
}

#[test]
fn test_decode_unknown_kind() {
    let mut bytes = frame::encode(&Packet::ping(1, Vec::new())).unwrap();
    bytes[0] = 0x1f;
    assert_eq!(frame::decode(&bytes).unwrap_err(), Error::UnknownKind(0x1f));
}

#[test]
fn test_decode_invalid_command() {
    let mut bytes = frame::encode(&Packet::request("ab", 1, Vec::new(), false)).unwrap();
    bytes[HEADER_LEN] = 0xff;
    assert_eq!(frame::decode(&bytes).unwrap_err(), Error::InvalidCommand);
}

#[test]
fn test_encode_command_too_long() {
    let command = "c".repeat(u16::MAX as usize + 1);
    let packet = Packet::request(command, 1, Vec::new(), false);
    assert_eq!(
        frame::encode(&packet).unwrap_err(),
        Error::CommandTooLong(u16::MAX as usize + 1)
    );
}

#[test]
fn test_header_parse_then_body() {
    let packet = Packet::failure(5, "nope");
    let bytes = frame::encode(&packet).unwrap();

    let mut head = [0u8; HEADER_LEN];
    head.copy_from_slice(&bytes[..HEADER_LEN]);
    let header = Header::parse(&head);

    assert_eq!(header.sequence, 5);
    assert_eq!(header.command_len, 0);
    assert_eq!(header.body_len(), 4);
    assert_eq!(header.into_packet(&bytes[HEADER_LEN..]).unwrap(), packet);
}
