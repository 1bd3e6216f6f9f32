//! Golden-byte tests for the wire format.
//!
//! Client and server are built independently; these fixtures pin the exact
//! bytes so a layout change shows up as a test failure instead of silent
//! misdecoding on the other peer.

use chatwire_protocol::{
    AuthorizationResult, ChannelRecord, MessageRecord, Packet, PacketKind, ProtocolError,
    UserRecord,
};

fn string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

#[test]
fn test_new_message_golden_bytes() {
    let packet = Packet::NewMessage(MessageRecord {
        id: "m1".into(),
        author: "u1".into(),
        channel: "c1".into(),
        server: "s1".into(),
        content: "hi".into(),
        created_at_millis: 1_700_000_000_000,
    });

    let mut expected = vec![0x00, 0x03];
    for field in ["m1", "u1", "c1", "s1", "hi"] {
        expected.extend(string(field));
    }
    expected.extend(1_700_000_000_000u64.to_be_bytes());

    let frame = packet.encode().unwrap();
    assert_eq!(frame, expected);
    assert_eq!(frame.len(), 40);
    assert_eq!(Packet::decode(&expected).unwrap(), packet);
}

#[test]
fn test_new_channel_golden_bytes() {
    let packet = Packet::NewChannel(ChannelRecord {
        id: "c2".into(),
        server: "s1".into(),
        name: "general".into(),
    });

    let mut expected = vec![0x00, 0x04];
    expected.extend(string("c2"));
    expected.extend(string("s1"));
    expected.extend(string("general"));

    assert_eq!(packet.encode().unwrap(), expected);
}

#[test]
fn test_user_joined_golden_bytes() {
    let packet = Packet::UserJoined {
        user: UserRecord {
            id: "u2".into(),
            username: "bob".into(),
        },
        server: "s1".into(),
    };

    let mut expected = vec![0x00, 0x05];
    expected.extend(string("u2"));
    expected.extend(string("bob"));
    expected.extend(string("s1"));

    assert_eq!(packet.encode().unwrap(), expected);
}

#[test]
fn test_authorization_golden_bytes() {
    let packet = Packet::Authorization {
        token: "abc".into(),
    };
    assert_eq!(
        packet.encode().unwrap(),
        [vec![0x00, 0x01], string("abc")].concat()
    );

    let rejected = Packet::AuthorizationResult(AuthorizationResult::rejected("Forbidden"));
    assert_eq!(
        rejected.encode().unwrap(),
        [vec![0x00, 0x02, 0x00], string("Forbidden")].concat()
    );
}

#[test]
fn test_every_registered_kind_is_decodable_from_its_tag() {
    // A frame holding only the tag either decodes (empty body) or fails as
    // truncated; it is never reported as an unknown type.
    for kind in PacketKind::ALL {
        let frame = kind.tag().to_be_bytes();
        match Packet::decode(&frame) {
            Ok(packet) => assert_eq!(packet.kind(), kind),
            Err(ProtocolError::TruncatedFrame { .. }) => {}
            Err(other) => panic!("{kind}: unexpected {other}"),
        }
    }
}
