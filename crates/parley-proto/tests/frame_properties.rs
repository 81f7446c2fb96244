//! Property-based tests for frame encoding/decoding
//!
//! Verifies the codec contract for all valid inputs: encoded frames decode to
//! themselves, every strict prefix of an encoded frame reports
//! `FrameTooShort`, and a `FrameDecoder` reassembles the same frames no matter
//! how the stream is split.

use bytes::Bytes;
use parley_proto::{
    ChatFrame, ChatOpcode, ClientRequest, Frame, FrameDecoder, MonitorFrame, MonitorMessage,
    MonitorOpcode, ProtocolError,
};
use proptest::prelude::*;

fn arbitrary_chat_opcode() -> impl Strategy<Value = ChatOpcode> {
    prop_oneof![
        Just(ChatOpcode::Connect),
        Just(ChatOpcode::SetNickname),
        Just(ChatOpcode::SendMessage),
        Just(ChatOpcode::SendDirectMessage),
        Just(ChatOpcode::GetMembers),
        Just(ChatOpcode::Disconnect),
        Just(ChatOpcode::Connected),
        Just(ChatOpcode::NicknameAccepted),
        Just(ChatOpcode::Message),
        Just(ChatOpcode::DirectMessage),
        Just(ChatOpcode::Members),
        Just(ChatOpcode::MemberJoined),
        Just(ChatOpcode::MemberLeft),
        Just(ChatOpcode::Error),
    ]
}

fn arbitrary_monitor_opcode() -> impl Strategy<Value = MonitorOpcode> {
    prop_oneof![
        Just(MonitorOpcode::Connect),
        Just(MonitorOpcode::Message),
        Just(MonitorOpcode::DirectMessage),
        Just(MonitorOpcode::Disconnect),
    ]
}

fn arbitrary_chat_frame() -> impl Strategy<Value = ChatFrame> {
    (arbitrary_chat_opcode(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(opcode, payload)| ChatFrame::new(opcode, Bytes::from(payload)).expect("small payload"),
    )
}

fn arbitrary_monitor_frame() -> impl Strategy<Value = MonitorFrame> {
    (
        arbitrary_monitor_opcode(),
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..1024),
    )
        .prop_map(|(opcode, nickname, payload)| {
            MonitorFrame::new(opcode, Bytes::from(nickname), Bytes::from(payload))
                .expect("small trailers")
        })
}

fn nickname() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

#[test]
fn prop_chat_frame_roundtrip() {
    proptest!(|(frame in arbitrary_chat_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // PROPERTY: Round-trip must be identity
        let decoded = ChatFrame::decode(&buf).expect("decode should succeed");
        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_monitor_frame_roundtrip() {
    proptest!(|(frame in arbitrary_monitor_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = MonitorFrame::decode(&buf).expect("decode should succeed");
        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_chat_prefix_is_too_short() {
    proptest!(|(frame in arbitrary_chat_frame(), cut in any::<prop::sample::Index>())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // PROPERTY: Any strict prefix asks for more bytes
        let len = cut.index(buf.len());
        let result = ChatFrame::decode(&buf[..len]);
        prop_assert!(
            matches!(result, Err(ProtocolError::FrameTooShort { .. })),
            "prefix of {} / {} bytes gave {:?}",
            len,
            buf.len(),
            result
        );
    });
}

#[test]
fn prop_monitor_prefix_is_too_short() {
    proptest!(|(frame in arbitrary_monitor_frame(), cut in any::<prop::sample::Index>())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let len = cut.index(buf.len());
        let result = MonitorFrame::decode(&buf[..len]);
        prop_assert!(matches!(result, Err(ProtocolError::FrameTooShort { .. })), "expected FrameTooShort, got {:?}", result);
    });
}

#[test]
fn prop_decoder_reassembles_any_split() {
    proptest!(|(
        frames in prop::collection::vec(arbitrary_chat_frame(), 1..8),
        chunk in 1usize..64,
    )| {
        let mut wire = Vec::new();
        for frame in &frames {
            frame.encode(&mut wire).expect("encode should succeed");
        }

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            decoder.extend(piece);
            while let Some(frame) = decoder.next_frame().expect("valid stream") {
                decoded.push(frame);
            }
        }

        // PROPERTY: Same frames, same order, nothing left over
        let expected: Vec<Frame> = frames.into_iter().map(Frame::Chat).collect();
        prop_assert_eq!(decoded, expected);
        prop_assert_eq!(decoder.buffered(), 0);
    });
}

#[test]
fn prop_direct_message_roundtrip() {
    proptest!(|(recipient in nickname(), text in prop::collection::vec(any::<u8>(), 0..512))| {
        let request = ClientRequest::SendDirectMessage {
            recipient: Bytes::from(recipient.into_bytes()),
            text: Bytes::from(text),
        };

        let frame = request.clone().into_frame().expect("encode should succeed");
        prop_assert_eq!(ClientRequest::from_frame(&frame).expect("decode should succeed"), request);
    });
}

#[test]
fn prop_monitor_message_attribution() {
    proptest!(|(sender in nickname(), text in prop::collection::vec(any::<u8>(), 0..512))| {
        let message = MonitorMessage::Message { sender: sender.clone(), text: Bytes::from(text) };

        let frame = message.clone().into_frame().expect("encode should succeed");

        // PROPERTY: Sender travels in the nickname trailer
        prop_assert_eq!(&frame.nickname[..], sender.as_bytes());
        prop_assert_eq!(MonitorMessage::from_frame(&frame).expect("decode should succeed"), message);
    });
}
