#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for realtime frames and backend rows.
//!
//! The JSON fixtures below are what the realtime service and the data
//! service exchange with clients; the types must accept them as-is and
//! produce the same shapes.

use galinheiro_client::error_codes::ErrorCode;
use galinheiro_client::protocol::{
    Avatar, BroadcastEvent, ChangeKind, ClientFrame, Reactions, RoomCode, RoomStatus, RowChange,
    ServerFrame,
};
use galinheiro_client::RealtimeEvent;
use serde_json::{json, Value};
use uuid::Uuid;

fn test_uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn room_json() -> Value {
    json!({
        "id": test_uuid(1),
        "code": "ABC123",
        "status": "album_selection",
        "host_id": test_uuid(2),
        "current_round": 0,
        "total_rounds": 10,
        "round_duration": 15,
        "eggs_per_correct": 10,
        "speed_bonus_threshold": 80,
        "speed_bonus_eggs": 5,
        "genre_id": test_uuid(3),
        "updated_at": "2026-03-01T12:00:00Z"
    })
}

fn participant_json() -> Value {
    json!({
        "id": test_uuid(10),
        "room_id": test_uuid(1),
        "client_id": test_uuid(11),
        "display_name": "Ana",
        "avatar": { "kind": "emoji", "value": "🐣" },
        "is_host": true,
        "joined_at": "2026-03-01T12:00:00Z",
        "last_seen": "2026-03-01T12:00:10Z"
    })
}

// ════════════════════════════════════════════════════════════════════
// Client frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn subscribe_frame_shape() {
    let frame = ClientFrame::Subscribe {
        topic: "room:ABC123".into(),
    };
    assert_eq!(
        serde_json::to_value(&frame).unwrap(),
        json!({ "type": "Subscribe", "data": { "topic": "room:ABC123" } })
    );
}

#[test]
fn heartbeat_frame_has_no_data() {
    assert_eq!(
        serde_json::to_value(ClientFrame::Heartbeat).unwrap(),
        json!({ "type": "Heartbeat" })
    );
}

#[test]
fn broadcast_frame_nests_event_and_payload() {
    let frame = ClientFrame::Broadcast {
        topic: "room:ABC123".into(),
        event: BroadcastEvent::NewRoundStarting {
            session_id: test_uuid(7),
            round_number: 3,
        },
        ack: false,
    };
    assert_eq!(
        serde_json::to_value(&frame).unwrap(),
        json!({
            "type": "Broadcast",
            "data": {
                "topic": "room:ABC123",
                "event": {
                    "event": "NEW_ROUND_STARTING",
                    "payload": { "session_id": test_uuid(7), "round_number": 3 }
                },
                "ack": false
            }
        })
    );
}

#[test]
fn broadcast_ack_defaults_to_false() {
    let raw = json!({
        "type": "Broadcast",
        "data": {
            "topic": "room:ABC123",
            "event": {
                "event": "PLAYER_LEFT",
                "payload": { "client_id": test_uuid(11), "display_name": "Ana" }
            }
        }
    });
    let frame: ClientFrame = serde_json::from_value(raw).unwrap();
    assert!(matches!(frame, ClientFrame::Broadcast { ack: false, .. }));
}

// ════════════════════════════════════════════════════════════════════
// Broadcast events
// ════════════════════════════════════════════════════════════════════

#[test]
fn broadcast_event_names_are_screaming_snake_case() {
    let events = [
        (
            BroadcastEvent::GenreSelected {
                genre_id: test_uuid(3),
                genre_name: "MPB".into(),
            },
            "GENRE_SELECTED",
        ),
        (
            BroadcastEvent::AlbumSelected {
                album_id: test_uuid(4),
                album_name: "Clube da Esquina".into(),
                cover_url: None,
            },
            "ALBUM_SELECTED",
        ),
        (
            BroadcastEvent::MessageReaction {
                message_id: test_uuid(5),
                reactions: Reactions::default(),
                updated_at: "2026-03-01T12:00:00Z".parse().unwrap(),
            },
            "MESSAGE_REACTION",
        ),
        (
            BroadcastEvent::PlayerLeft {
                client_id: test_uuid(11),
                display_name: "Ana".into(),
            },
            "PLAYER_LEFT",
        ),
    ];
    for (event, name) in events {
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], name);
        assert!(value["payload"].is_object(), "{name} has a payload object");
    }
}

#[test]
fn album_selected_omits_missing_cover() {
    let value = serde_json::to_value(BroadcastEvent::AlbumSelected {
        album_id: test_uuid(4),
        album_name: "Acabou Chorare".into(),
        cover_url: None,
    })
    .unwrap();
    assert!(value["payload"].get("cover_url").is_none());
}

#[test]
fn new_message_carries_the_whole_row() {
    let raw = json!({
        "event": "NEW_MESSAGE",
        "payload": {
            "id": test_uuid(20),
            "room_id": test_uuid(1),
            "sender_id": test_uuid(11),
            "sender_name": "Ana",
            "text": "quem canta essa?",
            "created_at": "2026-03-01T12:00:00Z",
            "updated_at": "2026-03-01T12:00:00Z",
            "reply_to": {
                "message_id": test_uuid(19),
                "sender_name": "Bia",
                "text": "próxima!"
            },
            "reactions": { "🔥": [test_uuid(12)] }
        }
    });
    let event: BroadcastEvent = serde_json::from_value(raw).unwrap();
    let BroadcastEvent::NewMessage(message) = event else {
        panic!("expected NewMessage");
    };
    assert_eq!(message.sender_avatar, Avatar::default());
    assert_eq!(message.reply_to.unwrap().sender_name, "Bia");
    assert_eq!(message.reactions.count("🔥"), 1);
    assert_eq!(message.reactions.count("👍"), 0);
}

// ════════════════════════════════════════════════════════════════════
// Server frames and row changes
// ════════════════════════════════════════════════════════════════════

#[test]
fn change_frame_parses_room_rows() {
    let raw = json!({
        "type": "Change",
        "data": {
            "topic": "room:ABC123",
            "change": { "table": "game_rooms", "kind": "UPDATE", "record": room_json() }
        }
    });
    let frame: ServerFrame = serde_json::from_value(raw).unwrap();
    let ServerFrame::Change { topic, change } = frame else {
        panic!("expected Change");
    };
    assert_eq!(topic, "room:ABC123");
    assert_eq!(change.kind(), ChangeKind::Update);
    let RowChange::GameRooms { record, .. } = change else {
        panic!("expected a game_rooms change");
    };
    assert_eq!(record.code.as_str(), "ABC123");
    assert_eq!(record.status, RoomStatus::AlbumSelection);
    assert_eq!(record.album_id, None);
    assert_eq!(record.session_id, None);
}

#[test]
fn participant_rows_default_their_counters() {
    let change: RowChange = serde_json::from_value(json!({
        "table": "room_participants",
        "kind": "INSERT",
        "record": participant_json()
    }))
    .unwrap();
    let RowChange::RoomParticipants { record, kind } = change else {
        panic!("expected a room_participants change");
    };
    assert_eq!(kind, ChangeKind::Insert);
    assert!(record.is_host);
    assert!(!record.is_spectator);
    assert_eq!(record.eggs, 0);
    assert_eq!(record.average_response_ms(), None);
    assert_eq!(record.avatar, Avatar::Emoji("🐣".into()));
}

#[test]
fn room_rows_reject_invalid_codes() {
    let mut room = room_json();
    room["code"] = json!("ABC-12");
    let change = json!({ "table": "game_rooms", "kind": "UPDATE", "record": room });
    assert!(serde_json::from_value::<RowChange>(change).is_err());
}

#[test]
fn lowercase_room_codes_are_normalized_on_the_wire() {
    let code: RoomCode = serde_json::from_value(json!("abc123")).unwrap();
    assert_eq!(serde_json::to_value(&code).unwrap(), json!("ABC123"));
}

#[test]
fn subscribe_failed_carries_error_code() {
    let raw = json!({
        "type": "SubscribeFailed",
        "data": {
            "topic": "room:ABC123",
            "reason": "no such room",
            "error_code": "ROOM_NOT_FOUND"
        }
    });
    let frame: ServerFrame = serde_json::from_value(raw).unwrap();
    let event = RealtimeEvent::from(frame);
    assert_eq!(event.topic(), Some("room:ABC123"));
    match event {
        RealtimeEvent::SubscribeFailed { error_code, .. } => {
            assert_eq!(error_code, Some(ErrorCode::RoomNotFound));
        }
        other => panic!("expected SubscribeFailed, got {other:?}"),
    }
}

#[test]
fn channel_error_without_topic() {
    let frame: ServerFrame =
        serde_json::from_value(json!({ "type": "ChannelError", "data": { "message": "boom" } }))
            .unwrap();
    let event = RealtimeEvent::from(frame);
    assert_eq!(event.topic(), None);
}

#[test]
fn unknown_frame_types_are_rejected() {
    assert!(serde_json::from_value::<ServerFrame>(json!({ "type": "Presence", "data": {} })).is_err());
}

// ════════════════════════════════════════════════════════════════════
// Error codes
// ════════════════════════════════════════════════════════════════════

#[test]
fn error_codes_match_backend_names() {
    let cases = [
        (ErrorCode::RoomNotInLobby, "ROOM_NOT_IN_LOBBY"),
        (ErrorCode::AlreadyAnswered, "ALREADY_ANSWERED"),
        (ErrorCode::SpectatorCannotAnswer, "SPECTATOR_CANNOT_ANSWER"),
        (ErrorCode::NotHost, "NOT_HOST"),
        (ErrorCode::InvalidRoomCode, "INVALID_ROOM_CODE"),
    ];
    for (code, name) in cases {
        assert_eq!(serde_json::to_value(&code).unwrap(), json!(name));
        assert_eq!(serde_json::from_value::<ErrorCode>(json!(name)).unwrap(), code);
        assert!(!code.description().is_empty());
    }
}
