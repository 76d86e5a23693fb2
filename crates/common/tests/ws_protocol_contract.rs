use std::collections::BTreeSet;

use chrono::Utc;
use hearth_common::protocol::ws::{
    room_name, WsMessage, CURRENT_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use hearth_common::types::{
    ChatMember, ChatMessage, ChatRole, MemberView, MessageView, UserSummary,
};
use uuid::Uuid;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/realtime-protocol.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

fn contract_set<'a>(contract: &'a serde_json::Value, key: &str) -> BTreeSet<&'a str> {
    contract[key]
        .as_array()
        .unwrap_or_else(|| panic!("{key} should be an array"))
        .iter()
        .map(|v| v.as_str().expect("entry should be a string"))
        .collect()
}

fn type_tag(message: &WsMessage) -> String {
    serde_json::to_value(message).expect("message should serialize")["type"]
        .as_str()
        .expect("type tag should be a string")
        .to_owned()
}

fn user(id: Uuid) -> UserSummary {
    UserSummary { id, display_name: "Contract User".into(), avatar_url: None }
}

#[test]
fn current_version_matches_contract() {
    let contract = load_contract();
    let expected =
        contract["current_version"].as_str().expect("current_version should be a string");
    assert_eq!(CURRENT_PROTOCOL_VERSION, expected);
}

#[test]
fn supported_versions_match_contract() {
    let contract = load_contract();
    let expected: Vec<&str> = contract["protocol_versions"]
        .as_array()
        .expect("protocol_versions should be an array")
        .iter()
        .map(|v| v.as_str().expect("version should be a string"))
        .collect();
    assert_eq!(SUPPORTED_PROTOCOL_VERSIONS, &expected[..]);
}

#[test]
fn room_prefix_matches_contract() {
    let contract = load_contract();
    let prefix = contract["room_prefix"].as_str().expect("room_prefix should be a string");
    assert!(room_name(Uuid::new_v4()).starts_with(prefix));
}

#[test]
fn client_message_tags_match_contract() {
    let contract = load_contract();
    let chat_id = Uuid::new_v4();
    let actual: BTreeSet<String> = [
        WsMessage::Hello { session_token: "token".into() },
        WsMessage::JoinChat { chat_id },
        WsMessage::LeaveChat { chat_id },
        WsMessage::NotifyTyping { chat_id },
        WsMessage::NotifyStoppedTyping { chat_id },
    ]
    .iter()
    .map(type_tag)
    .collect();

    let expected: BTreeSet<String> =
        contract_set(&contract, "client_messages").into_iter().map(str::to_owned).collect();
    assert_eq!(actual, expected, "client message tags diverged from contract");
}

#[test]
fn server_message_tags_match_contract() {
    let contract = load_contract();
    let chat_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let message = ChatMessage::new(Uuid::new_v4(), chat_id, user_id, "hi".into(), now);
    let member = ChatMember::new(Uuid::new_v4(), chat_id, user_id, ChatRole::Member, now);

    let actual: BTreeSet<String> = [
        WsMessage::HelloAck { server_time: now.to_rfc3339() },
        WsMessage::JoinedChat { chat_id, room: room_name(chat_id) },
        WsMessage::LeftChat { chat_id },
        WsMessage::UserTyping { chat_id, user_id },
        WsMessage::UserStoppedTyping { chat_id, user_id },
        WsMessage::MessageCreated {
            message: MessageView { message: message.clone(), sender: user(user_id) },
        },
        WsMessage::MessageEdited { message: MessageView { message, sender: user(user_id) } },
        WsMessage::MessageDeleted { chat_id, message_id: Uuid::new_v4() },
        WsMessage::UserJoined { member: MemberView { member, user: user(user_id) } },
        WsMessage::UserLeft { chat_id, user_id },
        WsMessage::Error {
            code: "AUTH_FORBIDDEN".into(),
            message: "denied".into(),
            retryable: false,
            chat_id: Some(chat_id),
        },
    ]
    .iter()
    .map(type_tag)
    .collect();

    let expected: BTreeSet<String> =
        contract_set(&contract, "server_messages").into_iter().map(str::to_owned).collect();
    assert_eq!(actual, expected, "server message tags diverged from contract");
}
