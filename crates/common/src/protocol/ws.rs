// WebSocket message types for the hearth-chat.v1 realtime protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MemberView, MessageView};

/// The current (latest) protocol version.
pub const CURRENT_PROTOCOL_VERSION: &str = "hearth-chat.v1";

/// All protocol versions the server accepts, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[CURRENT_PROTOCOL_VERSION];

const ROOM_PREFIX: &str = "chat_";

/// Broadcast group for a chat. One room per chat, stable for the process lifetime.
pub fn room_name(chat_id: Uuid) -> String {
    format!("{ROOM_PREFIX}{chat_id}")
}

/// All message types in the hearth-chat.v1 WebSocket protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client -> Server: initial handshake.
    Hello { session_token: String },

    /// Server -> Client: handshake acknowledgement.
    HelloAck { server_time: String },

    /// Client -> Server: subscribe to a chat room. Membership is re-checked every time.
    JoinChat { chat_id: Uuid },

    /// Server -> Client: subscription confirmed.
    JoinedChat { chat_id: Uuid, room: String },

    /// Client -> Server: drop the room subscription. Membership is untouched.
    LeaveChat { chat_id: Uuid },

    /// Server -> Client: subscription removed.
    LeftChat { chat_id: Uuid },

    /// Client -> Server: ephemeral typing indicator.
    NotifyTyping { chat_id: Uuid },

    /// Client -> Server: ephemeral typing indicator cleared.
    NotifyStoppedTyping { chat_id: Uuid },

    /// Server -> Client: another member is typing.
    UserTyping { chat_id: Uuid, user_id: Uuid },

    /// Server -> Client: another member stopped typing.
    UserStoppedTyping { chat_id: Uuid, user_id: Uuid },

    /// Server -> Client: a message was stored.
    MessageCreated { message: MessageView },

    /// Server -> Client: a message was edited.
    MessageEdited { message: MessageView },

    /// Server -> Client: a message was soft-deleted.
    MessageDeleted { chat_id: Uuid, message_id: Uuid },

    /// Server -> Client: a member joined (or rejoined) the chat.
    UserJoined { member: MemberView },

    /// Server -> Client: a member left the chat.
    UserLeft { chat_id: Uuid, user_id: Uuid },

    /// Server -> Client: error.
    Error {
        code: String,
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        chat_id: Option<Uuid>,
    },
}

impl WsMessage {
    /// Chat the frame refers to, if any.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::JoinChat { chat_id }
            | Self::JoinedChat { chat_id, .. }
            | Self::LeaveChat { chat_id }
            | Self::LeftChat { chat_id }
            | Self::NotifyTyping { chat_id }
            | Self::NotifyStoppedTyping { chat_id }
            | Self::UserTyping { chat_id, .. }
            | Self::UserStoppedTyping { chat_id, .. }
            | Self::MessageDeleted { chat_id, .. }
            | Self::UserLeft { chat_id, .. } => Some(*chat_id),
            Self::MessageCreated { message } | Self::MessageEdited { message } => {
                Some(message.message.chat_id)
            }
            Self::UserJoined { member } => Some(member.member.chat_id),
            Self::Error { chat_id, .. } => *chat_id,
            Self::Hello { .. } | Self::HelloAck { .. } => None,
        }
    }
}
