// Chat domain types shared across Hearth crates.
//
// Entities reference each other by id only. Members and messages are loaded
// through explicit store queries keyed by chat id, never through embedded
// collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Rejections raised by entity state transitions.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("message has been deleted")]
    MessageDeleted,
    #[error("membership is not active")]
    MembershipInactive,
    #[error("membership is already active")]
    MembershipActive,
    #[error("chat has been deactivated")]
    ChatInactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Group,
    Private,
}

impl ChatType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Private => "private",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "group" => Some(Self::Group),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Membership role inside a chat. Ordered by privilege.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Member,
    Admin,
    Owner,
}

impl ChatRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn allows(self, required: ChatRole) -> bool {
        self >= required
    }

    /// Owners and admins may add members and edit chat details.
    pub fn can_manage_members(self) -> bool {
        self.allows(Self::Admin)
    }

    pub fn can_update_chat(self) -> bool {
        self.allows(Self::Admin)
    }

    /// Deactivation is owner-only; admins cannot delete a chat.
    pub fn can_deactivate_chat(self) -> bool {
        self == Self::Owner
    }

    /// Whether a member holding `self` may hand out `granted` when adding someone.
    pub fn can_grant(self, granted: ChatRole) -> bool {
        self.can_manage_members() && self >= granted
    }
}

/// A chat room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub chat_type: ChatType,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Chat {
    pub fn new(
        id: Uuid,
        name: String,
        description: Option<String>,
        chat_type: ChatType,
        created_by: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            chat_type,
            created_by,
            created_at: now,
            updated_at: None,
            is_active: true,
        }
    }

    pub fn update_details(
        &mut self,
        name: String,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::ChatInactive);
        }
        self.name = name;
        self.description = description;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Soft-deactivates the chat. Members and messages are left in place.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::ChatInactive);
        }
        self.is_active = false;
        self.updated_at = Some(now);
        Ok(())
    }
}

/// Join record between a chat and a user.
///
/// A (chat, user) pair owns at most one row. Leaving flips `is_active` off and
/// stamps `left_at`; rejoining reactivates the same row instead of inserting a
/// second one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMember {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub role: ChatRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ChatMember {
    pub fn new(
        id: Uuid,
        chat_id: Uuid,
        user_id: Uuid,
        role: ChatRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self { id, chat_id, user_id, role, joined_at: now, left_at: None, is_active: true }
    }

    pub fn leave(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::MembershipInactive);
        }
        self.is_active = false;
        self.left_at = Some(now);
        Ok(())
    }

    pub fn reactivate(&mut self, role: ChatRole, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_active {
            return Err(DomainError::MembershipActive);
        }
        self.is_active = true;
        self.role = role;
        self.joined_at = now;
        self.left_at = None;
        Ok(())
    }
}

/// Observable lifecycle stage of a message: `Sent -> Edited* -> Deleted`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Sent,
    Edited,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl ChatMessage {
    pub fn new(
        id: Uuid,
        chat_id: Uuid,
        sender_id: Uuid,
        content: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self { id, chat_id, sender_id, content, sent_at: now, edited_at: None, is_deleted: false }
    }

    pub fn state(&self) -> MessageState {
        if self.is_deleted {
            MessageState::Deleted
        } else if self.edited_at.is_some() {
            MessageState::Edited
        } else {
            MessageState::Sent
        }
    }

    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id
    }

    pub fn edit(&mut self, content: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::MessageDeleted);
        }
        self.content = content;
        self.edited_at = Some(now);
        Ok(())
    }

    /// Deleted is terminal: content is retained but the message can no longer change.
    pub fn soft_delete(&mut self) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::MessageDeleted);
        }
        self.is_deleted = true;
        Ok(())
    }
}

/// Read-only view of a user from the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A message joined with its sender, as pushed to realtime clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender: UserSummary,
}

/// A membership joined with the member's user record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberView {
    #[serde(flatten)]
    pub member: ChatMember,
    pub user: UserSummary,
}
