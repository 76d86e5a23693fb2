// Chat command handlers.
//
// Every handler runs the same pipeline: load the aggregates it needs from the
// store, authorize against the caller's active membership, apply the domain
// transition, persist. Notifications are not sent from here; the HTTP layer
// calls `ChatNotifier` once the command has returned successfully.

use chrono::Utc;
use hearth_common::types::{Chat, ChatMember, ChatMessage, ChatRole, ChatType};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChatError, StoreResultExt};
use crate::{
    store::ChatStore,
    validation::{normalize_chat_name, normalize_description, normalize_message_content},
};

pub const DEFAULT_MESSAGE_PAGE_SIZE: usize = 50;
pub const MAX_MESSAGE_PAGE_SIZE: usize = 100;

/// Clamps a requested page size to `1..=100`, defaulting to 50.
pub fn normalize_take(take: Option<usize>) -> usize {
    take.unwrap_or(DEFAULT_MESSAGE_PAGE_SIZE).clamp(1, MAX_MESSAGE_PAGE_SIZE)
}

#[derive(Clone)]
pub struct ChatCommands {
    store: ChatStore,
}

impl ChatCommands {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub async fn create_chat(
        &self,
        creator_id: Uuid,
        name: &str,
        description: Option<&str>,
        chat_type: ChatType,
    ) -> Result<Chat, ChatError> {
        let name = normalize_chat_name(name).map_err(ChatError::Validation)?;
        let description = normalize_description(description).map_err(ChatError::Validation)?;

        // Allocated before anything is stored so failures can be correlated.
        let chat_id = Uuid::new_v4();

        let creator = self
            .store
            .get_user(creator_id)
            .await
            .or_failed(|| format!("failed to resolve creator for chat {chat_id}"))?;
        if creator.is_none() {
            return Err(ChatError::operation_failed(
                format!("failed to create chat {chat_id}"),
                anyhow::anyhow!("creator {creator_id} does not exist"),
            ));
        }

        let now = Utc::now();
        let chat = Chat::new(chat_id, name, description, chat_type, creator_id, now);
        let owner = ChatMember::new(Uuid::new_v4(), chat_id, creator_id, ChatRole::Owner, now);

        self.store
            .create_chat_with_owner(&chat, &owner)
            .await
            .or_failed(|| format!("failed to create chat {chat_id}"))?;

        info!(chat_id = %chat_id, creator_id = %creator_id, chat_type = chat_type.as_str(), "chat created");
        Ok(chat)
    }

    pub async fn add_member(
        &self,
        chat_id: Uuid,
        requestor_id: Uuid,
        target_user_id: Uuid,
        role: ChatRole,
    ) -> Result<ChatMember, ChatError> {
        self.load_active_chat(chat_id).await?;
        let requestor = self.require_active_member(chat_id, requestor_id).await?;
        if !requestor.role.can_manage_members() || !requestor.role.can_grant(role) {
            debug!(
                chat_id = %chat_id,
                requestor_id = %requestor_id,
                requestor_role = requestor.role.as_str(),
                requested_role = role.as_str(),
                "add member rejected"
            );
            return Err(ChatError::InsufficientPermissions);
        }

        let target = self
            .store
            .get_user(target_user_id)
            .await
            .or_failed(|| format!("failed to resolve user {target_user_id} for chat {chat_id}"))?;
        if target.is_none() {
            return Err(ChatError::operation_failed(
                format!("failed to add member to chat {chat_id}"),
                anyhow::anyhow!("user {target_user_id} does not exist"),
            ));
        }

        let now = Utc::now();
        let candidate = match self
            .store
            .get_member(chat_id, target_user_id)
            .await
            .or_failed(|| format!("failed to load membership in chat {chat_id}"))?
        {
            Some(existing) if existing.is_active => return Err(ChatError::AlreadyMember),
            Some(mut previous) => {
                previous.reactivate(role, now)?;
                previous
            }
            None => ChatMember::new(Uuid::new_v4(), chat_id, target_user_id, role, now),
        };

        // `None` means another request activated the membership after our read.
        let member = self
            .store
            .upsert_member(&candidate)
            .await
            .or_failed(|| format!("failed to add member to chat {chat_id}"))?
            .ok_or(ChatError::AlreadyMember)?;

        info!(
            chat_id = %chat_id,
            user_id = %target_user_id,
            member_id = %member.id,
            role = member.role.as_str(),
            "member added"
        );
        Ok(member)
    }

    pub async fn send_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = normalize_message_content(content).map_err(ChatError::Validation)?;
        self.load_active_chat(chat_id).await?;
        self.require_active_member(chat_id, sender_id).await?;

        let message = ChatMessage::new(Uuid::new_v4(), chat_id, sender_id, content, Utc::now());
        self.store
            .insert_message(&message)
            .await
            .or_failed(|| format!("failed to store message in chat {chat_id}"))?;

        debug!(chat_id = %chat_id, message_id = %message.id, "message stored");
        Ok(message)
    }

    pub async fn edit_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        requestor_id: Uuid,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = normalize_message_content(content).map_err(ChatError::Validation)?;
        let mut message = self.load_authored_message(chat_id, message_id, requestor_id).await?;

        message.edit(content, Utc::now())?;
        // A delete may have committed since the load; the guarded write then
        // matches nothing and the message stays deleted.
        let applied = self
            .store
            .edit_message(&message)
            .await
            .or_failed(|| format!("failed to edit message {message_id} in chat {chat_id}"))?;
        if !applied {
            return Err(ChatError::MessageDeleted);
        }

        debug!(chat_id = %chat_id, message_id = %message_id, "message edited");
        Ok(message)
    }

    /// Soft-deletes the message. A second delete is rejected and leaves the
    /// stored row untouched.
    pub async fn delete_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        requestor_id: Uuid,
    ) -> Result<ChatMessage, ChatError> {
        let mut message = self.load_authored_message(chat_id, message_id, requestor_id).await?;

        message.soft_delete()?;
        let applied = self
            .store
            .soft_delete_message(message_id)
            .await
            .or_failed(|| format!("failed to delete message {message_id} in chat {chat_id}"))?;
        if !applied {
            return Err(ChatError::MessageDeleted);
        }

        debug!(chat_id = %chat_id, message_id = %message_id, "message deleted");
        Ok(message)
    }

    /// Any role may leave, including the last owner.
    pub async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<ChatMember, ChatError> {
        self.load_active_chat(chat_id).await?;
        let mut member = self.require_active_member(chat_id, user_id).await?;

        member.leave(Utc::now())?;
        let applied = self
            .store
            .deactivate_member(&member)
            .await
            .or_failed(|| format!("failed to leave chat {chat_id}"))?;
        if !applied {
            return Err(ChatError::NotMember);
        }

        info!(chat_id = %chat_id, user_id = %user_id, role = member.role.as_str(), "member left");
        Ok(member)
    }

    pub async fn update_chat(
        &self,
        chat_id: Uuid,
        requestor_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Chat, ChatError> {
        let name = normalize_chat_name(name).map_err(ChatError::Validation)?;
        let description = normalize_description(description).map_err(ChatError::Validation)?;

        let mut chat = self.load_active_chat(chat_id).await?;
        let requestor = self.require_active_member(chat_id, requestor_id).await?;
        if !requestor.role.can_update_chat() {
            return Err(ChatError::InsufficientPermissions);
        }

        chat.update_details(name, description, Utc::now())?;
        let applied = self
            .store
            .update_chat_details(&chat)
            .await
            .or_failed(|| format!("failed to update chat {chat_id}"))?;
        if !applied {
            return Err(ChatError::ChatNotFound(chat_id));
        }

        info!(chat_id = %chat_id, requestor_id = %requestor_id, "chat updated");
        Ok(chat)
    }

    /// Owner-only soft deactivation. Members and messages are retained.
    pub async fn deactivate_chat(&self, chat_id: Uuid, requestor_id: Uuid) -> Result<Chat, ChatError> {
        let mut chat = self.load_active_chat(chat_id).await?;
        let requestor = self.require_active_member(chat_id, requestor_id).await?;
        if !requestor.role.can_deactivate_chat() {
            return Err(ChatError::InsufficientPermissions);
        }

        chat.deactivate(Utc::now())?;
        let applied = self
            .store
            .deactivate_chat(&chat)
            .await
            .or_failed(|| format!("failed to deactivate chat {chat_id}"))?;
        if !applied {
            return Err(ChatError::ChatNotFound(chat_id));
        }

        info!(chat_id = %chat_id, requestor_id = %requestor_id, "chat deactivated");
        Ok(chat)
    }

    pub async fn get_chat(&self, chat_id: Uuid, requestor_id: Uuid) -> Result<Chat, ChatError> {
        let chat = self.load_active_chat(chat_id).await?;
        self.require_active_member(chat_id, requestor_id).await?;
        Ok(chat)
    }

    pub async fn list_chats(&self, user_id: Uuid) -> Result<Vec<Chat>, ChatError> {
        self.store
            .list_chats_for_user(user_id)
            .await
            .or_failed(|| format!("failed to list chats for user {user_id}"))
    }

    pub async fn list_members(
        &self,
        chat_id: Uuid,
        requestor_id: Uuid,
    ) -> Result<Vec<ChatMember>, ChatError> {
        self.load_active_chat(chat_id).await?;
        self.require_active_member(chat_id, requestor_id).await?;
        self.store
            .list_members(chat_id)
            .await
            .or_failed(|| format!("failed to list members of chat {chat_id}"))
    }

    pub async fn list_messages(
        &self,
        chat_id: Uuid,
        requestor_id: Uuid,
        skip: usize,
        take: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.load_active_chat(chat_id).await?;
        self.require_active_member(chat_id, requestor_id).await?;
        self.store
            .list_messages(chat_id, skip, normalize_take(take))
            .await
            .or_failed(|| format!("failed to list messages of chat {chat_id}"))
    }

    /// Whether `user_id` may observe the chat's room. Used by the realtime gateway.
    pub async fn is_active_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool, ChatError> {
        match self.load_active_chat(chat_id).await {
            Ok(_) => {}
            Err(ChatError::ChatNotFound(_)) => return Ok(false),
            Err(error) => return Err(error),
        }
        match self.require_active_member(chat_id, user_id).await {
            Ok(_) => Ok(true),
            Err(ChatError::NotMember) => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn load_active_chat(&self, chat_id: Uuid) -> Result<Chat, ChatError> {
        self.store
            .get_chat(chat_id)
            .await
            .or_failed(|| format!("failed to load chat {chat_id}"))?
            .filter(|chat| chat.is_active)
            .ok_or(ChatError::ChatNotFound(chat_id))
    }

    async fn require_active_member(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<ChatMember, ChatError> {
        self.store
            .get_member(chat_id, user_id)
            .await
            .or_failed(|| format!("failed to load membership in chat {chat_id}"))?
            .filter(|member| member.is_active)
            .ok_or(ChatError::NotMember)
    }

    /// Shared preconditions of edit and delete. Authorship is never overridden by role.
    async fn load_authored_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        requestor_id: Uuid,
    ) -> Result<ChatMessage, ChatError> {
        self.load_active_chat(chat_id).await?;
        let message = self
            .store
            .get_message(message_id)
            .await
            .or_failed(|| format!("failed to load message {message_id} in chat {chat_id}"))?
            .ok_or(ChatError::MessageNotFound(message_id))?;

        if message.chat_id != chat_id {
            return Err(ChatError::operation_failed(
                format!("message {message_id} does not belong to chat {chat_id}"),
                anyhow::anyhow!("message belongs to chat {}", message.chat_id),
            ));
        }

        self.require_active_member(chat_id, requestor_id).await?;
        if !message.is_authored_by(requestor_id) {
            return Err(ChatError::InsufficientPermissions);
        }

        Ok(message)
    }
}
