use std::collections::HashMap;

use anyhow::{bail, Result};
use hearth_common::types::{Chat, ChatMember, ChatMessage, MemberView, MessageView, UserSummary};
use uuid::Uuid;

/// In-process chat store. Each `ChatStore` call takes the surrounding
/// `RwLock` once, so check-and-write sequences here are atomic.
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    users: HashMap<Uuid, UserSummary>,
    chats: HashMap<Uuid, Chat>,
    members: HashMap<(Uuid, Uuid), ChatMember>,
    messages: HashMap<Uuid, ChatMessage>,
    auto_provision_users: bool,
}

impl MemoryChatStore {
    /// Local development mode: unknown user ids resolve to a placeholder
    /// directory entry instead of "not found".
    pub fn with_auto_provisioned_users() -> Self {
        Self { auto_provision_users: true, ..Self::default() }
    }

    pub fn with_users(users: impl IntoIterator<Item = UserSummary>) -> Self {
        let mut store = Self::default();
        for user in users {
            store.users.insert(user.id, user);
        }
        store
    }

    pub(crate) fn get_user(&self, user_id: Uuid) -> Option<UserSummary> {
        if let Some(user) = self.users.get(&user_id) {
            return Some(user.clone());
        }
        self.auto_provision_users.then(|| UserSummary {
            id: user_id,
            display_name: format!("User {}", &user_id.simple().to_string()[..8]),
            avatar_url: None,
        })
    }

    pub(crate) fn get_chat(&self, chat_id: Uuid) -> Option<Chat> {
        self.chats.get(&chat_id).cloned()
    }

    pub(crate) fn create_chat_with_owner(&mut self, chat: &Chat, owner: &ChatMember) -> Result<()> {
        if self.chats.contains_key(&chat.id) {
            bail!("chat {} already exists", chat.id);
        }
        if owner.chat_id != chat.id {
            bail!("owner membership {} does not belong to chat {}", owner.id, chat.id);
        }
        self.chats.insert(chat.id, chat.clone());
        self.members.insert((chat.id, owner.user_id), owner.clone());
        Ok(())
    }

    pub(crate) fn update_chat_details(&mut self, chat: &Chat) -> bool {
        match self.chats.get_mut(&chat.id) {
            Some(stored) if stored.is_active => {
                stored.name = chat.name.clone();
                stored.description = chat.description.clone();
                stored.updated_at = chat.updated_at;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn deactivate_chat(&mut self, chat: &Chat) -> bool {
        match self.chats.get_mut(&chat.id) {
            Some(stored) if stored.is_active => {
                stored.is_active = false;
                stored.updated_at = chat.updated_at;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn list_chats_for_user(&self, user_id: Uuid) -> Vec<Chat> {
        let mut chats: Vec<Chat> = self
            .members
            .values()
            .filter(|member| member.user_id == user_id && member.is_active)
            .filter_map(|member| self.chats.get(&member.chat_id))
            .filter(|chat| chat.is_active)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        chats
    }

    pub(crate) fn get_member(&self, chat_id: Uuid, user_id: Uuid) -> Option<ChatMember> {
        self.members.get(&(chat_id, user_id)).cloned()
    }

    pub(crate) fn list_members(&self, chat_id: Uuid) -> Vec<ChatMember> {
        let mut members: Vec<ChatMember> = self
            .members
            .values()
            .filter(|member| member.chat_id == chat_id && member.is_active)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        members
    }

    pub(crate) fn upsert_member(&mut self, member: &ChatMember) -> Option<ChatMember> {
        match self.members.get_mut(&(member.chat_id, member.user_id)) {
            Some(existing) if existing.is_active => None,
            Some(existing) => {
                existing.role = member.role;
                existing.joined_at = member.joined_at;
                existing.left_at = None;
                existing.is_active = true;
                Some(existing.clone())
            }
            None => {
                self.members.insert((member.chat_id, member.user_id), member.clone());
                Some(member.clone())
            }
        }
    }

    pub(crate) fn deactivate_member(&mut self, member: &ChatMember) -> bool {
        match self.members.get_mut(&(member.chat_id, member.user_id)) {
            Some(stored) if stored.id == member.id && stored.is_active => {
                stored.is_active = false;
                stored.left_at = member.left_at;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn insert_message(&mut self, message: &ChatMessage) -> Result<()> {
        if self.messages.contains_key(&message.id) {
            bail!("message {} already exists", message.id);
        }
        self.messages.insert(message.id, message.clone());
        Ok(())
    }

    pub(crate) fn get_message(&self, message_id: Uuid) -> Option<ChatMessage> {
        self.messages.get(&message_id).cloned()
    }

    pub(crate) fn edit_message(&mut self, message: &ChatMessage) -> bool {
        match self.messages.get_mut(&message.id) {
            Some(stored) if !stored.is_deleted => {
                stored.content = message.content.clone();
                stored.edited_at = message.edited_at;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn soft_delete_message(&mut self, message_id: Uuid) -> bool {
        match self.messages.get_mut(&message_id) {
            Some(stored) if !stored.is_deleted => {
                stored.is_deleted = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn list_messages(&self, chat_id: Uuid, skip: usize, take: usize) -> Vec<ChatMessage> {
        let mut messages: Vec<&ChatMessage> = self
            .messages
            .values()
            .filter(|message| message.chat_id == chat_id && !message.is_deleted)
            .collect();
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| b.id.cmp(&a.id)));
        messages.into_iter().skip(skip).take(take).cloned().collect()
    }

    pub(crate) fn message_view(&self, message_id: Uuid) -> Option<MessageView> {
        let message = self.messages.get(&message_id)?.clone();
        let sender = self.get_user(message.sender_id)?;
        Some(MessageView { message, sender })
    }

    pub(crate) fn member_view(&self, chat_id: Uuid, user_id: Uuid) -> Option<MemberView> {
        let member = self.members.get(&(chat_id, user_id))?.clone();
        let user = self.get_user(user_id)?;
        Some(MemberView { member, user })
    }
}
