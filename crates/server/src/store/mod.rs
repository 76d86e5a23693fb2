// Chat persistence.
//
// `ChatStore` is the single seam between command handlers and storage. The
// Postgres backend is used in production; the in-memory backend serves tests
// and local development when no database URL is configured. Soft-deleted
// messages, inactive memberships and deactivated chats are filtered here, at
// the query layer.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use hearth_common::types::{Chat, ChatMember, ChatMessage, MemberView, MessageView, UserSummary};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use memory::MemoryChatStore;

#[derive(Clone)]
pub enum ChatStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryChatStore>>),
}

impl ChatStore {
    pub fn memory(store: MemoryChatStore) -> Self {
        Self::Memory(Arc::new(RwLock::new(store)))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    // ── user directory ─────────────────────────────────────────────

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserSummary>> {
        match self {
            Self::Postgres(pool) => postgres::get_user(pool, user_id).await,
            Self::Memory(store) => Ok(store.read().await.get_user(user_id)),
        }
    }

    // ── chats ──────────────────────────────────────────────────────

    /// Returns the chat regardless of `is_active`; callers decide visibility.
    pub async fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        match self {
            Self::Postgres(pool) => postgres::get_chat(pool, chat_id).await,
            Self::Memory(store) => Ok(store.read().await.get_chat(chat_id)),
        }
    }

    /// Inserts the chat and its owner membership atomically.
    pub async fn create_chat_with_owner(&self, chat: &Chat, owner: &ChatMember) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::create_chat_with_owner(pool, chat, owner).await,
            Self::Memory(store) => store.write().await.create_chat_with_owner(chat, owner),
        }
    }

    /// Persists `name`, `description` and `updated_at` from `chat`. Returns
    /// `false` when the chat is missing or no longer active.
    pub async fn update_chat_details(&self, chat: &Chat) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::update_chat_details(pool, chat).await,
            Self::Memory(store) => Ok(store.write().await.update_chat_details(chat)),
        }
    }

    /// Flips an active chat inactive. Returns `false` when it already was.
    pub async fn deactivate_chat(&self, chat: &Chat) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::deactivate_chat(pool, chat).await,
            Self::Memory(store) => Ok(store.write().await.deactivate_chat(chat)),
        }
    }

    /// Active chats in which `user_id` holds an active membership, newest first.
    pub async fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        match self {
            Self::Postgres(pool) => postgres::list_chats_for_user(pool, user_id).await,
            Self::Memory(store) => Ok(store.read().await.list_chats_for_user(user_id)),
        }
    }

    // ── memberships ────────────────────────────────────────────────

    /// The (chat, user) membership row in any state.
    pub async fn get_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<ChatMember>> {
        match self {
            Self::Postgres(pool) => postgres::get_member(pool, chat_id, user_id).await,
            Self::Memory(store) => Ok(store.read().await.get_member(chat_id, user_id)),
        }
    }

    /// Active memberships ordered by `joined_at`.
    pub async fn list_members(&self, chat_id: Uuid) -> Result<Vec<ChatMember>> {
        match self {
            Self::Postgres(pool) => postgres::list_members(pool, chat_id).await,
            Self::Memory(store) => Ok(store.read().await.list_members(chat_id)),
        }
    }

    /// Inserts `member`, or reactivates the existing inactive row for the same
    /// (chat, user) pair. The stored row keeps its original id.
    ///
    /// Returns `None` when an active membership already exists, including when
    /// a concurrent request activated it first.
    pub async fn upsert_member(&self, member: &ChatMember) -> Result<Option<ChatMember>> {
        match self {
            Self::Postgres(pool) => postgres::upsert_member(pool, member).await,
            Self::Memory(store) => Ok(store.write().await.upsert_member(member)),
        }
    }

    /// Marks the membership left at `member.left_at`. Returns `false` when the
    /// row is not active anymore.
    pub async fn deactivate_member(&self, member: &ChatMember) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::deactivate_member(pool, member).await,
            Self::Memory(store) => Ok(store.write().await.deactivate_member(member)),
        }
    }

    // ── messages ───────────────────────────────────────────────────

    pub async fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        match self {
            Self::Postgres(pool) => postgres::insert_message(pool, message).await,
            Self::Memory(store) => store.write().await.insert_message(message),
        }
    }

    pub async fn get_message(&self, message_id: Uuid) -> Result<Option<ChatMessage>> {
        match self {
            Self::Postgres(pool) => postgres::get_message(pool, message_id).await,
            Self::Memory(store) => Ok(store.read().await.get_message(message_id)),
        }
    }

    /// Persists `content` and `edited_at`. Returns `false` when the message
    /// is missing or deleted; a deleted message never changes again.
    pub async fn edit_message(&self, message: &ChatMessage) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::edit_message(pool, message).await,
            Self::Memory(store) => Ok(store.write().await.edit_message(message)),
        }
    }

    pub async fn soft_delete_message(&self, message_id: Uuid) -> Result<bool> {
        match self {
            Self::Postgres(pool) => postgres::soft_delete_message(pool, message_id).await,
            Self::Memory(store) => Ok(store.write().await.soft_delete_message(message_id)),
        }
    }

    /// Non-deleted messages, newest first.
    pub async fn list_messages(
        &self,
        chat_id: Uuid,
        skip: usize,
        take: usize,
    ) -> Result<Vec<ChatMessage>> {
        match self {
            Self::Postgres(pool) => postgres::list_messages(pool, chat_id, skip, take).await,
            Self::Memory(store) => Ok(store.read().await.list_messages(chat_id, skip, take)),
        }
    }

    // ── projections ────────────────────────────────────────────────

    /// Message joined with its sender. Includes deleted messages.
    pub async fn message_view(&self, message_id: Uuid) -> Result<Option<MessageView>> {
        match self {
            Self::Postgres(pool) => postgres::message_view(pool, message_id).await,
            Self::Memory(store) => Ok(store.read().await.message_view(message_id)),
        }
    }

    pub async fn member_view(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<MemberView>> {
        match self {
            Self::Postgres(pool) => postgres::member_view(pool, chat_id, user_id).await,
            Self::Memory(store) => Ok(store.read().await.member_view(chat_id, user_id)),
        }
    }
}
