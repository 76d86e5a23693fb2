use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use hearth_common::types::{
    Chat, ChatMember, ChatMessage, ChatRole, ChatType, MemberView, MessageView, UserSummary,
};
use sqlx::PgPool;
use uuid::Uuid;

const CHAT_COLUMNS: &str =
    "id, name, description, chat_type, created_by, created_at, updated_at, is_active";
const MEMBER_COLUMNS: &str = "id, chat_id, user_id, role, joined_at, left_at, is_active";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, sent_at, edited_at, is_deleted";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    display_name: String,
    avatar_url: Option<String>,
}

impl From<UserRow> for UserSummary {
    fn from(value: UserRow) -> Self {
        Self { id: value.id, display_name: value.display_name, avatar_url: value.avatar_url }
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    chat_type: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<ChatRow> for Chat {
    type Error = anyhow::Error;

    fn try_from(value: ChatRow) -> Result<Self> {
        let chat_type = ChatType::from_db_value(&value.chat_type)
            .ok_or_else(|| anyhow!("invalid chat type '{}' in database", value.chat_type))?;
        Ok(Self {
            id: value.id,
            name: value.name,
            description: value.description,
            chat_type,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
            is_active: value.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    chat_id: Uuid,
    user_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<MemberRow> for ChatMember {
    type Error = anyhow::Error;

    fn try_from(value: MemberRow) -> Result<Self> {
        let role = ChatRole::from_db_value(&value.role)
            .ok_or_else(|| anyhow!("invalid chat role '{}' in database", value.role))?;
        Ok(Self {
            id: value.id,
            chat_id: value.chat_id,
            user_id: value.user_id,
            role,
            joined_at: value.joined_at,
            left_at: value.left_at,
            is_active: value.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    content: String,
    sent_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    is_deleted: bool,
}

impl From<MessageRow> for ChatMessage {
    fn from(value: MessageRow) -> Self {
        Self {
            id: value.id,
            chat_id: value.chat_id,
            sender_id: value.sender_id,
            content: value.content,
            sent_at: value.sent_at,
            edited_at: value.edited_at,
            is_deleted: value.is_deleted,
        }
    }
}

pub(crate) async fn get_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserSummary>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, display_name, avatar_url FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load user {user_id}"))?;

    Ok(row.map(UserSummary::from))
}

pub(crate) async fn get_chat(pool: &PgPool, chat_id: Uuid) -> Result<Option<Chat>> {
    sqlx::query_as::<_, ChatRow>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
        .bind(chat_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to load chat {chat_id}"))?
        .map(Chat::try_from)
        .transpose()
}

pub(crate) async fn create_chat_with_owner(
    pool: &PgPool,
    chat: &Chat,
    owner: &ChatMember,
) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin chat creation transaction")?;

    sqlx::query(
        r#"
        INSERT INTO chats (id, name, description, chat_type, created_by, created_at, updated_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(chat.id)
    .bind(&chat.name)
    .bind(&chat.description)
    .bind(chat.chat_type.as_str())
    .bind(chat.created_by)
    .bind(chat.created_at)
    .bind(chat.updated_at)
    .bind(chat.is_active)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to insert chat {}", chat.id))?;

    sqlx::query(
        r#"
        INSERT INTO chat_members (id, chat_id, user_id, role, joined_at, left_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(owner.id)
    .bind(owner.chat_id)
    .bind(owner.user_id)
    .bind(owner.role.as_str())
    .bind(owner.joined_at)
    .bind(owner.left_at)
    .bind(owner.is_active)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to insert owner membership for chat {}", chat.id))?;

    tx.commit().await.with_context(|| format!("failed to commit chat {}", chat.id))?;

    Ok(())
}

/// Rename and description change. Matches no row once the chat is deactivated.
pub(crate) async fn update_chat_details(pool: &PgPool, chat: &Chat) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chats
        SET name = $2,
            description = $3,
            updated_at = $4
        WHERE id = $1
          AND is_active
        "#,
    )
    .bind(chat.id)
    .bind(&chat.name)
    .bind(&chat.description)
    .bind(chat.updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to update chat {}", chat.id))?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn deactivate_chat(pool: &PgPool, chat: &Chat) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chats
        SET is_active = FALSE,
            updated_at = $2
        WHERE id = $1
          AND is_active
        "#,
    )
    .bind(chat.id)
    .bind(chat.updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to deactivate chat {}", chat.id))?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn list_chats_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Chat>> {
    sqlx::query_as::<_, ChatRow>(
        r#"
        SELECT c.id, c.name, c.description, c.chat_type, c.created_by,
               c.created_at, c.updated_at, c.is_active
        FROM chats AS c
        INNER JOIN chat_members AS cm
            ON cm.chat_id = c.id
        WHERE cm.user_id = $1
          AND cm.is_active
          AND c.is_active
        ORDER BY c.created_at DESC, c.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list chats for user {user_id}"))?
    .into_iter()
    .map(Chat::try_from)
    .collect()
}

pub(crate) async fn get_member(
    pool: &PgPool,
    chat_id: Uuid,
    user_id: Uuid,
) -> Result<Option<ChatMember>> {
    sqlx::query_as::<_, MemberRow>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM chat_members WHERE chat_id = $1 AND user_id = $2"
    ))
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load membership of user {user_id} in chat {chat_id}"))?
    .map(ChatMember::try_from)
    .transpose()
}

pub(crate) async fn list_members(pool: &PgPool, chat_id: Uuid) -> Result<Vec<ChatMember>> {
    sqlx::query_as::<_, MemberRow>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM chat_members \
         WHERE chat_id = $1 AND is_active \
         ORDER BY joined_at ASC, id ASC"
    ))
    .bind(chat_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list members of chat {chat_id}"))?
    .into_iter()
    .map(ChatMember::try_from)
    .collect()
}

/// `UNIQUE (chat_id, user_id)` makes this race-free: of two concurrent adds,
/// one inserts (or reactivates) and the other sees no returned row.
pub(crate) async fn upsert_member(pool: &PgPool, member: &ChatMember) -> Result<Option<ChatMember>> {
    sqlx::query_as::<_, MemberRow>(
        r#"
        INSERT INTO chat_members (id, chat_id, user_id, role, joined_at, left_at, is_active)
        VALUES ($1, $2, $3, $4, $5, NULL, TRUE)
        ON CONFLICT (chat_id, user_id) DO UPDATE
            SET role = EXCLUDED.role,
                joined_at = EXCLUDED.joined_at,
                left_at = NULL,
                is_active = TRUE
            WHERE NOT chat_members.is_active
        RETURNING id, chat_id, user_id, role, joined_at, left_at, is_active
        "#,
    )
    .bind(member.id)
    .bind(member.chat_id)
    .bind(member.user_id)
    .bind(member.role.as_str())
    .bind(member.joined_at)
    .fetch_optional(pool)
    .await
    .with_context(|| {
        format!("failed to upsert membership of user {} in chat {}", member.user_id, member.chat_id)
    })?
    .map(ChatMember::try_from)
    .transpose()
}

pub(crate) async fn deactivate_member(pool: &PgPool, member: &ChatMember) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chat_members
        SET is_active = FALSE,
            left_at = $2
        WHERE id = $1
          AND is_active
        "#,
    )
    .bind(member.id)
    .bind(member.left_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to deactivate membership {}", member.id))?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn insert_message(pool: &PgPool, message: &ChatMessage) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO chat_messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
    ))
    .bind(message.id)
    .bind(message.chat_id)
    .bind(message.sender_id)
    .bind(&message.content)
    .bind(message.sent_at)
    .bind(message.edited_at)
    .bind(message.is_deleted)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert message into chat {}", message.chat_id))?;

    Ok(())
}

pub(crate) async fn get_message(pool: &PgPool, message_id: Uuid) -> Result<Option<ChatMessage>> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1"
    ))
    .bind(message_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load message {message_id}"))?;

    Ok(row.map(ChatMessage::from))
}

/// Writes new content. Matches no row once the message is deleted, so an edit
/// racing a delete cannot bring the message back.
pub(crate) async fn edit_message(pool: &PgPool, message: &ChatMessage) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chat_messages
        SET content = $2,
            edited_at = $3
        WHERE id = $1
          AND NOT is_deleted
        "#,
    )
    .bind(message.id)
    .bind(&message.content)
    .bind(message.edited_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to edit message {}", message.id))?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn soft_delete_message(pool: &PgPool, message_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE chat_messages SET is_deleted = TRUE WHERE id = $1 AND NOT is_deleted",
    )
    .bind(message_id)
    .execute(pool)
    .await
    .with_context(|| format!("failed to delete message {message_id}"))?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn list_messages(
    pool: &PgPool,
    chat_id: Uuid,
    skip: usize,
    take: usize,
) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
         WHERE chat_id = $1 AND NOT is_deleted \
         ORDER BY sent_at DESC, id DESC \
         OFFSET $2 LIMIT $3"
    ))
    .bind(chat_id)
    .bind(i64::try_from(skip).context("skip out of range")?)
    .bind(i64::try_from(take).context("take out of range")?)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list messages of chat {chat_id}"))?;

    Ok(rows.into_iter().map(ChatMessage::from).collect())
}

#[derive(sqlx::FromRow)]
struct MessageViewRow {
    #[sqlx(flatten)]
    message: MessageRow,
    sender_display_name: String,
    sender_avatar_url: Option<String>,
}

pub(crate) async fn message_view(pool: &PgPool, message_id: Uuid) -> Result<Option<MessageView>> {
    let row = sqlx::query_as::<_, MessageViewRow>(
        r#"
        SELECT m.id, m.chat_id, m.sender_id, m.content, m.sent_at, m.edited_at, m.is_deleted,
               u.display_name AS sender_display_name,
               u.avatar_url AS sender_avatar_url
        FROM chat_messages AS m
        INNER JOIN users AS u
            ON u.id = m.sender_id
        WHERE m.id = $1
        "#,
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load message view {message_id}"))?;

    Ok(row.map(|row| {
        let message = ChatMessage::from(row.message);
        let sender = UserSummary {
            id: message.sender_id,
            display_name: row.sender_display_name,
            avatar_url: row.sender_avatar_url,
        };
        MessageView { message, sender }
    }))
}

#[derive(sqlx::FromRow)]
struct MemberViewRow {
    #[sqlx(flatten)]
    member: MemberRow,
    user_display_name: String,
    user_avatar_url: Option<String>,
}

pub(crate) async fn member_view(
    pool: &PgPool,
    chat_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MemberView>> {
    let row = sqlx::query_as::<_, MemberViewRow>(
        r#"
        SELECT cm.id, cm.chat_id, cm.user_id, cm.role, cm.joined_at, cm.left_at, cm.is_active,
               u.display_name AS user_display_name,
               u.avatar_url AS user_avatar_url
        FROM chat_members AS cm
        INNER JOIN users AS u
            ON u.id = cm.user_id
        WHERE cm.chat_id = $1
          AND cm.user_id = $2
        "#,
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to load member view of user {user_id} in chat {chat_id}"))?;

    row.map(|row| {
        let member = ChatMember::try_from(row.member)?;
        let user = UserSummary {
            id: member.user_id,
            display_name: row.user_display_name,
            avatar_url: row.user_avatar_url,
        };
        Ok(MemberView { member, user })
    })
    .transpose()
}
