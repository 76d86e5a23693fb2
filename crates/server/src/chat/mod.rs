pub mod commands;
pub mod fanout;

use hearth_common::types::DomainError;
use thiserror::Error;
use uuid::Uuid;

pub use commands::ChatCommands;
pub use fanout::ChatNotifier;

/// Outcome taxonomy for every chat command.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat {0} not found")]
    ChatNotFound(Uuid),
    #[error("message {0} not found")]
    MessageNotFound(Uuid),
    #[error("user is not an active member of this chat")]
    NotMember,
    #[error("user is already an active member of this chat")]
    AlreadyMember,
    #[error("user lacks permission for this operation")]
    InsufficientPermissions,
    #[error("message has been deleted")]
    MessageDeleted,
    #[error("{0}")]
    Validation(String),
    /// Infrastructure failure or an internal inconsistency. The cause is
    /// logged, never shown to clients.
    #[error("{context}")]
    OperationFailed {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ChatError {
    pub(crate) fn operation_failed(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::OperationFailed { context: context.into(), source }
    }
}

impl From<DomainError> for ChatError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::MessageDeleted => Self::MessageDeleted,
            DomainError::MembershipInactive => Self::NotMember,
            DomainError::MembershipActive => Self::AlreadyMember,
            DomainError::ChatInactive => {
                Self::operation_failed("chat is no longer active", anyhow::Error::new(error))
            }
        }
    }
}

/// Attaches correlation context to store failures.
pub(crate) trait StoreResultExt<T> {
    fn or_failed(self, context: impl FnOnce() -> String) -> Result<T, ChatError>;
}

impl<T> StoreResultExt<T> for anyhow::Result<T> {
    fn or_failed(self, context: impl FnOnce() -> String) -> Result<T, ChatError> {
        self.map_err(|source| ChatError::operation_failed(context(), source))
    }
}
