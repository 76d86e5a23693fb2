// Realtime fan-out of committed chat changes.
//
// Each notification re-reads the populated projection from the store and
// pushes one typed frame to the chat's room. Failures are logged and
// swallowed: the change is already persisted and clients recover by
// re-listing. Frames for one room go out in call order; there is no
// per-room sequencing beyond that.

use hearth_common::{
    protocol::ws::{room_name, WsMessage},
    types::MessageView,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{store::ChatStore, ws::hub::ConnectionHub};

#[derive(Clone)]
pub struct ChatNotifier {
    store: ChatStore,
    hub: ConnectionHub,
}

impl ChatNotifier {
    pub fn new(store: ChatStore, hub: ConnectionHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub async fn new_message(&self, message_id: Uuid) {
        self.publish_message(message_id, "message_created", |message| WsMessage::MessageCreated {
            message,
        })
        .await;
    }

    pub async fn message_edited(&self, message_id: Uuid) {
        self.publish_message(message_id, "message_edited", |message| WsMessage::MessageEdited {
            message,
        })
        .await;
    }

    pub async fn message_deleted(&self, chat_id: Uuid, message_id: Uuid) {
        self.publish(chat_id, "message_deleted", WsMessage::MessageDeleted { chat_id, message_id })
            .await;
    }

    pub async fn user_joined(&self, chat_id: Uuid, user_id: Uuid) {
        let member = match self.store.member_view(chat_id, user_id).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                warn!(chat_id = %chat_id, user_id = %user_id, "user_joined skipped: membership not found");
                return;
            }
            Err(error) => {
                error!(error = ?error, chat_id = %chat_id, user_id = %user_id, "failed to load member for user_joined");
                return;
            }
        };
        self.publish(chat_id, "user_joined", WsMessage::UserJoined { member }).await;
    }

    /// The leaver gets this frame too, then all of their sessions are
    /// detached from the room.
    pub async fn user_left(&self, chat_id: Uuid, user_id: Uuid) {
        self.publish(chat_id, "user_left", WsMessage::UserLeft { chat_id, user_id }).await;
        let detached = self.hub.unsubscribe_user(user_id, &room_name(chat_id)).await;
        debug!(chat_id = %chat_id, user_id = %user_id, detached, "leaver detached from room");
    }

    /// Drops every subscription to a deactivated chat's room.
    pub async fn chat_deactivated(&self, chat_id: Uuid) {
        let room = room_name(chat_id);
        let detached = self.hub.close_room(&room).await;
        debug!(chat_id = %chat_id, room = %room, detached, "room closed");
    }

    async fn publish_message(
        &self,
        message_id: Uuid,
        event: &'static str,
        frame: impl FnOnce(MessageView) -> WsMessage,
    ) {
        let message = match self.store.message_view(message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(message_id = %message_id, event, "notification skipped: message not found");
                return;
            }
            Err(error) => {
                error!(error = ?error, message_id = %message_id, event, "failed to load message for notification");
                return;
            }
        };
        let chat_id = message.message.chat_id;
        self.publish(chat_id, event, frame(message)).await;
    }

    async fn publish(&self, chat_id: Uuid, event: &'static str, frame: WsMessage) {
        let room = room_name(chat_id);
        let delivered = self.hub.broadcast(&room, frame).await;
        debug!(chat_id = %chat_id, room = %room, event, delivered, "chat event fanned out");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use hearth_common::{
        protocol::ws::{room_name, WsMessage},
        types::{ChatRole, ChatType, UserSummary},
    };
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::ChatNotifier;
    use crate::{
        chat::ChatCommands,
        store::{test_support::unreachable_store, ChatStore, MemoryChatStore},
        ws::hub::ConnectionHub,
    };

    struct Fixture {
        commands: ChatCommands,
        notifier: ChatNotifier,
        hub: ConnectionHub,
        alice: Uuid,
        bob: Uuid,
    }

    fn fixture() -> Fixture {
        let alice = UserSummary { id: Uuid::new_v4(), display_name: "Alice".into(), avatar_url: None };
        let bob = UserSummary { id: Uuid::new_v4(), display_name: "Bob".into(), avatar_url: None };
        let (alice_id, bob_id) = (alice.id, bob.id);
        let store = ChatStore::memory(MemoryChatStore::with_users([alice, bob]));
        let hub = ConnectionHub::default();
        Fixture {
            commands: ChatCommands::new(store.clone()),
            notifier: ChatNotifier::new(store, hub.clone()),
            hub,
            alice: alice_id,
            bob: bob_id,
        }
    }

    async fn listen(
        hub: &ConnectionHub,
        user_id: Uuid,
        chat_id: Uuid,
    ) -> mpsc::UnboundedReceiver<WsMessage> {
        let session_id = Uuid::new_v4();
        hub.create_session(session_id, user_id, "t".into(), Utc::now() + Duration::minutes(1)).await;
        hub.mark_connected(session_id).await;
        let (sender, receiver) = mpsc::unbounded_channel();
        hub.register_outbound(session_id, sender).await;
        hub.subscribe(session_id, &room_name(chat_id)).await;
        receiver
    }

    #[tokio::test]
    async fn message_frames_carry_sender_display_name() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Lease questions", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut rx = listen(&fx.hub, fx.alice, chat.id).await;

        let message =
            fx.commands.send_message(chat.id, fx.alice, "Is parking included?").await.expect("send");
        fx.notifier.new_message(message.id).await;

        match rx.try_recv().expect("frame should be queued") {
            WsMessage::MessageCreated { message: view } => {
                assert_eq!(view.message.id, message.id);
                assert_eq!(view.sender.display_name, "Alice");
            }
            other => panic!("expected message_created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_follow_call_order_within_a_room() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Move-in", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut rx = listen(&fx.hub, fx.alice, chat.id).await;

        let message = fx.commands.send_message(chat.id, fx.alice, "first").await.expect("send");
        fx.notifier.new_message(message.id).await;
        fx.commands.edit_message(chat.id, message.id, fx.alice, "edited").await.expect("edit");
        fx.notifier.message_edited(message.id).await;
        fx.commands.delete_message(chat.id, message.id, fx.alice).await.expect("delete");
        fx.notifier.message_deleted(chat.id, message.id).await;

        assert!(matches!(rx.try_recv(), Ok(WsMessage::MessageCreated { .. })));
        match rx.try_recv() {
            Ok(WsMessage::MessageEdited { message: view }) => {
                assert_eq!(view.message.content, "edited");
            }
            other => panic!("expected message_edited, got {other:?}"),
        }
        assert_eq!(
            rx.try_recv().ok(),
            Some(WsMessage::MessageDeleted { chat_id: chat.id, message_id: message.id })
        );
    }

    // Fan-out is not sequenced against persistence: frames follow the order
    // notifications are issued in, which two racing handlers may invert
    // relative to commit order. Clients reconcile by re-listing.
    #[tokio::test]
    async fn frames_follow_call_order_not_commit_order() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Move-in", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut rx = listen(&fx.hub, fx.alice, chat.id).await;

        let earlier = fx.commands.send_message(chat.id, fx.alice, "earlier").await.expect("send");
        let later = fx.commands.send_message(chat.id, fx.alice, "later").await.expect("send");
        fx.notifier.new_message(later.id).await;
        fx.notifier.new_message(earlier.id).await;

        for expected in ["later", "earlier"] {
            match rx.try_recv() {
                Ok(WsMessage::MessageCreated { message }) => {
                    assert_eq!(message.message.content, expected);
                }
                other => panic!("expected message_created, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn leaver_gets_user_left_and_nothing_after() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Roommates", None, ChatType::Group)
            .await
            .expect("chat should be created");
        fx.commands.add_member(chat.id, fx.alice, fx.bob, ChatRole::Member).await.expect("add");
        let mut alice_rx = listen(&fx.hub, fx.alice, chat.id).await;
        let mut bob_rx = listen(&fx.hub, fx.bob, chat.id).await;

        fx.commands.leave_chat(chat.id, fx.bob).await.expect("leave");
        fx.notifier.user_left(chat.id, fx.bob).await;
        let message = fx.commands.send_message(chat.id, fx.alice, "after").await.expect("send");
        fx.notifier.new_message(message.id).await;

        let left = WsMessage::UserLeft { chat_id: chat.id, user_id: fx.bob };
        assert_eq!(bob_rx.try_recv().ok(), Some(left.clone()));
        assert!(bob_rx.try_recv().is_err(), "leaver must not see later frames");
        assert_eq!(alice_rx.try_recv().ok(), Some(left));
        assert!(matches!(alice_rx.try_recv(), Ok(WsMessage::MessageCreated { .. })));
    }

    #[tokio::test]
    async fn deactivated_chat_room_is_closed() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Roommates", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut rx = listen(&fx.hub, fx.alice, chat.id).await;
        let message = fx.commands.send_message(chat.id, fx.alice, "before").await.expect("send");

        fx.commands.deactivate_chat(chat.id, fx.alice).await.expect("deactivate");
        fx.notifier.chat_deactivated(chat.id).await;
        fx.notifier.message_deleted(chat.id, message.id).await;

        assert!(rx.try_recv().is_err());
        let frame = WsMessage::UserLeft { chat_id: chat.id, user_id: fx.alice };
        assert_eq!(fx.hub.broadcast(&room_name(chat.id), frame).await, 0);
    }

    #[tokio::test]
    async fn membership_frames_reach_the_room() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Roommates", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut rx = listen(&fx.hub, fx.alice, chat.id).await;

        fx.commands.add_member(chat.id, fx.alice, fx.bob, ChatRole::Member).await.expect("add");
        fx.notifier.user_joined(chat.id, fx.bob).await;
        fx.commands.leave_chat(chat.id, fx.bob).await.expect("leave");
        fx.notifier.user_left(chat.id, fx.bob).await;

        match rx.try_recv() {
            Ok(WsMessage::UserJoined { member }) => {
                assert_eq!(member.member.user_id, fx.bob);
                assert_eq!(member.user.display_name, "Bob");
            }
            other => panic!("expected user_joined, got {other:?}"),
        }
        assert_eq!(rx.try_recv().ok(), Some(WsMessage::UserLeft { chat_id: chat.id, user_id: fx.bob }));
    }

    #[tokio::test]
    async fn other_rooms_do_not_receive_frames() {
        let fx = fixture();
        let chat = fx
            .commands
            .create_chat(fx.alice, "Unit 4B", None, ChatType::Group)
            .await
            .expect("chat should be created");
        let mut elsewhere = listen(&fx.hub, fx.bob, Uuid::new_v4()).await;

        let message = fx.commands.send_message(chat.id, fx.alice, "hello").await.expect("send");
        fx.notifier.new_message(message.id).await;

        assert!(elsewhere.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_projection_is_logged_not_sent() {
        let fx = fixture();
        let chat_id = Uuid::new_v4();
        let mut rx = listen(&fx.hub, fx.alice, chat_id).await;

        fx.notifier.new_message(Uuid::new_v4()).await;
        fx.notifier.user_joined(chat_id, fx.bob).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn store_failures_never_propagate() {
        let hub = ConnectionHub::default();
        let notifier = ChatNotifier::new(unreachable_store(), hub.clone());
        let chat_id = Uuid::new_v4();
        let mut rx = listen(&hub, Uuid::new_v4(), chat_id).await;

        notifier.new_message(Uuid::new_v4()).await;
        notifier.message_edited(Uuid::new_v4()).await;
        notifier.user_joined(chat_id, Uuid::new_v4()).await;

        assert!(rx.try_recv().is_err());
    }
}
