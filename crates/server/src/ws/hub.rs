use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use hearth_common::protocol::ws::WsMessage;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Registry of realtime sessions and their room subscriptions.
///
/// A session carries at most one live connection. Records are dropped once
/// they are expired and nothing is connected to them.
///
/// Cloning is cheap; all clones share the same session table.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHub {
    sessions: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: Uuid,
    session_token: String,
    expires_at: DateTime<Utc>,
    connected: bool,
    rooms: HashSet<String>,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
}

impl SessionRecord {
    fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        !self.connected && now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    Connected,
    UnknownSession,
    AlreadyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTokenValidation {
    Valid { user_id: Uuid },
    Invalid,
    Expired,
}

impl ConnectionHub {
    pub async fn create_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        session_token: String,
        expires_at: DateTime<Utc>,
    ) {
        let mut guard = self.sessions.write().await;
        let now = Utc::now();
        guard.retain(|_, session| !session.is_reclaimable(now));
        guard.insert(
            session_id,
            SessionRecord {
                user_id,
                session_token,
                expires_at,
                connected: false,
                rooms: HashSet::new(),
                outbound: None,
            },
        );
    }

    /// Removes expired sessions with no live connection. Returns how many went.
    pub async fn prune_expired(&self) -> usize {
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        let now = Utc::now();
        guard.retain(|_, session| !session.is_reclaimable(now));
        before - guard.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_exists(&self, session_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    pub async fn validate_session_token(
        &self,
        session_id: Uuid,
        session_token: &str,
    ) -> SessionTokenValidation {
        let guard = self.sessions.read().await;
        let Some(session) = guard.get(&session_id) else {
            return SessionTokenValidation::Invalid;
        };

        if session.session_token != session_token {
            return SessionTokenValidation::Invalid;
        }
        if Utc::now() > session.expires_at {
            return SessionTokenValidation::Expired;
        }

        SessionTokenValidation::Valid { user_id: session.user_id }
    }

    pub async fn user_for_session(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions.read().await.get(&session_id).map(|session| session.user_id)
    }

    /// Claims the session for one connection. A second socket is refused
    /// while the first is still attached.
    pub async fn mark_connected(&self, session_id: Uuid) -> ConnectAttempt {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&session_id) {
            Some(session) if session.connected => ConnectAttempt::AlreadyConnected,
            Some(session) => {
                session.connected = true;
                ConnectAttempt::Connected
            }
            None => ConnectAttempt::UnknownSession,
        }
    }

    /// Releases the connection and drops its room subscriptions. An expired
    /// session is removed outright since it can never be attached again.
    pub async fn mark_disconnected(&self, session_id: Uuid) {
        let mut guard = self.sessions.write().await;
        let Some(session) = guard.get_mut(&session_id) else {
            return;
        };
        session.connected = false;
        session.rooms.clear();
        session.outbound = None;
        if session.is_reclaimable(Utc::now()) {
            guard.remove(&session_id);
        }
    }

    pub async fn register_outbound(
        &self,
        session_id: Uuid,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> bool {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&session_id) {
            Some(session) => {
                session.outbound = Some(sender);
                true
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, session_id: Uuid, room: &str) -> bool {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&session_id) {
            Some(session) => {
                session.rooms.insert(room.to_owned());
                true
            }
            None => false,
        }
    }

    /// Returns whether the session was subscribed.
    pub async fn unsubscribe(&self, session_id: Uuid, room: &str) -> bool {
        let mut guard = self.sessions.write().await;
        guard.get_mut(&session_id).map(|session| session.rooms.remove(room)).unwrap_or(false)
    }

    /// Detaches every session of `user_id` from `room`. Returns how many were subscribed.
    pub async fn unsubscribe_user(&self, user_id: Uuid, room: &str) -> usize {
        let mut guard = self.sessions.write().await;
        guard
            .values_mut()
            .filter(|session| session.user_id == user_id)
            .map(|session| session.rooms.remove(room))
            .filter(|removed| *removed)
            .count()
    }

    /// Detaches all sessions from `room`.
    pub async fn close_room(&self, room: &str) -> usize {
        let mut guard = self.sessions.write().await;
        guard.values_mut().map(|session| session.rooms.remove(room)).filter(|removed| *removed).count()
    }

    pub async fn is_subscribed(&self, session_id: Uuid, room: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|session| session.rooms.contains(room))
            .unwrap_or(false)
    }

    pub async fn rooms_for_session(&self, session_id: Uuid) -> Vec<String> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|session| {
                let mut rooms = session.rooms.iter().cloned().collect::<Vec<_>>();
                rooms.sort();
                rooms
            })
            .unwrap_or_default()
    }

    /// Pushes `message` to every connected session subscribed to `room`.
    /// Returns the number of sessions the frame was queued for.
    pub async fn broadcast(&self, room: &str, message: WsMessage) -> usize {
        self.send_to_room(room, message, None).await
    }

    pub async fn broadcast_excluding(
        &self,
        room: &str,
        message: WsMessage,
        exclude_session: Uuid,
    ) -> usize {
        self.send_to_room(room, message, Some(exclude_session)).await
    }

    async fn send_to_room(
        &self,
        room: &str,
        message: WsMessage,
        exclude_session: Option<Uuid>,
    ) -> usize {
        // Senders are collected under the read lock and used after it is released.
        let recipients = {
            let guard = self.sessions.read().await;
            guard
                .iter()
                .filter(|(session_id, _)| Some(**session_id) != exclude_session)
                .filter(|(_, session)| session.rooms.contains(room))
                .filter_map(|(_, session)| session.outbound.clone())
                .collect::<Vec<_>>()
        };

        recipients.into_iter().filter(|sender| sender.send(message.clone()).is_ok()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectAttempt, ConnectionHub, SessionTokenValidation};
    use chrono::{Duration, Utc};
    use hearth_common::protocol::ws::{room_name, WsMessage};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    async fn connected_session(
        hub: &ConnectionHub,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<WsMessage>) {
        let session_id = Uuid::new_v4();
        hub.create_session(session_id, user_id, "token".into(), Utc::now() + Duration::minutes(5))
            .await;
        assert_eq!(hub.mark_connected(session_id).await, ConnectAttempt::Connected);
        let (sender, receiver) = mpsc::unbounded_channel();
        assert!(hub.register_outbound(session_id, sender).await);
        (session_id, receiver)
    }

    fn typing(chat_id: Uuid, user_id: Uuid) -> WsMessage {
        WsMessage::UserTyping { chat_id, user_id }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_room_subscribers() {
        let hub = ConnectionHub::default();
        let chat_id = Uuid::new_v4();
        let room = room_name(chat_id);
        let (subscribed, mut subscribed_rx) = connected_session(&hub, Uuid::new_v4()).await;
        let (_other, mut other_rx) = connected_session(&hub, Uuid::new_v4()).await;

        assert!(hub.subscribe(subscribed, &room).await);
        let sent = hub.broadcast(&room, typing(chat_id, Uuid::nil())).await;

        assert_eq!(sent, 1);
        assert_eq!(subscribed_rx.try_recv().ok(), Some(typing(chat_id, Uuid::nil())));
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_excluding_skips_sender() {
        let hub = ConnectionHub::default();
        let chat_id = Uuid::new_v4();
        let room = room_name(chat_id);
        let (sender, mut sender_rx) = connected_session(&hub, Uuid::new_v4()).await;
        let (peer, mut peer_rx) = connected_session(&hub, Uuid::new_v4()).await;
        hub.subscribe(sender, &room).await;
        hub.subscribe(peer, &room).await;

        let sent = hub.broadcast_excluding(&room, typing(chat_id, Uuid::nil()), sender).await;

        assert_eq!(sent, 1);
        assert!(sender_rx.try_recv().is_err());
        assert!(peer_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = ConnectionHub::default();
        let room = room_name(Uuid::new_v4());
        let (session_id, mut rx) = connected_session(&hub, Uuid::new_v4()).await;
        hub.subscribe(session_id, &room).await;

        assert!(hub.unsubscribe(session_id, &room).await);
        assert!(!hub.unsubscribe(session_id, &room).await);
        assert_eq!(hub.broadcast(&room, typing(Uuid::nil(), Uuid::nil())).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_clears_subscriptions() {
        let hub = ConnectionHub::default();
        let room = room_name(Uuid::new_v4());
        let (session_id, _rx) = connected_session(&hub, Uuid::new_v4()).await;
        hub.subscribe(session_id, &room).await;

        hub.mark_disconnected(session_id).await;

        assert!(!hub.is_subscribed(session_id, &room).await);
        assert!(hub.rooms_for_session(session_id).await.is_empty());
    }

    #[tokio::test]
    async fn token_validation_checks_value_and_expiry() {
        let hub = ConnectionHub::default();
        let user_id = Uuid::new_v4();
        let live = Uuid::new_v4();
        let stale = Uuid::new_v4();
        hub.create_session(live, user_id, "live".into(), Utc::now() + Duration::minutes(5)).await;
        hub.create_session(stale, user_id, "stale".into(), Utc::now() - Duration::seconds(1)).await;

        assert_eq!(
            hub.validate_session_token(live, "live").await,
            SessionTokenValidation::Valid { user_id }
        );
        assert_eq!(hub.validate_session_token(live, "wrong").await, SessionTokenValidation::Invalid);
        assert_eq!(hub.validate_session_token(stale, "stale").await, SessionTokenValidation::Expired);
        assert_eq!(
            hub.validate_session_token(Uuid::new_v4(), "live").await,
            SessionTokenValidation::Invalid
        );
    }

    #[tokio::test]
    async fn second_connection_is_refused_until_the_first_leaves() {
        let hub = ConnectionHub::default();
        let room = room_name(Uuid::new_v4());
        let (session_id, mut rx) = connected_session(&hub, Uuid::new_v4()).await;
        hub.subscribe(session_id, &room).await;

        assert_eq!(hub.mark_connected(session_id).await, ConnectAttempt::AlreadyConnected);
        assert_eq!(hub.broadcast(&room, typing(Uuid::nil(), Uuid::nil())).await, 1);
        assert!(rx.try_recv().is_ok(), "first connection keeps its outbound queue");

        hub.mark_disconnected(session_id).await;
        assert_eq!(hub.mark_connected(session_id).await, ConnectAttempt::Connected);
        assert_eq!(hub.mark_connected(Uuid::new_v4()).await, ConnectAttempt::UnknownSession);
    }

    #[tokio::test]
    async fn unsubscribe_user_detaches_all_of_their_sessions() {
        let hub = ConnectionHub::default();
        let chat_id = Uuid::new_v4();
        let room = room_name(chat_id);
        let leaver = Uuid::new_v4();
        let (phone, mut phone_rx) = connected_session(&hub, leaver).await;
        let (laptop, mut laptop_rx) = connected_session(&hub, leaver).await;
        let (peer, mut peer_rx) = connected_session(&hub, Uuid::new_v4()).await;
        for session_id in [phone, laptop, peer] {
            hub.subscribe(session_id, &room).await;
        }

        assert_eq!(hub.unsubscribe_user(leaver, &room).await, 2);
        assert_eq!(hub.broadcast(&room, typing(chat_id, Uuid::nil())).await, 1);
        assert!(phone_rx.try_recv().is_err());
        assert!(laptop_rx.try_recv().is_err());
        assert!(peer_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn close_room_detaches_every_subscriber() {
        let hub = ConnectionHub::default();
        let room = room_name(Uuid::new_v4());
        let other_room = room_name(Uuid::new_v4());
        let (first, _first_rx) = connected_session(&hub, Uuid::new_v4()).await;
        let (second, _second_rx) = connected_session(&hub, Uuid::new_v4()).await;
        hub.subscribe(first, &room).await;
        hub.subscribe(second, &room).await;
        hub.subscribe(second, &other_room).await;

        assert_eq!(hub.close_room(&room).await, 2);
        assert_eq!(hub.broadcast(&room, typing(Uuid::nil(), Uuid::nil())).await, 0);
        assert_eq!(hub.rooms_for_session(second).await, vec![other_room]);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_once_unattached() {
        let hub = ConnectionHub::default();
        let user_id = Uuid::new_v4();
        let never_attached = Uuid::new_v4();
        let attached = Uuid::new_v4();
        let expired = Utc::now() - Duration::seconds(1);
        hub.create_session(never_attached, user_id, "a".into(), expired).await;
        hub.create_session(attached, user_id, "b".into(), expired).await;
        assert_eq!(hub.mark_connected(attached).await, ConnectAttempt::Connected);

        assert_eq!(hub.prune_expired().await, 1);
        assert!(!hub.session_exists(never_attached).await);
        assert!(hub.session_exists(attached).await, "live connection keeps its session");

        hub.mark_disconnected(attached).await;
        assert!(!hub.session_exists(attached).await);
    }

    #[tokio::test]
    async fn creating_a_session_sweeps_expired_ones() {
        let hub = ConnectionHub::default();
        let user_id = Uuid::new_v4();
        let expired = Utc::now() - Duration::seconds(1);
        for _ in 0..3 {
            hub.create_session(Uuid::new_v4(), user_id, "old".into(), expired).await;
        }
        let live = Uuid::new_v4();
        hub.create_session(live, user_id, "new".into(), Utc::now() + Duration::minutes(5)).await;

        assert_eq!(hub.session_count().await, 1);
        assert!(hub.session_exists(live).await);
    }
}
