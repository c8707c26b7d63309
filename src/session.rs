//! In-memory session store
//!
//! One session per user, created on first touch and evicted after a period
//! of inactivity. A single lock guards the map; callers never hold it across
//! a completion round trip.

mod clock;
mod message;
mod permit;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use message::{Message, MessageId};
pub use permit::{GenerationPermit, InFlight};

use crate::llm::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Conversation state implied by the trailing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Empty,
    /// Last message is from the user
    AwaitingReply,
    /// Last message is from the assistant (or a seed system line)
    Idle,
}

/// Mutable conversation state for one user
#[derive(Debug, Clone)]
pub struct Session {
    pub history: Vec<Message>,
    pub last_activity: DateTime<Utc>,
    /// Provider hint only
    pub streaming: bool,
    /// Identifies this incarnation of the history; changes on reset
    pub epoch: u64,
    /// Bumped on every change to the history
    pub revision: u64,
}

impl Session {
    pub fn state(&self) -> ChatState {
        match self.history.last().map(|m| m.role) {
            None => ChatState::Empty,
            Some(Role::User) => ChatState::AwaitingReply,
            Some(Role::Assistant | Role::System) => ChatState::Idle,
        }
    }

    /// History in provider form
    pub fn prompt(&self) -> Vec<ChatMessage> {
        self.history.iter().map(Message::to_chat).collect()
    }

    /// Same incarnation and no changes since `snapshot` was taken
    pub fn unchanged_since(&self, snapshot: &Session) -> bool {
        self.epoch == snapshot.epoch && self.revision == snapshot.revision
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// Point-in-time copy of a user's history taken by `save-chat`
#[derive(Debug, Clone)]
pub struct SavedChat {
    pub owner: String,
    pub messages: Vec<Message>,
    pub saved_at: DateTime<Utc>,
}

/// Concurrency-safe map from user id to session
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    saved: RwLock<HashMap<String, SavedChat>>,
    clock: Arc<dyn Clock>,
    next_epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            saved: RwLock::new(HashMap::new()),
            clock,
            next_epoch: AtomicU64::new(1),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn fresh_session(&self, seed: Vec<ChatMessage>) -> Session {
        let now = self.clock.now();
        Session {
            history: seed
                .into_iter()
                .map(|m| Message::from_chat(m, now))
                .collect(),
            last_activity: now,
            streaming: false,
            epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }

    /// Existing session for `user_id`, or a new one seeded from `seed`.
    /// `seed` only runs when the session is created.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        seed: impl FnOnce() -> Vec<ChatMessage>,
    ) -> Session {
        if let Some(session) = self.sessions.read().await.get(user_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id = %user_id, "Creating session");
                self.fresh_session(seed())
            })
            .clone()
    }

    /// Read-only copy of the session, if there is one
    pub async fn read(&self, user_id: &str) -> Option<Session> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Apply `f` to the user's session (creating it from `seed` if needed)
    /// under exclusive access, then record activity. Counts as a history
    /// change; a copy taken inside `f` already carries the new revision.
    pub async fn mutate<R>(
        &self,
        user_id: &str,
        seed: impl FnOnce() -> Vec<ChatMessage>,
        f: impl FnOnce(&mut Session) -> R,
    ) -> R {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| self.fresh_session(seed()));
        session.revision += 1;
        let result = f(session);
        session.touch(self.clock.now());
        result
    }

    /// Apply `f` only if the session is still the one `snapshot` was taken
    /// from, with no history changes since. A swept session never matches.
    pub async fn mutate_if_unchanged<R>(
        &self,
        user_id: &str,
        snapshot: &Session,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(user_id)
            .filter(|s| s.unchanged_since(snapshot))?;
        session.revision += 1;
        let result = f(session);
        session.touch(self.clock.now());
        Some(result)
    }

    /// Set the stream hint without counting as a history change
    pub async fn set_streaming(
        &self,
        user_id: &str,
        seed: impl FnOnce() -> Vec<ChatMessage>,
        enabled: bool,
    ) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| self.fresh_session(seed()));
        session.streaming = enabled;
        session.touch(self.clock.now());
    }

    /// Replace the user's history with a fresh seed under a new epoch
    pub async fn reset(&self, user_id: &str, seed: Vec<ChatMessage>) -> Session {
        let mut session = self.fresh_session(seed);
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.get(user_id) {
            session.streaming = previous.streaming;
        }
        sessions.insert(user_id.to_string(), session.clone());
        session
    }

    /// Remove every session idle for longer than `max_idle`
    pub async fn sweep_expired(&self, max_idle: Duration) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            !(now - session.last_activity)
                .to_std()
                .is_ok_and(|idle| idle > max_idle)
        });
        before - sessions.len()
    }

    /// Advisory check: was there activity within `window`?
    pub async fn is_in_cooldown(&self, user_id: &str, window: Duration) -> bool {
        let now = self.clock.now();
        self.sessions
            .read()
            .await
            .get(user_id)
            .is_some_and(|session| {
                (now - session.last_activity)
                    .to_std()
                    .map_or(true, |idle| idle < window)
            })
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Owner and session holding the message
    pub async fn find_message(&self, message_id: MessageId) -> Option<(String, Session)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .find(|(_, session)| session.history.iter().any(|m| m.id == message_id))
            .map(|(user_id, session)| (user_id.clone(), session.clone()))
    }

    pub async fn update_message_content(&self, message_id: MessageId, content: &str) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            if let Some(message) = session.history.iter_mut().find(|m| m.id == message_id) {
                message.content = content.to_string();
                session.revision += 1;
                session.touch(now);
                return true;
            }
        }
        false
    }

    pub async fn delete_message(&self, message_id: MessageId) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            if let Some(index) = session.history.iter().position(|m| m.id == message_id) {
                session.history.remove(index);
                session.revision += 1;
                session.touch(now);
                return true;
            }
        }
        false
    }

    /// Store a copy of `messages` under a fresh chat id
    pub async fn save_snapshot(&self, owner: &str, messages: Vec<Message>) -> String {
        let chat_id = uuid::Uuid::new_v4().to_string();
        let saved = SavedChat {
            owner: owner.to_string(),
            messages,
            saved_at: self.clock.now(),
        };
        self.saved.write().await.insert(chat_id.clone(), saved);
        chat_id
    }

    pub async fn saved_chat(&self, chat_id: &str) -> Option<SavedChat> {
        self.saved.read().await.get(chat_id).cloned()
    }
}

/// Periodically evict idle sessions
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired(max_idle).await;
            if removed > 0 {
                let remaining = store.len().await;
                tracing::info!(removed, remaining, "Evicted idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_clock() -> (Arc<ManualClock>, SessionStore) {
        let clock = Arc::new(ManualClock::new());
        let store = SessionStore::new(clock.clone());
        (clock, store)
    }

    fn seed() -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::System, "Personality: calm"),
            ChatMessage::new(Role::Assistant, "Hello."),
        ]
    }

    #[tokio::test]
    async fn test_get_or_create_seeds_once() {
        let (_, store) = store_with_clock();
        let created = store.get_or_create("alice", seed).await;
        assert_eq!(created.prompt(), seed());

        let read = store.read("alice").await.unwrap();
        assert_eq!(read.prompt(), seed());

        let again = store
            .get_or_create("alice", || panic!("must not reseed"))
            .await;
        assert_eq!(again.epoch, created.epoch);
        assert_eq!(again.history, created.history);
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let (_, store) = store_with_clock();
        assert!(store.read("ghost").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_mutate_records_activity() {
        let (clock, store) = store_with_clock();
        let before = store.get_or_create("alice", Vec::new).await.last_activity;

        clock.advance(Duration::from_secs(5));
        store
            .mutate("alice", Vec::new, |s| {
                s.history
                    .push(Message::new(Role::User, "hi", Utc::now()));
            })
            .await;

        let session = store.read("alice").await.unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.last_activity - before, chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_activity_never_regresses() {
        let (clock, store) = store_with_clock();
        let created = store.get_or_create("alice", Vec::new).await;

        clock.rewind(Duration::from_secs(60));
        store.mutate("alice", Vec::new, |_| ()).await;

        let session = store.read("alice").await.unwrap();
        assert_eq!(session.last_activity, created.last_activity);
    }

    #[tokio::test]
    async fn test_sweep_boundary() {
        let (clock, store) = store_with_clock();
        store.get_or_create("stale", Vec::new).await;
        clock.advance(Duration::from_secs(2));
        store.get_or_create("fresh", Vec::new).await;

        // stale idle 31s, fresh idle 29s
        clock.advance(Duration::from_secs(29));
        let removed = store.sweep_expired(Duration::from_secs(30)).await;

        assert_eq!(removed, 1);
        assert!(store.read("stale").await.is_none());
        assert!(store.read("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_reset_changes_epoch_and_keeps_streaming() {
        let (_, store) = store_with_clock();
        let first = store.get_or_create("alice", seed).await;
        store
            .mutate("alice", Vec::new, |s| s.streaming = true)
            .await;

        let reset = store.reset("alice", Vec::new()).await;
        assert_ne!(reset.epoch, first.epoch);
        assert!(reset.history.is_empty());
        assert!(reset.streaming);

        let applied = store
            .mutate_if_unchanged("alice", &first, |s| s.history.clear())
            .await;
        assert!(applied.is_none());
    }

    #[tokio::test]
    async fn test_history_changes_invalidate_snapshots() {
        let (_, store) = store_with_clock();
        let snapshot = store.get_or_create("alice", seed).await;

        // Stream hint is not a history change
        store.set_streaming("alice", Vec::new, true).await;
        assert!(store.read("alice").await.unwrap().unchanged_since(&snapshot));

        let target = snapshot.history[1].id;
        assert!(store.update_message_content(target, "Edited.").await);
        assert!(store
            .mutate_if_unchanged("alice", &snapshot, |_| ())
            .await
            .is_none());

        let current = store.read("alice").await.unwrap();
        let applied = store
            .mutate_if_unchanged("alice", &current, |s| s.history.len())
            .await;
        assert_eq!(applied, Some(2));
        // The applied change itself moves the revision on
        assert!(!store.read("alice").await.unwrap().unchanged_since(&current));
    }

    #[tokio::test]
    async fn test_swept_session_never_matches_snapshot() {
        let (clock, store) = store_with_clock();
        let snapshot = store.get_or_create("alice", seed).await;
        clock.advance(Duration::from_secs(31));
        store.sweep_expired(Duration::from_secs(30)).await;

        let applied = store
            .mutate_if_unchanged("alice", &snapshot, |s| s.history.clear())
            .await;
        assert!(applied.is_none());
        assert!(store.read("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_message_lookup_update_delete() {
        let (_, store) = store_with_clock();
        store.get_or_create("alice", seed).await;
        let bob = store.get_or_create("bob", seed).await;
        let target = bob.history[1].id;

        let (owner, _) = store.find_message(target).await.unwrap();
        assert_eq!(owner, "bob");

        assert!(store.update_message_content(target, "Edited.").await);
        assert_eq!(store.read("bob").await.unwrap().history[1].content, "Edited.");

        assert!(store.delete_message(target).await);
        assert_eq!(store.read("bob").await.unwrap().history.len(), 1);
        assert!(store.find_message(target).await.is_none());
        assert!(!store.delete_message(target).await);
        assert!(!store.update_message_content(target, "x").await);
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let (clock, store) = store_with_clock();
        assert!(!store.is_in_cooldown("alice", Duration::from_secs(3)).await);

        store.get_or_create("alice", Vec::new).await;
        assert!(store.is_in_cooldown("alice", Duration::from_secs(3)).await);

        clock.advance(Duration::from_secs(4));
        assert!(!store.is_in_cooldown("alice", Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn test_snapshots_are_separate_from_sessions() {
        let (_, store) = store_with_clock();
        let session = store.get_or_create("alice", seed).await;
        let chat_id = store.save_snapshot("alice", session.history.clone()).await;

        assert_eq!(store.len().await, 1);
        let saved = store.saved_chat(&chat_id).await.unwrap();
        assert_eq!(saved.owner, "alice");
        assert_eq!(saved.messages, session.history);
        assert!(store.saved_chat("missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(SessionStore::new(clock.clone()));
        store.get_or_create("alice", Vec::new).await;
        clock.advance(Duration::from_secs(31));

        let handle = spawn_sweeper(
            Arc::clone(&store),
            Duration::from_secs(10),
            Duration::from_secs(30),
        );
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(store.is_empty().await);
        handle.abort();
    }

    #[test]
    fn test_state_from_trailing_role() {
        let mut session = Session {
            history: Vec::new(),
            last_activity: Utc::now(),
            streaming: false,
            epoch: 1,
            revision: 0,
        };
        assert_eq!(session.state(), ChatState::Empty);
        session.history.push(Message::new(Role::User, "hi", Utc::now()));
        assert_eq!(session.state(), ChatState::AwaitingReply);
        session
            .history
            .push(Message::new(Role::Assistant, "hello", Utc::now()));
        assert_eq!(session.state(), ChatState::Idle);
    }
}
