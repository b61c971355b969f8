//! Per-user conversation history.
//!
//! The [`HistoryStore`] keeps one ordered window of [`Turn`]s per user in
//! process memory.  Nothing is persisted; a restart forgets every
//! conversation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::{Role, Turn, UserId};

/// Default number of turns retained per user.
pub const DEFAULT_HISTORY_LIMIT: usize = 40;

struct Session {
    turns: VecDeque<Turn>,
    last_active: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            turns: VecDeque::new(),
            last_active: now,
        }
    }
}

/// In-memory store of conversation windows keyed by user.
///
/// Insertion order is chronological order.  When a window grows past its
/// limit the oldest turns are evicted first.  A window never starts with a
/// non-user turn: such turns are dropped from the head on every append,
/// which also covers a reply landing after its session was evicted.
///
/// The internal lock only protects the map.  Ordering of appends for one
/// user is the caller's job; the dispatcher guarantees it by running each
/// user on its own worker.
pub struct HistoryStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    limit: Option<usize>,
}

impl HistoryStore {
    /// Creates a store that keeps at most `limit` turns per user.
    pub fn new(limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            limit: Some(limit),
        }
    }

    /// Creates a store that never evicts.
    pub fn unbounded() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            limit: None,
        }
    }

    /// Appends a turn to the user's history, creating it if absent.
    pub fn append(&self, user: UserId, turn: Turn) {
        self.append_at(user, turn, Instant::now());
    }

    fn append_at(&self, user: UserId, turn: Turn, now: Instant) {
        let mut sessions = self.lock();
        let session = sessions.entry(user).or_insert_with(|| Session::new(now));
        session.turns.push_back(turn);
        session.last_active = now;
        let mut evicted = 0usize;
        if let Some(limit) = self.limit {
            while session.turns.len() > limit {
                session.turns.pop_front();
                evicted += 1;
            }
        }
        while session
            .turns
            .front()
            .is_some_and(|turn| turn.role() != Role::User)
        {
            session.turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(user = %user, evicted, "trimmed conversation window");
        }
    }

    /// Returns the user's full ordered history; empty if none exists.
    pub fn get(&self, user: UserId) -> Vec<Turn> {
        self.lock()
            .get(&user)
            .map(|session| session.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces the user's history with an empty one.
    pub fn reset(&self, user: UserId) {
        self.lock().insert(user, Session::new(Instant::now()));
    }

    /// Number of users with a live session.
    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every session that has been idle for longer than `ttl`.
    ///
    /// Returns the number of sessions removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(Instant::now(), ttl)
    }

    fn evict_idle_at(&self, now: Instant, ttl: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| now.saturating_duration_since(session.last_active) <= ttl);
        before - sessions.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Session>> {
        // A panic while holding the lock cannot leave a window half-written.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADA: UserId = UserId(1);
    const BOB: UserId = UserId(2);

    #[test]
    fn get_unknown_user_is_empty() {
        let store = HistoryStore::default();
        assert!(store.get(ADA).is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn append_preserves_order() {
        let store = HistoryStore::unbounded();
        store.append(ADA, Turn::user("one"));
        store.append(ADA, Turn::assistant("two"));
        store.append(ADA, Turn::user("three"));

        assert_eq!(
            store.get(ADA),
            vec![
                Turn::user("one"),
                Turn::assistant("two"),
                Turn::user("three")
            ]
        );
    }

    #[test]
    fn users_are_isolated() {
        let store = HistoryStore::default();
        store.append(ADA, Turn::user("mine"));
        store.append(BOB, Turn::user("theirs"));

        assert_eq!(store.get(ADA), vec![Turn::user("mine")]);
        assert_eq!(store.get(BOB), vec![Turn::user("theirs")]);
    }

    #[test]
    fn reset_clears_history() {
        let store = HistoryStore::default();
        store.append(ADA, Turn::user("hello"));
        store.append(ADA, Turn::assistant("hi"));
        store.append(BOB, Turn::user("untouched"));

        store.reset(ADA);
        assert!(store.get(ADA).is_empty());
        assert_eq!(store.get(BOB).len(), 1);

        store.append(ADA, Turn::user("again"));
        assert_eq!(store.get(ADA), vec![Turn::user("again")]);
    }

    #[test]
    fn reset_unknown_user_creates_empty_session() {
        let store = HistoryStore::default();
        store.reset(ADA);
        assert!(store.get(ADA).is_empty());
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn window_evicts_oldest_first() {
        let store = HistoryStore::new(4);
        for i in 0..3 {
            store.append(ADA, Turn::user(format!("q{i}")));
            store.append(ADA, Turn::assistant(format!("a{i}")));
        }

        assert_eq!(
            store.get(ADA),
            vec![
                Turn::user("q1"),
                Turn::assistant("a1"),
                Turn::user("q2"),
                Turn::assistant("a2"),
            ]
        );
    }

    #[test]
    fn window_never_starts_with_assistant() {
        let store = HistoryStore::new(3);
        store.append(ADA, Turn::user("q0"));
        store.append(ADA, Turn::assistant("a0"));
        store.append(ADA, Turn::user("q1"));
        store.append(ADA, Turn::assistant("a1"));

        let turns = store.get(ADA);
        assert_eq!(turns, vec![Turn::user("q1"), Turn::assistant("a1")]);
    }

    #[test]
    fn window_keeps_unanswered_user_turns() {
        let store = HistoryStore::new(3);
        store.append(ADA, Turn::user("q0"));
        store.append(ADA, Turn::user("q1"));
        store.append(ADA, Turn::user("q2"));
        store.append(ADA, Turn::user("q3"));

        assert_eq!(
            store.get(ADA),
            vec![Turn::user("q1"), Turn::user("q2"), Turn::user("q3")]
        );
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let store = HistoryStore::default();
        let start = Instant::now();
        store.append_at(ADA, Turn::user("old"), start);
        store.append_at(BOB, Turn::user("new"), start + Duration::from_secs(50));

        let removed = store.evict_idle_at(start + Duration::from_secs(100), Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert!(store.get(ADA).is_empty());
        assert_eq!(store.get(BOB), vec![Turn::user("new")]);
    }

    #[test]
    fn reply_after_eviction_does_not_lead_the_window() {
        let store = HistoryStore::default();
        let start = Instant::now();
        store.append_at(ADA, Turn::user("question"), start);

        // The session times out while the completion is still running.
        let removed = store.evict_idle_at(start + Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(removed, 1);
        store.append_at(ADA, Turn::assistant("answer"), start + Duration::from_secs(6));
        assert!(store.get(ADA).is_empty());

        store.append_at(ADA, Turn::user("again"), start + Duration::from_secs(7));
        store.append_at(ADA, Turn::assistant("hi"), start + Duration::from_secs(8));
        assert_eq!(store.get(ADA), vec![Turn::user("again"), Turn::assistant("hi")]);
    }

    #[test]
    fn unbounded_store_still_starts_with_user() {
        let store = HistoryStore::unbounded();
        store.append(ADA, Turn::assistant("stray"));
        store.append(ADA, Turn::user("hello"));
        assert_eq!(store.get(ADA), vec![Turn::user("hello")]);
    }
}
