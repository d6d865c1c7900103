use std::collections::HashMap;

use uuid::Uuid;

use dockline_types::models::{Message, ReadMark};

/// Client-local unread accounting: a per-thread flag plus the derived
/// thread-level count behind the global badge. Unread is never stored
/// durably — the read marks are the single source of truth, and this
/// state is reconciled from them on cold start.
///
/// Every mutation is idempotent so replayed events under at-least-once
/// delivery cannot double-count.
#[derive(Debug, Default)]
pub struct UnreadState {
    // Absent means read.
    by_thread: HashMap<Uuid, bool>,
}

impl UnreadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cold-start contract: derive the flags from the raw rows visible
    /// to a user. A message counts against a thread iff someone else
    /// sent it and the user holds no read mark for it.
    pub fn from_rows(user_id: Uuid, messages: &[Message], marks: &[ReadMark]) -> Self {
        let mut state = Self::new();
        for message in messages {
            if message.sender_id == user_id {
                continue;
            }
            let read = marks
                .iter()
                .any(|m| m.message_id == message.id && m.user_id == user_id);
            if !read {
                state.by_thread.insert(message.thread_id, true);
            }
        }
        state
    }

    /// Replace the flags wholesale from a reconciliation query.
    pub fn seed(&mut self, unread_thread_ids: &[Uuid]) {
        self.by_thread.clear();
        for id in unread_thread_ids {
            self.by_thread.insert(*id, true);
        }
    }

    /// A qualifying message arrived for this thread. Returns true if
    /// the flag actually flipped (a replayed event returns false).
    pub fn note_incoming(&mut self, thread_id: Uuid) -> bool {
        !std::mem::replace(self.by_thread.entry(thread_id).or_insert(false), true)
    }

    /// The thread was marked read. Returns true if the flag flipped.
    pub fn clear(&mut self, thread_id: Uuid) -> bool {
        self.by_thread.remove(&thread_id).unwrap_or(false)
    }

    pub fn is_unread(&self, thread_id: Uuid) -> bool {
        self.by_thread.get(&thread_id).copied().unwrap_or(false)
    }

    /// Number of threads (not messages) with something unread.
    pub fn thread_count(&self) -> u64 {
        self.by_thread.values().filter(|v| **v).count() as u64
    }

    pub fn unread_threads(&self) -> Vec<Uuid> {
        self.by_thread
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn reset(&mut self) {
        self.by_thread.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(thread_id: Uuid, sender_id: Uuid) -> Message {
        Message::new(thread_id, sender_id, "aisle 3 restock")
    }

    #[test]
    fn own_messages_never_count() {
        let me = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let state = UnreadState::from_rows(me, &[msg(thread, me)], &[]);
        assert_eq!(state.thread_count(), 0);
        assert!(!state.is_unread(thread));
    }

    #[test]
    fn counts_threads_not_messages() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let messages = vec![msg(thread, them), msg(thread, them), msg(thread, them)];
        let state = UnreadState::from_rows(me, &messages, &[]);
        assert_eq!(state.thread_count(), 1);
    }

    #[test]
    fn read_marks_suppress_unread() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let message = msg(thread, them);
        let marks = vec![ReadMark {
            message_id: message.id,
            user_id: me,
        }];
        let state = UnreadState::from_rows(me, &[message], &marks);
        assert_eq!(state.thread_count(), 0);
    }

    #[test]
    fn note_incoming_is_idempotent() {
        let thread = Uuid::new_v4();
        let mut state = UnreadState::new();
        assert!(state.note_incoming(thread));
        assert!(!state.note_incoming(thread));
        assert_eq!(state.thread_count(), 1);
    }

    #[test]
    fn clear_then_note_flips_again() {
        let thread = Uuid::new_v4();
        let mut state = UnreadState::new();
        state.note_incoming(thread);
        assert!(state.clear(thread));
        assert!(!state.clear(thread));
        assert!(state.note_incoming(thread));
    }

    #[test]
    fn seed_replaces_previous_flags() {
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let mut state = UnreadState::new();
        state.note_incoming(old);
        state.seed(&[fresh]);
        assert!(!state.is_unread(old));
        assert!(state.is_unread(fresh));
        assert_eq!(state.thread_count(), 1);
    }
}
