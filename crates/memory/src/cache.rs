//! Bounded recency cache of conversation turns.

use parley_core::message::{Conversation, Turn};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Fixed-capacity FIFO of the most recent turns.
///
/// Adding past capacity silently evicts the oldest turn. The cache lives for
/// the process only; [`MessageCache::hydrate`] refills it from a stored
/// conversation when the caller wants continuity across restarts.
#[derive(Debug, Clone)]
pub struct MessageCache {
    capacity: usize,
    turns: VecDeque<Turn>,
}

impl MessageCache {
    /// Create an empty cache. A zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("Message cache capacity 0 is not usable, clamping to 1");
            1
        } else {
            capacity
        };

        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, turn: Turn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Snapshot of every cached turn, oldest first.
    pub fn get_all(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// The newest `min(n, len)` turns, oldest first.
    pub fn get_last_n(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Prompt forms of every cached message, request then response, oldest first.
    pub fn get_chat_history(&self) -> Vec<String> {
        self.turns
            .iter()
            .flat_map(|turn| turn.messages())
            .map(|message| message.to_prompt_string())
            .collect()
    }

    /// Re-add a stored conversation's turns. Only the last `capacity` survive.
    ///
    /// Returns how many turns were added.
    pub fn hydrate(&mut self, conversation: &Conversation) -> usize {
        let skip = conversation.turns.len().saturating_sub(self.capacity);
        let mut added = 0;
        for turn in conversation.turns.iter().skip(skip) {
            self.add(turn.clone());
            added += 1;
        }
        debug!(conversation = %conversation.uuid, added, "Hydrated message cache");
        added
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::{Message, start_conversation};

    fn turn(i: usize) -> Turn {
        Turn::new(
            Message::request("alice", format!("question {i}")),
            Message::response("bot", format!("answer {i}")),
        )
    }

    #[test]
    fn empty_cache_operations() {
        let cache = MessageCache::new(3);
        assert!(cache.is_empty());
        assert!(cache.get_all().is_empty());
        assert!(cache.get_last_n(5).is_empty());
        assert!(cache.get_chat_history().is_empty());
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut cache = MessageCache::new(2);
        let turns: Vec<_> = (0..3).map(turn).collect();
        for t in &turns {
            cache.add(t.clone());
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_all(), turns[1..].to_vec());
    }

    #[test]
    fn holds_most_recent_min_n_c() {
        for capacity in 1..6 {
            for adds in 0..10 {
                let mut cache = MessageCache::new(capacity);
                let turns: Vec<_> = (0..adds).map(turn).collect();
                for t in &turns {
                    cache.add(t.clone());
                }
                let kept = adds.min(capacity);
                assert_eq!(cache.get_all(), turns[adds - kept..].to_vec());
            }
        }
    }

    #[test]
    fn last_n_is_tail_of_all() {
        let mut cache = MessageCache::new(4);
        for i in 0..6 {
            cache.add(turn(i));
        }
        let all = cache.get_all();
        for n in 0..8 {
            let last = cache.get_last_n(n);
            assert_eq!(last.len(), n.min(all.len()));
            assert_eq!(last, all[all.len() - last.len()..].to_vec());
        }
    }

    #[test]
    fn chat_history_alternates_roles() {
        let mut cache = MessageCache::new(5);
        cache.add(turn(0));
        cache.add(turn(1));

        let history = cache.get_chat_history();
        assert_eq!(history.len(), 4);
        assert!(history[0].starts_with("<|im_start|>alice"));
        assert!(history[0].contains("question 0"));
        assert!(history[1].starts_with("<|im_start|>bot"));
        assert!(history[3].contains("answer 1"));
        assert!(history[3].ends_with("<|im_end|>"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = MessageCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.add(turn(0));
        cache.add(turn(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hydrate_keeps_newest_turns() {
        let mut conversation = start_conversation("alice", false, "bot", true);
        for i in 0..5 {
            conversation.push_turn(turn(i));
        }

        let mut cache = MessageCache::new(3);
        assert_eq!(cache.hydrate(&conversation), 3);
        assert_eq!(cache.get_all(), conversation.turns[2..].to_vec());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 3);
    }
}
