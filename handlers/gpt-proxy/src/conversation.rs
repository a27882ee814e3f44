//! Short-lived conversation history shared across invocations.
//!
//! Keys are `"{mode}:{context_id}"`. Entries are created on first reference
//! and live only as long as the process; a scaled-out deployment gets no
//! cross-instance consistency. Growth is bounded by a TTL and a hard entry
//! cap, evicting the least recently touched conversation first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::openai::ChatMessage;

struct Entry {
    messages: Vec<ChatMessage>,
    touched: Instant,
}

pub struct ConversationStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl ConversationStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Append the user's turn and return the full history to send upstream.
    pub fn push_user(&self, key: &str, prompt: &str) -> Vec<ChatMessage> {
        let mut entries = self.entries.lock();
        self.evict(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            messages: Vec::new(),
            touched: Instant::now(),
        });
        entry.messages.push(ChatMessage::user(prompt));
        entry.touched = Instant::now();
        entry.messages.clone()
    }

    /// Record the assistant's reply for an existing conversation.
    pub fn push_assistant(&self, key: &str, text: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.messages.push(ChatMessage::assistant(text));
            entry.touched = Instant::now();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, entries: &mut HashMap<String, Entry>, incoming: &str) {
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.touched) < self.ttl);
        while entries.len() >= self.capacity && !entries.contains_key(incoming) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!(%key, "evicting conversation at capacity");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
