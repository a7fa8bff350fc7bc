use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;

/// In-memory conversation histories keyed by conversation id
///
/// Histories are append-only and live as long as the store. Appending to an id that was
/// never seen creates it, so callers never have to pre-register a conversation.
///
/// A turn that reads a history and then extends it should hold [`ConversationStore::lock_turn`]
/// for that conversation so concurrent turns on one id do not interleave.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    turns: Mutex<HashMap<String, Arc<TurnLock<()>>>>,
    counter: AtomicU64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Message>>> {
        // histories stay valid across a panicking holder
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mint_locked(&self, conversations: &mut HashMap<String, Vec<Message>>) -> String {
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let id = format!("thread_{}", n);
            // Skip ids a caller already claimed by name
            if !conversations.contains_key(&id) {
                conversations.insert(id.clone(), Vec::new());
                return id;
            }
        }
    }

    /// Wait until no other turn is running on this conversation
    pub async fn lock_turn(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut turns = self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(turns.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Mint a fresh conversation id with an empty history
    pub fn mint_id(&self) -> String {
        let mut conversations = self.lock();
        self.mint_locked(&mut conversations)
    }

    /// Look up a conversation, creating it when the id is unknown or missing
    pub fn get_or_create(&self, id: Option<&str>) -> (String, Vec<Message>) {
        let mut conversations = self.lock();
        match id {
            Some(id) => {
                let history = conversations.entry(id.to_string()).or_default().clone();
                (id.to_string(), history)
            }
            None => (self.mint_locked(&mut conversations), Vec::new()),
        }
    }

    /// Extend the history of a conversation, in order
    pub fn append(&self, id: &str, messages: impl IntoIterator<Item = Message>) {
        let mut conversations = self.lock();
        conversations
            .entry(id.to_string())
            .or_default()
            .extend(messages);
    }

    /// The current history of a known conversation
    pub fn history(&self, id: &str) -> AgentResult<Vec<Message>> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::UnknownConversation(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
