//! services/engine/src/stores/conversations.rs
//!
//! Message history per conversation. Pushed messages and fetched history
//! meet here: identity is the message id, so re-delivery is a no-op,
//! `status` and `reactions` are last-write-wins, and `content`/`timestamp`
//! never change once seen. Display order is (timestamp, id) regardless of
//! arrival order.

use std::collections::HashMap;

use praxis_core::domain::{
    Conversation, ConversationSummary, Message, MessageRole, MessageStatus,
};

use super::{CacheEntry, CacheLookup};

/// What patching one pushed message into the store did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageApplied {
    /// New message id; it was inserted in display order.
    Inserted,
    /// Known message id; mutable fields were merged, nothing else changed.
    Merged,
    /// The conversation is not cached; the aggregate was marked for
    /// refetch instead of patching a stale reference.
    Uncached,
}

pub struct ConversationStore {
    conversations: HashMap<String, CacheEntry<Conversation>>,
    summaries: Option<CacheEntry<Vec<ConversationSummary>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
            summaries: None,
        }
    }

    pub fn get(&self, conversation_id: &str) -> CacheLookup<&Conversation> {
        match self.conversations.get(conversation_id) {
            Some(entry) if entry.is_stale() => CacheLookup::Stale(entry.value()),
            Some(entry) => CacheLookup::Fresh(entry.value()),
            None => CacheLookup::Miss,
        }
    }

    pub fn summaries(&self) -> CacheLookup<&[ConversationSummary]> {
        match &self.summaries {
            Some(entry) if entry.is_stale() => CacheLookup::Stale(entry.value()),
            Some(entry) => CacheLookup::Fresh(entry.value()),
            None => CacheLookup::Miss,
        }
    }

    pub fn reconcile_summaries(&mut self, summaries: Vec<ConversationSummary>) {
        match &mut self.summaries {
            Some(entry) => entry.reconcile(summaries),
            None => self.summaries = Some(CacheEntry::fresh(summaries)),
        }
    }

    /// Merges a fetched conversation with whatever was already pushed.
    /// Messages the fetch does not know yet (pushed while the fetch was in
    /// flight) survive the merge.
    pub fn reconcile(&mut self, mut fetched: Conversation) {
        if let Some(entry) = self.conversations.get(&fetched.id) {
            for message in entry.value().messages.clone() {
                merge_message(&mut fetched.messages, message);
            }
        }
        sort_for_display(&mut fetched.messages);
        match self.conversations.get_mut(&fetched.id) {
            Some(entry) => entry.reconcile(fetched),
            None => {
                self.conversations
                    .insert(fetched.id.clone(), CacheEntry::fresh(fetched));
            }
        }
    }

    /// Patches one pushed message into its conversation. Counts a newly
    /// inserted client message as unread.
    pub fn apply_message(&mut self, conversation_id: &str, message: Message) -> MessageApplied {
        let Some(entry) = self.conversations.get_mut(conversation_id) else {
            // Never patch into an aggregate we do not hold; force a refetch.
            self.invalidate_summaries();
            return MessageApplied::Uncached;
        };

        let from_client = message.role == MessageRole::User;
        let conversation = entry.value_mut();
        let applied = if merge_message(&mut conversation.messages, message) {
            if from_client {
                conversation.new_client_messages_count += 1;
            }
            sort_for_display(&mut conversation.messages);
            MessageApplied::Inserted
        } else {
            MessageApplied::Merged
        };
        self.invalidate_summaries();
        applied
    }

    /// Appends the business user's own message before the send completes.
    pub fn apply_local_message(&mut self, conversation_id: &str, message: Message) {
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            let conversation = entry.value_mut();
            merge_message(&mut conversation.messages, message);
            sort_for_display(&mut conversation.messages);
        }
    }

    /// Marks a locally appended message as handed to the channel (or as
    /// failed, when the channel rejected it).
    pub fn set_message_status(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) {
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            let messages = &mut entry.value_mut().messages;
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.status = Some(status);
            }
        }
    }

    /// Drops a locally appended message whose send was rolled back.
    pub fn remove_message(&mut self, conversation_id: &str, message_id: &str) {
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry
                .value_mut()
                .messages
                .retain(|message| message.id != message_id);
        }
    }

    pub fn mark_read(&mut self, conversation_id: &str) {
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.value_mut().new_client_messages_count = 0;
        }
        self.invalidate_summaries();
    }

    /// The conversation ids currently held, for gap-recovery refetches.
    pub fn cached_ids(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    pub fn invalidate(&mut self, conversation_id: &str) {
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.mark_stale();
        }
    }

    pub fn invalidate_summaries(&mut self) {
        if let Some(entry) = &mut self.summaries {
            entry.mark_stale();
        }
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.conversations.values_mut() {
            entry.mark_stale();
        }
        self.invalidate_summaries();
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges one message into a list by id. Returns true when the id was new.
/// For a known id, `status` and `reactions` take the incoming value and
/// `content`/`timestamp` keep the first-seen one.
fn merge_message(messages: &mut Vec<Message>, incoming: Message) -> bool {
    match messages.iter_mut().find(|m| m.id == incoming.id) {
        Some(existing) => {
            if incoming.status.is_some() {
                existing.status = incoming.status;
            }
            existing.reactions = incoming.reactions;
            false
        }
        None => {
            messages.push(incoming);
            true
        }
    }
}

fn sort_for_display(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use praxis_core::domain::Reaction;
    use uuid::Uuid;

    fn message(id: &str, minute: u32, role: MessageRole) -> Message {
        Message {
            id: id.to_string(),
            content: format!("message {id}"),
            role,
            timestamp: Utc.with_ymd_and_hms(2024, 12, 2, 12, minute, 0).unwrap(),
            media: None,
            status: None,
            reactions: Vec::new(),
        }
    }

    fn conversation(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            client_id: "5544998877@c.us".to_string(),
            business_id: Uuid::nil(),
            messages: Vec::new(),
            new_client_messages_count: 0,
        }
    }

    #[test]
    fn duplicate_delivery_is_a_no_op() {
        let mut store = ConversationStore::new();
        store.reconcile(conversation("chat-1"));

        let pushed = message("m-1", 0, MessageRole::User);
        assert_eq!(
            store.apply_message("chat-1", pushed.clone()),
            MessageApplied::Inserted
        );
        assert_eq!(store.apply_message("chat-1", pushed), MessageApplied::Merged);

        let cached = store.get("chat-1").cached().unwrap();
        assert_eq!(cached.messages.len(), 1);
        assert_eq!(cached.new_client_messages_count, 1);
    }

    #[test]
    fn redelivery_merges_status_and_reactions_only() {
        let mut store = ConversationStore::new();
        store.reconcile(conversation("chat-1"));
        store.apply_message("chat-1", message("m-1", 0, MessageRole::User));

        let mut redelivered = message("m-1", 30, MessageRole::User);
        redelivered.content = "rewritten".to_string();
        redelivered.status = Some(MessageStatus::Read);
        redelivered.reactions = vec![Reaction {
            emoji: "👍".to_string(),
            sender_id: "5544998877@c.us".to_string(),
        }];
        store.apply_message("chat-1", redelivered);

        let cached = store.get("chat-1").cached().unwrap();
        let kept = &cached.messages[0];
        assert_eq!(kept.content, "message m-1");
        assert_eq!(kept.timestamp.format("%M").to_string(), "00");
        assert_eq!(kept.status, Some(MessageStatus::Read));
        assert_eq!(kept.reactions.len(), 1);
    }

    #[test]
    fn messages_render_in_timestamp_order_with_id_tie_break() {
        let mut store = ConversationStore::new();
        store.reconcile(conversation("chat-1"));

        // Delivered out of order, plus a timestamp tie.
        store.apply_message("chat-1", message("m-3", 10, MessageRole::Assistant));
        store.apply_message("chat-1", message("m-1", 0, MessageRole::User));
        store.apply_message("chat-1", message("m-4", 10, MessageRole::User));

        let cached = store.get("chat-1").cached().unwrap();
        let ids: Vec<&str> = cached.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-3", "m-4"]);
    }

    #[test]
    fn uncached_conversation_is_never_patched() {
        let mut store = ConversationStore::new();
        store.reconcile_summaries(Vec::new());
        assert_eq!(
            store.apply_message("chat-9", message("m-1", 0, MessageRole::User)),
            MessageApplied::Uncached
        );
        assert!(store.get("chat-9").cached().is_none());
        assert!(matches!(store.summaries(), CacheLookup::Stale(_)));
    }

    #[test]
    fn fetch_merge_keeps_messages_pushed_during_the_fetch() {
        let mut store = ConversationStore::new();
        store.reconcile(conversation("chat-1"));
        store.apply_message("chat-1", message("m-push", 5, MessageRole::User));

        // The fetch raced the push and does not contain m-push yet.
        let mut fetched = conversation("chat-1");
        fetched.messages = vec![message("m-old", 0, MessageRole::Business)];
        store.reconcile(fetched);

        let cached = store.get("chat-1").cached().unwrap();
        let ids: Vec<&str> = cached.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-old", "m-push"]);
        assert!(store.get("chat-1").is_fresh());
    }

    #[test]
    fn mark_read_resets_the_unread_counter() {
        let mut store = ConversationStore::new();
        store.reconcile(conversation("chat-1"));
        store.apply_message("chat-1", message("m-1", 0, MessageRole::User));
        store.apply_message("chat-1", message("m-2", 1, MessageRole::User));

        store.mark_read("chat-1");
        assert_eq!(
            store.get("chat-1").cached().unwrap().new_client_messages_count,
            0
        );
    }
}
