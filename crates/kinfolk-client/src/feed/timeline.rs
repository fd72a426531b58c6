use std::collections::{HashSet, VecDeque};

use kinfolk_shared::{Message, MessageId};

/// Ordered message list fed by two writers (local writes and remote
/// events), deduplicated by id.
///
/// Deleted ids are tombstoned so a late insert for them never resurrects
/// the row. Only the most recent [`MAX_TOMBSTONES`] deletions are kept.
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    tombstones: HashSet<MessageId>,
    tombstone_order: VecDeque<MessageId>,
}

/// Late inserts arrive within seconds of their delete; older tombstones are
/// dropped oldest first.
pub const MAX_TOMBSTONES: usize = 1024;

impl Timeline {
    /// Replace the contents with a freshly fetched list.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        self.ids.clear();
        for message in messages {
            self.append(message);
        }
    }

    /// Append at the tail. Returns false when the id is already present or
    /// was deleted.
    pub fn append(&mut self, message: Message) -> bool {
        if self.tombstones.contains(&message.id) || !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Remove and tombstone. Returns whether the row was present.
    pub fn remove(&mut self, id: MessageId) -> bool {
        self.tombstone(id);
        if !self.ids.remove(&id) {
            return false;
        }
        self.messages.retain(|m| m.id != id);
        true
    }

    fn tombstone(&mut self, id: MessageId) {
        if !self.tombstones.insert(id) {
            return;
        }
        self.tombstone_order.push_back(id);
        if self.tombstone_order.len() > MAX_TOMBSTONES {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}
