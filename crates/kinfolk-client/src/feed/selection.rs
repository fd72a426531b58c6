use kinfolk_shared::MessageId;

/// Messages marked for batch deletion.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    active: bool,
    ids: Vec<MessageId>,
}

impl Selection {
    /// Long press: enter selection mode with `id`, or toggle it when
    /// already selecting.
    pub fn long_press(&mut self, id: MessageId) {
        if self.active {
            self.toggle(id);
        } else {
            self.active = true;
            self.ids = vec![id];
        }
    }

    /// Tap: toggle membership, only while selecting.
    pub fn tap(&mut self, id: MessageId) {
        if self.active {
            self.toggle(id);
        }
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.ids.clear();
    }

    /// Drop an id that no longer exists.
    pub fn forget(&mut self, id: MessageId) {
        self.ids.retain(|s| *s != id);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn toggle(&mut self, id: MessageId) {
        if self.contains(id) {
            self.forget(id);
        } else {
            self.ids.push(id);
        }
    }
}
