use std::collections::{btree_map, BTreeMap, VecDeque};

use crate::{
    domain::{ChannelId, ListId, ListKey},
    ports::ContentList,
};

/// Relay state for one content list.
#[derive(Clone, Debug)]
pub struct ListState {
    /// Name as first observed on the content platform.
    pub name: String,
    pub source_id: ListId,
    /// Bound once by the reconciler, never changed afterwards.
    pub destination: Option<ChannelId>,
    /// Formatted messages awaiting delivery, oldest first.
    pub pending: VecDeque<String>,
}

impl ListState {
    pub fn new(name: impl Into<String>, source_id: ListId) -> Self {
        Self {
            name: name.into(),
            source_id,
            destination: None,
            pending: VecDeque::new(),
        }
    }
}

/// All lists ever observed, keyed by case-folded name.
///
/// Lists are only added, never removed: a list that disappears upstream keeps
/// its channel and queue for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ListRegistry {
    lists: BTreeMap<ListKey, ListState>,
}

impl ListRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any list not seen before. Returns the keys that were added.
    pub fn observe(&mut self, memberships: impl IntoIterator<Item = ContentList>) -> Vec<ListKey> {
        let mut added = Vec::new();
        for list in memberships {
            let key = ListKey::new(&list.name);
            if let btree_map::Entry::Vacant(slot) = self.lists.entry(key.clone()) {
                slot.insert(ListState::new(list.name, list.id));
                added.push(key);
            }
        }
        added
    }

    pub fn get(&self, key: &ListKey) -> Option<&ListState> {
        self.lists.get(key)
    }

    pub fn get_mut(&mut self, key: &ListKey) -> Option<&mut ListState> {
        self.lists.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ListKey, &ListState)> {
        self.lists.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ListKey, &mut ListState)> {
        self.lists.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn pending_total(&self) -> usize {
        self.lists.values().map(|l| l.pending.len()).sum()
    }
}
