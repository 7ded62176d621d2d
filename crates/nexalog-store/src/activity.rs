//! Friend-list activity ordering and online presence.
//!
//! Both indexes are fed by every inbound event regardless of which thread is
//! open. Neither gates message delivery.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use nexalog_shared::UserId;

use crate::models::FriendEntry;

/// Result of [`ActivityIndex::bump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpOutcome {
    /// The entry existed and is now first.
    Moved,
    /// The user was not listed; a new entry was put first.
    Inserted,
}

/// Friend / conversation list ordered by most recent activity.
#[derive(Debug, Clone, Default)]
pub struct ActivityIndex {
    entries: Vec<FriendEntry>,
}

impl ActivityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a freshly fetched page.
    ///
    /// Rows the page reports without an activity time keep the one recorded
    /// locally. The result is ordered by most recent activity; rows without
    /// any keep the page order, after the others.
    pub fn replace(&mut self, mut entries: Vec<FriendEntry>) {
        for entry in entries.iter_mut().filter(|e| e.last_activity_at.is_none()) {
            entry.last_activity_at = self.last_activity(entry.user_id);
        }
        entries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        self.entries = entries;
    }

    /// Move `user` to the front and record `at` as its last activity.
    ///
    /// Last write wins: `at` is stored even if it is older than the
    /// current value.
    pub fn bump(&mut self, user: UserId, at: DateTime<Utc>) -> BumpOutcome {
        let (mut entry, outcome) = match self.entries.iter().position(|e| e.user_id == user) {
            Some(idx) => (self.entries.remove(idx), BumpOutcome::Moved),
            None => (FriendEntry::new(user), BumpOutcome::Inserted),
        };
        entry.last_activity_at = Some(at);
        self.entries.insert(0, entry);

        debug!(user = %user, outcome = ?outcome, "Bumped friend activity");
        outcome
    }

    pub fn entries(&self) -> &[FriendEntry] {
        &self.entries
    }

    pub fn last_activity(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .find(|e| e.user_id == user)
            .and_then(|e| e.last_activity_at)
    }
}

/// Online flags keyed by user.
#[derive(Debug, Clone, Default)]
pub struct PresenceIndex {
    online: HashMap<UserId, bool>,
}

impl PresenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&mut self, user: UserId, online: bool) {
        self.online.insert(user, online);
    }

    /// Users never reported are considered offline.
    pub fn is_online(&self, user: UserId) -> bool {
        self.online.get(&user).copied().unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .online
            .iter()
            .filter(|(_, online)| **online)
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        users
    }
}
