//! The reconciling message store.
//!
//! A [`Timeline`] holds the ordered messages of the thread currently open and
//! is the only place that sequence is mutated. REST pages, push events and
//! local optimistic writes all funnel through [`Timeline::append`],
//! [`Timeline::prepend`] and [`Timeline::mark_deleted`].
//!
//! `append` is idempotent under redelivery and tolerant of reordering:
//! a message is matched by identity first, then an optimistic echo is
//! matched by (thread, sender, content), and only then is a new row added.

use std::collections::HashSet;

use tracing::debug;

use nexalog_shared::MessageId;

use crate::models::Message;

/// What [`Timeline::append`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// An entry with the same identity was updated in place.
    Merged(usize),
    /// The same identity was already present with identical fields.
    Unchanged(usize),
    /// An optimistic entry was replaced by its confirmed copy.
    Reconciled(usize),
    /// A new entry was added at the end.
    Appended(usize),
}

impl AppendOutcome {
    pub fn index(&self) -> usize {
        match *self {
            Self::Merged(i) | Self::Unchanged(i) | Self::Reconciled(i) | Self::Appended(i) => i,
        }
    }

    /// Whether the view should follow the newest message.
    pub fn should_scroll(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

/// Ordered messages of one conversation or channel.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a message.
    pub fn append(&mut self, incoming: Message) -> AppendOutcome {
        if let Some(idx) = self.position(&incoming.id) {
            let entry = &mut self.messages[idx];
            let before = entry.clone();
            let keep_optimistic = incoming.id.is_temporary() && incoming.optimistic;
            merge_into(entry, incoming, true);
            entry.optimistic = keep_optimistic;

            if *entry == before {
                debug!(id = %entry.id, "Duplicate delivery ignored");
                return AppendOutcome::Unchanged(idx);
            }
            debug!(id = %entry.id, index = idx, "Merged message in place");
            return AppendOutcome::Merged(idx);
        }

        if incoming.id.is_durable() {
            if let Some(idx) = self.optimistic_echo(&incoming) {
                let entry = &mut self.messages[idx];
                debug!(
                    temp = %entry.id,
                    confirmed = %incoming.id,
                    index = idx,
                    "Reconciled optimistic message"
                );
                entry.id = incoming.id.clone();
                merge_into(entry, incoming, false);
                entry.optimistic = false;
                return AppendOutcome::Reconciled(idx);
            }
        }

        self.messages.push(incoming);
        AppendOutcome::Appended(self.messages.len() - 1)
    }

    /// Merge the first page of a freshly opened thread.
    ///
    /// Entries already present arrived by push while the page was in
    /// flight, so page rows that are new to the timeline are placed ahead
    /// of them. Rows the timeline already holds are merged in place.
    /// Returns whether anything changed.
    pub fn load_page(&mut self, mut page: Vec<Message>) -> bool {
        page.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let held = self.messages.len();
        let mut changed = false;
        for message in page {
            changed |= self.append(message).should_scroll();
        }

        let added = self.messages.len() - held;
        if held > 0 && added > 0 {
            debug!(held, added, "Page rows placed ahead of pushed messages");
            self.messages.rotate_right(added);
        }
        changed
    }

    /// Insert an older page before the current start.
    ///
    /// The page is sorted ascending by `created_at`. Returns how many
    /// messages were inserted; entries whose durable identity is already
    /// loaded are skipped.
    pub fn prepend(&mut self, mut older: Vec<Message>) -> usize {
        older.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut seen: HashSet<i64> = self
            .messages
            .iter()
            .filter_map(|m| m.id.as_durable())
            .collect();
        older.retain(|m| match m.id.as_durable() {
            Some(id) => seen.insert(id),
            None => true,
        });

        let inserted = older.len();
        older.append(&mut self.messages);
        self.messages = older;
        inserted
    }

    /// Flag a message as deleted without moving it. Returns `false` when no
    /// entry carries `id`.
    pub fn mark_deleted(&mut self, id: &MessageId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.messages[idx].deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
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

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|idx| &self.messages[idx])
    }

    /// Cursor for the next older page.
    pub fn oldest_durable_id(&self) -> Option<i64> {
        self.messages.iter().find_map(|m| m.id.as_durable())
    }

    fn optimistic_echo(&self, confirmed: &Message) -> Option<usize> {
        self.messages.iter().position(|m| {
            m.optimistic
                && m.id.is_temporary()
                && m.thread_id == confirmed.thread_id
                && m.sender_id == confirmed.sender_id
                && m.content == confirmed.content
        })
    }
}

/// Overlay `incoming` onto `entry`. Optional fields only overwrite when
/// present; `deleted` never reverts.
fn merge_into(entry: &mut Message, incoming: Message, keep_created_at: bool) {
    entry.content = incoming.content;
    entry.edited = incoming.edited;
    entry.deleted |= incoming.deleted;
    if !keep_created_at {
        entry.created_at = incoming.created_at;
    }
    if incoming.thread_id.is_some() {
        entry.thread_id = incoming.thread_id;
    }
    if incoming.sender_id.is_some() {
        entry.sender_id = incoming.sender_id;
    }
    if incoming.recipient_id.is_some() {
        entry.recipient_id = incoming.recipient_id;
    }
    if incoming.author.is_some() {
        entry.author = incoming.author;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use nexalog_shared::{ThreadId, UserId};

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn msg(id: MessageId, content: &str, at: i64) -> Message {
        Message {
            id,
            thread_id: Some(ThreadId(5)),
            sender_id: Some(UserId(7)),
            recipient_id: None,
            content: content.to_string(),
            created_at: t(at),
            edited: false,
            deleted: false,
            optimistic: false,
            author: None,
        }
    }

    fn durable(id: i64, content: &str, at: i64) -> Message {
        msg(MessageId::Durable(id), content, at)
    }

    fn optimistic(token: &str, content: &str, at: i64) -> Message {
        let mut m = msg(MessageId::temporary(token), content, at);
        m.optimistic = true;
        m
    }

    fn ids(tl: &Timeline) -> Vec<String> {
        tl.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn test_idempotent_append() {
        let mut tl = Timeline::new();
        tl.append(durable(1, "a", 0));
        assert_eq!(tl.append(durable(2, "b", 1)), AppendOutcome::Appended(1));
        tl.append(durable(3, "c", 2));

        let outcome = tl.append(durable(2, "b", 1));
        assert_eq!(outcome, AppendOutcome::Unchanged(1));
        assert!(!outcome.should_scroll());
        assert_eq!(ids(&tl), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_optimistic_reconciliation_in_place() {
        let mut tl = Timeline::new();
        tl.append(durable(40, "before", 0));
        tl.append(optimistic("1", "hi", 1));
        tl.append(durable(41, "after", 2));

        let outcome = tl.append(durable(42, "hi", 3));
        assert_eq!(outcome, AppendOutcome::Reconciled(1));
        assert_eq!(tl.len(), 3);

        let confirmed = &tl.messages()[1];
        assert_eq!(confirmed.id, MessageId::Durable(42));
        assert!(!confirmed.optimistic);
        assert_eq!(confirmed.created_at, t(3));
    }

    #[test]
    fn test_reconciliation_requires_matching_sender_thread_content() {
        let mut tl = Timeline::new();
        tl.append(optimistic("1", "hi", 0));

        let mut other_sender = durable(42, "hi", 1);
        other_sender.sender_id = Some(UserId(8));
        assert_eq!(tl.append(other_sender), AppendOutcome::Appended(1));

        let mut other_thread = durable(43, "hi", 1);
        other_thread.thread_id = Some(ThreadId(6));
        assert_eq!(tl.append(other_thread), AppendOutcome::Appended(2));

        assert_eq!(tl.append(durable(44, "hello", 1)), AppendOutcome::Appended(3));
        assert!(tl.messages()[0].optimistic);
    }

    #[test]
    fn test_identical_sends_reconcile_oldest_first() {
        let mut tl = Timeline::new();
        tl.append(optimistic("a", "ok", 0));
        tl.append(optimistic("b", "ok", 1));

        assert_eq!(tl.append(durable(10, "ok", 2)), AppendOutcome::Reconciled(0));
        assert_eq!(tl.append(durable(11, "ok", 3)), AppendOutcome::Reconciled(1));
        assert_eq!(ids(&tl), vec!["10", "11"]);
    }

    #[test]
    fn test_confirmation_then_push_echo_is_single_entry() {
        let mut tl = Timeline::new();
        tl.append(optimistic("1", "hi", 0));
        tl.append(durable(42, "hi", 1));
        assert_eq!(tl.append(durable(42, "hi", 1)), AppendOutcome::Unchanged(0));
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn test_edit_merges_and_keeps_created_at() {
        let mut tl = Timeline::new();
        tl.append(durable(7, "draft", 0));

        let mut edit = durable(7, "final", 30);
        edit.edited = true;
        edit.sender_id = None;
        assert_eq!(tl.append(edit), AppendOutcome::Merged(0));

        let m = &tl.messages()[0];
        assert_eq!(m.content, "final");
        assert!(m.edited);
        assert_eq!(m.created_at, t(0));
        assert_eq!(m.sender_id, Some(UserId(7)));
    }

    #[test]
    fn test_page_lands_ahead_of_pushed_messages() {
        let mut tl = Timeline::new();
        tl.append(durable(20, "hey", 3));
        tl.append(optimistic("a", "reply", 4));

        assert!(tl.load_page(vec![durable(20, "hey", 3), durable(19, "hi", 2), durable(18, "yo", 1)]));
        assert_eq!(ids(&tl), vec!["18", "19", "20", "tmp-a"]);

        // Nothing new: order and contents stay put.
        assert!(!tl.load_page(vec![durable(19, "hi", 2)]));
        assert_eq!(ids(&tl), vec!["18", "19", "20", "tmp-a"]);
    }

    #[test]
    fn test_page_into_empty_timeline() {
        let mut tl = Timeline::new();
        assert!(tl.load_page(vec![durable(2, "b", 2), durable(1, "a", 1)]));
        assert_eq!(ids(&tl), vec!["1", "2"]);
        assert!(!tl.load_page(Vec::new()));
    }

    #[test]
    fn test_prepend_ordering() {
        let mut tl = Timeline::new();
        tl.append(durable(3, "c", 10));
        tl.append(durable(4, "d", 11));

        let inserted = tl.prepend(vec![durable(2, "b", 2), durable(1, "a", 1)]);
        assert_eq!(inserted, 2);
        assert_eq!(ids(&tl), vec!["1", "2", "3", "4"]);
        assert_eq!(tl.oldest_durable_id(), Some(1));
    }

    #[test]
    fn test_prepend_skips_loaded_ids() {
        let mut tl = Timeline::new();
        tl.append(durable(3, "c", 10));
        let inserted = tl.prepend(vec![durable(2, "b", 2), durable(3, "c", 10)]);
        assert_eq!(inserted, 1);
        assert_eq!(ids(&tl), vec!["2", "3"]);
    }

    #[test]
    fn test_mark_deleted_preserves_position() {
        let mut tl = Timeline::new();
        for id in 9..=11 {
            tl.append(durable(id, "x", id));
        }
        let before = tl.messages().to_vec();

        assert!(tl.mark_deleted(&MessageId::Durable(10)));
        assert_eq!(ids(&tl), vec!["9", "10", "11"]);

        let m = &tl.messages()[1];
        assert!(m.deleted);
        assert_eq!(m.display_content(), None);
        let mut expected = before[1].clone();
        expected.deleted = true;
        assert_eq!(*m, expected);
        assert_eq!(tl.messages()[0], before[0]);
    }

    #[test]
    fn test_delete_is_sticky_across_merges() {
        let mut tl = Timeline::new();
        tl.append(durable(1, "x", 0));
        tl.mark_deleted(&MessageId::Durable(1));
        tl.append(durable(1, "x", 0));
        assert!(tl.messages()[0].deleted);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut tl = Timeline::new();
        tl.append(durable(1, "x", 0));
        assert!(!tl.mark_deleted(&MessageId::Durable(99)));
        assert!(!tl.messages()[0].deleted);
    }

    #[test]
    fn test_reset() {
        let mut tl = Timeline::new();
        tl.append(durable(1, "x", 0));
        tl.reset();
        assert!(tl.is_empty());
        assert_eq!(tl.oldest_durable_id(), None);
    }
}
