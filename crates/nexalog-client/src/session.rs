//! Session controller.
//!
//! [`Session`] owns everything the chat screen shows: the open thread and
//! its [`Timeline`], the friend activity order and presence. It performs no
//! I/O. Each operation returns the [`Effect`]s the runtime must carry out
//! (control signals, backend requests, UI hints) and backend results come
//! back through [`Session::complete`].
//!
//! Every request carries a [`SessionTicket`]. Opening or closing a thread
//! starts a new epoch, so results issued for an earlier thread are dropped
//! when they arrive instead of leaking into the new one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use nexalog_net::{NetError, PageRequest};
use nexalog_shared::constants::{CHANNEL_PAGE_SIZE, CONVERSATION_PAGE_SIZE, FRIEND_PAGE_SIZE};
use nexalog_shared::identity::{self, CONTENT_FIELDS, CREATED_AT_FIELDS};
use nexalog_shared::visibility::is_visible;
use nexalog_shared::{ControlSignal, PushEvent, RawRecord, Scope, ScopeKind, ThreadId, UserId};
use nexalog_store::normalize::{friend_entry, mint_temporary_id, parse_timestamp};
use nexalog_store::{
    normalize, ActivityIndex, BumpOutcome, Message, NormalizeContext, PresenceIndex, Timeline,
};

use crate::error::SessionError;
use crate::state::ViewSnapshot;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The direct conversation with a user. Its identity is resolved through
    /// the backend the first time.
    Peer(UserId),
    Channel(ThreadId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
    pub conversation: u32,
    pub channel: u32,
    pub friends: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            conversation: CONVERSATION_PAGE_SIZE,
            channel: CHANNEL_PAGE_SIZE,
            friends: FRIEND_PAGE_SIZE,
        }
    }
}

impl PageSizes {
    fn for_kind(&self, kind: ScopeKind) -> u32 {
        match kind {
            ScopeKind::Conversation => self.conversation,
            ScopeKind::Channel => self.channel,
        }
    }
}

/// Identifies the session a request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
    scope: Option<Scope>,
}

impl SessionTicket {
    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }
}

/// Backend work requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ResolveConversation {
        ticket: SessionTicket,
        peer: UserId,
    },
    FetchPage {
        ticket: SessionTicket,
        scope: Scope,
        page: PageRequest,
        /// `true` for history pages that go before the loaded messages.
        older: bool,
    },
    Send {
        ticket: SessionTicket,
        scope: Scope,
        content: String,
    },
    FetchFriends {
        page: u32,
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Signal(ControlSignal),
    Request(Request),
    /// The newest message changed; the view should follow it.
    ScrollToBottom,
}

/// Result of a [`Request`], fed back through [`Session::complete`].
#[derive(Debug)]
pub enum Completion {
    Resolved {
        ticket: SessionTicket,
        result: nexalog_net::Result<ThreadId>,
    },
    Page {
        ticket: SessionTicket,
        limit: u32,
        older: bool,
        result: nexalog_net::Result<Vec<RawRecord>>,
    },
    Sent {
        ticket: SessionTicket,
        result: nexalog_net::Result<Option<RawRecord>>,
    },
    Friends {
        result: nexalog_net::Result<Vec<RawRecord>>,
    },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    me: UserId,
    sizes: PageSizes,
    epoch: u64,
    scope: Option<Scope>,
    /// Other party of the open (or resolving) direct conversation.
    peer: Option<UserId>,
    timeline: Timeline,
    activity: ActivityIndex,
    presence: PresenceIndex,
    conversations: HashMap<UserId, ThreadId>,
    conversation_peers: HashMap<ThreadId, UserId>,
    error: Option<SessionError>,
    has_more: bool,
    loading_older: bool,
    connected: bool,
}

impl Session {
    pub fn new(me: UserId, sizes: PageSizes) -> Self {
        Self {
            me,
            sizes,
            epoch: 0,
            scope: None,
            peer: None,
            timeline: Timeline::new(),
            activity: ActivityIndex::new(),
            presence: PresenceIndex::new(),
            conversations: HashMap::new(),
            conversation_peers: HashMap::new(),
            error: None,
            has_more: false,
            loading_older: false,
            connected: false,
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn peer(&self) -> Option<UserId> {
        self.peer
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn activity(&self) -> &ActivityIndex {
        &self.activity
    }

    pub fn presence(&self) -> &PresenceIndex {
        &self.presence
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            me: Some(self.me),
            scope: self.scope,
            peer: self.peer,
            messages: self.timeline.messages().to_vec(),
            friends: self.activity.entries().to_vec(),
            online: self.presence.online_users(),
            error: self.error.clone(),
            has_more: self.has_more,
            loading_older: self.loading_older,
            connected: self.connected,
        }
    }

    // -- Thread lifecycle --

    /// Switch to `target`, leaving the current thread first.
    ///
    /// The scope is set before the initial page is requested, so push
    /// events for the new thread are accepted while the fetch is pending.
    pub fn open(&mut self, target: Target) -> Vec<Effect> {
        let mut effects = self.leave();
        info!(target = ?target, "Opening thread");

        match target {
            Target::Channel(id) => self.enter(Scope::channel(id), None, &mut effects),
            Target::Peer(peer) => {
                self.peer = Some(peer);
                match self.conversations.get(&peer).copied() {
                    Some(thread) => {
                        self.enter(Scope::conversation(thread), Some(peer), &mut effects)
                    }
                    None => effects.push(Effect::Request(Request::ResolveConversation {
                        ticket: self.ticket(),
                        peer,
                    })),
                }
            }
        }
        effects
    }

    pub fn close(&mut self) -> Vec<Effect> {
        let effects = self.leave();
        debug!("Thread closed");
        effects
    }

    /// Leave the current thread, if any, and start a new epoch with an
    /// empty store.
    fn leave(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(scope) = self.scope.take() {
            debug!(scope = %scope, "Leaving thread");
            effects.push(Effect::Signal(ControlSignal::Leave(scope)));
        }
        self.peer = None;
        self.epoch += 1;
        self.timeline.reset();
        self.error = None;
        self.has_more = false;
        self.loading_older = false;
        effects
    }

    fn enter(&mut self, scope: Scope, peer: Option<UserId>, effects: &mut Vec<Effect>) {
        self.scope = Some(scope);
        self.peer = peer;
        if let (ScopeKind::Conversation, Some(peer)) = (scope.kind, peer) {
            self.conversations.insert(peer, scope.id);
            self.conversation_peers.insert(scope.id, peer);
        }

        effects.push(Effect::Signal(ControlSignal::Join(scope)));
        effects.push(Effect::Request(Request::FetchPage {
            ticket: self.ticket(),
            scope,
            page: PageRequest {
                limit: self.sizes.for_kind(scope.kind),
                before: None,
            },
            older: false,
        }));
    }

    // -- Local actions --

    /// Post `content` to the open thread. An optimistic entry is shown
    /// immediately and reconciled once the backend confirms it.
    pub fn send(&mut self, content: &str) -> Vec<Effect> {
        let content = content.trim();
        if content.is_empty() {
            return Vec::new();
        }
        let Some(scope) = self.scope else {
            debug!("Send ignored, no thread open");
            return Vec::new();
        };

        let now = Utc::now();
        let optimistic = Message {
            id: mint_temporary_id(now),
            thread_id: Some(scope.id),
            sender_id: Some(self.me),
            recipient_id: self.peer,
            content: content.to_string(),
            created_at: now,
            edited: false,
            deleted: false,
            optimistic: true,
            author: None,
        };
        debug!(id = %optimistic.id, scope = %scope, "Sending message");

        let mut effects = Vec::new();
        if self.timeline.append(optimistic).should_scroll() {
            effects.push(Effect::ScrollToBottom);
        }
        if let Some(peer) = self.peer {
            self.bump(peer, now, &mut effects);
        }
        effects.push(Effect::Request(Request::Send {
            ticket: self.ticket(),
            scope,
            content: content.to_string(),
        }));
        effects
    }

    /// Request the page before the oldest loaded message.
    pub fn load_older(&mut self) -> Vec<Effect> {
        let Some(scope) = self.scope else {
            return Vec::new();
        };
        if self.loading_older || !self.has_more {
            return Vec::new();
        }
        let Some(before) = self.timeline.oldest_durable_id() else {
            return Vec::new();
        };

        self.loading_older = true;
        vec![Effect::Request(Request::FetchPage {
            ticket: self.ticket(),
            scope,
            page: PageRequest {
                limit: self.sizes.for_kind(scope.kind),
                before: Some(before),
            },
            older: true,
        })]
    }

    pub fn refresh_friends(&self) -> Vec<Effect> {
        vec![Effect::Request(Request::FetchFriends {
            page: 1,
            limit: self.sizes.friends,
        })]
    }

    // -- Push channel --

    /// The push channel (re)connected: announce ourselves and re-join the
    /// open thread's room.
    pub fn on_connected(&mut self) -> Vec<Effect> {
        self.connected = true;
        let mut effects = vec![Effect::Signal(ControlSignal::UserJoin(self.me))];
        if let Some(scope) = self.scope {
            effects.push(Effect::Signal(ControlSignal::Join(scope)));
        }
        effects
    }

    pub fn on_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn on_push(&mut self, event: PushEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            PushEvent::MessageNew(raw) => {
                if self.is_direct(&raw) {
                    if let Some(other) = self.other_party(&raw) {
                        self.bump(other, event_time(&raw), &mut effects);
                    }
                }
                if self.is_visible(&raw) {
                    let message = normalize(&raw, &self.normalize_context());
                    if self.timeline.append(message).should_scroll() {
                        effects.push(Effect::ScrollToBottom);
                    }
                } else {
                    debug!("Push message for another thread");
                }
            }
            PushEvent::MessageEdited(raw) => self.apply_edit(&raw),
            PushEvent::MessageDeleted(raw) => self.apply_delete(&raw),
            PushEvent::InboxNew(raw) => {
                let open_here = matches!(
                    self.scope,
                    Some(scope) if scope.kind == ScopeKind::Conversation
                        && identity::conversation_id(&raw) == Some(scope.id)
                );
                if !open_here {
                    if let Some(other) = self.other_party(&raw) {
                        self.bump(other, event_time(&raw), &mut effects);
                    }
                }
            }
            PushEvent::PresenceOnline(user) => self.presence.set_online(user, true),
            PushEvent::PresenceOffline(user) => self.presence.set_online(user, false),
            PushEvent::Other { name } => debug!(event = %name, "Ignoring push event"),
        }

        effects
    }

    // -- Backend results --

    pub fn complete(&mut self, completion: Completion) -> Vec<Effect> {
        match completion {
            Completion::Resolved { ticket, result } => self.on_resolved(ticket, result),
            Completion::Page {
                ticket,
                limit,
                older: false,
                result,
            } => self.on_page(ticket, limit, result),
            Completion::Page {
                ticket,
                limit,
                older: true,
                result,
            } => {
                self.on_older_page(ticket, limit, result);
                Vec::new()
            }
            Completion::Sent { ticket, result } => self.on_sent(ticket, result),
            Completion::Friends { result } => {
                self.on_friends(result);
                Vec::new()
            }
        }
    }

    fn on_resolved(
        &mut self,
        ticket: SessionTicket,
        result: nexalog_net::Result<ThreadId>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.is_current(&ticket) {
            debug!(epoch = ticket.epoch, "Discarding stale conversation lookup");
            return effects;
        }
        let Some(peer) = self.peer else {
            return effects;
        };

        match result {
            Ok(thread) => self.enter(Scope::conversation(thread), Some(peer), &mut effects),
            Err(e) => {
                warn!(peer = %peer, error = %e, "Conversation lookup failed");
                self.error = Some(SessionError::Resolve(e.to_string()));
            }
        }
        effects
    }

    fn on_page(
        &mut self,
        ticket: SessionTicket,
        limit: u32,
        result: nexalog_net::Result<Vec<RawRecord>>,
    ) -> Vec<Effect> {
        if !self.is_current(&ticket) {
            debug!(epoch = ticket.epoch, "Discarding stale page");
            return Vec::new();
        }
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                self.fail_fetch(e);
                return Vec::new();
            }
        };

        self.has_more = records.len() >= limit as usize;
        let ctx = self.normalize_context();
        let page: Vec<Message> = records.iter().map(|raw| normalize(raw, &ctx)).collect();
        let count = page.len();
        let scroll = self.timeline.load_page(page);
        debug!(count, has_more = self.has_more, "Initial page loaded");

        if scroll {
            vec![Effect::ScrollToBottom]
        } else {
            Vec::new()
        }
    }

    fn on_older_page(
        &mut self,
        ticket: SessionTicket,
        limit: u32,
        result: nexalog_net::Result<Vec<RawRecord>>,
    ) {
        if !self.is_current(&ticket) {
            debug!(epoch = ticket.epoch, "Discarding stale history page");
            return;
        }
        self.loading_older = false;

        match result {
            Ok(records) => {
                self.has_more = records.len() >= limit as usize;
                let ctx = self.normalize_context();
                let older = records.iter().map(|raw| normalize(raw, &ctx)).collect();
                let inserted = self.timeline.prepend(older);
                debug!(inserted, has_more = self.has_more, "History page loaded");
            }
            Err(e) => self.fail_fetch(e),
        }
    }

    fn on_sent(
        &mut self,
        ticket: SessionTicket,
        result: nexalog_net::Result<Option<RawRecord>>,
    ) -> Vec<Effect> {
        if !self.is_current(&ticket) {
            debug!(epoch = ticket.epoch, "Discarding stale send result");
            return Vec::new();
        }

        match result {
            Ok(Some(raw)) => {
                let mut message = normalize(&raw, &self.normalize_context());
                message.sender_id.get_or_insert(self.me);
                if self.timeline.append(message).should_scroll() {
                    vec![Effect::ScrollToBottom]
                } else {
                    Vec::new()
                }
            }
            Ok(None) => {
                debug!("Send accepted without echo");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Send failed");
                self.error = Some(SessionError::Send(e.to_string()));
                Vec::new()
            }
        }
    }

    fn on_friends(&mut self, result: nexalog_net::Result<Vec<RawRecord>>) {
        match result {
            Ok(records) => {
                let entries: Vec<_> = records.iter().filter_map(friend_entry).collect();
                debug!(count = entries.len(), "Friend list refreshed");
                self.activity.replace(entries);
            }
            Err(e) => warn!(error = %e, "Friend list refresh failed"),
        }
    }

    fn fail_fetch(&mut self, e: NetError) {
        warn!(scope = ?self.scope, error = %e, "Message fetch failed");
        self.error = Some(SessionError::Fetch(e.to_string()));
    }

    // -- Helpers --

    fn ticket(&self) -> SessionTicket {
        SessionTicket {
            epoch: self.epoch,
            scope: self.scope,
        }
    }

    fn is_current(&self, ticket: &SessionTicket) -> bool {
        ticket.epoch == self.epoch && (ticket.scope.is_none() || ticket.scope == self.scope)
    }

    fn normalize_context(&self) -> NormalizeContext {
        NormalizeContext::new(self.scope.map(|scope| scope.id))
    }

    fn is_visible(&self, raw: &RawRecord) -> bool {
        is_visible(raw, self.scope, self.peer, Some(self.me))
    }

    /// Direct-message traffic only. Channel records never touch the friend
    /// list, and neither does a record that names no conversation or
    /// recipient while a channel is open.
    fn is_direct(&self, raw: &RawRecord) -> bool {
        if identity::is_channel_record(raw) {
            return false;
        }
        let channel_open = matches!(self.scope, Some(scope) if scope.kind == ScopeKind::Channel);
        !channel_open
            || identity::conversation_id(raw).is_some()
            || identity::recipient_id(raw).is_some()
    }

    /// Message ids are only unique within a thread kind, so updates must
    /// prove they belong here like any other push.
    fn apply_edit(&mut self, raw: &RawRecord) {
        if !self.is_visible(raw) {
            return;
        }
        let mut message = normalize(raw, &self.normalize_context());
        let Some(existing) = self.timeline.get(&message.id) else {
            debug!(id = %message.id, "Edit for unknown message ignored");
            return;
        };

        if raw.first_of(CONTENT_FIELDS, |v| v.as_str().map(|_| ())).is_none() {
            message.content = existing.content.clone();
        }
        message.edited = true;
        self.timeline.append(message);
    }

    fn apply_delete(&mut self, raw: &RawRecord) {
        if !self.is_visible(raw) {
            return;
        }
        let Some(id) = identity::message_id(raw) else {
            return;
        };
        if !self.timeline.mark_deleted(&id) {
            debug!(id = %id, "Delete for unknown message ignored");
        }
    }

    fn other_party(&self, raw: &RawRecord) -> Option<UserId> {
        identity::other_party(raw, Some(self.me), |thread| {
            self.conversation_peers.get(&thread).copied()
        })
    }

    fn bump(&mut self, user: UserId, at: DateTime<Utc>, effects: &mut Vec<Effect>) {
        if user == self.me {
            return;
        }
        if self.activity.bump(user, at) == BumpOutcome::Inserted {
            effects.extend(self.refresh_friends());
        }
    }
}

fn event_time(raw: &RawRecord) -> DateTime<Utc> {
    raw.first_of(CREATED_AT_FIELDS, parse_timestamp)
        .unwrap_or_else(Utc::now)
}
