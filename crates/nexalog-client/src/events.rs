use serde::Serialize;
use tokio::sync::mpsc;

use crate::state::ViewSnapshot;

pub const EVENT_SNAPSHOT: &str = "snapshot";
pub const EVENT_SCROLL_TO_BOTTOM: &str = "scroll-to-bottom";
pub const EVENT_CONNECTION_CHANGED: &str = "connection-changed";

/// Events pushed from the runtime to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum UiEvent {
    /// The session changed; redraw from this view.
    Snapshot(Box<ViewSnapshot>),
    /// The newest message changed and the view should follow it.
    ScrollToBottom,
    ConnectionChanged(ConnectionPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionPayload {
    pub connected: bool,
    /// Set when reconnection attempts are exhausted.
    pub gave_up: bool,
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => EVENT_SNAPSHOT,
            Self::ScrollToBottom => EVENT_SCROLL_TO_BOTTOM,
            Self::ConnectionChanged(_) => EVENT_CONNECTION_CHANGED,
        }
    }
}

pub async fn emit_event(ui_tx: &mpsc::Sender<UiEvent>, event: UiEvent) {
    let name = event.name();
    if ui_tx.send(event).await.is_err() {
        tracing::debug!(event = name, "UI receiver dropped, event discarded");
    }
}
