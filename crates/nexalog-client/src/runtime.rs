//! Event loop that owns the [`Session`].
//!
//! UI commands, push notifications and backend completions each arrive on
//! their own mpsc channel; `tokio::select!` serialises them so the session
//! has exactly one writer. Backend calls run in spawned tasks and report back
//! through the completion channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nexalog_net::{spawn_push, Backend, PushCommand, PushConfig, PushNotification, RestBackend};
use nexalog_shared::ControlSignal;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{emit_event, ConnectionPayload, UiEvent};
use crate::session::{Completion, Effect, PageSizes, Request, Session, Target};

/// Commands sent from the UI into the runtime.
#[derive(Debug)]
pub enum ClientCommand {
    Open(Target),
    Close,
    Send(String),
    LoadOlder,
    RefreshFriends,
    Shutdown,
}

/// Cloneable handle for driving a running client.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    pub async fn open(&self, target: Target) -> Result<()> {
        self.command(ClientCommand::Open(target)).await
    }

    pub async fn close(&self) -> Result<()> {
        self.command(ClientCommand::Close).await
    }

    pub async fn send(&self, content: impl Into<String>) -> Result<()> {
        self.command(ClientCommand::Send(content.into())).await
    }

    pub async fn load_older(&self) -> Result<()> {
        self.command(ClientCommand::LoadOlder).await
    }

    pub async fn refresh_friends(&self) -> Result<()> {
        self.command(ClientCommand::RefreshFriends).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.command(ClientCommand::Shutdown).await
    }

    async fn command(&self, cmd: ClientCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Stopped)
    }
}

/// Connect to the configured backend and start the runtime.
///
/// Returns the command handle and the stream of UI events.
pub async fn start(config: &ClientConfig) -> Result<(ClientHandle, mpsc::Receiver<UiEvent>)> {
    let token = config.token.as_deref().ok_or(ClientError::MissingToken)?;

    let backend = RestBackend::new(&config.api_base, token, config.request_timeout)?;

    let mut push_config = PushConfig::from_api_base(&config.api_base, token)?;
    push_config.reconnect_attempts = config.reconnect_attempts;
    push_config.reconnect_delay = config.reconnect_delay;
    debug!(url = %push_config.url, "Push endpoint");

    let (push_tx, push_rx) = spawn_push(push_config);
    start_with(Arc::new(backend), push_tx, push_rx, config.page_sizes()).await
}

/// Start the runtime over an arbitrary backend and push channel.
pub async fn start_with(
    backend: Arc<dyn Backend>,
    push_tx: mpsc::Sender<PushCommand>,
    push_rx: mpsc::Receiver<PushNotification>,
    sizes: PageSizes,
) -> Result<(ClientHandle, mpsc::Receiver<UiEvent>)> {
    let me = match backend.fetch_me().await {
        Ok(me) => me,
        Err(e) => {
            let _ = push_tx.send(PushCommand::Shutdown).await;
            return Err(e.into());
        }
    };
    info!(me = %me, "Signed in");

    let (cmd_tx, cmd_rx) = mpsc::channel::<ClientCommand>(64);
    let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>(256);
    let (done_tx, done_rx) = mpsc::channel::<Completion>(64);

    let runtime = Runtime {
        session: Session::new(me, sizes),
        backend,
        push_tx,
        ui_tx,
        done_tx,
    };
    tokio::spawn(runtime.run(cmd_rx, push_rx, done_rx));

    Ok((ClientHandle { cmd_tx }, ui_rx))
}

struct Runtime {
    session: Session,
    backend: Arc<dyn Backend>,
    push_tx: mpsc::Sender<PushCommand>,
    ui_tx: mpsc::Sender<UiEvent>,
    done_tx: mpsc::Sender<Completion>,
}

impl Runtime {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ClientCommand>,
        mut push_rx: mpsc::Receiver<PushNotification>,
        mut done_rx: mpsc::Receiver<Completion>,
    ) {
        info!("Client runtime started");

        let effects = self.session.refresh_friends();
        self.apply(effects).await;
        self.publish().await;

        let mut push_open = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let effects = match cmd {
                        Some(ClientCommand::Open(target)) => self.session.open(target),
                        Some(ClientCommand::Close) => self.session.close(),
                        Some(ClientCommand::Send(content)) => self.session.send(&content),
                        Some(ClientCommand::LoadOlder) => self.session.load_older(),
                        Some(ClientCommand::RefreshFriends) => self.session.refresh_friends(),
                        Some(ClientCommand::Shutdown) | None => break,
                    };
                    self.apply(effects).await;
                }

                notif = push_rx.recv(), if push_open => {
                    match notif {
                        Some(notification) => self.on_notification(notification).await,
                        None => {
                            warn!("Push channel closed");
                            push_open = false;
                        }
                    }
                }

                Some(completion) = done_rx.recv() => {
                    let effects = self.session.complete(completion);
                    self.apply(effects).await;
                }
            }

            self.publish().await;
        }

        let effects = self.session.close();
        self.apply(effects).await;
        self.signal(ControlSignal::UserLeave(self.session.me())).await;
        let _ = self.push_tx.send(PushCommand::Shutdown).await;
        info!("Client runtime stopped");
    }

    async fn on_notification(&mut self, notification: PushNotification) {
        match notification {
            PushNotification::Connected => {
                info!("Push channel connected");
                let effects = self.session.on_connected();
                self.apply(effects).await;
                self.connection_changed(true, false).await;
            }
            PushNotification::Disconnected { reason } => {
                warn!(reason = %reason, "Push channel disconnected");
                self.session.on_disconnected();
                self.connection_changed(false, false).await;
            }
            PushNotification::Event(event) => {
                debug!(event = event.name(), "Push event");
                let effects = self.session.on_push(event);
                self.apply(effects).await;
            }
            PushNotification::GaveUp => {
                warn!("Push channel gave up reconnecting");
                self.session.on_disconnected();
                self.connection_changed(false, true).await;
            }
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Signal(signal) => self.signal(signal).await,
                Effect::Request(request) => self.dispatch(request),
                Effect::ScrollToBottom => emit_event(&self.ui_tx, UiEvent::ScrollToBottom).await,
            }
        }
    }

    async fn signal(&self, signal: ControlSignal) {
        if self.push_tx.send(PushCommand::Emit(signal)).await.is_err() {
            debug!(signal = signal.event_name(), "Push task gone, signal dropped");
        }
    }

    /// Run `request` against the backend in its own task.
    fn dispatch(&self, request: Request) {
        let backend = self.backend.clone();
        let done_tx = self.done_tx.clone();

        tokio::spawn(async move {
            let completion = match request {
                Request::ResolveConversation { ticket, peer } => Completion::Resolved {
                    ticket,
                    result: backend.resolve_conversation(peer).await,
                },
                Request::FetchPage {
                    ticket,
                    scope,
                    page,
                    older,
                } => Completion::Page {
                    ticket,
                    limit: page.limit,
                    older,
                    result: backend.fetch_page(scope, page).await,
                },
                Request::Send {
                    ticket,
                    scope,
                    content,
                } => Completion::Sent {
                    ticket,
                    result: backend.send_message(scope, &content).await,
                },
                Request::FetchFriends { page, limit } => Completion::Friends {
                    result: backend.fetch_friends(page, limit).await,
                },
            };

            if done_tx.send(completion).await.is_err() {
                debug!("Runtime gone, completion dropped");
            }
        });
    }

    async fn publish(&self) {
        let snapshot = self.session.snapshot();
        emit_event(&self.ui_tx, UiEvent::Snapshot(Box::new(snapshot))).await;
    }

    async fn connection_changed(&self, connected: bool, gave_up: bool) {
        emit_event(
            &self.ui_tx,
            UiEvent::ConnectionChanged(ConnectionPayload { connected, gave_up }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use nexalog_net::{NetError, PageRequest};
    use nexalog_shared::{MessageId, PushEvent, RawRecord, Scope, ThreadId, UserId};
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use crate::state::ViewSnapshot;

    const ME: UserId = UserId(1);
    const PEER: UserId = UserId(7);

    /// In-memory backend. Page fetches wait for `release` so tests control
    /// when the initial page lands.
    struct MemoryBackend {
        pages: Mutex<Vec<Value>>,
        sent: Mutex<Vec<String>>,
        release: Notify,
    }

    impl MemoryBackend {
        fn new(pages: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages),
                sent: Mutex::new(Vec::new()),
                release: Notify::new(),
            })
        }
    }

    fn records(values: Vec<Value>) -> Vec<RawRecord> {
        values.into_iter().filter_map(RawRecord::from_value).collect()
    }

    #[async_trait]
    impl Backend for MemoryBackend {
        async fn fetch_me(&self) -> nexalog_net::Result<UserId> {
            Ok(ME)
        }

        async fn resolve_conversation(&self, peer: UserId) -> nexalog_net::Result<ThreadId> {
            if peer == PEER {
                Ok(ThreadId(5))
            } else {
                Err(NetError::Status {
                    status: 404,
                    message: "No such user".into(),
                })
            }
        }

        async fn fetch_page(
            &self,
            _scope: Scope,
            _page: PageRequest,
        ) -> nexalog_net::Result<Vec<RawRecord>> {
            self.release.notified().await;
            let pages = self.pages.lock().unwrap().clone();
            Ok(records(pages))
        }

        async fn send_message(
            &self,
            _scope: Scope,
            content: &str,
        ) -> nexalog_net::Result<Option<RawRecord>> {
            self.sent.lock().unwrap().push(content.to_string());
            Ok(None)
        }

        async fn fetch_friends(&self, _page: u32, _limit: u32) -> nexalog_net::Result<Vec<RawRecord>> {
            Ok(records(vec![json!({ "ID_USER": PEER.0, "username": "peer" })]))
        }
    }

    struct Harness {
        handle: ClientHandle,
        ui_rx: mpsc::Receiver<UiEvent>,
        push_cmd_rx: mpsc::Receiver<PushCommand>,
        push_notif_tx: mpsc::Sender<PushNotification>,
    }

    async fn harness(backend: Arc<MemoryBackend>) -> Harness {
        let (push_tx, push_cmd_rx) = mpsc::channel(64);
        let (push_notif_tx, push_rx) = mpsc::channel(64);
        let (handle, ui_rx) = start_with(backend, push_tx, push_rx, PageSizes::default())
            .await
            .unwrap();
        Harness {
            handle,
            ui_rx,
            push_cmd_rx,
            push_notif_tx,
        }
    }

    /// Wait for the first snapshot satisfying `pred`.
    async fn snapshot_where(
        ui_rx: &mut mpsc::Receiver<UiEvent>,
        pred: impl Fn(&ViewSnapshot) -> bool,
    ) -> ViewSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ui_rx.recv().await {
                    Some(UiEvent::Snapshot(snapshot)) if pred(&snapshot) => return *snapshot,
                    Some(_) => continue,
                    None => panic!("runtime stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    async fn next_signal(push_cmd_rx: &mut mpsc::Receiver<PushCommand>) -> ControlSignal {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match push_cmd_rx.recv().await {
                    Some(PushCommand::Emit(signal)) => return signal,
                    Some(PushCommand::Shutdown) => continue,
                    None => panic!("push channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for signal")
    }

    fn record(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn test_open_push_and_page_converge() {
        let backend = MemoryBackend::new(vec![
            json!({ "ID_Message": 10, "ID_Conversation": 5, "ID_Sender": 7, "content": "a",
                    "createdAt": "2024-05-01T12:00:00Z" }),
            json!({ "ID_Message": 11, "ID_Conversation": 5, "ID_Sender": 7, "content": "b",
                    "createdAt": "2024-05-01T12:01:00Z" }),
        ]);
        let mut h = harness(backend.clone()).await;

        // Friend list is seeded at start.
        snapshot_where(&mut h.ui_rx, |s| s.friends.len() == 1).await;

        h.handle.open(Target::Peer(PEER)).await.unwrap();
        assert_eq!(
            next_signal(&mut h.push_cmd_rx).await,
            ControlSignal::Join(Scope::conversation(ThreadId(5)))
        );

        // A push for message 11 lands while the page is still pending.
        h.push_notif_tx
            .send(PushNotification::Event(PushEvent::MessageNew(record(json!({
                "ID_Message": 11, "ID_Conversation": 5, "ID_Sender": 7, "content": "b",
                "createdAt": "2024-05-01T12:01:00Z",
            })))))
            .await
            .unwrap();
        snapshot_where(&mut h.ui_rx, |s| s.messages.len() == 1).await;

        backend.release.notify_one();
        let snapshot = snapshot_where(&mut h.ui_rx, |s| s.messages.len() == 2).await;
        let ids: Vec<_> = snapshot.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![MessageId::Durable(10), MessageId::Durable(11)]);
        assert_eq!(snapshot.scope, Some(Scope::conversation(ThreadId(5))));

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_and_reconnect() {
        let backend = MemoryBackend::new(Vec::new());
        let mut h = harness(backend.clone()).await;

        h.handle.open(Target::Channel(ThreadId(3))).await.unwrap();
        assert_eq!(
            next_signal(&mut h.push_cmd_rx).await,
            ControlSignal::Join(Scope::channel(ThreadId(3)))
        );
        backend.release.notify_one();

        h.handle.send("hello").await.unwrap();
        let snapshot = snapshot_where(&mut h.ui_rx, |s| s.messages.len() == 1).await;
        assert!(snapshot.messages[0].optimistic);

        h.push_notif_tx.send(PushNotification::Connected).await.unwrap();
        assert_eq!(next_signal(&mut h.push_cmd_rx).await, ControlSignal::UserJoin(ME));
        assert_eq!(
            next_signal(&mut h.push_cmd_rx).await,
            ControlSignal::Join(Scope::channel(ThreadId(3)))
        );
        snapshot_where(&mut h.ui_rx, |s| s.connected).await;

        h.handle.shutdown().await.unwrap();
        assert_eq!(
            next_signal(&mut h.push_cmd_rx).await,
            ControlSignal::Leave(Scope::channel(ThreadId(3)))
        );
        assert_eq!(next_signal(&mut h.push_cmd_rx).await, ControlSignal::UserLeave(ME));
        assert_eq!(backend.sent.lock().unwrap().as_slice(), ["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_lookup_failure_surfaces_error() {
        let backend = MemoryBackend::new(Vec::new());
        let mut h = harness(backend).await;

        h.handle.open(Target::Peer(UserId(99))).await.unwrap();
        let snapshot = snapshot_where(&mut h.ui_rx, |s| s.error.is_some()).await;
        assert_eq!(snapshot.scope, None);
        assert!(snapshot.messages.is_empty());
    }
}
