//! Async client for the realtime service.
//!
//! [`RealtimeClient`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<RealtimeEvent>`]) returned
//! from [`RealtimeClient::start`].
//!
//! Services that only need to publish (lobby, chat, arena, presence) hold a
//! cloneable [`Publisher`] instead of the client itself.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect_with_api_key(endpoint, key).await?;
//! let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());
//!
//! client.subscribe(room_topic(&code))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RealtimeEvent::Broadcast { event, .. } => { /* … */ }
//!         RealtimeEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::error::{GalinheiroError, Result};
use crate::event::RealtimeEvent;
use crate::protocol::{BroadcastEvent, ClientFrame, ServerFrame};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RealtimeClient`] connection.
///
/// # Example
///
/// ```
/// use galinheiro_client::client::RealtimeConfig;
/// use std::time::Duration;
///
/// let config = RealtimeConfig::default()
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5))
///     .with_broadcast_ack(true);
/// assert_eq!(config.event_channel_capacity, 512);
/// ```
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) to avoid blocking the transport loop. The `Disconnected`
    /// event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the transport loop
    /// immediately.
    pub shutdown_timeout: Duration,
    /// Ask the service to acknowledge every broadcast. Defaults to `false`.
    pub broadcast_ack: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            broadcast_ack: false,
        }
    }
}

impl RealtimeConfig {
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_broadcast_ack(mut self, ack: bool) -> Self {
        self.broadcast_ack = ack;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the handles and the transport loop.
struct ClientState {
    connected: AtomicBool,
    /// Topics confirmed by the service.
    topics: Mutex<BTreeSet<String>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            topics: Mutex::new(BTreeSet::new()),
        }
    }
}

// ── Publisher ───────────────────────────────────────────────────────

/// Cloneable sending half of a [`RealtimeClient`].
///
/// Every method queues a [`ClientFrame`] and returns once it is queued (no
/// round-trip await).
#[derive(Clone)]
pub struct Publisher {
    cmd_tx: mpsc::UnboundedSender<ClientFrame>,
    state: Arc<ClientState>,
    broadcast_ack: bool,
}

impl Publisher {
    /// Start receiving broadcasts and row changes for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn subscribe(&self, topic: impl Into<String>) -> Result<()> {
        self.send(ClientFrame::Subscribe {
            topic: topic.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn unsubscribe(&self, topic: impl Into<String>) -> Result<()> {
        self.send(ClientFrame::Unsubscribe {
            topic: topic.into(),
        })
    }

    /// Publish a broadcast event to every other subscriber of `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn broadcast(&self, topic: impl Into<String>, event: BroadcastEvent) -> Result<()> {
        self.send(ClientFrame::Broadcast {
            topic: topic.into(),
            event,
            ack: self.broadcast_ack,
        })
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn heartbeat(&self) -> Result<()> {
        self.send(ClientFrame::Heartbeat)
    }

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn send(&self, frame: ClientFrame) -> Result<()> {
        if !self.is_connected() {
            return Err(GalinheiroError::NotConnected);
        }
        self.cmd_tx
            .send(frame)
            .map_err(|_| GalinheiroError::NotConnected)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the realtime service.
///
/// Created via [`RealtimeClient::start`], which spawns a background transport
/// loop and returns this handle together with an event receiver.
pub struct RealtimeClient {
    publisher: Publisher,
    /// Handle to the background transport loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the transport loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl RealtimeClient {
    /// Start the transport loop and return a handle plus event receiver.
    ///
    /// The event receiver yields [`RealtimeEvent`]s, starting with a
    /// synthetic `Connected`, until the transport closes or the client shuts
    /// down; `Disconnected` is always the last event.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: RealtimeConfig,
    ) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientFrame>();
        // tokio panics on a zero capacity.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<RealtimeEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            publisher: Publisher {
                cmd_tx,
                state,
                broadcast_ack: config.broadcast_ack,
            },
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    /// A cloneable handle for publishing on this connection.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn subscribe(&self, topic: impl Into<String>) -> Result<()> {
        self.publisher.subscribe(topic)
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn unsubscribe(&self, topic: impl Into<String>) -> Result<()> {
        self.publisher.unsubscribe(topic)
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn broadcast(&self, topic: impl Into<String>, event: BroadcastEvent) -> Result<()> {
        self.publisher.broadcast(topic, event)
    }

    /// # Errors
    ///
    /// Returns [`GalinheiroError::NotConnected`] if the transport has closed.
    pub fn heartbeat(&self) -> Result<()> {
        self.publisher.heartbeat()
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the transport loop exits.
    pub async fn shutdown(&mut self) {
        debug!("RealtimeClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Abort on timeout so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.publisher.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Topics whose subscription the service confirmed.
    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.publisher
            .state
            .topics
            .lock()
            .await
            .iter()
            .cloned()
            .collect()
    }

    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.publisher.state.topics.lock().await.contains(topic)
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        // No executor to drive an async close here; abort only.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background transport loop that multiplexes send/receive via `tokio::select!`.
///
/// Exits when:
/// - Every command sender is dropped (client and all publishers)
/// - The shutdown signal fires
/// - The transport returns `None` (service closed the connection)
/// - A transport error occurs
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientFrame>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    emit_event(&event_tx, RealtimeEvent::Connected).await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(frame) => {
                        debug!("sending client frame: {:?}", std::mem::discriminant(&frame));
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    emit_disconnected(
                                        &event_tx,
                                        &state,
                                        Some(format!("transport send error: {e}")),
                                    ).await;
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientFrame: {e}");
                            }
                        }
                    }
                    None => {
                        debug!("command channel closed, shutting down transport loop");
                        let _ = transport.close().await;
                        emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => {
                                update_state(&state, &frame).await;
                                emit_event(&event_tx, RealtimeEvent::from(frame)).await;
                            }
                            Err(e) => {
                                warn!("failed to deserialize server frame: {e} (raw: {text})");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by service");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Update shared [`ClientState`] based on a received [`ServerFrame`].
async fn update_state(state: &ClientState, frame: &ServerFrame) {
    match frame {
        ServerFrame::Subscribed { topic } => {
            state.topics.lock().await.insert(topic.clone());
            debug!(topic = %topic, "state: subscribed");
        }
        ServerFrame::Unsubscribed { topic } => {
            state.topics.lock().await.remove(topic);
            debug!(topic = %topic, "state: unsubscribed");
        }
        ServerFrame::SubscribeFailed { topic, reason, .. } => {
            warn!(topic = %topic, "subscription refused: {reason}");
        }
        ServerFrame::ChannelError { topic, message, .. } => {
            warn!(topic = ?topic, "channel error: {message}");
        }
        _ => {}
    }
}

/// Emit an event; if the channel is full, log and drop it so the transport
/// loop never blocks on a slow consumer.
async fn emit_event(event_tx: &mpsc::Sender<RealtimeEvent>, event: RealtimeEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit [`Disconnected`](RealtimeEvent::Disconnected) and update state.
///
/// Uses `send().await`: this is always the last event and must not be
/// dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<RealtimeEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    state.topics.lock().await.clear();
    let event = RealtimeEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    type Scripted = Option<std::result::Result<String, GalinheiroError>>;

    /// Records sent frames and replays scripted responses.
    struct MockTransport {
        incoming: VecDeque<Scripted>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(incoming: Vec<Scripted>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), GalinheiroError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, GalinheiroError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                // Script exhausted: stay open until shutdown.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), GalinheiroError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn frame(frame: &ServerFrame) -> Scripted {
        Some(Ok(serde_json::to_string(frame).unwrap()))
    }

    fn subscribed(topic: &str) -> Scripted {
        frame(&ServerFrame::Subscribed {
            topic: topic.into(),
        })
    }

    fn sent_frames(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientFrame> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        assert_eq!(events.recv().await.unwrap(), RealtimeEvent::Connected);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn subscribe_sends_frame_and_tracks_confirmation() {
        let (transport, sent, _closed) = MockTransport::new(vec![subscribed("room:ABC123")]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        client.subscribe("room:ABC123").unwrap();
        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert_eq!(event.topic(), Some("room:ABC123"));
        assert!(client.is_subscribed("room:ABC123").await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            sent_frames(&sent),
            vec![ClientFrame::Subscribe {
                topic: "room:ABC123".into()
            }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn unsubscribed_clears_topic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            subscribed("room:ABC123"),
            frame(&ServerFrame::Unsubscribed {
                topic: "room:ABC123".into(),
            }),
        ]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Subscribed
        let _ = events.recv().await; // Unsubscribed
        assert!(client.subscribed_topics().await.is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn publisher_broadcast_carries_ack_setting() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let config = RealtimeConfig::default().with_broadcast_ack(true);
        let (mut client, mut events) = RealtimeClient::start(transport, config);
        let _ = events.recv().await;

        let publisher = client.publisher();
        let event = BroadcastEvent::PlayerLeft {
            client_id: Uuid::new_v4(),
            display_name: "Ana".into(),
        };
        publisher.broadcast("room:ABC123", event.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            sent_frames(&sent),
            vec![ClientFrame::Broadcast {
                topic: "room:ABC123".into(),
                event,
                ack: true,
            }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());
        let _ = events.recv().await;

        client.shutdown().await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            RealtimeEvent::Disconnected {
                reason: Some("client shut down".into())
            }
        );
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn not_connected_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = RealtimeClient::start(transport, RealtimeConfig::default());
        let publisher = client.publisher();
        client.shutdown().await;

        assert!(matches!(client.heartbeat(), Err(GalinheiroError::NotConnected)));
        assert!(matches!(
            publisher.subscribe("room:ABC123"),
            Err(GalinheiroError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn transport_close_emits_disconnected_without_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        let _ = events.recv().await;
        assert_eq!(
            events.recv().await.unwrap(),
            RealtimeEvent::Disconnected { reason: None }
        );
        assert!(!client.is_connected());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn receive_error_emits_disconnected_with_reason() {
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Err(GalinheiroError::TransportReceive("reset".into())))]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        let _ = events.recv().await;
        match events.recv().await.unwrap() {
            RealtimeEvent::Disconnected { reason: Some(reason) } => {
                assert!(reason.contains("reset"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{not json".into())),
            frame(&ServerFrame::HeartbeatAck),
        ]);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        let _ = events.recv().await;
        assert_eq!(events.recv().await.unwrap(), RealtimeEvent::HeartbeatAck);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert!(!config.broadcast_ack);
    }

    #[tokio::test]
    async fn zero_event_channel_capacity_does_not_panic() {
        let config = RealtimeConfig {
            event_channel_capacity: 0,
            ..RealtimeConfig::default()
        };
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = RealtimeClient::start(transport, config);
        assert_eq!(events.recv().await.unwrap(), RealtimeEvent::Connected);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn backpressure_drops_events_but_delivers_disconnected() {
        let mut incoming: Vec<Scripted> = (0..(DEFAULT_EVENT_CHANNEL_CAPACITY + 50))
            .map(|_| frame(&ServerFrame::HeartbeatAck))
            .collect();
        incoming.push(None);
        let (transport, _sent, _closed) = MockTransport::new(incoming);
        let (mut client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());

        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut last = None;
        let mut count = 0;
        while let Some(event) = events.recv().await {
            count += 1;
            last = Some(event);
        }
        assert!(count <= DEFAULT_EVENT_CHANNEL_CAPACITY + 1);
        assert!(matches!(last, Some(RealtimeEvent::Disconnected { .. })));
        client.shutdown().await;
    }

    /// A transport whose `close()` never completes.
    struct StuckTransport;

    #[async_trait]
    impl Transport for StuckTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), GalinheiroError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, GalinheiroError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), GalinheiroError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_transport_task() {
        let config = RealtimeConfig::default().with_shutdown_timeout(Duration::from_millis(50));
        let (mut client, _events) = RealtimeClient::start(StuckTransport, config);

        tokio::time::timeout(Duration::from_secs(2), client.shutdown())
            .await
            .expect("shutdown must not hang");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (client, mut events) = RealtimeClient::start(transport, RealtimeConfig::default());
        let _ = events.recv().await;
        drop(client);
        // The aborted loop drops its sender; the channel closes.
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = RealtimeClient::start(transport, RealtimeConfig::default());
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("RealtimeClient"));
        assert!(debug_str.contains("connected"));
        client.shutdown().await;
    }
}
