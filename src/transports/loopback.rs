//! In-process realtime service.
//!
//! [`LoopbackHub`] plays the part of the hosted realtime service for tests
//! and the `local_game` demo. Every [`LoopbackTransport`] obtained from
//! [`LoopbackHub::connect`] behaves like one client connection:
//!
//! - `Subscribe`/`Unsubscribe` are confirmed immediately.
//! - `Broadcast` is relayed to every *other* connection subscribed to the
//!   topic (the sender does not receive its own broadcast).
//! - `Heartbeat` is answered with `HeartbeatAck`.
//!
//! Row changes are injected with [`LoopbackHub::publish_change`], or
//! forwarded from a [`MemoryBackend`](crate::backends::MemoryBackend) with
//! [`LoopbackHub::relay`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backends::RoomChange;
use crate::error::GalinheiroError;
use crate::protocol::{ClientFrame, RowChange, ServerFrame};
use crate::transport::Transport;

struct Peer {
    tx: mpsc::UnboundedSender<String>,
    topics: BTreeSet<String>,
}

#[derive(Default)]
struct HubState {
    peers: HashMap<u64, Peer>,
}

/// Shared in-process realtime service. Cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for LoopbackHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHub")
            .field("connections", &self.lock().peers.len())
            .finish()
    }
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to the hub.
    pub fn connect(&self) -> LoopbackTransport {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().peers.insert(
            id,
            Peer {
                tx,
                topics: BTreeSet::new(),
            },
        );
        debug!(connection = id, "loopback connection opened");
        LoopbackTransport {
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Deliver a row change to every connection subscribed to `topic`.
    /// Returns how many connections received it.
    pub fn publish_change(&self, topic: &str, change: RowChange) -> usize {
        let frame = ServerFrame::Change {
            topic: topic.to_string(),
            change,
        };
        self.fan_out(topic, None, &frame)
    }

    /// Forward every change from `changes` to the subscribers of its topic,
    /// until the sending side closes.
    pub fn relay(&self, mut changes: broadcast::Receiver<RoomChange>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(RoomChange { topic, change }) => {
                        hub.publish_change(&topic, change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "loopback relay lagged; changes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("loopback relay stopped");
        })
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fan_out(&self, topic: &str, except: Option<u64>, frame: &ServerFrame) -> usize {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize loopback frame: {e}");
                return 0;
            }
        };
        let state = self.lock();
        state
            .peers
            .iter()
            .filter(|(id, peer)| Some(**id) != except && peer.topics.contains(topic))
            .filter(|(_, peer)| peer.tx.send(json.clone()).is_ok())
            .count()
    }

    fn reply(&self, id: u64, frame: &ServerFrame) {
        let Ok(json) = serde_json::to_string(frame) else {
            return;
        };
        if let Some(peer) = self.lock().peers.get(&id) {
            let _ = peer.tx.send(json);
        }
    }

    fn handle(&self, id: u64, frame: ClientFrame) {
        match frame {
            ClientFrame::Subscribe { topic } => {
                if let Some(peer) = self.lock().peers.get_mut(&id) {
                    peer.topics.insert(topic.clone());
                }
                self.reply(id, &ServerFrame::Subscribed { topic });
            }
            ClientFrame::Unsubscribe { topic } => {
                if let Some(peer) = self.lock().peers.get_mut(&id) {
                    peer.topics.remove(&topic);
                }
                self.reply(id, &ServerFrame::Unsubscribed { topic });
            }
            ClientFrame::Broadcast { topic, event, ack } => {
                let frame = ServerFrame::Broadcast {
                    topic: topic.clone(),
                    event,
                };
                self.fan_out(&topic, Some(id), &frame);
                if ack {
                    self.reply(id, &ServerFrame::BroadcastAck { topic });
                }
            }
            ClientFrame::Heartbeat => self.reply(id, &ServerFrame::HeartbeatAck),
        }
    }

    fn disconnect(&self, id: u64) {
        if self.lock().peers.remove(&id).is_some() {
            debug!(connection = id, "loopback connection closed");
        }
    }
}

/// One connection to a [`LoopbackHub`].
pub struct LoopbackTransport {
    id: u64,
    hub: LoopbackHub,
    rx: mpsc::UnboundedReceiver<String>,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("id", &self.id)
            .finish()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), GalinheiroError> {
        let frame: ClientFrame = serde_json::from_str(&message)?;
        self.hub.handle(self.id, frame);
        Ok(())
    }

    /// Cancel-safe: `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, GalinheiroError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), GalinheiroError> {
        self.hub.disconnect(self.id);
        self.rx.close();
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}
