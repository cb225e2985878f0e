//! Presence: heartbeats, stale-participant sweeps and emergency leave.
//!
//! Background work runs in a [`PeriodicTask`], a ticker with explicit
//! cancellation that is aborted when dropped. A failed tick is logged and
//! the next tick runs as usual.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::client::Publisher;
use crate::config::Timings;
use crate::error::Result;
use crate::identity::Identity;
use crate::protocol::{BroadcastEvent, ClientId, RoomId};

/// A named background ticker.
pub struct PeriodicTask {
    name: &'static str,
    task: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl PeriodicTask {
    /// Run `tick` every `period`, starting immediately.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = interval.tick() => {
                        if let Err(e) = tick().await {
                            warn!(task = name, "periodic task tick failed: {e}");
                        }
                    }
                }
            }
            debug!(task = name, "periodic task stopped");
        });
        Self {
            name,
            task: Some(task),
            cancel: Some(cancel),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the ticker and wait for the in-flight tick, if any.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(task = self.name, "periodic task ended with join error: {e}");
            }
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Touch the caller's `last_seen` every `period`.
pub fn heartbeat(
    backend: Arc<dyn Backend>,
    room_id: RoomId,
    client_id: ClientId,
    period: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("heartbeat", period, move || {
        let backend = Arc::clone(&backend);
        async move { backend.touch_participant(room_id, client_id).await }
    })
}

/// Host-only: every `period`, remove participants not seen for longer than
/// `stale_after`.
pub fn stale_sweep(
    backend: Arc<dyn Backend>,
    room_id: RoomId,
    stale_after: Duration,
    period: Duration,
) -> PeriodicTask {
    let stale_after =
        chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::seconds(30));
    PeriodicTask::spawn("stale-sweep", period, move || {
        let backend = Arc::clone(&backend);
        async move {
            let cutoff = Utc::now() - stale_after;
            let removed = backend.remove_stale_participants(room_id, cutoff).await?;
            if removed > 0 {
                info!(room_id = %room_id, removed, "swept stale participants");
            }
            Ok(())
        }
    })
}

/// Presence duties of one client in one room.
#[derive(Debug)]
pub struct Presence {
    heartbeat: PeriodicTask,
    sweep: Option<PeriodicTask>,
}

impl Presence {
    /// Start the heartbeat, plus the stale sweep when `is_host`.
    pub fn start(
        backend: Arc<dyn Backend>,
        room_id: RoomId,
        client_id: ClientId,
        is_host: bool,
        timings: &Timings,
    ) -> Self {
        let sweep = is_host.then(|| {
            stale_sweep(
                Arc::clone(&backend),
                room_id,
                timings.stale_after(),
                timings.sweep(),
            )
        });
        Self {
            heartbeat: heartbeat(backend, room_id, client_id, timings.heartbeat()),
            sweep,
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweep.is_some()
    }

    pub async fn stop(&mut self) {
        self.heartbeat.stop().await;
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.stop().await;
        }
    }
}

/// Leave without waiting (tab closing, process exit): announce the
/// departure and delete the participant row in the background.
pub fn emergency_leave(
    backend: Arc<dyn Backend>,
    publisher: &Publisher,
    room_id: RoomId,
    topic: &str,
    identity: &Identity,
) -> JoinHandle<()> {
    let event = BroadcastEvent::PlayerLeft {
        client_id: identity.client_id,
        display_name: identity.profile.display_name.clone(),
    };
    if let Err(e) = publisher.broadcast(topic, event) {
        debug!("emergency leave broadcast skipped: {e}");
    }
    let client_id = identity.client_id;
    tokio::spawn(async move {
        if let Err(e) = backend.delete_participant(room_id, client_id).await {
            warn!(room_id = %room_id, "emergency leave failed: {e}");
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::GalinheiroError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("test", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.stop().await;
        assert!(!task.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_tick_does_not_stop_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("failing", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GalinheiroError::Backend("down".into()))
            }
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_aborts_the_ticker() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("dropped", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
