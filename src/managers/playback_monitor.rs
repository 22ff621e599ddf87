// PlaybackMonitor: Periodic playback status broadcast
//
// Single Responsibility: poll a shared controller and fan the results out to
// any number of subscribers (UI, CLI, logs).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::PlaybackController;
use crate::config::MonitorConfig;
use crate::engine::PlaybackBackend;
use crate::stream::PlaybackState;

/// Buffered statuses per subscriber before it starts lagging
const STATUS_CHANNEL_CAPACITY: usize = 16;

/// One poll of the controller's queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub position_millis: i64,
    pub total_patch_millis: i64,
    pub latency_millis: f64,
    pub state: PlaybackState,
}

impl PlaybackStatus {
    /// Status reported while no engine is live
    pub fn idle() -> Self {
        Self {
            position_millis: 0,
            total_patch_millis: 0,
            latency_millis: 0.0,
            state: PlaybackState::Uninitialized,
        }
    }
}

/// Tokio task broadcasting a [`PlaybackStatus`] every poll interval.
///
/// The task stops on [`PlaybackMonitor::stop`] or when the monitor is
/// dropped. Must be spawned from within a tokio runtime.
pub struct PlaybackMonitor {
    tx: broadcast::Sender<PlaybackStatus>,
    task: JoinHandle<()>,
}

impl PlaybackMonitor {
    pub fn spawn<B>(controller: Arc<PlaybackController<B>>, config: &MonitorConfig) -> Self
    where
        B: PlaybackBackend + 'static,
    {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let period = Duration::from_millis(config.poll_interval_ms.max(1));
        let task_tx = tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let status = controller.status();
                tracing::trace!(
                    position_millis = status.position_millis,
                    latency_millis = status.latency_millis,
                    "[PlaybackMonitor] poll"
                );
                // No subscribers is fine; keep polling for late ones
                let _ = task_tx.send(status);
            }
        });

        tracing::debug!("[PlaybackMonitor] polling every {:?}", period);
        Self { tx, task }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackStatus> {
        self.tx.subscribe()
    }

    pub fn stop(&self) {
        if !self.task.is_finished() {
            self.task.abort();
            tracing::debug!("[PlaybackMonitor] stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PlaybackMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamDefaults;
    use crate::host::FixedHostProperties;
    use crate::testing::RecordingBackend;

    #[test]
    fn test_status_without_engine_is_idle() {
        let (backend, _calls) = RecordingBackend::new();
        let controller = PlaybackController::new(
            backend.with_position(700, 5000),
            Arc::new(FixedHostProperties::default()),
            StreamDefaults::default(),
        );

        let status = controller.status();
        assert_eq!(status, PlaybackStatus::idle());
    }

    #[test]
    fn test_status_reads_live_engine() {
        let (backend, _calls) = RecordingBackend::new();
        let controller = PlaybackController::new(
            backend.with_position(700, 5000).with_latency(120.0),
            Arc::new(FixedHostProperties::default()),
            StreamDefaults::default(),
        );
        controller.create();

        let status = controller.status();
        assert_eq!(status.position_millis, 700);
        assert_eq!(status.total_patch_millis, 5000);
        assert_eq!(status.latency_millis, 120.0);
        assert_eq!(status.state, PlaybackState::Created);
    }
}
