use crate::coordinator::{Coordinator, StatusSnapshot};
use crate::error::SwitchError;
use crate::events::{Broadcaster, CoordinatorEvent, EventSink, SwitchEvent};
use crate::gate::GateDecision;
use crate::raf::RadioAccessFamilyRequest;
use anyhow::Context;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Longest the worker sleeps without an event, so a shutdown flag set
/// without a message is still noticed.
const IDLE_WAIT: Duration = Duration::from_millis(250);

type SwitchReply = Sender<Result<GateDecision, SwitchError>>;

/// Control messages sent via crossbeam channel.
enum ControlMessage {
    SetRadioCapability {
        rafs: Vec<RadioAccessFamilyRequest>,
        reply: SwitchReply,
    },
    Shutdown,
}

/// Thread-safe handle to the capability switch worker.
///
/// Owns a background thread that owns the [`Coordinator`] and serializes
/// everything that touches it: switch requests arrive on a bounded control
/// channel, modem responses and condition changes on the coordinator's
/// event channel. The worker also fires the session timer and republishes
/// the [`StatusSnapshot`] after every step.
///
/// Dropping the runtime triggers a graceful shutdown of the worker thread.
pub struct SwitchRuntime {
    control_tx: Sender<ControlMessage>,
    events: EventSink,
    broadcaster: Broadcaster,
    shutdown: Arc<AtomicBool>,
    status: Arc<Mutex<StatusSnapshot>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SwitchRuntime {
    /// Move `coordinator` onto a worker thread that drains `events_rx`,
    /// the receiving half of the channel the coordinator was built with.
    pub fn spawn(
        coordinator: Coordinator,
        events_rx: Receiver<CoordinatorEvent>,
    ) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = bounded(coordinator.config().control_channel_capacity);
        let events = coordinator.events();
        let broadcaster = coordinator.broadcaster();
        let status = Arc::new(Mutex::new(coordinator.status_snapshot()));
        let status_clone = status.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::Builder::new()
            .name("capswitch-worker".into())
            .spawn(move || {
                runtime_worker(coordinator, events_rx, control_rx, status_clone, shutdown_clone)
            })
            .context("failed to spawn capability switch worker")?;

        Ok(Self {
            control_tx,
            events,
            broadcaster,
            shutdown,
            status,
            handle: Some(handle),
        })
    }

    /// Submit a switch request and wait for the gate's decision.
    pub fn request_switch(
        &self,
        rafs: &[RadioAccessFamilyRequest],
    ) -> Result<GateDecision, SwitchError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx
            .send(ControlMessage::SetRadioCapability {
                rafs: rafs.to_vec(),
                reply: reply_tx,
            })
            .map_err(|_| SwitchError::RuntimeStopped)?;
        reply_rx.recv().map_err(|_| SwitchError::RuntimeStopped)?
    }

    /// Boolean form of [`request_switch`](Self::request_switch).
    pub fn set_radio_capability(
        &self,
        rafs: &[RadioAccessFamilyRequest],
    ) -> Result<bool, SwitchError> {
        self.request_switch(rafs).map(GateDecision::as_bool)
    }

    pub fn is_capability_switching(&self) -> bool {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .switching
    }

    /// Returns the status published after the worker's last step.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Pretty-printed JSON of [`status_snapshot`](Self::status_snapshot).
    pub fn status_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.status_snapshot())
            .context("failed to serialize status snapshot")
    }

    pub fn subscribe(&self) -> Receiver<SwitchEvent> {
        self.broadcaster.subscribe()
    }

    /// Sink for posting events (condition changes, radio-available) to the
    /// worker.
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Stops the worker thread and waits for it to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SwitchRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn publish(coordinator: &Coordinator, status: &Mutex<StatusSnapshot>) {
    *status.lock().unwrap_or_else(|e| e.into_inner()) = coordinator.status_snapshot();
}

fn runtime_worker(
    mut coordinator: Coordinator,
    events_rx: Receiver<CoordinatorEvent>,
    control_rx: Receiver<ControlMessage>,
    status: Arc<Mutex<StatusSnapshot>>,
    shutdown: Arc<AtomicBool>,
) {
    info!(modems = coordinator.modem_count(), "capability switch worker started");
    while !shutdown.load(Ordering::Relaxed) {
        let wait = coordinator
            .time_until_deadline()
            .map_or(IDLE_WAIT, |d| d.min(IDLE_WAIT));

        select! {
            recv(control_rx) -> msg => match msg {
                Ok(ControlMessage::SetRadioCapability { rafs, reply }) => {
                    let result = coordinator.set_radio_capability(&rafs);
                    publish(&coordinator, &status);
                    let _ = reply.send(result);
                }
                Ok(ControlMessage::Shutdown) | Err(_) => break,
            },
            recv(events_rx) -> event => match event {
                Ok(event) => coordinator.handle_event(event),
                Err(_) => break,
            },
            default(wait) => {}
        }

        coordinator.poll_timeout();
        publish(&coordinator, &status);
    }
    debug!("capability switch worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchConfig;
    use crate::events;
    use crate::raf::RadioAccessFamily;

    #[test]
    fn disabled_device_noop_and_shutdown() {
        let (sink, rx) = events::channel();
        let config = SwitchConfig {
            disabled: true,
            ..SwitchConfig::default()
        };
        let coordinator = Coordinator::builder(Vec::new(), sink)
            .with_config(config)
            .build();
        let mut runtime = SwitchRuntime::spawn(coordinator, rx).unwrap();

        assert_eq!(runtime.request_switch(&[]), Ok(GateDecision::NoOp));
        assert!(!runtime.is_capability_switching());

        runtime.shutdown();
        assert_eq!(
            runtime.request_switch(&[RadioAccessFamilyRequest::new(0, RadioAccessFamily::LTE)]),
            Err(SwitchError::RuntimeStopped)
        );
    }

    #[test]
    fn input_errors_cross_the_thread() {
        let (sink, rx) = events::channel();
        let coordinator = Coordinator::builder(Vec::new(), sink).build();
        let runtime = SwitchRuntime::spawn(coordinator, rx).unwrap();
        assert_eq!(
            runtime.set_radio_capability(&[RadioAccessFamilyRequest::new(0, RadioAccessFamily::LTE)]),
            Err(SwitchError::LengthMismatch { expected: 0, got: 1 })
        );
        let json = runtime.status_json().unwrap();
        assert!(json.contains("\"switching\": false"));
    }
}
