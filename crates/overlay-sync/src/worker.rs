use std::sync::Arc;
use std::time::Instant;

use overlay_proto::{ContactDetails, FollowUpRequest, INBOUND_TOPICS};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use transport_bus::{Bus, TransportEvent};

use crate::reconcile::TimelineNotice;
use crate::session::OverlaySession;
use crate::store::OverlayState;

const COMMAND_CAPACITY: usize = 32;
const NOTICE_CAPACITY: usize = 64;

/// Visitor interactions forwarded from the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitorCommand {
    SelectProperty(String),
    RequestTour(FollowUpRequest),
    RequestBrochure(FollowUpRequest),
    ShareContact(ContactDetails),
    DismissLeadStatus,
}

/// Rendering-side view of a running session: read-only snapshots, timeline
/// notices, and a command channel for visitor interactions.
pub struct SessionHandle {
    commands: mpsc::Sender<VisitorCommand>,
    snapshots: watch::Receiver<OverlayState>,
    notices: broadcast::Sender<TimelineNotice>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn snapshots(&self) -> watch::Receiver<OverlayState> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> OverlayState {
        self.snapshots.borrow().clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<TimelineNotice> {
        self.notices.subscribe()
    }

    /// Queues a visitor interaction. Returns false if the session has stopped
    /// or is saturated; the interaction is dropped either way.
    pub fn command(&self, command: VisitorCommand) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "overlay.worker", error = %err, "dropping visitor command");
                false
            }
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Runs `session` on its own task. The task is the only writer of the session
/// state: inbound overlays, lifecycle signals, visitor commands and expiry
/// ticks are handled one at a time, in the order they are received. Expiry is
/// checked every `tick_interval` of the session's config.
pub fn spawn_session_worker<B: Bus + 'static>(
    bus: Arc<B>,
    mut session: OverlaySession<B>,
) -> SessionHandle {
    let tick_interval = session.config().tick_interval;
    // Subscribe before spawning so nothing published right after this call is missed.
    let mut inbound = bus.subscribe_all();
    let mut lifecycle = bus.lifecycle();
    let (commands, mut command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (snapshot_tx, snapshots) = watch::channel(session.snapshot());
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
    let notice_tx = notices.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                received = inbound.recv() => match received {
                    Ok(msg) => {
                        if !INBOUND_TOPICS.contains(&msg.topic.as_str()) {
                            continue;
                        }
                        if let Some(applied) = session.on_message(&msg.payload, &msg.topic) {
                            for notice in applied.notices {
                                let _ = notice_tx.send(notice);
                            }
                            snapshot_tx.send_replace(session.snapshot());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            target = "overlay.worker",
                            skipped,
                            "inbound overlay stream lagged; state converges on the next overlay"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = lifecycle.recv() => match event {
                    Ok(TransportEvent::Connected) => session.on_connected(),
                    Ok(TransportEvent::Disconnected) => session.on_disconnected(),
                    Ok(TransportEvent::Reconnected) => {
                        let report = session.on_reconnected();
                        if !report.replayed.is_empty() {
                            snapshot_tx.send_replace(session.snapshot());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target = "overlay.worker", skipped, "lifecycle stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                command = command_rx.recv() => match command {
                    Some(command) => {
                        if session.handle_command(command, Instant::now()) {
                            snapshot_tx.send_replace(session.snapshot());
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if session.tick(Instant::now()) {
                        snapshot_tx.send_replace(session.snapshot());
                    }
                }
            }
        }
        debug!(target = "overlay.worker", "session worker stopped");
    });

    SessionHandle {
        commands,
        snapshots,
        notices,
        task,
    }
}
