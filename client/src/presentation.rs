//! Seam between the game core and whatever draws it.
//!
//! The core never draws. Every visible consequence of a state change goes
//! through [`Presentation`], and the core only keeps the opaque handles the
//! implementation returns. The binary ships [`ConsolePresentation`], which
//! just logs; tests use [`RecordingPresentation`] to assert on the exact
//! call sequence.

use crate::entity::RenderHandle;
use log::info;
use shared::protocol::{GamePhase, ScoreEntry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Where a chat message belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChannel {
    Public,
    /// Private conversation with the named opponent.
    Private(String),
}

/// Callbacks the game core drives. Implementations must be `Send + Sync`;
/// calls may come from any of the synchronization loops.
pub trait Presentation: Send + Sync {
    fn on_pod_created(&self, x: f64, y: f64) -> RenderHandle;
    fn on_pod_moved(&self, handle: RenderHandle, x: f64, y: f64);
    /// May reissue the handle, e.g. when rotating means redrawing.
    fn on_pod_rotated(&self, handle: RenderHandle, angle: f64) -> RenderHandle;
    fn on_obstacle_created(&self, x: f64, y: f64) -> RenderHandle;
    fn on_objective_shown(&self, x: f64, y: f64, variant: u8) -> RenderHandle;
    fn on_entity_removed(&self, handle: RenderHandle);
    fn on_scores_changed(&self, scores: &[ScoreEntry]);
    fn on_status_changed(&self, phase: GamePhase);
    fn on_winner_announced(&self, pseudonym: &str, is_local: bool);
    fn on_chat_opened(&self, pseudonym: &str);
    fn on_chat_closed(&self, pseudonym: &str);
    fn on_chat_message(&self, channel: &ChatChannel, text: &str, from_local: bool);
    fn on_connection_denied(&self);
}

/// Headless presentation that narrates the game through the log.
#[derive(Default)]
pub struct ConsolePresentation {
    next_handle: AtomicU64,
}

impl ConsolePresentation {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> RenderHandle {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Presentation for ConsolePresentation {
    fn on_pod_created(&self, x: f64, y: f64) -> RenderHandle {
        let handle = self.allocate();
        info!("Pod #{} appears at ({:.1}, {:.1})", handle, x, y);
        handle
    }

    fn on_pod_moved(&self, _handle: RenderHandle, _x: f64, _y: f64) {
        // Too chatty even for debug logging; the score and status lines are
        // what a headless run wants to see.
    }

    fn on_pod_rotated(&self, handle: RenderHandle, _angle: f64) -> RenderHandle {
        handle
    }

    fn on_obstacle_created(&self, x: f64, y: f64) -> RenderHandle {
        let handle = self.allocate();
        info!("Asteroid #{} at ({:.1}, {:.1})", handle, x, y);
        handle
    }

    fn on_objective_shown(&self, x: f64, y: f64, variant: u8) -> RenderHandle {
        let handle = self.allocate();
        info!("Objective {} appears at ({:.1}, {:.1})", variant, x, y);
        handle
    }

    fn on_entity_removed(&self, _handle: RenderHandle) {}

    fn on_scores_changed(&self, scores: &[ScoreEntry]) {
        let table: Vec<String> = scores
            .iter()
            .map(|entry| format!("{}: {}", entry.pseudonym, entry.score))
            .collect();
        info!("Scores: {}", table.join(", "));
    }

    fn on_status_changed(&self, phase: GamePhase) {
        match phase {
            GamePhase::Waiting => info!("Waiting for the session to begin..."),
            GamePhase::Playing => info!("Session started, good luck!"),
        }
    }

    fn on_winner_announced(&self, pseudonym: &str, is_local: bool) {
        if is_local {
            info!("You win!");
        } else {
            info!("{} wins", pseudonym);
        }
    }

    fn on_chat_opened(&self, pseudonym: &str) {
        info!("{} joined the session", pseudonym);
    }

    fn on_chat_closed(&self, pseudonym: &str) {
        info!("{} left the game", pseudonym);
    }

    fn on_chat_message(&self, channel: &ChatChannel, text: &str, from_local: bool) {
        let who = if from_local { "me" } else { "them" };
        match channel {
            ChatChannel::Public => info!("[public] {}: {}", who, text),
            ChatChannel::Private(peer) => info!("[{}] {}: {}", peer, who, text),
        }
    }

    fn on_connection_denied(&self) {
        info!("The server denied the connection (pseudonym already taken?)");
    }
}

/// Every call the core can make, captured for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationCall {
    PodCreated { x: f64, y: f64, handle: RenderHandle },
    PodMoved { handle: RenderHandle, x: f64, y: f64 },
    PodRotated { handle: RenderHandle, angle: f64 },
    ObstacleCreated { x: f64, y: f64, handle: RenderHandle },
    ObjectiveShown { x: f64, y: f64, variant: u8, handle: RenderHandle },
    EntityRemoved { handle: RenderHandle },
    ScoresChanged(Vec<ScoreEntry>),
    StatusChanged(GamePhase),
    WinnerAnnounced { pseudonym: String, is_local: bool },
    ChatOpened(String),
    ChatClosed(String),
    ChatMessage { channel: ChatChannel, text: String, from_local: bool },
    ConnectionDenied,
}

/// Presentation double that records everything it is told.
#[derive(Default)]
pub struct RecordingPresentation {
    next_handle: AtomicU64,
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> RenderHandle {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record(&self, call: PresentationCall) {
        self.calls.lock().expect("recording mutex").push(call);
    }

    /// Snapshot of every call made so far, in order.
    pub fn calls(&self) -> Vec<PresentationCall> {
        self.calls.lock().expect("recording mutex").clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("recording mutex").len()
    }
}

impl Presentation for RecordingPresentation {
    fn on_pod_created(&self, x: f64, y: f64) -> RenderHandle {
        let handle = self.allocate();
        self.record(PresentationCall::PodCreated { x, y, handle });
        handle
    }

    fn on_pod_moved(&self, handle: RenderHandle, x: f64, y: f64) {
        self.record(PresentationCall::PodMoved { handle, x, y });
    }

    fn on_pod_rotated(&self, handle: RenderHandle, angle: f64) -> RenderHandle {
        self.record(PresentationCall::PodRotated { handle, angle });
        handle
    }

    fn on_obstacle_created(&self, x: f64, y: f64) -> RenderHandle {
        let handle = self.allocate();
        self.record(PresentationCall::ObstacleCreated { x, y, handle });
        handle
    }

    fn on_objective_shown(&self, x: f64, y: f64, variant: u8) -> RenderHandle {
        let handle = self.allocate();
        self.record(PresentationCall::ObjectiveShown {
            x,
            y,
            variant,
            handle,
        });
        handle
    }

    fn on_entity_removed(&self, handle: RenderHandle) {
        self.record(PresentationCall::EntityRemoved { handle });
    }

    fn on_scores_changed(&self, scores: &[ScoreEntry]) {
        self.record(PresentationCall::ScoresChanged(scores.to_vec()));
    }

    fn on_status_changed(&self, phase: GamePhase) {
        self.record(PresentationCall::StatusChanged(phase));
    }

    fn on_winner_announced(&self, pseudonym: &str, is_local: bool) {
        self.record(PresentationCall::WinnerAnnounced {
            pseudonym: pseudonym.to_string(),
            is_local,
        });
    }

    fn on_chat_opened(&self, pseudonym: &str) {
        self.record(PresentationCall::ChatOpened(pseudonym.to_string()));
    }

    fn on_chat_closed(&self, pseudonym: &str) {
        self.record(PresentationCall::ChatClosed(pseudonym.to_string()));
    }

    fn on_chat_message(&self, channel: &ChatChannel, text: &str, from_local: bool) {
        self.record(PresentationCall::ChatMessage {
            channel: channel.clone(),
            text: text.to_string(),
            from_local,
        });
    }

    fn on_connection_denied(&self) {
        self.record(PresentationCall::ConnectionDenied);
    }
}
