//! Shared game state and the locked operations over it.
//!
//! The registry owns every entity the client mirrors: the local pod, the
//! opponent map, the obstacle list and the single objective. Three loops
//! touch this state concurrently (network reader, position updater, command
//! sender) plus short-lived input tasks, so access follows two lock tiers:
//!
//! - structure-level guards (the player slot, the opponent map, the obstacle
//!   list, the objective slot) serialize inserts and removals;
//! - each pod carries its own guard for field mutation, and every
//!   multi-field read or write happens under a single acquisition.
//!
//! The position updater is the only task that ever holds more than one pod
//! guard at a time; every other path holds at most one, which keeps the
//! nested acquisitions below cycle-free.

use crate::entity::{Obstacle, Objective, Pod, PodState, Position, SessionPhase, Vector};
use crate::physics;
use crate::presentation::{ChatChannel, Presentation};
use log::{debug, info};
use shared::config::GameConfig;
use shared::protocol::{GamePhase, PodCoords, PodTick, ScoreEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// How long the command sender may wait for the local pod's guard before
/// giving up on the cycle.
pub const COMMAND_GUARD_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Default)]
struct ObjectiveSlot {
    current: Option<Objective>,
    /// Cosmetic variant counter, cycles `1..=7` across objective
    /// replacements and resets with the session.
    cycle: u8,
}

/// Owner of all mirrored game state.
pub struct Registry {
    config: GameConfig,
    presentation: Arc<dyn Presentation>,
    pseudonym: String,
    phase: Mutex<SessionPhase>,
    user_can_play: AtomicBool,
    player: RwLock<Option<Arc<Pod>>>,
    opponents: Mutex<HashMap<String, Arc<Pod>>>,
    obstacles: Mutex<Vec<Obstacle>>,
    objective: Mutex<ObjectiveSlot>,
}

impl Registry {
    pub fn new(config: GameConfig, pseudonym: &str, presentation: Arc<dyn Presentation>) -> Self {
        Self {
            config,
            presentation,
            pseudonym: pseudonym.to_string(),
            phase: Mutex::new(SessionPhase::Uninitialized),
            user_can_play: AtomicBool::new(false),
            player: RwLock::new(None),
            opponents: Mutex::new(HashMap::new()),
            obstacles: Mutex::new(Vec::new()),
            objective: Mutex::new(ObjectiveSlot::default()),
        }
    }

    /// The local player's pseudonym.
    pub fn pseudonym(&self) -> &str {
        &self.pseudonym
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Whether local input commands are currently accepted.
    pub fn user_can_play(&self) -> bool {
        self.user_can_play.load(Ordering::SeqCst)
    }

    pub async fn phase(&self) -> SessionPhase {
        *self.phase.lock().await
    }

    pub async fn mark_connected(&self) {
        *self.phase.lock().await = SessionPhase::Connected;
    }

    pub async fn local_player(&self) -> Option<Arc<Pod>> {
        self.player.read().await.clone()
    }

    pub async fn opponent(&self, pseudonym: &str) -> Option<Arc<Pod>> {
        self.opponents.lock().await.get(pseudonym).cloned()
    }

    pub async fn opponent_count(&self) -> usize {
        self.opponents.lock().await.len()
    }

    pub async fn obstacle_count(&self) -> usize {
        self.obstacles.lock().await.len()
    }

    /// Position and variant of the live objective, if any.
    pub async fn objective(&self) -> Option<(f64, f64, u8)> {
        self.objective
            .lock()
            .await
            .current
            .map(|objective| (objective.x, objective.y, objective.variant))
    }

    // ---- registry operations ------------------------------------------------

    /// Creates the local pod at full precision, angle 0, zero vector.
    pub async fn create_local_player(&self, x: f64, y: f64) {
        let handle = self.presentation.on_pod_created(x, y);
        let pod = Arc::new(Pod::new(
            &self.pseudonym,
            Some(Position { x, y }),
            0.0,
            Some(handle),
        ));
        *self.player.write().await = Some(pod);
    }

    /// Registers an opponent whose position is not yet known; its pod gets
    /// a render handle when the first tick for it arrives.
    pub async fn create_opponent(&self, pseudonym: &str) {
        self.presentation.on_chat_opened(pseudonym);
        let pod = Arc::new(Pod::new(pseudonym, None, 0.0, None));
        self.opponents
            .lock()
            .await
            .insert(pseudonym.to_string(), pod);
        debug!("Opponent {} registered without a position", pseudonym);
    }

    /// Registers an opponent at a known position (session start).
    pub async fn create_opponent_at(&self, pseudonym: &str, x: f64, y: f64) {
        self.presentation.on_chat_opened(pseudonym);
        let handle = self.presentation.on_pod_created(x, y);
        let pod = Arc::new(Pod::new(
            pseudonym,
            Some(Position { x, y }),
            0.0,
            Some(handle),
        ));
        self.opponents
            .lock()
            .await
            .insert(pseudonym.to_string(), pod);
    }

    /// Removes an opponent and its chat side-channel. No-op if absent.
    pub async fn remove_player(&self, pseudonym: &str) {
        let removed = self.opponents.lock().await.remove(pseudonym);
        if let Some(pod) = removed {
            let state = pod.state().lock().await;
            if let Some(handle) = state.render {
                self.presentation.on_entity_removed(handle);
            }
            drop(state);
            self.presentation.on_chat_closed(pseudonym);
            debug!("Opponent {} removed", pseudonym);
        }
    }

    /// Applies one authoritative tick to every pod it names.
    ///
    /// A pod with an unknown position is initialized from scratch and gets
    /// its render handle here; otherwise the four numeric fields update
    /// atomically under one guard acquisition. Ticks arriving before the
    /// session exists, or naming pods we do not know, are ignored.
    pub async fn apply_tick(&self, ticks: &[PodTick]) {
        let Some(player) = self.player.read().await.clone() else {
            return;
        };

        for tick in ticks {
            if tick.pseudonym == self.pseudonym {
                let mut state = player.state().lock().await;
                apply_tick_fields(&mut state, tick);
            } else {
                let opponents = self.opponents.lock().await;
                if let Some(opponent) = opponents.get(&tick.pseudonym) {
                    let mut state = opponent.state().lock().await;
                    let first_sighting = state.position.is_none();
                    apply_tick_fields(&mut state, tick);
                    if first_sighting {
                        state.render = Some(self.presentation.on_pod_created(tick.x, tick.y));
                    }
                }
            }
        }
    }

    /// Replaces the objective, cycling the cosmetic variant `1..=7`.
    pub async fn set_objective(&self, x: f64, y: f64) {
        let mut slot = self.objective.lock().await;
        if let Some(previous) = slot.current.take() {
            self.presentation.on_entity_removed(previous.render);
        }
        slot.cycle += 1;
        if slot.cycle > 7 {
            slot.cycle = 1;
        }
        let handle = self.presentation.on_objective_shown(x, y, slot.cycle);
        slot.current = Some(Objective {
            x,
            y,
            variant: slot.cycle,
            render: handle,
        });
    }

    /// Adds obstacles from a server list.
    pub async fn add_obstacles(&self, coords: &[(f64, f64)]) {
        let mut obstacles = self.obstacles.lock().await;
        for &(x, y) in coords {
            let handle = self.presentation.on_obstacle_created(x, y);
            obstacles.push(Obstacle { x, y, render: handle });
        }
    }

    /// Drains every entity and render resource; the session is over.
    pub async fn reset_session(&self) {
        self.user_can_play.store(false, Ordering::SeqCst);

        if let Some(pod) = self.player.write().await.take() {
            let state = pod.state().lock().await;
            if let Some(handle) = state.render {
                self.presentation.on_entity_removed(handle);
            }
        }

        let mut opponents = self.opponents.lock().await;
        for (pseudonym, pod) in opponents.drain() {
            let state = pod.state().lock().await;
            if let Some(handle) = state.render {
                self.presentation.on_entity_removed(handle);
            }
            drop(state);
            self.presentation.on_chat_closed(&pseudonym);
        }
        drop(opponents);

        let mut obstacles = self.obstacles.lock().await;
        for obstacle in obstacles.drain(..) {
            self.presentation.on_entity_removed(obstacle.render);
        }
        drop(obstacles);

        let mut slot = self.objective.lock().await;
        if let Some(objective) = slot.current.take() {
            self.presentation.on_entity_removed(objective.render);
        }
        slot.cycle = 0;
    }

    // ---- event handlers -----------------------------------------------------

    pub async fn handle_status(&self, phase: GamePhase) {
        *self.phase.lock().await = match phase {
            GamePhase::Waiting => SessionPhase::Waiting,
            GamePhase::Playing => SessionPhase::Playing,
        };
        self.presentation.on_status_changed(phase);
    }

    pub fn handle_scores(&self, scores: &[ScoreEntry]) {
        self.presentation.on_scores_changed(scores);
    }

    /// Creates every pod and the first objective, then opens play.
    pub async fn handle_session_start(&self, pods: &[PodCoords], objective: (f64, f64)) {
        info!("Session starting with {} pods", pods.len());
        for pod in pods {
            if pod.pseudonym == self.pseudonym {
                self.create_local_player(pod.x, pod.y).await;
            } else {
                self.create_opponent_at(&pod.pseudonym, pod.x, pod.y).await;
            }
        }
        self.set_objective(objective.0, objective.1).await;
        *self.phase.lock().await = SessionPhase::Playing;
        self.user_can_play.store(true, Ordering::SeqCst);
        self.presentation.on_status_changed(GamePhase::Playing);
    }

    /// Picks the winner (highest score, first seen on ties), resets the
    /// session and announces the result. The caller must have stopped the
    /// tick loops first.
    pub async fn handle_winner(&self, scores: &[ScoreEntry]) {
        let mut best: Option<&ScoreEntry> = None;
        for entry in scores {
            if best.map_or(true, |current| entry.score > current.score) {
                best = Some(entry);
            }
        }

        self.reset_session().await;
        *self.phase.lock().await = SessionPhase::Ended;

        if let Some(winner) = best {
            self.presentation
                .on_winner_announced(&winner.pseudonym, winner.pseudonym == self.pseudonym);
        }
    }

    pub async fn handle_denied(&self) {
        *self.phase.lock().await = SessionPhase::Ended;
        self.presentation.on_connection_denied();
    }

    pub fn handle_public_chat(&self, text: &str) {
        self.presentation
            .on_chat_message(&ChatChannel::Public, text, false);
    }

    pub fn handle_private_chat(&self, from: &str, text: &str) {
        self.presentation
            .on_chat_message(&ChatChannel::Private(from.to_string()), text, false);
    }

    // ---- local input --------------------------------------------------------

    /// Rotates the local pod clockwise by one turn step.
    pub async fn rotate_clockwise(&self) {
        let turn = self.config.turn_it;
        self.rotate_by(-turn).await;
    }

    /// Rotates the local pod counter-clockwise by one turn step.
    pub async fn rotate_counter_clockwise(&self) {
        let turn = self.config.turn_it;
        self.rotate_by(turn).await;
    }

    async fn rotate_by(&self, degrees: f64) {
        if !self.user_can_play() {
            return;
        }
        let Some(pod) = self.player.read().await.clone() else {
            return;
        };
        let mut state = pod.state().lock().await;
        state.angle = (state.angle + degrees).rem_euclid(360.0);
        state.angle_command += degrees;
        if let Some(handle) = state.render {
            state.render = Some(self.presentation.on_pod_rotated(handle, state.angle));
        }
    }

    /// Applies one thrust pulse along the local pod's heading.
    pub async fn thrust(&self) {
        if !self.user_can_play() {
            return;
        }
        let Some(pod) = self.player.read().await.clone() else {
            return;
        };
        let mut state = pod.state().lock().await;
        let heading = state.angle.to_radians();
        state.vector.x += self.config.thrust_it * heading.cos();
        state.vector.y += self.config.thrust_it * -heading.sin();
        state.thrust_command += 1;
    }

    /// Reads and resets the accumulated command counters in one guard
    /// acquisition, bounded by [`COMMAND_GUARD_TIMEOUT`]. Returns the
    /// rotation delta in radians and the thrust pulse count, or `None` when
    /// there is no local pod or the guard stayed contended.
    pub async fn take_command(&self) -> Option<(f64, u32)> {
        let pod = self.player.read().await.clone()?;
        let result = match tokio::time::timeout(COMMAND_GUARD_TIMEOUT, pod.state().lock()).await {
            Ok(mut state) => {
                let command = (state.angle_command.to_radians(), state.thrust_command);
                state.angle_command = 0.0;
                state.thrust_command = 0;
                Some(command)
            }
            Err(_) => {
                debug!("Pod guard contended, skipping this command cycle");
                None
            }
        };
        result
    }

    // ---- physics tick -------------------------------------------------------

    /// Integrates and collision-checks every pod with a known position,
    /// notifying the presentation for each one moved. Called once per
    /// refresh tick.
    pub async fn update_every_pod(&self) {
        let player = self.player.read().await.clone();

        if let Some(pod) = &player {
            let mut state = pod.state().lock().await;
            if state.position.is_some() {
                physics::integrate(&mut state, self.config.arena_l, self.config.arena_h);
                self.check_collisions(pod, &mut state, None, None).await;
                self.notify_moved(&state);
            }
        }

        let opponents = self.opponents.lock().await;
        for opponent in opponents.values() {
            let mut state = opponent.state().lock().await;
            if state.position.is_none() {
                continue;
            }
            physics::integrate(&mut state, self.config.arena_l, self.config.arena_h);
            self.check_collisions(opponent, &mut state, Some(&*opponents), player.as_ref())
                .await;
            self.notify_moved(&state);
        }
    }

    /// Collision pass for one freshly integrated pod: against the local
    /// player (when the moving pod is an opponent), against every other
    /// known-position opponent, and against every obstacle.
    async fn check_collisions(
        &self,
        moving: &Pod,
        state: &mut PodState,
        locked_opponents: Option<&HashMap<String, Arc<Pod>>>,
        player: Option<&Arc<Pod>>,
    ) {
        let Some(position) = state.position else {
            return;
        };
        let pod_side = self.config.pod_side;
        let asteroid_side = self.config.asteroid_side;

        if let Some(pod) = player {
            let mut other = pod.state().lock().await;
            if let Some(other_position) = other.position {
                if physics::check_hit(
                    position.x,
                    position.y,
                    pod_side,
                    other_position.x,
                    other_position.y,
                    asteroid_side,
                ) {
                    physics::resolve_pod_collision(state, &mut other, pod_side);
                }
            }
        }

        match locked_opponents {
            Some(opponents) => {
                self.collide_against_opponents(moving, state, position, opponents)
                    .await
            }
            None => {
                let opponents = self.opponents.lock().await;
                self.collide_against_opponents(moving, state, position, &opponents)
                    .await
            }
        }

        let obstacles = self.obstacles.lock().await;
        for obstacle in obstacles.iter() {
            if physics::check_hit(
                position.x,
                position.y,
                pod_side,
                obstacle.x,
                obstacle.y,
                asteroid_side,
            ) {
                physics::resolve_obstacle_collision(
                    state,
                    obstacle.x,
                    obstacle.y,
                    pod_side,
                    asteroid_side,
                );
            }
        }
    }

    async fn collide_against_opponents(
        &self,
        moving: &Pod,
        state: &mut PodState,
        position: Position,
        opponents: &HashMap<String, Arc<Pod>>,
    ) {
        for other in opponents.values() {
            // Never against itself: locking the moving pod twice would hang.
            if other.pseudonym() == moving.pseudonym() {
                continue;
            }
            let mut other_state = other.state().lock().await;
            if let Some(other_position) = other_state.position {
                if physics::check_hit(
                    position.x,
                    position.y,
                    self.config.pod_side,
                    other_position.x,
                    other_position.y,
                    self.config.asteroid_side,
                ) {
                    physics::resolve_pod_collision(state, &mut other_state, self.config.pod_side);
                }
            }
        }
    }

    fn notify_moved(&self, state: &PodState) {
        if let (Some(position), Some(handle)) = (state.position, state.render) {
            self.presentation.on_pod_moved(handle, position.x, position.y);
        }
    }
}

/// Writes one tick's four numeric fields; the angle arrives in radians and
/// is stored as rounded degrees in `[0, 360)`.
fn apply_tick_fields(state: &mut PodState, tick: &PodTick) {
    state.position = Some(Position {
        x: tick.x,
        y: tick.y,
    });
    state.vector = Vector {
        x: tick.vx,
        y: tick.vy,
    };
    state.angle = tick.angle.to_degrees().round().rem_euclid(360.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{PresentationCall, RecordingPresentation};
    use assert_approx_eq::assert_approx_eq;

    fn test_config() -> GameConfig {
        GameConfig::from_json_str(
            r#"{
                "turn_it": 15,
                "thrust_it": 2.0,
                "server_tickrate": 20,
                "refresh_tickrate": 60,
                "arena_h": 300.0,
                "arena_l": 400.0,
                "pod_side": 30.0,
                "ball_side": 20.0,
                "asteroid_side": 40.0
            }"#,
        )
        .unwrap()
    }

    fn test_registry() -> (Arc<Registry>, Arc<RecordingPresentation>) {
        let presentation = Arc::new(RecordingPresentation::new());
        let registry = Arc::new(Registry::new(test_config(), "alice", presentation.clone()));
        (registry, presentation)
    }

    fn tick(pseudonym: &str, x: f64, y: f64, vx: f64, vy: f64, angle: f64) -> PodTick {
        PodTick {
            pseudonym: pseudonym.to_string(),
            x,
            y,
            vx,
            vy,
            angle,
        }
    }

    async fn start_two_pod_session(registry: &Registry) {
        let pods = vec![
            PodCoords {
                pseudonym: "alice".to_string(),
                x: 0.0,
                y: 0.0,
            },
            PodCoords {
                pseudonym: "bob".to_string(),
                x: 100.0,
                y: 100.0,
            },
        ];
        registry.handle_session_start(&pods, (50.0, 50.0)).await;
    }

    #[tokio::test]
    async fn test_session_start_creates_everything() {
        let (registry, _presentation) = test_registry();
        start_two_pod_session(&registry).await;

        assert!(registry.local_player().await.is_some());
        assert_eq!(registry.opponent_count().await, 1);
        assert!(registry.user_can_play());
        assert_eq!(registry.phase().await, SessionPhase::Playing);
        assert_eq!(registry.objective().await, Some((50.0, 50.0, 1)));
    }

    #[tokio::test]
    async fn test_first_tick_initializes_unknown_opponent_in_place() {
        let (registry, _presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;
        registry.create_opponent("bob").await;

        let before = registry.opponent("bob").await.unwrap();
        {
            let state = before.state().lock().await;
            assert!(state.position.is_none());
            assert!(state.render.is_none());
        }

        registry
            .apply_tick(&[tick("bob", 10.0, 20.0, 1.0, -1.0, std::f64::consts::PI)])
            .await;

        let after = registry.opponent("bob").await.unwrap();
        // Same identity object, now fully initialized.
        assert!(Arc::ptr_eq(&before, &after));
        let state = after.state().lock().await;
        assert_eq!(state.position, Some(Position { x: 10.0, y: 20.0 }));
        assert_eq!(state.vector, Vector { x: 1.0, y: -1.0 });
        assert_eq!(state.angle, 180.0);
        assert!(state.render.is_some());
    }

    #[tokio::test]
    async fn test_later_ticks_update_in_place() {
        let (registry, presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;
        registry.create_opponent("bob").await;

        registry
            .apply_tick(&[tick("bob", 10.0, 20.0, 0.0, 0.0, 0.0)])
            .await;
        let created = presentation.call_count();

        registry
            .apply_tick(&[tick("bob", 11.0, 21.0, 0.5, 0.5, 0.1)])
            .await;
        // No new render resources for a known pod.
        assert_eq!(presentation.call_count(), created);

        let pod = registry.opponent("bob").await.unwrap();
        let state = pod.state().lock().await;
        assert_eq!(state.position, Some(Position { x: 11.0, y: 21.0 }));
    }

    #[tokio::test]
    async fn test_tick_before_session_is_ignored() {
        let (registry, presentation) = test_registry();
        registry
            .apply_tick(&[tick("alice", 1.0, 2.0, 0.0, 0.0, 0.0)])
            .await;
        assert_eq!(presentation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_for_unknown_pseudonym_is_ignored() {
        let (registry, _presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;
        registry
            .apply_tick(&[tick("stranger", 1.0, 2.0, 0.0, 0.0, 0.0)])
            .await;
        assert_eq!(registry.opponent_count().await, 0);
    }

    #[tokio::test]
    async fn test_tick_angle_is_rounded_degrees() {
        let (registry, _presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;
        registry
            .apply_tick(&[tick("alice", 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_3)])
            .await;

        let pod = registry.local_player().await.unwrap();
        let state = pod.state().lock().await;
        assert_eq!(state.angle, 60.0);
    }

    #[tokio::test]
    async fn test_objective_variant_cycles_and_replaces() {
        let (registry, presentation) = test_registry();
        for round in 1..=15 {
            registry.set_objective(round as f64, 0.0).await;
            let (_, _, variant) = registry.objective().await.unwrap();
            assert!((1u8..=7).contains(&variant));
            let expected = if round % 7 == 0 { 7 } else { round % 7 };
            assert_eq!(variant, expected as u8);
        }

        // Each replacement removed the previous render handle first.
        let removals = presentation
            .calls()
            .iter()
            .filter(|call| matches!(call, PresentationCall::EntityRemoved { .. }))
            .count();
        assert_eq!(removals, 14);
    }

    #[tokio::test]
    async fn test_input_rejected_until_session_starts() {
        let (registry, _presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;

        registry.thrust().await;
        registry.rotate_clockwise().await;

        let pod = registry.local_player().await.unwrap();
        let state = pod.state().lock().await;
        assert_eq!(state.vector, Vector::default());
        assert_eq!(state.angle, 0.0);
        assert_eq!(state.thrust_command, 0);
        assert_eq!(state.angle_command, 0.0);
    }

    #[tokio::test]
    async fn test_rotation_wraps_and_accumulates() {
        let (registry, _presentation) = test_registry();
        start_two_pod_session(&registry).await;

        registry.rotate_clockwise().await;
        let pod = registry.local_player().await.unwrap();
        {
            let state = pod.state().lock().await;
            assert_eq!(state.angle, 345.0);
            assert_eq!(state.angle_command, -15.0);
        }

        registry.rotate_counter_clockwise().await;
        registry.rotate_counter_clockwise().await;
        let state = pod.state().lock().await;
        assert_eq!(state.angle, 15.0);
        assert_eq!(state.angle_command, 15.0);
    }

    #[tokio::test]
    async fn test_thrust_follows_heading() {
        let (registry, _presentation) = test_registry();
        start_two_pod_session(&registry).await;

        let pod = registry.local_player().await.unwrap();
        {
            let mut state = pod.state().lock().await;
            state.angle = 90.0;
        }
        registry.thrust().await;

        let state = pod.state().lock().await;
        assert_approx_eq!(state.vector.x, 0.0);
        // The y axis points down on screen, so heading 90 thrusts upward.
        assert_approx_eq!(state.vector.y, -2.0);
        assert_eq!(state.thrust_command, 1);
    }

    #[tokio::test]
    async fn test_take_command_resets_counters() {
        let (registry, _presentation) = test_registry();
        start_two_pod_session(&registry).await;

        registry.rotate_clockwise().await;
        registry.thrust().await;
        registry.thrust().await;

        let (angle, pulses) = registry.take_command().await.unwrap();
        assert_approx_eq!(angle, (-15.0f64).to_radians());
        assert_eq!(pulses, 2);

        let (angle, pulses) = registry.take_command().await.unwrap();
        assert_eq!(angle, 0.0);
        assert_eq!(pulses, 0);
    }

    #[tokio::test]
    async fn test_take_command_without_player() {
        let (registry, _presentation) = test_registry();
        assert!(registry.take_command().await.is_none());
    }

    #[tokio::test]
    async fn test_remove_player_is_noop_when_absent() {
        let (registry, presentation) = test_registry();
        registry.remove_player("ghost").await;
        assert_eq!(presentation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_player_releases_resources() {
        let (registry, presentation) = test_registry();
        start_two_pod_session(&registry).await;
        registry.remove_player("bob").await;

        assert_eq!(registry.opponent_count().await, 0);
        let calls = presentation.calls();
        assert!(calls
            .iter()
            .any(|call| matches!(call, PresentationCall::EntityRemoved { .. })));
        assert!(calls
            .iter()
            .any(|call| matches!(call, PresentationCall::ChatClosed(name) if name == "bob")));
    }

    #[tokio::test]
    async fn test_winner_resets_session() {
        let (registry, presentation) = test_registry();
        start_two_pod_session(&registry).await;
        registry.add_obstacles(&[(10.0, 10.0)]).await;

        let scores = vec![
            ScoreEntry {
                pseudonym: "alice".to_string(),
                score: 3,
            },
            ScoreEntry {
                pseudonym: "bob".to_string(),
                score: 7,
            },
        ];
        registry.handle_winner(&scores).await;

        assert!(registry.local_player().await.is_none());
        assert_eq!(registry.opponent_count().await, 0);
        assert_eq!(registry.obstacle_count().await, 0);
        assert!(registry.objective().await.is_none());
        assert!(!registry.user_can_play());
        assert_eq!(registry.phase().await, SessionPhase::Ended);

        let calls = presentation.calls();
        assert!(calls.iter().any(|call| matches!(
            call,
            PresentationCall::WinnerAnnounced { pseudonym, is_local: false } if pseudonym == "bob"
        )));

        // Variant counter starts over in the next session.
        registry.set_objective(0.0, 0.0).await;
        assert_eq!(registry.objective().await.unwrap().2, 1);
    }

    #[tokio::test]
    async fn test_winner_tie_keeps_first_entry() {
        let (registry, presentation) = test_registry();
        start_two_pod_session(&registry).await;

        let scores = vec![
            ScoreEntry {
                pseudonym: "bob".to_string(),
                score: 5,
            },
            ScoreEntry {
                pseudonym: "alice".to_string(),
                score: 5,
            },
        ];
        registry.handle_winner(&scores).await;

        assert!(presentation.calls().iter().any(|call| matches!(
            call,
            PresentationCall::WinnerAnnounced { pseudonym, .. } if pseudonym == "bob"
        )));
    }

    #[tokio::test]
    async fn test_update_moves_pod_and_notifies() {
        let (registry, presentation) = test_registry();
        start_two_pod_session(&registry).await;

        let pod = registry.local_player().await.unwrap();
        {
            let mut state = pod.state().lock().await;
            state.vector = Vector { x: 2.0, y: -1.0 };
        }
        registry.update_every_pod().await;

        let state = pod.state().lock().await;
        let position = state.position.unwrap();
        assert_approx_eq!(position.x, 2.0);
        assert_approx_eq!(position.y, -1.0);
        drop(state);

        assert!(presentation
            .calls()
            .iter()
            .any(|call| matches!(call, PresentationCall::PodMoved { .. })));
    }

    #[tokio::test]
    async fn test_update_wraps_at_arena_edge() {
        let (registry, _presentation) = test_registry();
        start_two_pod_session(&registry).await;

        let pod = registry.local_player().await.unwrap();
        {
            let mut state = pod.state().lock().await;
            state.position = Some(Position { x: 399.5, y: 0.0 });
            state.vector = Vector { x: 2.0, y: 0.0 };
        }
        registry.update_every_pod().await;

        let state = pod.state().lock().await;
        assert_approx_eq!(state.position.unwrap().x, -398.5);
    }

    #[tokio::test]
    async fn test_update_resolves_pod_collision() {
        let (registry, _presentation) = test_registry();
        let pods = vec![
            PodCoords {
                pseudonym: "alice".to_string(),
                x: 0.0,
                y: 0.0,
            },
            PodCoords {
                pseudonym: "bob".to_string(),
                x: 20.0,
                y: 0.0,
            },
        ];
        registry.handle_session_start(&pods, (200.0, 200.0)).await;

        let alice = registry.local_player().await.unwrap();
        let bob = registry.opponent("bob").await.unwrap();
        {
            let mut state = alice.state().lock().await;
            state.vector = Vector { x: 1.0, y: 0.0 };
        }
        {
            let mut state = bob.state().lock().await;
            state.vector = Vector { x: -1.0, y: 0.0 };
        }

        registry.update_every_pod().await;

        // Head-on contact: the normal components swapped.
        let alice_state = alice.state().lock().await;
        assert!(alice_state.vector.x < 0.0);
        drop(alice_state);
        let bob_state = bob.state().lock().await;
        assert!(bob_state.vector.x > 0.0);
    }

    #[tokio::test]
    async fn test_unknown_position_opponent_is_skipped_by_update() {
        let (registry, presentation) = test_registry();
        registry.create_local_player(0.0, 0.0).await;
        registry.create_opponent("bob").await;

        let moves_before = presentation
            .calls()
            .iter()
            .filter(|call| matches!(call, PresentationCall::PodMoved { .. }))
            .count();
        registry.update_every_pod().await;
        let moves_after = presentation
            .calls()
            .iter()
            .filter(|call| matches!(call, PresentationCall::PodMoved { .. }))
            .count();

        // Only the local pod produced a move notification.
        assert_eq!(moves_after - moves_before, 1);
    }
}
