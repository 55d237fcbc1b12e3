//! Entity model: pods, obstacles, the objective and the session phase.

use tokio::sync::Mutex;

/// Opaque reference to whatever the presentation layer drew for an entity.
pub type RenderHandle = u64;

/// An arena-relative coordinate pair, centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A velocity pair, updated by physics and server ticks only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

/// The mutable fields of a pod, protected by the pod's guard.
///
/// Every multi-field read or write happens under one guard acquisition;
/// readers must check `position` before doing physics or presentation work,
/// since an opponent announced by the server has no position until its
/// first tick arrives.
#[derive(Debug)]
pub struct PodState {
    pub position: Option<Position>,
    pub vector: Vector,
    /// Heading in degrees, kept in `[0, 360)`.
    pub angle: f64,
    pub render: Option<RenderHandle>,
    /// Accumulated signed rotation, in degrees. Local player only.
    pub angle_command: f64,
    /// Accumulated thrust pulses. Local player only.
    pub thrust_command: u32,
}

/// A player's in-arena entity, local or opponent.
pub struct Pod {
    pseudonym: String,
    state: Mutex<PodState>,
}

impl Pod {
    pub fn new(
        pseudonym: &str,
        position: Option<Position>,
        angle: f64,
        render: Option<RenderHandle>,
    ) -> Self {
        Self {
            pseudonym: pseudonym.to_string(),
            state: Mutex::new(PodState {
                position,
                vector: Vector::default(),
                angle,
                render,
                angle_command: 0.0,
                thrust_command: 0,
            }),
        }
    }

    /// The pod's identity, stable for the session lifetime.
    pub fn pseudonym(&self) -> &str {
        &self.pseudonym
    }

    /// The guard protecting the pod's fields.
    pub fn state(&self) -> &Mutex<PodState> {
        &self.state
    }
}

impl std::fmt::Debug for Pod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pod")
            .field("pseudonym", &self.pseudonym)
            .finish_non_exhaustive()
    }
}

/// A static asteroid. Immutable once created, bulk-cleared on session reset.
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub render: RenderHandle,
}

/// The single collectible target of a session.
#[derive(Debug, Clone, Copy)]
pub struct Objective {
    pub x: f64,
    pub y: f64,
    /// Cosmetic selection, cycles through `1..=7`.
    pub variant: u8,
    pub render: RenderHandle,
}

/// Lifecycle of the process-wide session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Connected,
    Waiting,
    Playing,
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_creation() {
        let pod = Pod::new("alice", Some(Position { x: 1.0, y: 2.0 }), 0.0, Some(7));
        assert_eq!(pod.pseudonym(), "alice");

        let state = pod.state().try_lock().unwrap();
        assert_eq!(state.position, Some(Position { x: 1.0, y: 2.0 }));
        assert_eq!(state.vector, Vector::default());
        assert_eq!(state.angle, 0.0);
        assert_eq!(state.render, Some(7));
        assert_eq!(state.angle_command, 0.0);
        assert_eq!(state.thrust_command, 0);
    }

    #[test]
    fn test_pod_without_position() {
        let pod = Pod::new("bob", None, 0.0, None);
        let state = pod.state().try_lock().unwrap();
        assert!(state.position.is_none());
        assert!(state.render.is_none());
    }

    #[tokio::test]
    async fn test_guard_is_exclusive() {
        let pod = Pod::new("alice", None, 0.0, None);
        let held = pod.state().lock().await;
        assert!(pod.state().try_lock().is_err());
        drop(held);
        assert!(pod.state().try_lock().is_ok());
    }
}
