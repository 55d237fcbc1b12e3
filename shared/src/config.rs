//! Game constants, loaded once at startup from a JSON file.
//!
//! Every peer of the protocol reads the same `data.json`; the physics only
//! matches the server when both sides agree on these values, so every field
//! is required and a missing key is a startup error rather than a default.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The game constants shared by client and server.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Degrees added or removed by one rotation command.
    pub turn_it: f64,
    /// Velocity gained along the pod's heading by one thrust pulse.
    pub thrust_it: f64,
    /// Rate at which accumulated commands are flushed to the server (Hz).
    pub server_tickrate: f64,
    /// Rate at which local positions are integrated (Hz).
    pub refresh_tickrate: f64,
    /// Arena half-extent along the y axis.
    pub arena_h: f64,
    /// Arena half-extent along the x axis.
    pub arena_l: f64,
    /// Side length of a pod.
    pub pod_side: f64,
    /// Side length of an objective ball.
    pub ball_side: f64,
    /// Side length of an asteroid.
    pub asteroid_side: f64,
}

impl GameConfig {
    /// Parses the constants from a JSON string.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses the constants file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?)
    }

    /// Interval between two command flushes.
    pub fn server_tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.server_tickrate)
    }

    /// Interval between two local position updates.
    pub fn refresh_tick(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_tickrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "turn_it": 15,
        "thrust_it": 1.5,
        "server_tickrate": 20,
        "refresh_tickrate": 60,
        "arena_h": 300.0,
        "arena_l": 400.0,
        "pod_side": 30.0,
        "ball_side": 20.0,
        "asteroid_side": 40.0
    }"#;

    #[test]
    fn test_parse_full_config() {
        let config = GameConfig::from_json_str(FULL).unwrap();
        assert_eq!(config.turn_it, 15.0);
        assert_eq!(config.thrust_it, 1.5);
        assert_eq!(config.server_tickrate, 20.0);
        assert_eq!(config.refresh_tickrate, 60.0);
        assert_eq!(config.arena_h, 300.0);
        assert_eq!(config.arena_l, 400.0);
        assert_eq!(config.pod_side, 30.0);
        assert_eq!(config.ball_side, 20.0);
        assert_eq!(config.asteroid_side, 40.0);
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let incomplete = r#"{"turn_it": 15, "thrust_it": 1.5}"#;
        assert!(GameConfig::from_json_str(incomplete).is_err());
    }

    #[test]
    fn test_tick_intervals() {
        let config = GameConfig::from_json_str(FULL).unwrap();
        assert_eq!(config.server_tick(), Duration::from_millis(50));
        assert_eq!(
            config.refresh_tick(),
            Duration::from_secs_f64(1.0 / 60.0)
        );
    }
}
