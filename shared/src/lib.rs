//! Shared building blocks of the pod arena game.
//!
//! This crate holds everything both ends of the wire must agree on: the
//! text-protocol codec ([`protocol`]) and the game constants ([`config`]).
//! It contains no networking or game state of its own.

pub mod config;
pub mod protocol;

pub use config::GameConfig;
pub use protocol::{
    parse_chunk, Decoded, GamePhase, PodCoords, PodTick, ScoreEntry, ServerEvent,
};
