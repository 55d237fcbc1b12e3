//! Codec for the `/`-delimited text protocol.
//!
//! Inbound traffic is a stream of fields separated by `/`; several logical
//! messages may arrive glued together in one read, and one message may be
//! cut across two reads. [`parse_chunk`] scans token by token, turns every
//! complete message into typed [`ServerEvent`]s and hands back the
//! unconsumed tail so the caller can prepend it to the next chunk.
//!
//! Outbound frames are built by the `*_frame` helpers; the transport is
//! responsible for the terminating newline.

use log::warn;
use regex::Regex;
use std::sync::OnceLock;

/// Phase reported by the server on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Waiting,
    Playing,
}

/// One row of the score table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub pseudonym: String,
    pub score: i32,
}

/// Initial coordinates of one pod, from a session-start message.
#[derive(Debug, Clone, PartialEq)]
pub struct PodCoords {
    pub pseudonym: String,
    pub x: f64,
    pub y: f64,
}

/// Full authoritative state of one pod, from a tick message.
/// The angle is in radians, as sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PodTick {
    pub pseudonym: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Status(GamePhase),
    Scores(Vec<ScoreEntry>),
    Obstacles(Vec<(f64, f64)>),
    SessionStart {
        pods: Vec<PodCoords>,
        objective: (f64, f64),
    },
    PlayerJoined {
        pseudonym: String,
    },
    PlayerLeft {
        pseudonym: String,
    },
    Winner(Vec<ScoreEntry>),
    Tick(Vec<PodTick>),
    NewObjective {
        x: f64,
        y: f64,
    },
    PublicChat {
        text: String,
    },
    PrivateChat {
        text: String,
        from: String,
    },
    Denied,
}

/// Result of scanning one chunk: the events decoded from it, plus the
/// trailing portion that needs more bytes before it can be decoded.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    pub events: Vec<ServerEvent>,
    pub remainder: String,
}

fn float_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-?[0-9]+\.?[0-9]+E?-?[0-9]*").expect("float pattern is a valid regex")
    })
}

/// Extracts exactly `count` signed floats (optional exponent) from a field.
fn extract_floats(field: &str, count: usize) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(count);
    for found in float_pattern().find_iter(field) {
        if out.len() == count {
            break;
        }
        out.push(found.as_str().parse::<f64>().ok()?);
    }
    if out.len() == count {
        Some(out)
    } else {
        None
    }
}

/// Parses a `pseudo:<int>` score table. Empty entries are skipped; any other
/// malformed entry fails the whole blob.
fn parse_scores(blob: &str) -> Option<Vec<ScoreEntry>> {
    let mut entries = Vec::new();
    for part in blob.split('|') {
        if part.is_empty() {
            continue;
        }
        let (pseudonym, score) = part.split_once(':')?;
        entries.push(ScoreEntry {
            pseudonym: pseudonym.to_string(),
            score: score.parse().ok()?,
        });
    }
    Some(entries)
}

/// Parses a `pseudo:X<x>Y<y>` coordinate table.
fn parse_coords(blob: &str) -> Option<Vec<PodCoords>> {
    let mut entries = Vec::new();
    for part in blob.split('|') {
        if part.is_empty() {
            continue;
        }
        let (pseudonym, payload) = part.split_once(':')?;
        let floats = extract_floats(payload, 2)?;
        entries.push(PodCoords {
            pseudonym: pseudonym.to_string(),
            x: floats[0],
            y: floats[1],
        });
    }
    Some(entries)
}

/// Parses a `pseudo:X<x>Y<y>VX<vx>VY<vy>T<angle>` table.
fn parse_vcoords(blob: &str) -> Option<Vec<PodTick>> {
    let mut entries = Vec::new();
    for part in blob.split('|') {
        if part.is_empty() {
            continue;
        }
        let (pseudonym, payload) = part.split_once(':')?;
        let floats = extract_floats(payload, 5)?;
        entries.push(PodTick {
            pseudonym: pseudonym.to_string(),
            x: floats[0],
            y: floats[1],
            vx: floats[2],
            vy: floats[3],
            angle: floats[4],
        });
    }
    Some(entries)
}

/// Parses an obstacle-style coordinate list (`obs<i>:X<x>Y<y>|...`).
///
/// This grammar is tolerant: empty entries (including the customary trailing
/// one) are skipped, the part before the first `:` is ignored, and an entry
/// without two readable coordinates is dropped with a warning instead of
/// failing the message.
fn parse_obstacles(blob: &str) -> Vec<(f64, f64)> {
    let mut entries = Vec::new();
    for part in blob.split('|') {
        if part.is_empty() {
            continue;
        }
        let payload = match part.split_once(':') {
            Some((_, payload)) => payload,
            None => part,
        };
        match extract_floats(payload, 2) {
            Some(floats) => entries.push((floats[0], floats[1])),
            None => warn!("Dropping unreadable coordinate entry {:?}", part),
        }
    }
    entries
}

/// Parses a single `X<x>Y<y>` objective position.
fn parse_objective(blob: &str) -> Option<(f64, f64)> {
    let floats = extract_floats(blob, 2)?;
    Some((floats[0], floats[1]))
}

/// Number of payload fields following each message tag.
fn payload_fields(tag: &str) -> Option<usize> {
    match tag {
        "WELCOME" => Some(4),
        "DENIED" => Some(0),
        "NEWPLAYER" | "PLAYERLEFT" | "WINNER" | "TICK" | "RECEPTION" => Some(1),
        "NEWOBJ" | "PRECEPTION" => Some(2),
        "SESSION" => Some(3),
        _ => None,
    }
}

/// Scans one decoded text chunk and produces the events it contains.
///
/// A message whose numeric payload is malformed is dropped with a warning;
/// the scan still advances past its full field count so that the following
/// messages stay aligned. A message cut off by the end of an unterminated
/// chunk is returned in `remainder` untouched.
pub fn parse_chunk(chunk: &str) -> Decoded {
    let terminated = chunk.ends_with('/');
    let tokens: Vec<&str> = chunk.split('/').collect();

    let mut decoded = Decoded::default();
    let mut i = 0;
    while i < tokens.len() {
        let tag = tokens[i];
        let count = match payload_fields(tag) {
            Some(count) => count,
            None => {
                // An unrecognized final token of an unterminated chunk may
                // be the first half of a split tag: keep it for the next read.
                if i == tokens.len() - 1 && !terminated && !tag.is_empty() {
                    decoded.remainder = tag.to_string();
                }
                i += 1;
                continue;
            }
        };

        let last = i + count;
        if last >= tokens.len() || (last == tokens.len() - 1 && !terminated) {
            decoded.remainder = tokens[i..].join("/");
            break;
        }

        match tag {
            "WELCOME" => {
                let phase = phase_of(tokens[i + 1]);
                match parse_scores(tokens[i + 2]) {
                    Some(scores) => {
                        decoded.events.push(ServerEvent::Status(phase));
                        decoded.events.push(ServerEvent::Scores(scores));
                        // The welcome message carries coordinates in both of
                        // its remaining fields; merge them into one list.
                        let mut coords = parse_obstacles(tokens[i + 3]);
                        coords.extend(parse_obstacles(tokens[i + 4]));
                        decoded.events.push(ServerEvent::Obstacles(coords));
                    }
                    None => warn!("Dropping malformed WELCOME message"),
                }
            }
            "DENIED" => decoded.events.push(ServerEvent::Denied),
            "NEWPLAYER" => decoded.events.push(ServerEvent::PlayerJoined {
                pseudonym: tokens[i + 1].to_string(),
            }),
            "PLAYERLEFT" => decoded.events.push(ServerEvent::PlayerLeft {
                pseudonym: tokens[i + 1].to_string(),
            }),
            "SESSION" => {
                match (parse_coords(tokens[i + 1]), parse_objective(tokens[i + 2])) {
                    (Some(pods), Some(objective)) => {
                        decoded
                            .events
                            .push(ServerEvent::SessionStart { pods, objective });
                        decoded
                            .events
                            .push(ServerEvent::Obstacles(parse_obstacles(tokens[i + 3])));
                    }
                    _ => warn!("Dropping malformed SESSION message"),
                }
            }
            "WINNER" => match parse_scores(tokens[i + 1]) {
                Some(scores) => decoded.events.push(ServerEvent::Winner(scores)),
                None => warn!("Dropping malformed WINNER message"),
            },
            "TICK" => match parse_vcoords(tokens[i + 1]) {
                Some(pods) => decoded.events.push(ServerEvent::Tick(pods)),
                None => warn!("Dropping malformed TICK message"),
            },
            "NEWOBJ" => {
                match (parse_objective(tokens[i + 1]), parse_scores(tokens[i + 2])) {
                    (Some((x, y)), Some(scores)) => {
                        decoded.events.push(ServerEvent::NewObjective { x, y });
                        decoded.events.push(ServerEvent::Scores(scores));
                    }
                    _ => warn!("Dropping malformed NEWOBJ message"),
                }
            }
            "RECEPTION" => decoded.events.push(ServerEvent::PublicChat {
                text: tokens[i + 1].to_string(),
            }),
            "PRECEPTION" => decoded.events.push(ServerEvent::PrivateChat {
                text: tokens[i + 1].to_string(),
                from: tokens[i + 2].to_string(),
            }),
            _ => unreachable!("tag with a known field count"),
        }

        i = last + 1;
    }

    decoded
}

fn phase_of(field: &str) -> GamePhase {
    if field == "wait" {
        GamePhase::Waiting
    } else {
        GamePhase::Playing
    }
}

/// Builds the connection request sent right after the transport opens.
pub fn connect_frame(pseudonym: &str) -> String {
    format!("CONNECT/{}/", pseudonym)
}

/// Builds one command frame from the accumulated rotation (radians) and
/// thrust pulses.
pub fn command_frame(angle_delta_radians: f64, thrust_pulses: u32) -> String {
    format!("NEWCOM/A{}T{}/", angle_delta_radians, thrust_pulses)
}

/// Builds the frame announcing that the local player leaves the session.
pub fn exit_frame(pseudonym: &str) -> String {
    format!("EXIT/{}/", pseudonym)
}

/// Builds a public chat frame.
pub fn public_chat_frame(message: &str) -> String {
    format!("ENVOI/{}/", message)
}

/// Builds a private chat frame.
pub fn private_chat_frame(target: &str, message: &str) -> String {
    format!("PENVOI/{}/{}/", target, message)
}
