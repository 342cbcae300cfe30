// Copyright (C) 2026 Crewfall
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const GAME_CODE_LEN: usize = 6;
pub const MIN_CAPACITY: u8 = 2;
pub const MAX_CAPACITY: u8 = 10;
pub const TOTAL_TASKS: usize = 5;

pub const DEFAULT_DISCUSSION_SECONDS: u64 = 30;
pub const DEFAULT_VOTING_SECONDS: u64 = 30;
pub const EMERGENCY_ANNOUNCE_MILLIS: u64 = 1_000;
pub const RESOLUTION_ANNOUNCE_SECONDS: u64 = 3;
pub const GHOST_DELAY_SECONDS: u64 = 3;
pub const SABOTAGE_DURATION_SECONDS: u64 = 30;
pub const SABOTAGE_COOLDOWN_SECONDS: u64 = 30;
pub const GAME_OVER_WINDOW_SECONDS: u64 = 8;

/// Swipe minigame timing bands, in milliseconds. Durations strictly below
/// the fast bound are "fast", up to the valid bound are "valid", anything
/// longer is rejected as too slow.
pub const SWIPE_FAST_MAX_MS: u64 = 400;
pub const SWIPE_VALID_MAX_MS: u64 = 700;

pub type PlayerId = u32;
pub type TaskId = u32;

/// Characters used in game codes. Uppercase alphanumerics without the
/// easily-confused O/0 and I/1 pairs.
const GAME_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlayerColor {
    Red,
    Blue,
    Green,
    Pink,
    Orange,
    Yellow,
    Black,
    White,
    Purple,
    Brown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Crewmate,
    Impostor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Alive,
    Dead,
    Ghost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    InProgress,
    Emergency,
    Discussion,
    Voting,
    Resolution,
    GameOver,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Crewmates,
    Impostors,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EliminationMethod {
    Kill,
    Vote,
}

/// Cosmetic facing/animation hint. Never load-bearing for validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Up,
    Left,
    Down,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    User,
    Timer,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoteTarget {
    Player { id: PlayerId },
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameCommand {
    Join {
        name: String,
        color: PlayerColor,
    },
    Start,
    Move {
        x: i32,
        y: i32,
        #[serde(default)]
        facing: Option<Facing>,
    },
    Task {
        task_id: TaskId,
        duration_ms: u64,
    },
    Kill {
        target_id: PlayerId,
    },
    Sabotage,
    Report {
        target_id: PlayerId,
    },
    Emergency,
    Vote {
        target: VoteTarget,
    },
}

impl GameCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            GameCommand::Join { .. } => "join",
            GameCommand::Start => "start",
            GameCommand::Move { .. } => "move",
            GameCommand::Task { .. } => "task",
            GameCommand::Kill { .. } => "kill",
            GameCommand::Sabotage => "sabotage",
            GameCommand::Report { .. } => "report",
            GameCommand::Emergency => "emergency",
            GameCommand::Vote { .. } => "vote",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    OutOfBounds,
    Blocked,
    NotAdjacent,
    WrongRole,
    WrongPhase,
    WrongStatus,
    CooldownActive,
    SabotageLocked,
    TaskAlreadyComplete,
    TooSlow,
    InvalidTarget,
    CapacityExceeded,
    DuplicateColor,
    SessionNotFull,
    SessionNotFound,
    DuplicateCommand,
    MissingPlayerId,
    UnknownTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_id: String,
    pub source: CommandSource,
    pub game_code: String,
    /// Absent only for join commands, where the id is assigned on accept.
    pub player_id: Option<PlayerId>,
    pub command: GameCommand,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub x: i32,
    pub y: i32,
    pub status: PlayerStatus,
    pub facing: Facing,
    /// Revealed once the player is no longer alive or the game is over.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub game_code: String,
    pub phase: Phase,
    pub capacity: u8,
    pub impostor_count: u8,
    pub map_id: String,
    pub players: Vec<PlayerSnapshot>,
    pub completed_tasks: Vec<TaskId>,
    pub total_tasks: usize,
    pub sabotage_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEvent {
    pub game_code: String,
    pub seq: u64,
    pub snapshot: SessionSnapshot,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub game_code: String,
    pub phase: Phase,
    /// Wall-clock deadline for phases that advance on a timer.
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EliminationEvent {
    pub game_code: String,
    pub target_id: PlayerId,
    pub method: EliminationMethod,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverEvent {
    pub game_code: String,
    pub winner: Winner,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEvent {
    pub game_code: String,
    pub player_id: Option<PlayerId>,
    pub command_id: String,
    pub command_kind: String,
    pub reason: RejectReason,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub capacity: u8,
    pub impostor_count: u8,
    #[serde(default)]
    pub map_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub game_code: String,
    pub capacity: u8,
    /// May be lower than requested: clamped to floor(capacity / 2).
    pub impostor_count: u8,
    pub map_id: String,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommandRequest {
    /// Client-chosen idempotency key. Generated by the gateway when the
    /// client leaves it out.
    #[serde(default)]
    pub command_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    pub command: GameCommand,
    pub client_sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommandResponse {
    pub accepted: bool,
    pub command_id: String,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapData {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<i32>>,
}

pub fn generate_game_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..GAME_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..GAME_CODE_CHARSET.len());
            GAME_CODE_CHARSET[idx] as char
        })
        .collect()
}

/// Clamp a requested impostor count to the legal range for the capacity.
/// At least one impostor, never more than floor(capacity / 2).
pub fn clamp_impostor_count(capacity: u8, requested: u8) -> u8 {
    requested.max(1).min(capacity / 2)
}

/// Draw roles for a full lobby: `impostor_count` impostors, the rest
/// crewmates, shuffled so assignment is independent of join order.
pub fn assign_roles<R: Rng + ?Sized>(
    player_count: usize,
    impostor_count: u8,
    rng: &mut R,
) -> Vec<Role> {
    let mut roles: Vec<Role> = (0..player_count)
        .map(|i| {
            if i < impostor_count as usize {
                Role::Impostor
            } else {
                Role::Crewmate
            }
        })
        .collect();
    roles.shuffle(rng);
    roles
}
