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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crewfall_common::{
    Facing, Phase, PlayerColor, PlayerId, PlayerSnapshot, PlayerStatus, Role, SessionSnapshot,
    TaskId, VoteTarget,
};

use crate::grid::Grid;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub x: i32,
    pub y: i32,
    pub role: Option<Role>,
    pub status: PlayerStatus,
    pub facing: Facing,
}

/// Session-wide single-slot sabotage. `activation_seq` distinguishes
/// activations so a stale expiry timer cannot clear a newer sabotage.
#[derive(Debug, Clone, Default)]
pub struct SabotageState {
    pub active_until: Option<DateTime<Utc>>,
    pub last_activated: Option<DateTime<Utc>>,
    pub activation_seq: u64,
}

impl SabotageState {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_until.is_some_and(|until| now < until)
    }

    pub fn cooldown_ready(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_activated {
            Some(at) => now - at >= cooldown,
            None => true,
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>, duration: Duration) -> u64 {
        self.active_until = Some(now + duration);
        self.last_activated = Some(now);
        self.activation_seq += 1;
        self.activation_seq
    }

    pub fn clear(&mut self) {
        self.active_until = None;
    }
}

/// The authoritative per-game aggregate. Owned exclusively by one session
/// actor; every mutation goes through command processing on that actor.
pub struct SessionState {
    pub game_code: String,
    pub capacity: u8,
    pub impostor_count: u8,
    pub grid: Arc<Grid>,
    pub phase: Phase,
    /// Bumped on every phase change. Delayed commands carry the value
    /// they were scheduled under and no-op when it has moved on.
    pub phase_seq: u64,
    pub players: Vec<Player>,
    pub completed_tasks: HashSet<TaskId>,
    pub sabotage: SabotageState,
    /// Present only while phase == Voting. Last write wins per voter.
    pub votes: Option<HashMap<PlayerId, VoteTarget>>,
    pub created_at: DateTime<Utc>,
    pub state_seq: u64,
    pub processed_commands: HashSet<String>,
}

impl SessionState {
    pub fn new(
        game_code: String,
        capacity: u8,
        impostor_count: u8,
        grid: Arc<Grid>,
        created_at: DateTime<Utc>,
    ) -> SessionState {
        SessionState {
            game_code,
            capacity,
            impostor_count,
            grid,
            phase: Phase::Lobby,
            phase_seq: 0,
            players: Vec::new(),
            completed_tasks: HashSet::new(),
            sabotage: SabotageState::default(),
            votes: None,
            created_at,
            state_seq: 0,
            processed_commands: HashSet::new(),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn color_taken(&self, color: PlayerColor) -> bool {
        self.players.iter().any(|p| p.color == color)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity as usize
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_seq += 1;
        if phase != Phase::Voting {
            self.votes = None;
        }
    }

    pub fn next_state_seq(&mut self) -> u64 {
        self.state_seq += 1;
        self.state_seq
    }

    /// Voters still counted toward early vote-session close: alive only,
    /// ghosts and the dead excluded.
    pub fn eligible_voters(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.status == PlayerStatus::Alive)
            .count()
    }

    pub fn all_votes_cast(&self) -> bool {
        match &self.votes {
            Some(votes) => votes.len() >= self.eligible_voters(),
            None => false,
        }
    }

    /// Reduce the vote ledger to an elimination decision. Plurality over
    /// all cast targets, the skip sentinel included as a candidate; any
    /// tie among the top vote-getters means no elimination. Voters who
    /// never cast count toward nothing.
    pub fn tally_votes(&self) -> Option<PlayerId> {
        let votes = self.votes.as_ref()?;
        let mut counts: HashMap<VoteTarget, usize> = HashMap::new();
        for target in votes.values() {
            *counts.entry(*target).or_insert(0) += 1;
        }

        let top = counts.values().copied().max()?;
        let mut leaders = counts
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(target, _)| *target);
        let leader = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        match leader {
            VoteTarget::Player { id } => Some(id),
            VoteTarget::Skip => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let reveal_all = self.phase == Phase::GameOver;
        let mut completed: Vec<TaskId> = self.completed_tasks.iter().copied().collect();
        completed.sort_unstable();
        SessionSnapshot {
            game_code: self.game_code.clone(),
            phase: self.phase,
            capacity: self.capacity,
            impostor_count: self.impostor_count,
            map_id: self.grid.map_id().to_string(),
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    id: p.id,
                    name: p.name.clone(),
                    color: p.color,
                    x: p.x,
                    y: p.y,
                    status: p.status,
                    facing: p.facing,
                    role: if reveal_all || p.status != PlayerStatus::Alive {
                        p.role
                    } else {
                        None
                    },
                })
                .collect(),
            completed_tasks: completed,
            total_tasks: self.grid.tasks().len(),
            sabotage_active: self.sabotage.is_active(Utc::now()),
            created_at: self.created_at,
        }
    }
}
