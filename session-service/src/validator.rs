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

//! Pure precondition checks. Every check returns `Ok(())` or a
//! `RejectReason`; session state is only mutated after a check accepts,
//! so a rejected command never leaves partial writes behind.

use chrono::{DateTime, Duration, Utc};
use crewfall_common::{
    Phase, PlayerColor, PlayerId, PlayerStatus, RejectReason, Role, SWIPE_FAST_MAX_MS,
    SWIPE_VALID_MAX_MS, TaskId, VoteTarget,
};

use crate::session::{Player, SessionState};

/// Movement adjacency rule. Four-way keeps the classic cardinal grid,
/// eight-way allows diagonals; both cap the step at distance 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementRule {
    FourWay,
    EightWay,
}

impl MovementRule {
    pub fn from_env() -> MovementRule {
        match std::env::var("MOVEMENT_RULE").as_deref() {
            Ok("four_way") => MovementRule::FourWay,
            _ => MovementRule::EightWay,
        }
    }

    fn adjacent(self, from: (i32, i32), to: (i32, i32)) -> bool {
        let dx = (to.0 - from.0).abs();
        let dy = (to.1 - from.1).abs();
        match self {
            MovementRule::FourWay => dx + dy == 1,
            MovementRule::EightWay => dx.max(dy) == 1,
        }
    }
}

fn chebyshev(a: &Player, b: &Player) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

fn issuer(state: &SessionState, player_id: PlayerId) -> Result<&Player, RejectReason> {
    state.player(player_id).ok_or(RejectReason::InvalidTarget)
}

pub fn validate_join(state: &SessionState, color: PlayerColor) -> Result<(), RejectReason> {
    if state.phase != Phase::Lobby {
        return Err(RejectReason::WrongPhase);
    }
    if state.is_full() {
        return Err(RejectReason::CapacityExceeded);
    }
    if state.color_taken(color) {
        return Err(RejectReason::DuplicateColor);
    }
    Ok(())
}

pub fn validate_start(state: &SessionState) -> Result<(), RejectReason> {
    if state.phase != Phase::Lobby {
        return Err(RejectReason::WrongPhase);
    }
    if !state.is_full() {
        return Err(RejectReason::SessionNotFull);
    }
    Ok(())
}

pub fn validate_move(
    state: &SessionState,
    player_id: PlayerId,
    x: i32,
    y: i32,
    rule: MovementRule,
) -> Result<(), RejectReason> {
    let player = issuer(state, player_id)?;
    // Ghosts keep moving and observing; only the dead-awaiting-ghost are pinned.
    if player.status == PlayerStatus::Dead {
        return Err(RejectReason::WrongStatus);
    }
    if !state.grid.in_bounds(x, y) {
        return Err(RejectReason::OutOfBounds);
    }
    if !rule.adjacent((player.x, player.y), (x, y)) {
        return Err(RejectReason::NotAdjacent);
    }
    if !state.grid.is_walkable(x, y) {
        return Err(RejectReason::Blocked);
    }
    Ok(())
}

pub fn validate_task(
    state: &SessionState,
    player_id: PlayerId,
    task_id: TaskId,
    duration_ms: u64,
    now: DateTime<Utc>,
) -> Result<(), RejectReason> {
    let player = issuer(state, player_id)?;
    if state.phase != Phase::InProgress {
        return Err(RejectReason::WrongPhase);
    }
    if player.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if player.role != Some(Role::Crewmate) {
        return Err(RejectReason::WrongRole);
    }
    let site = state.grid.task(task_id).ok_or(RejectReason::UnknownTask)?;
    if (site.x - player.x).abs().max((site.y - player.y).abs()) > 1 {
        return Err(RejectReason::NotAdjacent);
    }
    if state.completed_tasks.contains(&task_id) {
        return Err(RejectReason::TaskAlreadyComplete);
    }
    if state.sabotage.is_active(now) {
        return Err(RejectReason::SabotageLocked);
    }
    if classify_swipe(duration_ms) == SwipeOutcome::Slow {
        return Err(RejectReason::TooSlow);
    }
    Ok(())
}

/// Swipe minigame timing bands. Fast and valid swipes both complete the
/// task; slow ones are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeOutcome {
    Fast,
    Valid,
    Slow,
}

pub fn classify_swipe(duration_ms: u64) -> SwipeOutcome {
    if duration_ms < SWIPE_FAST_MAX_MS {
        SwipeOutcome::Fast
    } else if duration_ms <= SWIPE_VALID_MAX_MS {
        SwipeOutcome::Valid
    } else {
        SwipeOutcome::Slow
    }
}

pub fn validate_kill(
    state: &SessionState,
    killer_id: PlayerId,
    target_id: PlayerId,
) -> Result<(), RejectReason> {
    let killer = issuer(state, killer_id)?;
    if state.phase != Phase::InProgress {
        return Err(RejectReason::WrongPhase);
    }
    if killer.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if killer.role != Some(Role::Impostor) {
        return Err(RejectReason::WrongRole);
    }
    let target = state.player(target_id).ok_or(RejectReason::InvalidTarget)?;
    if target.status != PlayerStatus::Alive || target.role != Some(Role::Crewmate) {
        return Err(RejectReason::InvalidTarget);
    }
    if chebyshev(killer, target) > 1 {
        return Err(RejectReason::NotAdjacent);
    }
    Ok(())
}

pub fn validate_sabotage(
    state: &SessionState,
    player_id: PlayerId,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Result<(), RejectReason> {
    let player = issuer(state, player_id)?;
    if state.phase != Phase::InProgress {
        return Err(RejectReason::WrongPhase);
    }
    if player.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if player.role != Some(Role::Impostor) {
        return Err(RejectReason::WrongRole);
    }
    if !state.grid.near_task_zone(player.x, player.y) {
        return Err(RejectReason::NotAdjacent);
    }
    if state.sabotage.is_active(now) || !state.sabotage.cooldown_ready(now, cooldown) {
        return Err(RejectReason::CooldownActive);
    }
    Ok(())
}

pub fn validate_report(
    state: &SessionState,
    reporter_id: PlayerId,
    target_id: PlayerId,
) -> Result<(), RejectReason> {
    let reporter = issuer(state, reporter_id)?;
    if state.phase != Phase::InProgress {
        return Err(RejectReason::WrongPhase);
    }
    if reporter.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if reporter.role == Some(Role::Impostor) {
        return Err(RejectReason::WrongRole);
    }
    let body = state.player(target_id).ok_or(RejectReason::InvalidTarget)?;
    // Ghosts are no longer reportable bodies.
    if body.status != PlayerStatus::Dead {
        return Err(RejectReason::InvalidTarget);
    }
    if chebyshev(reporter, body) > 1 {
        return Err(RejectReason::NotAdjacent);
    }
    Ok(())
}

pub fn validate_emergency(state: &SessionState, player_id: PlayerId) -> Result<(), RejectReason> {
    let player = issuer(state, player_id)?;
    if state.phase != Phase::InProgress {
        return Err(RejectReason::WrongPhase);
    }
    if player.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if !state.grid.near_emergency_zone(player.x, player.y) {
        return Err(RejectReason::NotAdjacent);
    }
    Ok(())
}

pub fn validate_vote(
    state: &SessionState,
    voter_id: PlayerId,
    target: VoteTarget,
) -> Result<(), RejectReason> {
    let voter = issuer(state, voter_id)?;
    if state.phase != Phase::Voting {
        return Err(RejectReason::WrongPhase);
    }
    if voter.status != PlayerStatus::Alive {
        return Err(RejectReason::WrongStatus);
    }
    if let VoteTarget::Player { id } = target {
        let candidate = state.player(id).ok_or(RejectReason::InvalidTarget)?;
        if candidate.status != PlayerStatus::Alive {
            return Err(RejectReason::InvalidTarget);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, MapData};
    use crewfall_common::Facing;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Open 20x20 arena with a single task row so geometry cases are easy
    /// to stage. Task cells at (2,2) and (17,17).
    fn arena() -> Arc<Grid> {
        let mut cells = vec![vec![0i32; 20]; 20];
        cells[2][2] = 2;
        cells[17][17] = 2;
        cells[10][15] = 4;
        cells[12][12] = 1;
        Arc::new(Grid::from_map("arena", &MapData { rows: 20, cols: 20, cells }).unwrap())
    }

    fn state_with(players: Vec<Player>, phase: Phase) -> SessionState {
        let mut state = SessionState::new(
            "ARENA1".to_string(),
            players.len() as u8,
            1,
            arena(),
            Utc::now(),
        );
        state.players = players;
        state.set_phase(phase);
        state
    }

    fn player(id: PlayerId, x: i32, y: i32, role: Role, status: PlayerStatus) -> Player {
        Player {
            id,
            name: format!("p{id}"),
            color: match id {
                0 => PlayerColor::Red,
                1 => PlayerColor::Blue,
                2 => PlayerColor::Green,
                _ => PlayerColor::Pink,
            },
            x,
            y,
            role: Some(role),
            status,
            facing: Facing::Down,
        }
    }

    #[test]
    fn move_to_adjacent_walkable_cell_is_accepted() {
        let state = state_with(
            vec![player(0, 10, 9, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        assert_eq!(
            validate_move(&state, 0, 11, 9, MovementRule::EightWay),
            Ok(())
        );
    }

    #[test]
    fn move_far_away_is_rejected() {
        let state = state_with(
            vec![player(0, 10, 9, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        assert_eq!(
            validate_move(&state, 0, 20, 20, MovementRule::EightWay),
            Err(RejectReason::OutOfBounds)
        );
        assert_eq!(
            validate_move(&state, 0, 14, 9, MovementRule::EightWay),
            Err(RejectReason::NotAdjacent)
        );
    }

    #[test]
    fn move_into_obstacle_is_blocked() {
        let state = state_with(
            vec![player(0, 11, 12, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        assert_eq!(
            validate_move(&state, 0, 12, 12, MovementRule::EightWay),
            Err(RejectReason::Blocked)
        );
    }

    #[test]
    fn four_way_rule_rejects_diagonals() {
        let state = state_with(
            vec![player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        assert_eq!(
            validate_move(&state, 0, 6, 6, MovementRule::EightWay),
            Ok(())
        );
        assert_eq!(
            validate_move(&state, 0, 6, 6, MovementRule::FourWay),
            Err(RejectReason::NotAdjacent)
        );
        assert_eq!(validate_move(&state, 0, 6, 5, MovementRule::FourWay), Ok(()));
    }

    #[test]
    fn ghosts_may_move_but_the_dead_may_not() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Crewmate, PlayerStatus::Ghost),
                player(1, 5, 5, Role::Crewmate, PlayerStatus::Dead),
            ],
            Phase::InProgress,
        );
        assert_eq!(validate_move(&state, 0, 5, 6, MovementRule::EightWay), Ok(()));
        assert_eq!(
            validate_move(&state, 1, 5, 6, MovementRule::EightWay),
            Err(RejectReason::WrongStatus)
        );
    }

    #[test]
    fn kill_requires_adjacency() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Impostor, PlayerStatus::Alive),
                player(1, 5, 6, Role::Crewmate, PlayerStatus::Alive),
                player(2, 5, 8, Role::Crewmate, PlayerStatus::Alive),
            ],
            Phase::InProgress,
        );
        assert_eq!(validate_kill(&state, 0, 1), Ok(()));
        assert_eq!(validate_kill(&state, 0, 2), Err(RejectReason::NotAdjacent));
    }

    #[test]
    fn kill_requires_impostor_and_living_crewmate() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive),
                player(1, 5, 6, Role::Crewmate, PlayerStatus::Alive),
                player(2, 6, 5, Role::Impostor, PlayerStatus::Alive),
                player(3, 6, 6, Role::Crewmate, PlayerStatus::Dead),
            ],
            Phase::InProgress,
        );
        assert_eq!(validate_kill(&state, 0, 1), Err(RejectReason::WrongRole));
        assert_eq!(validate_kill(&state, 2, 3), Err(RejectReason::InvalidTarget));
        // Impostors cannot kill impostors.
        let mut state = state;
        state.players[1].role = Some(Role::Impostor);
        assert_eq!(validate_kill(&state, 2, 1), Err(RejectReason::InvalidTarget));
    }

    #[test]
    fn kill_is_rejected_outside_in_progress() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Impostor, PlayerStatus::Alive),
                player(1, 5, 6, Role::Crewmate, PlayerStatus::Alive),
            ],
            Phase::Voting,
        );
        assert_eq!(validate_kill(&state, 0, 1), Err(RejectReason::WrongPhase));
    }

    #[test]
    fn task_swipe_bands_gate_completion() {
        let state = state_with(
            vec![player(0, 2, 2, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        let now = Utc::now();
        assert_eq!(validate_task(&state, 0, 0, 250, now), Ok(()));
        assert_eq!(validate_task(&state, 0, 0, 550, now), Ok(()));
        assert_eq!(
            validate_task(&state, 0, 0, 900, now),
            Err(RejectReason::TooSlow)
        );

        assert_eq!(classify_swipe(399), SwipeOutcome::Fast);
        assert_eq!(classify_swipe(400), SwipeOutcome::Valid);
        assert_eq!(classify_swipe(700), SwipeOutcome::Valid);
        assert_eq!(classify_swipe(701), SwipeOutcome::Slow);
    }

    #[test]
    fn task_requires_proximity_and_crewmate_role() {
        let state = state_with(
            vec![
                player(0, 9, 9, Role::Crewmate, PlayerStatus::Alive),
                player(1, 2, 3, Role::Impostor, PlayerStatus::Alive),
            ],
            Phase::InProgress,
        );
        let now = Utc::now();
        assert_eq!(
            validate_task(&state, 0, 0, 300, now),
            Err(RejectReason::NotAdjacent)
        );
        assert_eq!(
            validate_task(&state, 1, 0, 300, now),
            Err(RejectReason::WrongRole)
        );
        assert_eq!(
            validate_task(&state, 0, 99, 300, now),
            Err(RejectReason::UnknownTask)
        );
    }

    #[test]
    fn completed_or_sabotaged_tasks_reject_attempts() {
        let mut state = state_with(
            vec![player(0, 2, 2, Role::Crewmate, PlayerStatus::Alive)],
            Phase::InProgress,
        );
        let now = Utc::now();
        state.completed_tasks.insert(0);
        assert_eq!(
            validate_task(&state, 0, 0, 300, now),
            Err(RejectReason::TaskAlreadyComplete)
        );

        state.completed_tasks.clear();
        state.sabotage.activate(now, Duration::seconds(30));
        assert_eq!(
            validate_task(&state, 0, 0, 300, now),
            Err(RejectReason::SabotageLocked)
        );
    }

    #[test]
    fn sabotage_needs_proximity_cooldown_and_role() {
        let mut state = state_with(
            vec![
                player(0, 2, 3, Role::Impostor, PlayerStatus::Alive),
                player(1, 9, 9, Role::Impostor, PlayerStatus::Alive),
                player(2, 2, 1, Role::Crewmate, PlayerStatus::Alive),
            ],
            Phase::InProgress,
        );
        let now = Utc::now();
        let cooldown = Duration::seconds(30);
        assert_eq!(validate_sabotage(&state, 0, now, cooldown), Ok(()));
        assert_eq!(
            validate_sabotage(&state, 1, now, cooldown),
            Err(RejectReason::NotAdjacent)
        );
        assert_eq!(
            validate_sabotage(&state, 2, now, cooldown),
            Err(RejectReason::WrongRole)
        );

        state.sabotage.activate(now, Duration::seconds(30));
        assert_eq!(
            validate_sabotage(&state, 0, now + Duration::seconds(5), cooldown),
            Err(RejectReason::CooldownActive)
        );
    }

    #[test]
    fn report_requires_nonimpostor_next_to_a_body() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive),
                player(1, 5, 6, Role::Crewmate, PlayerStatus::Dead),
                player(2, 5, 4, Role::Impostor, PlayerStatus::Alive),
                player(3, 9, 9, Role::Crewmate, PlayerStatus::Alive),
                player(4, 5, 7, Role::Crewmate, PlayerStatus::Ghost),
            ],
            Phase::InProgress,
        );
        assert_eq!(validate_report(&state, 0, 1), Ok(()));
        assert_eq!(validate_report(&state, 2, 1), Err(RejectReason::WrongRole));
        assert_eq!(validate_report(&state, 3, 1), Err(RejectReason::NotAdjacent));
        assert_eq!(validate_report(&state, 0, 4), Err(RejectReason::InvalidTarget));
    }

    #[test]
    fn emergency_requires_button_adjacency_and_phase() {
        let mut state = state_with(
            vec![
                player(0, 15, 10, Role::Crewmate, PlayerStatus::Alive),
                player(1, 3, 3, Role::Crewmate, PlayerStatus::Alive),
            ],
            Phase::InProgress,
        );
        assert_eq!(validate_emergency(&state, 0), Ok(()));
        assert_eq!(validate_emergency(&state, 1), Err(RejectReason::NotAdjacent));

        state.set_phase(Phase::Discussion);
        assert_eq!(validate_emergency(&state, 0), Err(RejectReason::WrongPhase));
    }

    #[test]
    fn vote_rules_exclude_ghosts_and_dead_targets() {
        let state = state_with(
            vec![
                player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive),
                player(1, 5, 6, Role::Crewmate, PlayerStatus::Ghost),
                player(2, 5, 7, Role::Crewmate, PlayerStatus::Dead),
            ],
            Phase::Voting,
        );
        assert_eq!(validate_vote(&state, 0, VoteTarget::Skip), Ok(()));
        assert_eq!(
            validate_vote(&state, 0, VoteTarget::Player { id: 2 }),
            Err(RejectReason::InvalidTarget)
        );
        assert_eq!(
            validate_vote(&state, 1, VoteTarget::Skip),
            Err(RejectReason::WrongStatus)
        );
    }

    #[test]
    fn join_checks_phase_capacity_and_color() {
        let mut state = state_with(
            vec![player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive)],
            Phase::Lobby,
        );
        state.capacity = 2;
        assert_eq!(validate_join(&state, PlayerColor::Blue), Ok(()));
        assert_eq!(
            validate_join(&state, PlayerColor::Red),
            Err(RejectReason::DuplicateColor)
        );

        state.capacity = 1;
        assert_eq!(
            validate_join(&state, PlayerColor::Blue),
            Err(RejectReason::CapacityExceeded)
        );

        state.capacity = 2;
        state.set_phase(Phase::InProgress);
        assert_eq!(
            validate_join(&state, PlayerColor::Blue),
            Err(RejectReason::WrongPhase)
        );
    }

    #[test]
    fn start_requires_a_full_lobby() {
        let mut state = state_with(
            vec![player(0, 5, 5, Role::Crewmate, PlayerStatus::Alive)],
            Phase::Lobby,
        );
        state.capacity = 2;
        assert_eq!(validate_start(&state), Err(RejectReason::SessionNotFull));

        state.capacity = 1;
        assert_eq!(validate_start(&state), Ok(()));

        state.set_phase(Phase::InProgress);
        assert_eq!(validate_start(&state), Err(RejectReason::WrongPhase));
    }
}
