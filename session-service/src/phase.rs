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

use std::time::Duration;

use crewfall_common::{
    DEFAULT_DISCUSSION_SECONDS, DEFAULT_VOTING_SECONDS, EMERGENCY_ANNOUNCE_MILLIS,
    GAME_OVER_WINDOW_SECONDS, GHOST_DELAY_SECONDS, Phase, RESOLUTION_ANNOUNCE_SECONDS,
    SABOTAGE_COOLDOWN_SECONDS, SABOTAGE_DURATION_SECONDS,
};

/// All timer durations driving automatic phase advances. Read once at
/// startup; every session shares the same schedule.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimers {
    pub emergency_announce: Duration,
    pub discussion: Duration,
    pub voting: Duration,
    pub resolution_announce: Duration,
    pub ghost_delay: Duration,
    pub sabotage_duration: Duration,
    pub sabotage_cooldown: Duration,
    pub game_over_window: Duration,
}

impl PhaseTimers {
    pub fn from_env() -> PhaseTimers {
        PhaseTimers {
            emergency_announce: Duration::from_millis(EMERGENCY_ANNOUNCE_MILLIS),
            discussion: Duration::from_secs(env_seconds(
                "DISCUSSION_SECONDS",
                DEFAULT_DISCUSSION_SECONDS,
            )),
            voting: Duration::from_secs(env_seconds("VOTING_SECONDS", DEFAULT_VOTING_SECONDS)),
            resolution_announce: Duration::from_secs(RESOLUTION_ANNOUNCE_SECONDS),
            ghost_delay: Duration::from_secs(env_seconds(
                "GHOST_DELAY_SECONDS",
                GHOST_DELAY_SECONDS,
            )),
            sabotage_duration: Duration::from_secs(env_seconds(
                "SABOTAGE_DURATION_SECONDS",
                SABOTAGE_DURATION_SECONDS,
            )),
            sabotage_cooldown: Duration::from_secs(env_seconds(
                "SABOTAGE_COOLDOWN_SECONDS",
                SABOTAGE_COOLDOWN_SECONDS,
            )),
            game_over_window: Duration::from_secs(env_seconds(
                "GAME_OVER_WINDOW_SECONDS",
                GAME_OVER_WINDOW_SECONDS,
            )),
        }
    }
}

impl Default for PhaseTimers {
    fn default() -> PhaseTimers {
        PhaseTimers {
            emergency_announce: Duration::from_millis(EMERGENCY_ANNOUNCE_MILLIS),
            discussion: Duration::from_secs(DEFAULT_DISCUSSION_SECONDS),
            voting: Duration::from_secs(DEFAULT_VOTING_SECONDS),
            resolution_announce: Duration::from_secs(RESOLUTION_ANNOUNCE_SECONDS),
            ghost_delay: Duration::from_secs(GHOST_DELAY_SECONDS),
            sabotage_duration: Duration::from_secs(SABOTAGE_DURATION_SECONDS),
            sabotage_cooldown: Duration::from_secs(SABOTAGE_COOLDOWN_SECONDS),
            game_over_window: Duration::from_secs(GAME_OVER_WINDOW_SECONDS),
        }
    }
}

fn env_seconds(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
        .max(1)
}

/// The meeting phases advance on their own once entered; everything else
/// waits on a command. Returns the phase a fired timer moves into.
pub fn timer_target(phase: Phase) -> Option<Phase> {
    match phase {
        Phase::Emergency => Some(Phase::Discussion),
        Phase::Discussion => Some(Phase::Voting),
        Phase::Voting => Some(Phase::Resolution),
        Phase::Resolution => Some(Phase::InProgress),
        Phase::Lobby | Phase::InProgress | Phase::GameOver => None,
    }
}

/// Legal phase transitions, timer- and command-driven alike. The actor
/// asserts against this before every switch.
pub fn transition_allowed(from: Phase, to: Phase) -> bool {
    matches!(
        (from, to),
        (Phase::Lobby, Phase::InProgress)
            | (Phase::InProgress, Phase::Emergency)
            | (Phase::InProgress, Phase::GameOver)
            | (Phase::Emergency, Phase::Discussion)
            | (Phase::Discussion, Phase::Voting)
            | (Phase::Voting, Phase::Resolution)
            | (Phase::Resolution, Phase::InProgress)
            | (Phase::Resolution, Phase::GameOver)
    )
}

pub fn is_terminal(phase: Phase) -> bool {
    phase == Phase::GameOver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_chain_advances_on_timers() {
        assert_eq!(timer_target(Phase::Emergency), Some(Phase::Discussion));
        assert_eq!(timer_target(Phase::Discussion), Some(Phase::Voting));
        assert_eq!(timer_target(Phase::Voting), Some(Phase::Resolution));
        assert_eq!(timer_target(Phase::Resolution), Some(Phase::InProgress));
    }

    #[test]
    fn command_driven_phases_have_no_timer() {
        assert_eq!(timer_target(Phase::Lobby), None);
        assert_eq!(timer_target(Phase::InProgress), None);
        assert_eq!(timer_target(Phase::GameOver), None);
    }

    #[test]
    fn terminal_phase_has_no_outgoing_transitions() {
        assert!(is_terminal(Phase::GameOver));
        for to in [
            Phase::Lobby,
            Phase::InProgress,
            Phase::Emergency,
            Phase::Discussion,
            Phase::Voting,
            Phase::Resolution,
        ] {
            assert!(!transition_allowed(Phase::GameOver, to));
        }
    }

    #[test]
    fn lobby_can_only_start() {
        assert!(transition_allowed(Phase::Lobby, Phase::InProgress));
        assert!(!transition_allowed(Phase::Lobby, Phase::Voting));
        assert!(!transition_allowed(Phase::Lobby, Phase::GameOver));
    }

    #[test]
    fn kills_can_end_the_game_without_a_meeting() {
        assert!(transition_allowed(Phase::InProgress, Phase::GameOver));
        assert!(transition_allowed(Phase::Resolution, Phase::GameOver));
        assert!(!transition_allowed(Phase::Discussion, Phase::GameOver));
    }

    #[test]
    fn default_timers_match_design_values() {
        let timers = PhaseTimers::default();
        assert_eq!(timers.emergency_announce, Duration::from_millis(1_000));
        assert_eq!(timers.discussion, Duration::from_secs(30));
        assert_eq!(timers.voting, Duration::from_secs(30));
        assert_eq!(timers.resolution_announce, Duration::from_secs(3));
        assert_eq!(timers.ghost_delay, Duration::from_secs(3));
        assert_eq!(timers.game_over_window, Duration::from_secs(8));
    }
}
