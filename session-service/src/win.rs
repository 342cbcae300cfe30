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

use crewfall_common::{PlayerStatus, Role, Winner};

use crate::session::Player;

/// Decide a terminal outcome after a Status change to DEAD. Ghosts count
/// for neither side. Returns None while both factions still stand.
pub fn evaluate_elimination(players: &[Player]) -> Option<Winner> {
    let alive_impostors = alive_with_role(players, Role::Impostor);
    let alive_crewmates = alive_with_role(players, Role::Crewmate);

    if alive_crewmates == 0 {
        Some(Winner::Impostors)
    } else if alive_impostors == 0 {
        Some(Winner::Crewmates)
    } else {
        None
    }
}

/// Third, independent win condition, checked after every task completion.
pub fn evaluate_tasks(completed: usize, total: usize) -> Option<Winner> {
    if total > 0 && completed >= total {
        Some(Winner::Crewmates)
    } else {
        None
    }
}

fn alive_with_role(players: &[Player], role: Role) -> usize {
    players
        .iter()
        .filter(|p| p.status == PlayerStatus::Alive && p.role == Some(role))
        .count()
}
