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

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crewfall_common::{
    CommandEnvelope, EliminationEvent, EliminationMethod, Facing, GameCommand, GameOverEvent,
    Phase, PhaseEvent, PlayerId, PlayerStatus, RejectReason, RejectedEvent, Role, SessionSnapshot,
    StateEvent, VoteTarget, Winner, assign_roles,
};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::bus::EventPublisher;
use crate::phase::{PhaseTimers, is_terminal, timer_target, transition_allowed};
use crate::session::{Player, SessionState};
use crate::validator::{
    MovementRule, validate_emergency, validate_join, validate_kill, validate_move, validate_report,
    validate_sabotage, validate_start, validate_task, validate_vote,
};
use crate::win::{evaluate_elimination, evaluate_tasks};

/// A delayed command the actor sent to itself. Every variant carries the
/// sequence number it was scheduled under so deliveries that outlived
/// their context become no-ops instead of corrupting newer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Advance out of the timed phase that was current at schedule time.
    PhaseAdvance { phase_seq: u64 },
    /// Promote a dead player to ghost.
    Ghost { player_id: PlayerId },
    /// End the sabotage that was activation number `activation_seq`.
    SabotageEnd { activation_seq: u64 },
    /// Close the post-game window and stop the actor.
    Teardown,
}

/// Everything the session actor consumes, in arrival order. Commands and
/// timer fires share one queue so there is exactly one serialization
/// point per session.
#[derive(Debug)]
pub enum SessionMsg {
    Command(CommandEnvelope),
    Timer(TimerKind),
}

pub struct SessionActor {
    pub state: SessionState,
    rx: mpsc::UnboundedReceiver<SessionMsg>,
    tx: mpsc::UnboundedSender<SessionMsg>,
    publisher: Arc<dyn EventPublisher>,
    timers: PhaseTimers,
    movement: MovementRule,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    next_player_id: PlayerId,
    game_over_announced: bool,
}

impl SessionActor {
    pub fn new(
        state: SessionState,
        rx: mpsc::UnboundedReceiver<SessionMsg>,
        tx: mpsc::UnboundedSender<SessionMsg>,
        publisher: Arc<dyn EventPublisher>,
        timers: PhaseTimers,
        movement: MovementRule,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> SessionActor {
        SessionActor {
            state,
            rx,
            tx,
            publisher,
            timers,
            movement,
            snapshot_tx,
            next_player_id: 0,
            game_over_announced: false,
        }
    }

    /// Drain the session queue until teardown. Consumes the actor; the
    /// caller is expected to drop its registry entry once this returns.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            if !self.handle_message(msg).await {
                break;
            }
        }
        info!(game_code = %self.state.game_code, "session actor stopped");
    }

    /// Process one queue entry. Returns false when the actor should stop.
    pub async fn handle_message(&mut self, msg: SessionMsg) -> bool {
        match msg {
            SessionMsg::Command(envelope) => {
                self.handle_command(envelope).await;
                true
            }
            SessionMsg::Timer(kind) => self.handle_timer(kind).await,
        }
    }

    async fn handle_command(&mut self, envelope: CommandEnvelope) {
        if self.state.processed_commands.contains(&envelope.command_id) {
            self.reject(&envelope, RejectReason::DuplicateCommand).await;
            return;
        }
        if is_terminal(self.state.phase) {
            self.reject(&envelope, RejectReason::WrongPhase).await;
            return;
        }

        let outcome = match &envelope.command {
            GameCommand::Join { name, color } => self.apply_join(name.clone(), *color).await,
            GameCommand::Start => self.apply_start().await,
            command => {
                let Some(player_id) = envelope.player_id else {
                    self.reject(&envelope, RejectReason::MissingPlayerId).await;
                    return;
                };
                match command {
                    GameCommand::Move { x, y, facing } => {
                        self.apply_move(player_id, *x, *y, *facing).await
                    }
                    GameCommand::Task {
                        task_id,
                        duration_ms,
                    } => self.apply_task(player_id, *task_id, *duration_ms).await,
                    GameCommand::Kill { target_id } => {
                        self.apply_kill(player_id, *target_id).await
                    }
                    GameCommand::Sabotage => self.apply_sabotage(player_id).await,
                    GameCommand::Report { target_id } => {
                        self.apply_report(player_id, *target_id).await
                    }
                    GameCommand::Emergency => self.apply_emergency(player_id).await,
                    GameCommand::Vote { target } => self.apply_vote(player_id, *target).await,
                    GameCommand::Join { .. } | GameCommand::Start => unreachable!(),
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.state
                    .processed_commands
                    .insert(envelope.command_id.clone());
            }
            Err(reason) => self.reject(&envelope, reason).await,
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::PhaseAdvance { phase_seq } => {
                // The phase moved on since this was scheduled.
                if phase_seq != self.state.phase_seq {
                    return true;
                }
                match self.state.phase {
                    Phase::Voting => self.resolve_votes().await,
                    phase => {
                        if let Some(target) = timer_target(phase) {
                            self.enter_phase(target).await;
                        }
                    }
                }
            }
            TimerKind::Ghost { player_id } => {
                if is_terminal(self.state.phase) {
                    return true;
                }
                let promoted = match self.state.player_mut(player_id) {
                    Some(player) if player.status == PlayerStatus::Dead => {
                        player.status = PlayerStatus::Ghost;
                        true
                    }
                    _ => false,
                };
                if promoted {
                    self.publish_state().await;
                }
            }
            TimerKind::SabotageEnd { activation_seq } => {
                if self.state.sabotage.activation_seq == activation_seq
                    && self.state.sabotage.active_until.is_some()
                {
                    self.state.sabotage.clear();
                    self.publish_state().await;
                }
            }
            TimerKind::Teardown => {
                if is_terminal(self.state.phase) {
                    return false;
                }
            }
        }
        true
    }

    async fn apply_join(&mut self, name: String, color: crewfall_common::PlayerColor) -> Result<(), RejectReason> {
        validate_join(&self.state, color)?;
        let id = self.next_player_id;
        self.next_player_id += 1;
        let (x, y) = self.state.grid.spawn_point(id as usize);
        self.state.players.push(Player {
            id,
            name,
            color,
            x,
            y,
            role: None,
            status: PlayerStatus::Alive,
            facing: Facing::Down,
        });
        info!(game_code = %self.state.game_code, player_id = id, "player joined");
        self.publish_state().await;
        Ok(())
    }

    async fn apply_start(&mut self) -> Result<(), RejectReason> {
        validate_start(&self.state)?;
        let roles = assign_roles(
            self.state.players.len(),
            self.state.impostor_count,
            &mut rand::rng(),
        );
        for (player, role) in self.state.players.iter_mut().zip(roles) {
            player.role = Some(role);
        }
        info!(game_code = %self.state.game_code, "session started");
        self.enter_phase(Phase::InProgress).await;
        Ok(())
    }

    async fn apply_move(
        &mut self,
        player_id: PlayerId,
        x: i32,
        y: i32,
        facing: Option<Facing>,
    ) -> Result<(), RejectReason> {
        validate_move(&self.state, player_id, x, y, self.movement)?;
        let player = self
            .state
            .player_mut(player_id)
            .ok_or(RejectReason::InvalidTarget)?;
        player.x = x;
        player.y = y;
        if let Some(facing) = facing {
            player.facing = facing;
        }
        self.publish_state().await;
        Ok(())
    }

    async fn apply_task(
        &mut self,
        player_id: PlayerId,
        task_id: crewfall_common::TaskId,
        duration_ms: u64,
    ) -> Result<(), RejectReason> {
        validate_task(&self.state, player_id, task_id, duration_ms, Utc::now())?;
        self.state.completed_tasks.insert(task_id);
        self.publish_state().await;
        if let Some(winner) = evaluate_tasks(
            self.state.completed_tasks.len(),
            self.state.grid.tasks().len(),
        ) {
            self.finish_game(winner).await;
        }
        Ok(())
    }

    async fn apply_kill(
        &mut self,
        killer_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), RejectReason> {
        validate_kill(&self.state, killer_id, target_id)?;
        self.eliminate(target_id, EliminationMethod::Kill).await;
        if let Some(winner) = evaluate_elimination(&self.state.players) {
            self.finish_game(winner).await;
        }
        Ok(())
    }

    async fn apply_sabotage(&mut self, player_id: PlayerId) -> Result<(), RejectReason> {
        let now = Utc::now();
        validate_sabotage(
            &self.state,
            player_id,
            now,
            chrono_duration(self.timers.sabotage_cooldown),
        )?;
        let activation_seq = self
            .state
            .sabotage
            .activate(now, chrono_duration(self.timers.sabotage_duration));
        self.schedule(
            self.timers.sabotage_duration,
            TimerKind::SabotageEnd { activation_seq },
        );
        info!(game_code = %self.state.game_code, player_id, "sabotage activated");
        self.publish_state().await;
        Ok(())
    }

    async fn apply_report(
        &mut self,
        reporter_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), RejectReason> {
        validate_report(&self.state, reporter_id, target_id)?;
        self.begin_meeting().await;
        Ok(())
    }

    async fn apply_emergency(&mut self, player_id: PlayerId) -> Result<(), RejectReason> {
        validate_emergency(&self.state, player_id)?;
        self.begin_meeting().await;
        Ok(())
    }

    async fn apply_vote(
        &mut self,
        voter_id: PlayerId,
        target: VoteTarget,
    ) -> Result<(), RejectReason> {
        validate_vote(&self.state, voter_id, target)?;
        self.state
            .votes
            .get_or_insert_with(Default::default)
            .insert(voter_id, target);
        if self.state.all_votes_cast() {
            self.resolve_votes().await;
        }
        Ok(())
    }

    /// Entering a meeting interrupts any running sabotage.
    async fn begin_meeting(&mut self) {
        self.state.sabotage.clear();
        self.enter_phase(Phase::Emergency).await;
    }

    /// Close the voting window, tally, and move on. Called by the voting
    /// timer or by the final eligible ballot, whichever comes first.
    async fn resolve_votes(&mut self) {
        let eliminated = self.state.tally_votes();
        self.enter_phase(Phase::Resolution).await;
        if let Some(target_id) = eliminated {
            self.eliminate(target_id, EliminationMethod::Vote).await;
            if let Some(winner) = evaluate_elimination(&self.state.players) {
                self.finish_game(winner).await;
            }
        }
    }

    /// Mark a player dead, schedule the ghost promotion, and announce.
    async fn eliminate(&mut self, target_id: PlayerId, method: EliminationMethod) {
        let role = match self.state.player_mut(target_id) {
            Some(player) => {
                player.status = PlayerStatus::Dead;
                player.role.unwrap_or(Role::Crewmate)
            }
            None => return,
        };
        self.schedule(
            self.timers.ghost_delay,
            TimerKind::Ghost {
                player_id: target_id,
            },
        );
        let event = EliminationEvent {
            game_code: self.state.game_code.clone(),
            target_id,
            method,
            role,
            created_at: Utc::now(),
        };
        if let Err(error) = self.publisher.publish_elimination(&event).await {
            warn!(game_code = %self.state.game_code, %error, "elimination publish failed");
        }
        self.publish_state().await;
    }

    async fn finish_game(&mut self, winner: Winner) {
        if self.game_over_announced {
            return;
        }
        self.game_over_announced = true;
        self.enter_phase(Phase::GameOver).await;
        let event = GameOverEvent {
            game_code: self.state.game_code.clone(),
            winner,
            created_at: Utc::now(),
        };
        if let Err(error) = self.publisher.publish_game_over(&event).await {
            warn!(game_code = %self.state.game_code, %error, "game over publish failed");
        }
        info!(game_code = %self.state.game_code, ?winner, "session finished");
        self.schedule(self.timers.game_over_window, TimerKind::Teardown);
    }

    /// Switch phases, announce the switch, and schedule the next advance
    /// for phases that run on a clock.
    async fn enter_phase(&mut self, phase: Phase) {
        if !transition_allowed(self.state.phase, phase) {
            warn!(
                game_code = %self.state.game_code,
                from = ?self.state.phase,
                to = ?phase,
                "refusing illegal phase transition"
            );
            return;
        }
        self.state.set_phase(phase);
        if phase == Phase::Voting {
            self.state.votes = Some(Default::default());
        }

        let duration = match phase {
            Phase::Emergency => Some(self.timers.emergency_announce),
            Phase::Discussion => Some(self.timers.discussion),
            Phase::Voting => Some(self.timers.voting),
            Phase::Resolution => Some(self.timers.resolution_announce),
            Phase::Lobby | Phase::InProgress | Phase::GameOver => None,
        };
        let deadline = duration.map(|d| Utc::now() + chrono_duration(d));
        if let Some(duration) = duration {
            self.schedule(
                duration,
                TimerKind::PhaseAdvance {
                    phase_seq: self.state.phase_seq,
                },
            );
        }

        let event = PhaseEvent {
            game_code: self.state.game_code.clone(),
            phase,
            deadline,
            created_at: Utc::now(),
        };
        if let Err(error) = self.publisher.publish_phase(&event).await {
            warn!(game_code = %self.state.game_code, %error, "phase publish failed");
        }
        self.publish_state().await;
    }

    fn schedule(&self, delay: Duration, kind: TimerKind) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionMsg::Timer(kind));
        });
    }

    async fn publish_state(&mut self) {
        let seq = self.state.next_state_seq();
        let snapshot = self.state.snapshot();
        let _ = self.snapshot_tx.send(snapshot.clone());
        let event = StateEvent {
            game_code: self.state.game_code.clone(),
            seq,
            snapshot,
            created_at: Utc::now(),
        };
        if let Err(error) = self.publisher.publish_state(&event).await {
            warn!(game_code = %self.state.game_code, %error, "state publish failed");
        }
    }

    async fn reject(&self, envelope: &CommandEnvelope, reason: RejectReason) {
        let event = RejectedEvent {
            game_code: self.state.game_code.clone(),
            player_id: envelope.player_id,
            command_id: envelope.command_id.clone(),
            command_kind: envelope.command.kind().to_string(),
            reason,
            created_at: Utc::now(),
        };
        if let Err(error) = self.publisher.publish_rejected(&event).await {
            warn!(game_code = %self.state.game_code, %error, "rejected publish failed");
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis() as i64)
}
