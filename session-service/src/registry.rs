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

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use crewfall_common::{
    CommandEnvelope, CreateSessionRequest, CreateSessionResponse, Phase, RejectReason,
    RejectedEvent, SessionSnapshot, clamp_impostor_count, generate_game_code,
};
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{info, warn};

use crate::actor::{SessionActor, SessionMsg};
use crate::bus::EventPublisher;
use crate::grid::{Grid, MapCatalog};
use crate::phase::PhaseTimers;
use crate::session::SessionState;
use crate::validator::MovementRule;

/// Handle kept per live session: the queue feeding its actor plus a
/// watch of the actor's latest snapshot for read-only HTTP access.
#[derive(Clone)]
struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

/// Owns every live session on this node. Cheap to clone; all clones see
/// the same session table.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    publisher: Arc<dyn EventPublisher>,
    catalog: Arc<MapCatalog>,
    timers: PhaseTimers,
    movement: MovementRule,
}

impl SessionRegistry {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        catalog: MapCatalog,
        timers: PhaseTimers,
        movement: MovementRule,
    ) -> SessionRegistry {
        SessionRegistry {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            publisher,
            catalog: Arc::new(catalog),
            timers,
            movement,
        }
    }

    /// Spin up a new session actor under a fresh game code. The impostor
    /// count is clamped rather than rejected.
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> anyhow::Result<CreateSessionResponse> {
        let (map_id, map) = self
            .catalog
            .resolve(request.map_id.as_deref())
            .with_context(|| {
                format!(
                    "unknown map {}",
                    request.map_id.as_deref().unwrap_or("<default>")
                )
            })?;
        let grid = Arc::new(Grid::from_map(&map_id, map)?);
        let impostor_count = clamp_impostor_count(request.capacity, request.impostor_count);

        let mut sessions = self.sessions.write().await;
        let game_code = {
            // Six characters over a 32-symbol alphabet; collisions among
            // live sessions are vanishingly rare, retry regardless.
            let mut rng = rand::rng();
            loop {
                let candidate = generate_game_code(&mut rng);
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        let created_at = Utc::now();
        let state = SessionState::new(
            game_code.clone(),
            request.capacity,
            impostor_count,
            grid,
            created_at,
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let actor = SessionActor::new(
            state,
            rx,
            tx.clone(),
            self.publisher.clone(),
            self.timers,
            self.movement,
            snapshot_tx,
        );
        sessions.insert(
            game_code.clone(),
            SessionHandle {
                tx,
                snapshot_rx,
            },
        );
        drop(sessions);

        let registry = self.clone();
        let code = game_code.clone();
        tokio::spawn(async move {
            actor.run().await;
            registry.sessions.write().await.remove(&code);
            info!(game_code = %code, "session removed from registry");
        });

        info!(
            game_code = %game_code,
            capacity = request.capacity,
            impostor_count,
            map_id = %map_id,
            "session created"
        );
        Ok(CreateSessionResponse {
            game_code,
            capacity: request.capacity,
            impostor_count,
            map_id,
            phase: Phase::Lobby,
            created_at,
        })
    }

    /// Route an envelope to its session's queue. Misses are answered with
    /// a rejected event on the issuer's channel, never an error to the
    /// transport.
    pub async fn dispatch(&self, envelope: CommandEnvelope) {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(&envelope.game_code).cloned()
        };
        match handle {
            Some(handle) => {
                // A send error means the actor stopped between lookup and
                // send; its entry is about to disappear anyway.
                let _ = handle.tx.send(SessionMsg::Command(envelope));
            }
            None => {
                let event = RejectedEvent {
                    game_code: envelope.game_code.clone(),
                    player_id: envelope.player_id,
                    command_id: envelope.command_id.clone(),
                    command_kind: envelope.command.kind().to_string(),
                    reason: RejectReason::SessionNotFound,
                    created_at: Utc::now(),
                };
                if let Err(error) = self.publisher.publish_rejected(&event).await {
                    warn!(game_code = %envelope.game_code, %error, "rejected publish failed");
                }
            }
        }
    }

    pub async fn snapshot(&self, game_code: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions
            .get(game_code)
            .map(|handle| handle.snapshot_rx.borrow().clone())
    }

    pub async fn live_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::test_support::{Published, RecordingPublisher};
    use crewfall_common::{CommandSource, GameCommand, PlayerColor};

    fn registry(publisher: Arc<RecordingPublisher>) -> SessionRegistry {
        SessionRegistry::new(
            publisher,
            MapCatalog::from_env(),
            PhaseTimers::default(),
            MovementRule::EightWay,
        )
    }

    fn create_request(capacity: u8, impostor_count: u8) -> CreateSessionRequest {
        CreateSessionRequest {
            capacity,
            impostor_count,
            map_id: None,
        }
    }

    #[tokio::test]
    async fn create_session_registers_a_lobby() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher);

        let response = registry.create_session(&create_request(4, 1)).await.unwrap();
        assert_eq!(response.phase, Phase::Lobby);
        assert_eq!(response.game_code.len(), crewfall_common::GAME_CODE_LEN);
        assert_eq!(registry.live_sessions().await, 1);

        let snapshot = registry.snapshot(&response.game_code).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Lobby);
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.total_tasks, crewfall_common::TOTAL_TASKS);
    }

    #[tokio::test]
    async fn impostor_count_is_clamped_to_half_capacity() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher);

        let response = registry.create_session(&create_request(6, 4)).await.unwrap();
        assert_eq!(response.impostor_count, 3);
    }

    #[tokio::test]
    async fn unknown_map_is_an_error() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher);

        let request = CreateSessionRequest {
            capacity: 4,
            impostor_count: 1,
            map_id: Some("nowhere".to_string()),
        };
        assert!(registry.create_session(&request).await.is_err());
    }

    #[tokio::test]
    async fn game_codes_are_unique_across_sessions() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher);

        let mut codes = std::collections::HashSet::new();
        for _ in 0..20 {
            let response = registry.create_session(&create_request(4, 1)).await.unwrap();
            assert!(codes.insert(response.game_code));
        }
        assert_eq!(registry.live_sessions().await, 20);
    }

    #[tokio::test]
    async fn dispatch_to_unknown_session_publishes_rejected() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher.clone());

        registry
            .dispatch(CommandEnvelope {
                command_id: "cmd-1".to_string(),
                source: CommandSource::User,
                game_code: "NOSUCH".to_string(),
                player_id: Some(3),
                command: GameCommand::Emergency,
                sent_at: Utc::now(),
            })
            .await;

        let published = publisher.take();
        match published.as_slice() {
            [Published::Rejected(event)] => {
                assert_eq!(event.reason, RejectReason::SessionNotFound);
                assert_eq!(event.game_code, "NOSUCH");
                assert_eq!(event.player_id, Some(3));
            }
            other => panic!("expected one rejected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatched_join_reaches_the_actor() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registry = registry(publisher.clone());
        let response = registry.create_session(&create_request(4, 1)).await.unwrap();

        registry
            .dispatch(CommandEnvelope {
                command_id: "join-0".to_string(),
                source: CommandSource::User,
                game_code: response.game_code.clone(),
                player_id: None,
                command: GameCommand::Join {
                    name: "ada".to_string(),
                    color: PlayerColor::Red,
                },
                sent_at: Utc::now(),
            })
            .await;

        // The actor runs on its own task; wait for the snapshot to move.
        for _ in 0..50 {
            if let Some(snapshot) = registry.snapshot(&response.game_code).await {
                if !snapshot.players.is_empty() {
                    assert_eq!(snapshot.players[0].name, "ada");
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("join never reflected in the session snapshot");
    }
}
