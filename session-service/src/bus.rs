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

use anyhow::Context;
use async_trait::async_trait;
use crewfall_common::{
    EliminationEvent, GameOverEvent, PhaseEvent, PlayerId, RejectedEvent, StateEvent,
};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;

/// Per-channel topic naming. Every per-session topic is
/// `{prefix}.{game_code}.v1`; the rejected channel is keyed by player id
/// instead so rejections stay private to the issuer.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub commands_prefix: String,
    pub state_prefix: String,
    pub phase_prefix: String,
    pub elimination_prefix: String,
    pub game_over_prefix: String,
    pub rejected_prefix: String,
}

impl TopicConfig {
    pub fn from_env() -> TopicConfig {
        TopicConfig {
            commands_prefix: env_or("SESSION_COMMANDS_TOPIC_PREFIX", "session.commands"),
            state_prefix: env_or("SESSION_STATE_TOPIC_PREFIX", "session.state"),
            phase_prefix: env_or("SESSION_PHASE_TOPIC_PREFIX", "session.phase"),
            elimination_prefix: env_or("SESSION_ELIMINATION_TOPIC_PREFIX", "session.elimination"),
            game_over_prefix: env_or("SESSION_GAMEOVER_TOPIC_PREFIX", "session.gameover"),
            rejected_prefix: env_or("PLAYER_REJECTED_TOPIC_PREFIX", "player.rejected"),
        }
    }

    pub fn commands_topic(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.commands_prefix, game_code)
    }

    pub fn commands_topic_pattern(&self) -> String {
        format!("^{}\\..*\\.v1$", self.commands_prefix.replace('.', "\\."))
    }

    pub fn state_topic(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.state_prefix, game_code)
    }

    pub fn phase_topic(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.phase_prefix, game_code)
    }

    pub fn elimination_topic(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.elimination_prefix, game_code)
    }

    pub fn game_over_topic(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.game_over_prefix, game_code)
    }

    pub fn rejected_topic(&self, player_id: Option<PlayerId>) -> String {
        match player_id {
            Some(id) => format!("{}.{}.v1", self.rejected_prefix, id),
            // Pre-join rejections have no player id yet; they land on a
            // shared anonymous queue.
            None => format!("{}.anonymous.v1", self.rejected_prefix),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).ok().unwrap_or_else(|| default.to_string())
}

/// Broadcast seam for the session actor. Publishing is fire-and-forget
/// from the actor's point of view but must preserve per-topic order, so
/// the actor awaits each call before processing the next command.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_state(&self, event: &StateEvent) -> anyhow::Result<()>;
    async fn publish_phase(&self, event: &PhaseEvent) -> anyhow::Result<()>;
    async fn publish_elimination(&self, event: &EliminationEvent) -> anyhow::Result<()>;
    async fn publish_game_over(&self, event: &GameOverEvent) -> anyhow::Result<()>;
    async fn publish_rejected(&self, event: &RejectedEvent) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topics: TopicConfig,
}

impl KafkaEventPublisher {
    pub fn from_env(topics: TopicConfig) -> anyhow::Result<KafkaEventPublisher> {
        let bootstrap_servers = env_or("KAFKA_BOOTSTRAP_SERVERS", "kafka:9092");
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create Kafka event producer")?;
        Ok(KafkaEventPublisher { producer, topics })
    }

    async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        event: &T,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event).context("failed to encode event")?;
        self.producer
            .send(
                FutureRecord::to(topic).key(key).payload(&payload),
                Duration::from_secs(5),
            )
            .await
            .map_err(|(error, _)| anyhow::anyhow!("Kafka publish failed: {error:?}"))?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish_state(&self, event: &StateEvent) -> anyhow::Result<()> {
        let topic = self.topics.state_topic(&event.game_code);
        self.send_json(&topic, &event.game_code, event).await
    }

    async fn publish_phase(&self, event: &PhaseEvent) -> anyhow::Result<()> {
        let topic = self.topics.phase_topic(&event.game_code);
        self.send_json(&topic, &event.game_code, event).await
    }

    async fn publish_elimination(&self, event: &EliminationEvent) -> anyhow::Result<()> {
        let topic = self.topics.elimination_topic(&event.game_code);
        self.send_json(&topic, &event.game_code, event).await
    }

    async fn publish_game_over(&self, event: &GameOverEvent) -> anyhow::Result<()> {
        let topic = self.topics.game_over_topic(&event.game_code);
        self.send_json(&topic, &event.game_code, event).await
    }

    async fn publish_rejected(&self, event: &RejectedEvent) -> anyhow::Result<()> {
        let topic = self.topics.rejected_topic(event.player_id);
        self.send_json(&topic, &event.game_code, event).await
    }
}
