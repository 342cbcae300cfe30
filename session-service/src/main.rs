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

mod actor;
mod bus;
mod grid;
mod phase;
mod registry;
mod session;
mod validator;
mod win;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use crewfall_common::{
    CommandEnvelope, CreateSessionRequest, CreateSessionResponse, MAX_CAPACITY, MIN_CAPACITY,
    SessionSnapshot,
};
use rdkafka::{
    Message,
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::bus::{EventPublisher, KafkaEventPublisher, TopicConfig};
use crate::grid::MapCatalog;
use crate::phase::PhaseTimers;
use crate::registry::SessionRegistry;
use crate::validator::MovementRule;

#[derive(Clone)]
struct AppState {
    registry: SessionRegistry,
    topics: TopicConfig,
    kafka: KafkaSettings,
}

#[derive(Clone)]
struct KafkaSettings {
    bootstrap_servers: String,
    consumer_group_id: String,
}

impl AppState {
    fn from_env() -> anyhow::Result<AppState> {
        let topics = TopicConfig::from_env();
        let publisher: Arc<dyn EventPublisher> =
            Arc::new(KafkaEventPublisher::from_env(topics.clone())?);
        Ok(AppState::new(publisher, topics))
    }

    fn new(publisher: Arc<dyn EventPublisher>, topics: TopicConfig) -> AppState {
        let registry = SessionRegistry::new(
            publisher,
            MapCatalog::from_env(),
            PhaseTimers::from_env(),
            MovementRule::from_env(),
        );
        AppState {
            registry,
            topics,
            kafka: KafkaSettings {
                bootstrap_servers: std::env::var("KAFKA_BOOTSTRAP_SERVERS")
                    .ok()
                    .unwrap_or_else(|| "kafka:9092".to_string()),
                consumer_group_id: std::env::var("SESSION_SERVICE_CONSUMER_GROUP_ID")
                    .ok()
                    .unwrap_or_else(|| "session-service-v1".to_string()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "session_service=debug,tower_http=info".to_string()),
        )
        .init();

    let state = AppState::from_env()?;

    let consumer_state = state.clone();
    tokio::spawn(async move {
        if let Err(error) = run_command_consumer(consumer_state).await {
            warn!(error = %error, "session-service command consumer stopped");
        }
    });

    let app = build_router(state);
    let bind_addr = parse_bind_addr("SESSION_SERVICE_BIND", "0.0.0.0:8085")?;
    info!(%bind_addr, "session-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/sessions", post(create_session_handler))
        .route("/v1/sessions/{game_code}", get(get_session_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "session-service"}))
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&request.capacity) {
        return Err(ApiError::bad_request(format!(
            "capacity must be between {MIN_CAPACITY} and {MAX_CAPACITY}, got {}",
            request.capacity
        )));
    }
    let response = state
        .registry
        .create_session(&request)
        .await
        .map_err(|error| ApiError::bad_request(error.to_string()))?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(game_code): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    match state.registry.snapshot(&game_code).await {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::not_found(format!(
            "session {game_code} not found"
        ))),
    }
}

async fn run_command_consumer(state: AppState) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &state.kafka.bootstrap_servers)
        .set("group.id", &state.kafka.consumer_group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("topic.metadata.refresh.interval.ms", "1000")
        .set("topic.metadata.refresh.fast.interval.ms", "250")
        .create()
        .context("failed to create Kafka consumer in session-service")?;

    let pattern = state.topics.commands_topic_pattern();
    consumer
        .subscribe(&[&pattern])
        .context("failed to subscribe to session command topics")?;
    info!(pattern = %pattern, "session-service Kafka consumer subscribed");

    loop {
        let message = match consumer.recv().await {
            Ok(message) => message,
            Err(error) => {
                warn!(?error, "session-service Kafka receive error");
                tokio::time::sleep(Duration::from_millis(400)).await;
                continue;
            }
        };

        let payload = match message.payload() {
            Some(payload) => payload,
            None => {
                warn!("received empty Kafka payload in session-service");
                if let Err(error) = consumer.commit_message(&message, CommitMode::Async) {
                    warn!(?error, "failed to commit empty message");
                }
                continue;
            }
        };

        let envelope = match serde_json::from_slice::<CommandEnvelope>(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(?error, "invalid command payload in Kafka");
                if let Err(commit_err) = consumer.commit_message(&message, CommitMode::Async) {
                    warn!(?commit_err, "failed to commit invalid payload message");
                }
                continue;
            }
        };

        info!(
            game_code = %envelope.game_code,
            command_id = %envelope.command_id,
            command_kind = envelope.command.kind(),
            source = ?envelope.source,
            player_id = ?envelope.player_id,
            offset = message.offset(),
            "session-service received command from Kafka"
        );

        state.registry.dispatch(envelope).await;

        if let Err(error) = consumer.commit_message(&message, CommitMode::Async) {
            warn!(?error, "failed to commit consumed command message");
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
