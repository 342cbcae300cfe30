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

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use crewfall_common::{
    CommandEnvelope, CommandSource, GAME_CODE_LEN, GameCommand, SubmitCommandRequest,
    SubmitCommandResponse,
};
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    publisher: Arc<dyn CommandPublisher>,
}

#[async_trait]
trait CommandPublisher: Send + Sync {
    async fn publish(&self, command: &CommandEnvelope) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct KafkaCommandPublisher {
    producer: FutureProducer,
    commands_topic_prefix: String,
}

impl KafkaCommandPublisher {
    fn from_env() -> anyhow::Result<Self> {
        let bootstrap_servers = std::env::var("KAFKA_BOOTSTRAP_SERVERS")
            .ok()
            .unwrap_or_else(|| "kafka:9092".to_string());
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create Kafka command producer")?;
        let commands_topic_prefix = std::env::var("SESSION_COMMANDS_TOPIC_PREFIX")
            .ok()
            .unwrap_or_else(|| "session.commands".to_string());
        Ok(Self {
            producer,
            commands_topic_prefix,
        })
    }

    fn topic_for_session(&self, game_code: &str) -> String {
        format!("{}.{}.v1", self.commands_topic_prefix, game_code)
    }
}

#[async_trait]
impl CommandPublisher for KafkaCommandPublisher {
    async fn publish(&self, command: &CommandEnvelope) -> anyhow::Result<()> {
        let topic = self.topic_for_session(&command.game_code);
        let payload = serde_json::to_string(command).context("failed to encode command")?;
        self.producer
            .send(
                FutureRecord::to(&topic)
                    .key(&command.game_code)
                    .payload(&payload),
                std::time::Duration::from_secs(5),
            )
            .await
            .map_err(|(error, _)| anyhow::anyhow!("Kafka publish failed: {error:?}"))?;

        info!(
            game_code = %command.game_code,
            command_id = %command.command_id,
            command_kind = command.command.kind(),
            topic = %topic,
            "command published to Kafka command topic"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "gateway_service=debug,tower_http=info".to_string()),
        )
        .init();

    let state = AppState {
        publisher: Arc::new(KafkaCommandPublisher::from_env()?),
    };

    let app = build_router(state);

    let bind_addr = parse_bind_addr("GATEWAY_SERVICE_BIND", "0.0.0.0:8082")?;
    info!(%bind_addr, "gateway-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/sessions/{game_code}/commands",
            post(submit_command_handler),
        )
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
    Json(serde_json::json!({"ok": true, "service": "gateway-service"}))
}

async fn submit_command_handler(
    State(state): State<AppState>,
    Path(game_code): Path<String>,
    Json(request): Json<SubmitCommandRequest>,
) -> Result<Json<SubmitCommandResponse>, ApiError> {
    validate_game_code(&game_code)?;
    validate_user_command(&request)?;

    let command_id = request
        .command_id
        .clone()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let command = CommandEnvelope {
        command_id,
        source: CommandSource::User,
        game_code,
        player_id: request.player_id,
        command: request.command,
        sent_at: request.client_sent_at,
    };

    state
        .publisher
        .publish(&command)
        .await
        .map_err(|e| ApiError::internal(format!("failed to publish command: {e}")))?;

    Ok(Json(SubmitCommandResponse {
        accepted: true,
        command_id: command.command_id,
        queued_at: Utc::now(),
    }))
}

fn validate_game_code(game_code: &str) -> Result<(), ApiError> {
    if game_code.len() != GAME_CODE_LEN
        || !game_code.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(ApiError::bad_request("malformed game code"));
    }
    Ok(())
}

fn validate_user_command(request: &SubmitCommandRequest) -> Result<(), ApiError> {
    match &request.command {
        GameCommand::Join { name, .. } => {
            if request.player_id.is_some() {
                return Err(ApiError::bad_request(
                    "join commands must not carry a player_id",
                ));
            }
            if name.trim().is_empty() {
                return Err(ApiError::bad_request("name is required for join commands"));
            }
        }
        _ => {
            if request.player_id.is_none() {
                return Err(ApiError::bad_request(
                    "player_id is required for every command except join",
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
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
