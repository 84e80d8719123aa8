// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

use crate::application::errors::TriggerError;
use crate::application::trigger::{ProvisioningTrigger, TriggerOptions};
use crate::domain::deployment::DeploymentProvider;
use crate::domain::provisioning::ClientId;
use crate::infrastructure::event_bus::{EventBusError, ProgressEventBus};

pub struct AppState {
    pub trigger: Arc<ProvisioningTrigger>,
    pub events: ProgressEventBus,
}

pub fn app(trigger: Arc<ProvisioningTrigger>, events: ProgressEventBus) -> Router {
    let state = Arc::new(AppState { trigger, events });

    Router::new()
        .route("/health", get(health))
        .route("/api/clients/{id}/provision", post(provision_client))
        .route("/api/clients/{id}/events", get(stream_progress))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn provision_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let request: ProvisionRequest = if body.is_empty() {
        ProvisionRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)),
        }
    };

    let mut options = TriggerOptions {
        environment_overrides: request.environment,
        ..Default::default()
    };
    if let Some(provider) = request.provider.as_deref() {
        match provider.parse::<DeploymentProvider>() {
            Ok(provider) => options.provider = Some(provider),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    match state.trigger.provision_client(&ClientId::new(id), options).await {
        Ok(result) if result.success => (StatusCode::OK, Json(result)).into_response(),
        Ok(result) => (StatusCode::BAD_GATEWAY, Json(result)).into_response(),
        Err(e) => {
            let status = match &e {
                TriggerError::ClientNotFound(_) => StatusCode::NOT_FOUND,
                TriggerError::MissingField { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                TriggerError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!("Provisioning request rejected: {}", e);
            error_response(status, e.to_string())
        }
    }
}

/// Server-Sent Events stream of one client's progress events
async fn stream_progress(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let receiver = state.events.subscribe_client(ClientId::new(id));

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.status.as_str())
                        .data(serde_json::to_string(&event).unwrap_or_default());
                    return Some((Ok::<_, Infallible>(sse), receiver));
                }
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
