// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prometheus exposition of the provisioning metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `provisioning_runs_total` | counter | `provider`, `outcome` |
//! | `provisioning_duration_seconds` | histogram | `provider` |
//! | `provisioning_rollbacks_total` | counter | `outcome` |
//! | `deployment_status_polls_total` | counter | `provider` |

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!("provisioning_runs_total", "Provisioning runs by provider and outcome");
    describe_histogram!("provisioning_duration_seconds", "Wall-clock duration of provisioning runs");
    describe_counter!("provisioning_rollbacks_total", "Rollbacks by outcome (clean or partial)");
    describe_counter!("deployment_status_polls_total", "Deployment status observations");

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Router exposing `GET /metrics`
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move {
                (
                    StatusCode::OK,
                    [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                    handle.render(),
                )
                    .into_response()
            }
        }),
    )
}
