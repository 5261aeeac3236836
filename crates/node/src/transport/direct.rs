// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct (synchronous request/response) transport: an `axum` HTTP server
//! plus a `reqwest`-backed outbound client with fixed 1-second-backoff
//! retries, matching spec §4.4/§6.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::id::NodeId;
use crate::node::NodeHandle;
use crate::state::NodeState;
use crate::transport::Transport;

const CHANGE_STATE_PATH: &str = "/change_state";
const NOTIFICATION_PATH: &str = "/notification";
const GET_STATE_PATH: &str = "/get_state";
const HEALTH_PATH: &str = "/healthz";

/// HTTP request/response transport. `host` is used both to bind the local
/// server and to address peers (every node in the realm shares one host).
pub struct DirectTransport {
    client: reqwest::Client,
    host: String,
    rest_timeout: u32,
    time_get: Duration,
}

impl DirectTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: config.host.clone(),
            rest_timeout: config.rest_timeout,
            time_get: Duration::from_secs_f64(config.time_get),
        }
    }

    fn base_url(&self, dst: &NodeId) -> String {
        format!("http://{}:{}", self.host, dst.port_value())
    }

    /// POST with a fixed 1s-backoff retry, up to `rest_timeout` attempts.
    /// Fire-and-forget from the caller's perspective except for the final
    /// error, which is logged and returned for `Stop` (the only call the
    /// state machine awaits).
    async fn post_with_retry(&self, url: &str, query: &[(&str, String)]) -> anyhow::Result<()> {
        let mut last_err = None;
        for attempt in 1..=self.rest_timeout.max(1) {
            match self.client.post(url).query(query).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => last_err = Some(anyhow::anyhow!("{url} returned {}", resp.status())),
                Err(e) => last_err = Some(e.into()),
            }
            if attempt < self.rest_timeout {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("{url} failed with no response"));
        warn!("giving up on {url} after {} attempts: {err:#}", self.rest_timeout);
        Err(err)
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send_start(&self, dst: &NodeId, chance_to_fail: f64) -> anyhow::Result<()> {
        let url = format!("{}{CHANGE_STATE_PATH}", self.base_url(dst));
        self.post_with_retry(&url, &[("start", chance_to_fail.to_string())]).await
    }

    async fn send_stop(&self, dst: &NodeId) -> anyhow::Result<()> {
        let url = format!("{}{CHANGE_STATE_PATH}", self.base_url(dst));
        self.post_with_retry(&url, &[("stop", "_".to_owned())]).await
    }

    async fn send_notification(
        &self,
        dst: &NodeId,
        sender: &NodeId,
        state: NodeState,
        ts: f64,
    ) -> anyhow::Result<()> {
        let url = format!("{}{NOTIFICATION_PATH}", self.base_url(dst));
        let query = [
            ("state", wire_state_name(state)),
            ("sender", sender.to_port()),
            ("time_stamp", ts.to_string()),
        ];
        self.post_with_retry(&url, &query).await
    }

    async fn get_state(&self, dst: &NodeId) -> anyhow::Result<NodeState> {
        let url = format!("{}{GET_STATE_PATH}", self.base_url(dst));
        let resp: GetStateResponse = self.client.get(&url).send().await?.json().await?;
        parse_wire_state_name(&resp.state)
            .ok_or_else(|| anyhow::anyhow!("unrecognised state in response: {}", resp.state))
    }

    async fn serve(
        self: Arc<Self>,
        handle: Arc<NodeHandle>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let time_get = self.time_get;
        let app_state = AppState { handle, time_get };
        let router = Router::new()
            .route(CHANGE_STATE_PATH, post(change_state))
            .route(NOTIFICATION_PATH, post(notification))
            .route(GET_STATE_PATH, get(get_state))
            .route(HEALTH_PATH, get(health))
            .with_state(app_state.clone());

        let addr = format!("{}:{}", self.host, app_state.handle.id().await.port_value());
        let listener = TcpListener::bind(&addr).await?;
        info!("direct transport listening on {addr}");
        axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    handle: Arc<NodeHandle>,
    time_get: Duration,
}

#[derive(Debug, Deserialize)]
struct ChangeStateQuery {
    start: Option<f64>,
    stop: Option<String>,
}

async fn change_state(State(app): State<AppState>, Query(q): Query<ChangeStateQuery>) -> impl IntoResponse {
    match (q.start, q.stop) {
        (Some(p), None) => {
            app.handle.start(p).await;
            StatusCode::OK
        }
        (None, Some(_)) => {
            app.handle.stop().await;
            StatusCode::OK
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    state: String,
    sender: String,
    time_stamp: f64,
}

async fn notification(State(app): State<AppState>, Query(q): Query<NotificationQuery>) -> impl IntoResponse {
    let Some(state) = parse_wire_state_name(&q.state) else {
        return StatusCode::BAD_REQUEST;
    };
    let Ok(sender) = NodeId::from_port(&q.sender) else {
        return StatusCode::BAD_REQUEST;
    };
    app.handle.child_notify(&sender, state, q.time_stamp).await;
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
struct GetStateResponse {
    #[serde(rename = "State")]
    state: String,
}

async fn get_state(State(app): State<AppState>) -> Json<GetStateResponse> {
    tokio::time::sleep(app.time_get).await;
    let state = app.handle.state().await;
    Json(GetStateResponse { state: wire_state_name(state) })
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

fn wire_state_name(state: NodeState) -> String {
    format!("State.{}", state.as_str())
}

fn parse_wire_state_name(name: &str) -> Option<NodeState> {
    NodeState::from_name(name.strip_prefix("State.").unwrap_or(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_state_name_round_trips() {
        for s in [NodeState::Initialisation, NodeState::Stopped, NodeState::Starting, NodeState::Running, NodeState::Error] {
            assert_eq!(parse_wire_state_name(&wire_state_name(s)), Some(s));
        }
    }

    #[test]
    fn parse_wire_state_name_accepts_bare_names_too() {
        assert_eq!(parse_wire_state_name("Running"), Some(NodeState::Running));
    }
}
