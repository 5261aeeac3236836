// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker (publish-topic + RPC) transport: `Orange`/`Red` envelopes are
//! published to per-routing-key subjects on the configured NATS server; a
//! node subscribes to both subjects bound to its own routing key. `GetState`
//! uses NATS's native request/reply against `rpc_queue.<routing_key>`,
//! relying on the client library's auto-generated inbox subject as the
//! "temporary reply queue + correlation id" spec §4.4 calls for.

use std::sync::Arc;
use std::time::Duration;

use async_nats::Message;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::envelope::{Envelope, Format, Orange, Red, White};
use crate::id::NodeId;
use crate::node::NodeHandle;
use crate::state::NodeState;
use crate::transport::Transport;

fn state_change_subject(id: &NodeId) -> String {
    format!("state_change.{}", id.to_routing_key())
}

fn state_notification_subject(id: &NodeId) -> String {
    format!("state_notification.{}", id.to_routing_key())
}

fn rpc_subject(id: &NodeId) -> String {
    format!("rpc_queue.{}", id.to_routing_key())
}

/// NATS-backed transport. `validate` mirrors spec §4.5's "Validation (on
/// receive)" step, toggled by `broker_validation` since the direct
/// transport's HTTP framing already rejects most malformed input structurally.
pub struct BrokerTransport {
    client: async_nats::Client,
    format: Format,
    validate: bool,
    rpc_timeout: Duration,
    port_min: u32,
    port_max: u32,
}

impl BrokerTransport {
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let client = async_nats::ConnectOptions::new().connect(&config.broker_url).await?;
        info!("broker transport connected to {}", config.broker_url);
        Ok(Self {
            client,
            format: config.envelope_format_enum()?,
            validate: config.broker_validation,
            rpc_timeout: Duration::from_secs_f64(config.rpc_timeout),
            port_min: config.port_min,
            port_max: config.port_max,
        })
    }

    async fn publish(&self, subject: String, envelope: &Envelope) -> anyhow::Result<()> {
        let payload = envelope.encode(self.format);
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for BrokerTransport {
    async fn send_start(&self, dst: &NodeId, chance_to_fail: f64) -> anyhow::Result<()> {
        self.publish(state_change_subject(dst), &Envelope::Orange(Orange::running(chance_to_fail))).await
    }

    async fn send_stop(&self, dst: &NodeId) -> anyhow::Result<()> {
        self.publish(state_change_subject(dst), &Envelope::Orange(Orange::stopped())).await
    }

    async fn send_notification(
        &self,
        dst: &NodeId,
        sender: &NodeId,
        state: NodeState,
        ts: f64,
    ) -> anyhow::Result<()> {
        self.publish(state_notification_subject(dst), &Envelope::Red(Red::new(sender, state, ts))).await
    }

    async fn get_state(&self, dst: &NodeId) -> anyhow::Result<NodeState> {
        let payload = Envelope::White(White::default()).encode(self.format);
        let reply = tokio::time::timeout(
            self.rpc_timeout,
            self.client.request(rpc_subject(dst), payload),
        )
        .await
        .map_err(|_| anyhow::anyhow!("rpc to {dst} timed out after {:?}", self.rpc_timeout))??;
        match Envelope::decode(&reply.payload, self.format)? {
            Envelope::Blue(blue) => NodeState::from_name(&blue.state)
                .ok_or_else(|| anyhow::anyhow!("unrecognised state in rpc reply: {}", blue.state)),
            other => Err(anyhow::anyhow!("expected Blue reply, got {other:?}")),
        }
    }

    async fn serve(
        self: Arc<Self>,
        handle: Arc<NodeHandle>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let id = handle.id().await;
        let mut state_change_sub = self.client.subscribe(state_change_subject(&id)).await?;
        let mut notification_sub = self.client.subscribe(state_notification_subject(&id)).await?;
        let mut rpc_sub = self.client.subscribe(rpc_subject(&id)).await?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = state_change_sub.next() => {
                    let Some(msg) = msg else { break };
                    self.handle_state_change(&handle, msg).await;
                }
                msg = notification_sub.next() => {
                    let Some(msg) = msg else { break };
                    self.handle_notification(&handle, msg).await;
                }
                msg = rpc_sub.next() => {
                    let Some(msg) = msg else { break };
                    self.handle_rpc(&handle, msg).await;
                }
            }
        }
        Ok(())
    }
}

impl BrokerTransport {
    async fn handle_state_change(&self, handle: &Arc<NodeHandle>, msg: Message) {
        let envelope = match Envelope::decode(&msg.payload, self.format) {
            Ok(e) => e,
            Err(e) => {
                debug!("broker: dropping malformed Orange: {e}");
                return;
            }
        };
        let Envelope::Orange(orange) = envelope else {
            debug!("broker: expected Orange on state_change subject");
            return;
        };
        if self.validate {
            if let Err(e) = crate::envelope::validate_orange(&orange) {
                warn!("broker: rejecting invalid Orange: {e}");
                return;
            }
        }
        if orange.name == "Running" {
            handle.start(orange.chance_to_fail.unwrap_or(0.0)).await;
        } else {
            handle.stop().await;
        }
    }

    async fn handle_notification(&self, handle: &Arc<NodeHandle>, msg: Message) {
        let envelope = match Envelope::decode(&msg.payload, self.format) {
            Ok(e) => e,
            Err(e) => {
                debug!("broker: dropping malformed Red: {e}");
                return;
            }
        };
        let Envelope::Red(red) = envelope else {
            debug!("broker: expected Red on state_notification subject");
            return;
        };
        if self.validate {
            if let Err(e) = crate::envelope::validate_red(&red, self.port_min, self.port_max) {
                warn!("broker: rejecting invalid Red: {e}");
                return;
            }
        }
        let Ok(sender) = NodeId::from_routing_key(&red.sender) else {
            warn!("broker: Red from unparseable sender {}", red.sender);
            return;
        };
        let Some(state) = NodeState::from_name(&red.to_state) else {
            warn!("broker: Red with unrecognised state {}", red.to_state);
            return;
        };
        handle.child_notify(&sender, state, red.ts).await;
    }

    async fn handle_rpc(&self, handle: &Arc<NodeHandle>, msg: Message) {
        let Some(reply_to) = msg.reply else {
            debug!("broker: GetState request with no reply_to, dropping");
            return;
        };
        if self.validate {
            match Envelope::decode(&msg.payload, self.format) {
                Ok(Envelope::White(white)) => {
                    if let Err(e) = crate::envelope::validate_white(&white) {
                        warn!("broker: rejecting invalid White: {e}");
                        return;
                    }
                }
                _ => {
                    warn!("broker: expected White on rpc subject");
                    return;
                }
            }
        }
        let state = handle.state().await;
        let reply = Envelope::Blue(crate::envelope::Blue { state: state.as_str().to_owned() });
        if let Err(e) = self.client.publish(reply_to, reply.encode(self.format)).await {
            warn!("broker: failed to publish GetState reply: {e:#}");
        }
    }
}
