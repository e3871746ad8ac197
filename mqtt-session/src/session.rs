// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection lifecycle on top of the `rumqttc` event loop.
//!
//! [`Session::connect`] drives the event loop until the broker answers, then
//! hands it to a background task that keeps polling. That task invokes the
//! registered callbacks and reports connection changes as
//! [`ConnectionNotification`]s.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, Outgoing, QoS, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::{BrokerAddress, SessionConfig};
use crate::handlers;
use crate::notification::{ConnectionNotification, InboundMessage};

/// Capacity of the request channel between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 10;

pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type NotificationCallback = Arc<dyn Fn(&ConnectionNotification) + Send + Sync>;

/// Callbacks invoked from the session's background task.
#[derive(Clone)]
pub struct Handlers {
    pub on_message: MessageCallback,
    pub on_notification: NotificationCallback,
}

impl Handlers {
    pub fn new(
        on_message: impl Fn(&InboundMessage) + Send + Sync + 'static,
        on_notification: impl Fn(&ConnectionNotification) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_message: Arc::new(on_message),
            on_notification: Arc::new(on_notification),
        }
    }

    /// Handlers that log every message and notification.
    pub fn logging() -> Self {
        Self::new(handlers::log_message, handlers::log_notification)
    }

    fn notify(&self, notification: ConnectionNotification) {
        (self.on_notification)(&notification);
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::logging()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Subscribe,
    Unsubscribe,
}

/// Request progress forwarded from the event loop to a waiting call.
///
/// `Sent` carries the packet id the event loop assigned, so the waiting call
/// can ignore acknowledgements left over from an earlier, timed-out request.
#[derive(Debug)]
enum Ack {
    Sent { kind: RequestKind, pkid: u16 },
    SubAck { pkid: u16, codes: Vec<SubscribeReasonCode> },
    UnsubAck { pkid: u16 },
}

/// A connected MQTT session.
pub struct Session {
    config: SessionConfig,
    client: AsyncClient,
    acks: mpsc::UnboundedReceiver<Ack>,
    driver: JoinHandle<()>,
}

impl Session {
    /// Connect to the configured broker and wait for the CONNACK.
    ///
    /// On success the event loop keeps running in a background task. On
    /// failure `Failed` is reported and the connection error is returned.
    pub async fn connect(config: SessionConfig, handlers: Handlers) -> Result<Self> {
        info!(
            "[{}] Connecting to MQTT broker at {}",
            config.client_id, config.broker
        );

        let (client, mut eventloop) = AsyncClient::new(config.mqtt_options(), REQUEST_CAPACITY);

        handlers.notify(ConnectionNotification::Connecting {
            is_reconnect: false,
            attempt: 1,
        });

        if let Err(e) = await_connack(&mut eventloop).await {
            let reason = e.to_string();
            handlers.notify(ConnectionNotification::BrokerFailed {
                reason: reason.clone(),
                broker: config.broker.clone(),
            });
            handlers.notify(ConnectionNotification::Failed { reason });
            return Err(e).with_context(|| format!("failed to connect to {}", config.broker));
        }

        handlers.notify(ConnectionNotification::BrokerConnected {
            broker: config.broker.clone(),
        });
        handlers.notify(ConnectionNotification::Connected);

        let (ack_tx, acks) = mpsc::unbounded_channel();
        let driver = Driver {
            client_id: config.client_id.clone(),
            broker: config.broker.clone(),
            ping_timeout: config.ping_timeout,
            reconnect_delay: config.reconnect_delay,
            eventloop,
            handlers,
            acks: ack_tx,
            connected: true,
            attempt: 0,
            ping_deadline: None,
        };
        let driver = tokio::spawn(driver.run());

        Ok(Self {
            config,
            client,
            acks,
            driver,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to `topic` and wait for the broker's SUBACK.
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        self.discard_stale_acks();
        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| anyhow!("MQTT subscribe failed: {e}"))?;

        let codes = self.await_ack(RequestKind::Subscribe).await?;
        if codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            bail!("broker refused subscription to '{topic}'");
        }
        info!("[{}] Subscribed to topic: {topic}", self.config.client_id);
        Ok(())
    }

    /// Unsubscribe from `topic` and wait for the broker's UNSUBACK.
    pub async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.discard_stale_acks();
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| anyhow!("MQTT unsubscribe failed: {e}"))?;

        self.await_ack(RequestKind::Unsubscribe).await?;
        info!("[{}] Unsubscribed from topic: {topic}", self.config.client_id);
        Ok(())
    }

    /// Send DISCONNECT and give the event loop up to `grace` to flush it.
    ///
    /// The background task is aborted if it has not finished by then.
    pub async fn disconnect(self, grace: Duration) {
        let Session {
            config,
            client,
            mut driver,
            ..
        } = self;

        if let Err(e) = client.disconnect().await {
            debug!("[{}] Disconnect request not delivered: {e}", config.client_id);
        }

        match time::timeout(grace, &mut driver).await {
            Ok(_) => info!("[{}] Disconnected", config.client_id),
            Err(_) => {
                warn!(
                    "[{}] Disconnect did not complete within {grace:?}, closing connection",
                    config.client_id
                );
                driver.abort();
            }
        }
    }

    fn discard_stale_acks(&mut self) {
        while let Ok(ack) = self.acks.try_recv() {
            debug!("[{}] Discarding stale {ack:?}", self.config.client_id);
        }
    }

    /// Wait for the packet id of the request just queued, then for the
    /// broker's acknowledgement of that packet id.
    ///
    /// Returns the SUBACK reason codes, or nothing for an UNSUBACK.
    async fn await_ack(&mut self, kind: RequestKind) -> Result<Vec<SubscribeReasonCode>> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut pending = None;

        loop {
            let ack = match time::timeout_at(deadline, self.acks.recv()).await {
                Ok(Some(ack)) => ack,
                Ok(None) => bail!("MQTT event loop stopped before the broker acknowledged"),
                Err(_) => bail!(
                    "no acknowledgement from broker within {:?}",
                    self.config.ack_timeout
                ),
            };

            match (ack, pending) {
                (Ack::Sent { kind: sent, pkid }, None) if sent == kind => pending = Some(pkid),
                (Ack::SubAck { pkid, codes }, Some(expected))
                    if kind == RequestKind::Subscribe && pkid == expected =>
                {
                    return Ok(codes);
                }
                (Ack::UnsubAck { pkid }, Some(expected))
                    if kind == RequestKind::Unsubscribe && pkid == expected =>
                {
                    return Ok(Vec::new());
                }
                (stale, _) => {
                    debug!("[{}] Ignoring stale {stale:?}", self.config.client_id);
                }
            }
        }
    }
}

/// Poll until the broker's CONNACK arrives.
async fn await_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Incoming::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

/// Owns the event loop after the initial connection.
struct Driver {
    client_id: String,
    broker: BrokerAddress,
    ping_timeout: Duration,
    reconnect_delay: Duration,
    eventloop: EventLoop,
    handlers: Handlers,
    acks: mpsc::UnboundedSender<Ack>,
    connected: bool,
    attempt: u32,
    /// Set while a PINGREQ is outstanding.
    ping_deadline: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        debug!("[{}] MQTT event loop started", self.client_id);
        loop {
            if !self.connected {
                self.attempt += 1;
                self.handlers.notify(ConnectionNotification::Connecting {
                    is_reconnect: true,
                    attempt: self.attempt,
                });
            }

            let event = tokio::select! {
                event = self.eventloop.poll() => event,
                _ = ping_expired(self.ping_deadline) => {
                    self.ping_deadline = None;
                    self.connection_lost(format!(
                        "no ping response within {:?}",
                        self.ping_timeout
                    ));
                    // Dropping the network makes the next poll reconnect.
                    self.eventloop.clean();
                    continue;
                }
            };

            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    self.connected = true;
                    self.attempt = 0;
                    self.handlers.notify(ConnectionNotification::BrokerConnected {
                        broker: self.broker.clone(),
                    });
                    self.handlers.notify(ConnectionNotification::Connected);
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    (self.handlers.on_message)(&InboundMessage::from(publish));
                }
                Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                    self.forward(Ack::Sent {
                        kind: RequestKind::Subscribe,
                        pkid,
                    });
                }
                Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                    self.forward(Ack::Sent {
                        kind: RequestKind::Unsubscribe,
                        pkid,
                    });
                }
                Ok(Event::Incoming(Incoming::SubAck(suback))) => {
                    self.forward(Ack::SubAck {
                        pkid: suback.pkid,
                        codes: suback.return_codes,
                    });
                }
                Ok(Event::Incoming(Incoming::UnsubAck(unsuback))) => {
                    self.forward(Ack::UnsubAck {
                        pkid: unsuback.pkid,
                    });
                }
                Ok(Event::Incoming(Incoming::PingResp)) => {
                    self.ping_deadline = None;
                }
                Ok(Event::Outgoing(Outgoing::PingReq)) => {
                    self.ping_deadline = Some(Instant::now() + self.ping_timeout);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("[{}] DISCONNECT sent", self.client_id);
                    break;
                }
                Ok(_) => {} // Other acks and outgoing packets need no handling.
                Err(ConnectionError::RequestsDone) => {
                    debug!("[{}] Client handle dropped", self.client_id);
                    break;
                }
                Err(e) => {
                    self.ping_deadline = None;
                    if self.connected {
                        self.connection_lost(e.to_string());
                    } else {
                        self.handlers.notify(ConnectionNotification::BrokerFailed {
                            reason: e.to_string(),
                            broker: self.broker.clone(),
                        });
                    }
                    time::sleep(self.reconnect_delay).await;
                }
            }
        }
        debug!("[{}] MQTT event loop stopped", self.client_id);
    }

    fn connection_lost(&mut self, reason: String) {
        warn!("[{}] MQTT connection lost: {reason}", self.client_id);
        self.connected = false;
        self.attempt = 0;
        self.handlers.notify(ConnectionNotification::Lost { reason });
    }

    fn forward(&self, ack: Ack) {
        if self.acks.send(ack).is_err() {
            debug!("[{}] Dropping acknowledgement, session closed", self.client_id);
        }
    }
}

async fn ping_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
