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

//! Configuration types for an MQTT session.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use rumqttc::MqttOptions;

/// Broker the sample client connects to unless overridden.
pub const DEFAULT_BROKER: &str = "tcp://localhost:1883";
/// Topic the sample client subscribes to unless overridden.
pub const DEFAULT_TOPIC: &str = "mqtt-session/sample";
pub const DEFAULT_CLIENT_ID: &str = "mqtt-session-client";
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(2);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);
/// Time allowed for in-flight work to drain before a disconnect is forced.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_millis(250);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_PORT: u16 = 1883;

/// Broker endpoint parsed from a `scheme://host[:port]` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = anyhow::Error;

    fn from_str(uri: &str) -> Result<Self> {
        let rest = match uri.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => bail!("unsupported broker scheme '{scheme}' in '{uri}'"),
            None => uri,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| anyhow!("unterminated '[' in broker address '{uri}'"))?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| anyhow!("unexpected '{after}' after ']' in '{uri}'"))?;
                    parse_port(port, uri)?
                }
            };
            (host, port)
        } else {
            match rest.split_once(':') {
                Some((_, tail)) if tail.contains(':') => {
                    bail!("IPv6 broker address must be bracketed, e.g. 'tcp://[::1]:1883': '{uri}'")
                }
                Some((host, port)) => (host, parse_port(port, uri)?),
                None => (rest, DEFAULT_PORT),
            }
        };

        ensure!(!host.is_empty(), "missing broker host in '{uri}'");
        ensure!(port != 0, "broker port must be non-zero in '{uri}'");

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(port: &str, uri: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| anyhow!("invalid broker port '{port}' in '{uri}'"))
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "tcp://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "tcp://{}:{}", self.host, self.port)
        }
    }
}

/// Connection settings for a [`Session`](crate::Session).
///
/// Built once at startup through [`SessionConfig::builder`] and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker to connect to.
    pub broker: BrokerAddress,
    /// MQTT client identifier presented in CONNECT.
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Keep-alive interval advertised to the broker.
    pub keep_alive: Duration,
    /// How long to wait for a PINGRESP before the connection counts as lost.
    pub ping_timeout: Duration,
    /// Pause between reconnect attempts after the connection drops.
    pub reconnect_delay: Duration,
    /// Upper bound on waiting for a SUBACK or UNSUBACK.
    pub ack_timeout: Duration,
}

impl SessionConfig {
    /// Start building a config with the required credentials.
    pub fn builder(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> SessionConfigBuilder {
        SessionConfigBuilder {
            broker: DEFAULT_BROKER.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: username.into(),
            password: password.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Options handed to the underlying client library.
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        opts.set_keep_alive(self.keep_alive)
            .set_clean_session(true)
            .set_credentials(&self.username, &self.password);
        opts
    }
}

/// Builder for [`SessionConfig`].
pub struct SessionConfigBuilder {
    broker: String,
    client_id: String,
    username: String,
    password: String,
    keep_alive: Duration,
    ping_timeout: Duration,
    reconnect_delay: Duration,
    ack_timeout: Duration,
}

impl SessionConfigBuilder {
    pub fn broker(mut self, uri: impl Into<String>) -> Self {
        self.broker = uri.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Apply `MQTT_BROKER_URL` and `MQTT_CLIENT_ID` when they are set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(broker) = env::var("MQTT_BROKER_URL") {
            self.broker = broker;
        }
        if let Ok(client_id) = env::var("MQTT_CLIENT_ID") {
            self.client_id = client_id;
        }
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<SessionConfig> {
        let broker = self
            .broker
            .parse::<BrokerAddress>()
            .context("invalid broker address")?;

        ensure!(
            !self.client_id.is_empty() && !self.client_id.starts_with(' '),
            "client id must not be empty or start with a space"
        );
        // rumqttc rejects sub-second keep-alives other than zero.
        ensure!(
            self.keep_alive.is_zero() || self.keep_alive >= Duration::from_secs(1),
            "keep-alive must be zero or at least one second, got {:?}",
            self.keep_alive
        );
        ensure!(!self.ping_timeout.is_zero(), "ping timeout must be non-zero");

        Ok(SessionConfig {
            broker,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive: self.keep_alive,
            ping_timeout: self.ping_timeout,
            reconnect_delay: self.reconnect_delay,
            ack_timeout: self.ack_timeout,
        })
    }
}
