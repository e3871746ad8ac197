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

//! Values delivered to session callbacks.

use std::borrow::Cow;

use bytes::Bytes;

use crate::config::BrokerAddress;

/// A change in connection state reported by the session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotification {
    /// The session is connected and ready.
    Connected,
    /// A connection attempt is starting. `attempt` counts from 1 and resets
    /// after every successful connection.
    Connecting { is_reconnect: bool, attempt: u32 },
    /// The initial connection could not be established.
    Failed { reason: String },
    /// An established connection dropped.
    Lost { reason: String },
    /// The broker accepted the connection.
    BrokerConnected { broker: BrokerAddress },
    /// A connection attempt against the broker failed.
    BrokerFailed { reason: String, broker: BrokerAddress },
}

/// A PUBLISH received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl From<rumqttc::Publish> for InboundMessage {
    fn from(publish: rumqttc::Publish) -> Self {
        Self {
            topic: publish.topic,
            payload: publish.payload,
        }
    }
}
