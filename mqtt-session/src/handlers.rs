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

//! Logging callbacks for inbound messages and connection notifications.
//!
//! Each callback emits exactly one `info` record per event, tagged with a
//! `component` field so the two streams can be told apart.

use log::info;

use crate::notification::{ConnectionNotification, InboundMessage};

pub const MESSAGE_HANDLER_COMPONENT: &str = "mqtt-message-handler";
pub const CONNECTION_NOTIFIER_COMPONENT: &str = "mqtt-connection-notifier";

/// Log the topic and payload text of an inbound message.
pub fn log_message(message: &InboundMessage) {
    let payload = message.payload_str();
    info!(
        component = MESSAGE_HANDLER_COMPONENT,
        topic = message.topic.as_str(),
        payload = &*payload;
        "message"
    );
}

/// Log a connection notification with its variant-specific fields.
pub fn log_notification(notification: &ConnectionNotification) {
    const COMPONENT: &str = CONNECTION_NOTIFIER_COMPONENT;

    match notification {
        ConnectionNotification::Connected => {
            info!(component = COMPONENT; "connected");
        }
        ConnectionNotification::Connecting {
            is_reconnect,
            attempt,
        } => {
            info!(
                component = COMPONENT,
                is_reconnect = *is_reconnect,
                attempt = *attempt;
                "connecting"
            );
        }
        ConnectionNotification::Failed { reason } => {
            info!(component = COMPONENT, reason = reason.as_str(); "connection failed");
        }
        ConnectionNotification::Lost { reason } => {
            info!(component = COMPONENT, reason = reason.as_str(); "connection lost");
        }
        ConnectionNotification::BrokerConnected { broker } => {
            let broker = broker.to_string();
            info!(component = COMPONENT, broker = broker.as_str(); "broker connection");
        }
        ConnectionNotification::BrokerFailed { reason, broker } => {
            let broker = broker.to_string();
            info!(
                component = COMPONENT,
                reason = reason.as_str(),
                broker = broker.as_str();
                "broker connection failed"
            );
        }
    }
}
