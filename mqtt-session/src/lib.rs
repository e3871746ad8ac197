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

//! Callback-driven MQTT session on top of `rumqttc`.
//!
//! Connects to a broker, delivers inbound messages and connection
//! notifications to registered callbacks, and tears the connection down
//! with a bounded grace period.
//!
//! # Example
//!
//! ```ignore
//! use mqtt_session::{Handlers, Session, SessionConfig, DEFAULT_DISCONNECT_GRACE};
//! use rumqttc::QoS;
//!
//! let config = SessionConfig::builder("user", "secret")
//!     .broker("tcp://broker.local:1883")
//!     .build()?;
//!
//! let mut session = Session::connect(config, Handlers::logging()).await?;
//! session.subscribe("sensors/#", QoS::AtMostOnce).await?;
//! // ...
//! session.unsubscribe("sensors/#").await?;
//! session.disconnect(DEFAULT_DISCONNECT_GRACE).await;
//! ```

pub mod config;
pub mod handlers;
pub mod logging;
pub mod notification;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::{
    BrokerAddress, SessionConfig, SessionConfigBuilder, DEFAULT_DISCONNECT_GRACE, DEFAULT_TOPIC,
};
pub use notification::{ConnectionNotification, InboundMessage};
pub use rumqttc::QoS;
pub use session::{Handlers, Session};
