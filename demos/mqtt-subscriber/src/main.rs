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

use std::env;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::info;
use mqtt_session::{
    logging, Handlers, QoS, Session, SessionConfig, DEFAULT_DISCONNECT_GRACE, DEFAULT_TOPIC,
};

/// Subscribe to a topic and log every message until interrupted.
#[derive(Parser, Debug)]
#[command(name = "mqtt-subscriber")]
#[command(version)]
struct Args {
    /// Broker username
    username: String,
    /// Broker password
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(_) => {
            println!("{}", Args::command().render_usage());
            process::exit(1);
        }
    };

    logging::init();

    let topic = env::var("MQTT_TOPIC").unwrap_or_else(|_| DEFAULT_TOPIC.to_string());
    let config = SessionConfig::builder(args.username, args.password)
        .with_env_overrides()
        .build()?;

    // Listen before connecting so a signal that arrives during startup
    // still triggers an orderly shutdown.
    let mut shutdown = ShutdownSignal::install()?;

    // A failed connect ends the process through the returned error.
    let mut session = Session::connect(config, Handlers::logging())
        .await
        .context("MQTT connect failed")?;

    if let Err(e) = session.subscribe(&topic, QoS::AtMostOnce).await {
        println!("{e:#}");
        process::exit(1);
    }

    shutdown.recv().await?;
    info!("Shutdown signal received");

    if let Err(e) = session.unsubscribe(&topic).await {
        println!("{e:#}");
        process::exit(1);
    }

    session.disconnect(DEFAULT_DISCONNECT_GRACE).await;
    Ok(())
}

/// SIGINT and SIGTERM listeners on unix, Ctrl-C elsewhere.
struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Wait for the first shutdown signal.
    #[cfg(unix)]
    async fn recv(&mut self) -> Result<()> {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Result<()> {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")
    }
}
