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

//! Loopback broker speaking just enough MQTT 3.1.1 for connect, subscribe,
//! publish delivery and teardown.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const TOPIC: &str = "mqtt-session/sample";
pub const WAIT: Duration = Duration::from_secs(5);

pub const CONNECT: u8 = 1;
pub const SUBSCRIBE: u8 = 8;
pub const UNSUBSCRIBE: u8 = 10;
pub const PINGREQ: u8 = 12;
pub const DISCONNECT: u8 = 14;

#[derive(Clone, Copy)]
pub struct Script {
    pub connack_code: u8,
    pub suback_code: u8,
    pub publish_after_suback: Option<&'static str>,
    pub answer_pings: bool,
    pub drop_first_connection: bool,
    pub suback_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connack_code: 0,
            suback_code: 0,
            publish_after_suback: None,
            answer_pings: true,
            drop_first_connection: false,
            suback_delay: None,
        }
    }
}

/// Accept connections and reply according to `script`, reporting the type
/// of every packet received.
pub async fn spawn_broker(script: Script) -> (SocketAddr, mpsc::UnboundedReceiver<u8>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let drop_after_connack = script.drop_first_connection && index == 0;
            index += 1;
            let _ = serve(stream, script, drop_after_connack, tx.clone()).await;
        }
    });

    (addr, rx)
}

async fn serve(
    mut stream: TcpStream,
    script: Script,
    drop_after_connack: bool,
    packets: mpsc::UnboundedSender<u8>,
) -> std::io::Result<()> {
    loop {
        let (kind, body) = read_packet(&mut stream).await?;
        let _ = packets.send(kind);

        match kind {
            CONNECT => {
                stream.write_all(&[0x20, 0x02, 0x00, script.connack_code]).await?;
                if drop_after_connack {
                    return Ok(());
                }
            }
            SUBSCRIBE => {
                if let Some(delay) = script.suback_delay {
                    tokio::time::sleep(delay).await;
                }
                stream
                    .write_all(&[0x90, 0x03, body[0], body[1], script.suback_code])
                    .await?;
                if let Some(payload) = script.publish_after_suback {
                    stream.write_all(&publish_packet(TOPIC, payload)).await?;
                }
            }
            UNSUBSCRIBE => {
                stream.write_all(&[0xb0, 0x02, body[0], body[1]]).await?;
            }
            PINGREQ if script.answer_pings => {
                stream.write_all(&[0xd0, 0x00]).await?;
            }
            DISCONNECT => return Ok(()),
            _ => {}
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        len |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

fn publish_packet(topic: &str, payload: &str) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128);
    let mut packet = vec![0x30, remaining as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload.as_bytes());
    packet
}

/// Next packet type the broker received.
pub async fn next_packet(packets: &mut mpsc::UnboundedReceiver<u8>) -> u8 {
    timeout(WAIT, packets.recv())
        .await
        .expect("timed out waiting for packet")
        .expect("broker stopped")
}
