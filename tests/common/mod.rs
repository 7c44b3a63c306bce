// Copyright 2025 coScene
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

// Shared test helpers: an in-memory connector with scripted handshakes

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use landmark_streamer::{Connector, Link, Point3, Sample, TransportError};

/// Outcome of one scripted handshake
#[derive(Debug, Clone)]
pub enum Step {
    Accept,
    Fail(&'static str),
    /// Never completes; only cancellation ends it
    Hang,
}

/// Remote end of an accepted link
pub struct Peer {
    /// Frames written by the client
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Frames (or errors) to deliver to the client. Dropping it closes the link.
    pub inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl Peer {
    pub fn push(&self, text: &str) {
        self.inbound.send(Ok(text.to_string())).unwrap();
    }

    pub fn fail(&self, reason: &str) {
        self.inbound
            .send(Err(TransportError::Io(reason.to_string())))
            .unwrap();
    }

    /// Drain everything written so far
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            out.push(text);
        }
        out
    }
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<Step>>,
    attempts: HashMap<String, Vec<Instant>>,
    peers: HashMap<String, VecDeque<Peer>>,
}

/// Connector whose handshakes follow a per-address script. Unscripted
/// attempts are accepted.
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<MockState>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, address: &str, steps: Vec<Step>) {
        self.state
            .lock()
            .scripts
            .insert(address.to_string(), steps.into());
    }

    /// Instants at which `address` was dialed, oldest first
    pub fn attempts(&self, address: &str) -> Vec<Instant> {
        self.state
            .lock()
            .attempts
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn attempt_count(&self, address: &str) -> usize {
        self.attempts(address).len()
    }

    /// Take the oldest unclaimed peer for `address`
    pub fn take_peer(&self, address: &str) -> Option<Peer> {
        self.state.lock().peers.get_mut(address)?.pop_front()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Link, TransportError> {
        let step = {
            let mut state = self.state.lock();
            state
                .attempts
                .entry(address.to_string())
                .or_default()
                .push(Instant::now());
            state
                .scripts
                .get_mut(address)
                .and_then(|s| s.pop_front())
                .unwrap_or(Step::Accept)
        };

        match step {
            Step::Fail(reason) => Err(TransportError::Handshake {
                address: address.to_string(),
                reason: reason.to_string(),
            }),
            Step::Hang => {
                futures::future::pending::<()>().await;
                Err(TransportError::Closed)
            }
            Step::Accept => {
                let (sent_tx, sent_rx) = mpsc::unbounded_channel::<String>();
                let (inbound_tx, inbound_rx) =
                    mpsc::unbounded_channel::<Result<String, TransportError>>();

                let sink = futures::sink::unfold(sent_tx, |tx, text: String| async move {
                    tx.send(text).map_err(|_| TransportError::Closed)?;
                    Ok::<_, TransportError>(tx)
                });
                let stream = futures::stream::unfold(inbound_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });

                self.state
                    .lock()
                    .peers
                    .entry(address.to_string())
                    .or_default()
                    .push_back(Peer {
                        sent: sent_rx,
                        inbound: inbound_tx,
                    });

                Ok(Link::new(Box::pin(sink), Box::pin(stream)))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Let spawned tasks run without moving the clock far
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Poll `cond` every 10ms of (possibly paused) time until it holds
pub async fn wait_until<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// A right hand of 21 keypoints, all at `(x, 0.5, 0.0)`
pub fn right_hand_at(x: f32) -> Sample {
    Sample {
        body: None,
        hand_left: None,
        hand_right: Some(vec![Point3::new(x, 0.5, 0.0); 21]),
    }
}

/// A right hand at rest except for the wrist (keypoint 0)
pub fn right_wrist_at(x: f32) -> Sample {
    let mut hand = vec![Point3::new(0.5, 0.5, 0.0); 21];
    hand[0] = Point3::new(x, 0.5, 0.0);
    Sample {
        body: None,
        hand_left: None,
        hand_right: Some(hand),
    }
}
