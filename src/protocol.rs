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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::sample::{Sample, SampleWindow};

/// Payload of a `landmarks_sequence` message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequencePayload {
    pub sequence: Vec<Sample>,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub frame_count: usize,
}

/// Messages sent from the client to a classifier endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    LandmarksSequence { data: SequencePayload },
    Landmarks { data: Sample, timestamp: i64 },
    Ping,
    Pong,
}

impl OutboundMessage {
    /// Encode an admitted window, consuming it
    pub fn sequence(window: SampleWindow) -> Self {
        let timestamp = window.started_at().timestamp_millis();
        let sequence = window.into_samples();
        OutboundMessage::LandmarksSequence {
            data: SequencePayload {
                frame_count: sequence.len(),
                sequence,
                timestamp,
            },
        }
    }

    /// Encode a single live frame for the low-latency path
    pub fn frame(sample: Sample) -> Self {
        OutboundMessage::Landmarks {
            data: sample,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::LandmarksSequence { .. } => "landmarks_sequence",
            OutboundMessage::Landmarks { .. } => "landmarks",
            OutboundMessage::Ping => "ping",
            OutboundMessage::Pong => "pong",
        }
    }
}

/// Classification produced by the remote endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub prediction: String,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: HashMap<String, f64>,
}

/// Messages received from a classifier endpoint
///
/// Result payloads are handed to listeners as-is; unknown message types decode
/// to `Unknown` instead of failing so a newer server does not break clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ClassificationResult { data: ClassificationResult },
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
