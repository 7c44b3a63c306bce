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

// Real-time landmark streaming client
//
// Streams hand/body landmark sequences to remote classifiers:
// - Keeps a registry of live WebSocket connections to one or more endpoints
// - Reconnects dropped connections with exponential backoff
// - Buffers per-frame samples and flushes them on a fixed cadence
// - Rejects windows that moved too fast to classify reliably
// - Dispatches classification results to per-connection listeners

pub mod admission;
pub mod buffer;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod sample;
pub mod transmit;
pub mod transport;

// Re-export main types
pub use admission::{AdmissionDecision, AdmissionPolicy, FixedCadence, FlushPolicy, KinematicGate};
pub use buffer::{PushOutcome, SampleBuffer};
pub use config::{load_config, load_config_with_env, StreamerConfig};
pub use error::{StreamError, TransportError};
pub use notify::{AggregateState, GlobalStatus, SubscriptionId};
pub use pipeline::{CaptureEvent, CapturePipeline, FlushOutcome};
pub use protocol::{ClassificationResult, InboundMessage, OutboundMessage};
pub use reconnect::{AutoReconnectService, ReconnectPolicy, ReconnectState, ReconnectStatus};
pub use registry::{ConnectionId, ConnectionRecord, ConnectionRegistry, ConnectionStatus};
pub use sample::{Hand, Point3, Sample, SampleWindow};
pub use transmit::WindowTransmitter;
pub use transport::{Connector, Link, WebSocketConnector};
