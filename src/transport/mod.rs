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

// Transport module
//
// Provides a trait-based abstraction over the bidirectional text transport
// used to reach classifier endpoints. The registry only ever talks to the
// `Connector` trait, so tests can replace the WebSocket implementation with
// an in-memory one.

pub mod address;
pub mod connector;
pub mod websocket;

pub use address::resolve_address;
pub use connector::{Connector, Link, LinkSink, LinkStream};
pub use websocket::WebSocketConnector;
