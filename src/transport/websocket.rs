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

// WebSocket connector implementation

use super::connector::{Connector, Link};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// WebSocket connector backed by tokio-tungstenite
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, address: &str) -> Result<Link, TransportError> {
        debug!("Opening WebSocket to {}", address);

        let (ws, response) = tokio::time::timeout(self.connect_timeout, connect_async(address))
            .await
            .map_err(|_| TransportError::Timeout(address.to_string()))?
            .map_err(|e| TransportError::Handshake {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "WebSocket handshake with {} completed ({})",
            address,
            response.status()
        );

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

        // Control frames are answered by tungstenite itself; only text frames
        // carry protocol messages.
        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    debug!("Ignoring {} byte binary frame", bytes.len());
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
