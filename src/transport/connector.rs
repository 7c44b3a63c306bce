// Connector trait for bidirectional text transports

use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;

use crate::error::TransportError;

/// Outbound half of an established link
pub type LinkSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an established link. The stream ending means the remote
/// side closed the connection cleanly.
pub type LinkStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An established, handshaken connection split into its two halves
pub struct Link {
    pub sink: LinkSink,
    pub stream: LinkStream,
}

impl Link {
    pub fn new(sink: LinkSink, stream: LinkStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transports to remote endpoints.
///
/// The registry owns connection lifecycle; implementations only perform the
/// handshake and hand back the link. Tests inject scripted connectors here.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake with `address`
    async fn connect(&self, address: &str) -> Result<Link, TransportError>;

    /// Connector identifier for logging
    fn name(&self) -> &str;
}
