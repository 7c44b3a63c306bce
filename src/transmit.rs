// Encodes samples into wire messages and hands them to the registry

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::protocol::OutboundMessage;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::sample::{Sample, SampleWindow};

/// Sends encoded windows and frames either to one resolved connection or to
/// every connected endpoint.
pub struct WindowTransmitter {
    registry: ConnectionRegistry,
    target: RwLock<Option<ConnectionId>>,
}

impl WindowTransmitter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            target: RwLock::new(None),
        }
    }

    /// Route subsequent messages to one connection only
    pub fn set_target(&self, id: ConnectionId) {
        debug!("Transmitter target set to '{}'", id);
        *self.target.write() = Some(id);
    }

    /// Go back to broadcasting
    pub fn clear_target(&self) {
        *self.target.write() = None;
    }

    pub fn target(&self) -> Option<ConnectionId> {
        self.target.read().clone()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Encode and deliver an admitted window, consuming it
    pub fn send_window(&self, window: SampleWindow) -> bool {
        self.transmit(&OutboundMessage::sequence(window))
    }

    /// Encode and deliver a single live frame
    pub fn send_frame(&self, sample: Sample) -> bool {
        self.transmit(&OutboundMessage::frame(sample))
    }

    pub fn ping(&self) -> bool {
        self.transmit(&OutboundMessage::Ping)
    }

    pub fn transmit(&self, message: &OutboundMessage) -> bool {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} message: {}", message.kind(), e);
                return false;
            }
        };

        let target = self.target();
        let delivered = self.registry.send(&payload, target.as_ref());
        if !delivered {
            match &target {
                Some(id) => debug!("{} not delivered: '{}' is not connected", message.kind(), id),
                None => debug!("{} not delivered: no open connections", message.kind()),
            }
        }
        delivered
    }
}
