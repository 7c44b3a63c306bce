// Per-connection transport task
//
// One task per transport attempt. The task owns the link; the registry only
// holds a cancellation token and the outbound queue. Every transition the
// task reports carries its epoch, so a task outlived by a close or reconnect
// can never overwrite the newer state.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionId, ConnectionStatus, RegistryInner};
use crate::transport::{Link, LinkSink};

pub(super) fn spawn_transport(
    inner: Arc<RegistryInner>,
    id: ConnectionId,
    epoch: u64,
    address: String,
    cancel: CancellationToken,
) {
    tokio::spawn(run_transport(inner, id, epoch, address, cancel));
}

async fn run_transport(
    inner: Arc<RegistryInner>,
    id: ConnectionId,
    epoch: u64,
    address: String,
    cancel: CancellationToken,
) {
    let connector = inner.connector();

    let handshake = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Handshake for '{}' cancelled", id);
            return;
        }
        result = connector.connect(&address) => result,
    };
    debug!("Handshake for '{}' via {} finished", id, connector.name());

    let Link { mut sink, mut stream } = match handshake {
        Ok(link) => link,
        Err(e) => {
            warn!("Connection '{}' failed: {}", id, e);
            inner.settle(&id, epoch, ConnectionStatus::Error, Some(e.to_string()));
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if cancel.is_cancelled() || !inner.mark_connected(&id, epoch, tx) {
        close_quietly(&mut sink).await;
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Transport for '{}' cancelled", id);
                close_quietly(&mut sink).await;
                return;
            }
            Some(payload) = rx.recv() => {
                if let Err(e) = sink.send(payload).await {
                    warn!("Write to '{}' failed: {}", id, e);
                    inner.settle(&id, epoch, ConnectionStatus::Error, Some(e.to_string()));
                    return;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    if let Some(reply) = inner.dispatch_inbound(&id, &text) {
                        if let Err(e) = sink.send(reply).await {
                            warn!("Reply to '{}' failed: {}", id, e);
                            inner.settle(&id, epoch, ConnectionStatus::Error, Some(e.to_string()));
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("Transport error on '{}': {}", id, e);
                    inner.settle(&id, epoch, ConnectionStatus::Error, Some(e.to_string()));
                    return;
                }
                None => {
                    info!("Connection '{}' closed by remote", id);
                    inner.settle(&id, epoch, ConnectionStatus::Disconnected, None);
                    return;
                }
            }
        }
    }
}

async fn close_quietly(sink: &mut LinkSink) {
    if let Err(e) = sink.close().await {
        debug!("Ignoring close error: {}", e);
    }
}
