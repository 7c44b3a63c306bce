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

// Connection registry
//
// Owns every live connection record. All state transitions go through the
// registry, which recomputes the aggregate state and notifies subscribers
// before the operation returns.

mod connection;
pub mod record;

pub use record::{ConnectionId, ConnectionRecord, ConnectionStatus};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::notify::{AggregateState, SubscriberList, SubscriptionId};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::transport::{resolve_address, Connector};

/// Callback invoked for every decoded inbound message on a connection
pub type MessageListener = Arc<dyn Fn(&ConnectionId, &InboundMessage) + Send + Sync>;

/// Handle returned by `add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Record lifecycle events for components that keep per-connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Closed by the caller; the record is still registered
    Closed(ConnectionId),
    /// Removed from the registry (superseded or `close_all`)
    Disposed(ConnectionId),
}

pub type LifecycleHook = Arc<dyn Fn(&Lifecycle) + Send + Sync>;

/// Transport currently attached to a record
struct TransportHandle {
    epoch: u64,
    cancel: CancellationToken,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct ConnectionEntry {
    record: ConnectionRecord,
    transport: Option<TransportHandle>,
}

impl ConnectionEntry {
    fn owns(&self, epoch: u64) -> bool {
        self.transport.as_ref().map(|t| t.epoch) == Some(epoch)
    }

    fn detach(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.cancel.cancel();
        }
    }

    fn deliver(&self, payload: &str) -> bool {
        if !self.record.is_connected() {
            return false;
        }
        match self.transport.as_ref().and_then(|t| t.outbound.as_ref()) {
            Some(tx) => match tx.send(payload.to_string()) {
                Ok(()) => true,
                Err(_) => {
                    warn!("Send to '{}' failed: writer has stopped", self.record.id);
                    false
                }
            },
            None => false,
        }
    }
}

pub(crate) struct RegistryInner {
    connector: Arc<dyn Connector>,
    secure_origin: bool,
    records: DashMap<ConnectionId, ConnectionEntry>,
    by_address: DashMap<String, ConnectionId>,
    listeners: DashMap<ConnectionId, Vec<(ListenerId, MessageListener)>>,
    subscribers: SubscriberList,
    lifecycle_hooks: RwLock<Vec<LifecycleHook>>,
    state_tx: watch::Sender<AggregateState>,
    publish_lock: ReentrantMutex<()>,
    next_epoch: AtomicU64,
    next_listener: AtomicU64,
}

impl RegistryInner {
    fn arm(&self) -> (u64, CancellationToken) {
        (
            self.next_epoch.fetch_add(1, Ordering::Relaxed),
            CancellationToken::new(),
        )
    }

    fn aggregate(&self) -> AggregateState {
        AggregateState::from_statuses(self.records.iter().map(|e| e.record.status))
    }

    /// Recompute the aggregate and notify observers. Must be called with no
    /// record guard held.
    fn publish(&self) {
        let _guard = self.publish_lock.lock();
        let state = self.aggregate();
        self.state_tx.send_replace(state);
        self.subscribers.notify(&state);
    }

    fn fire(&self, event: Lifecycle) {
        let hooks: Vec<LifecycleHook> = self.lifecycle_hooks.read().clone();
        for hook in hooks {
            hook(&event);
        }
    }

    /// Remove a record, cancel its transport and drop its listeners
    fn dispose(&self, id: &ConnectionId) -> Option<ConnectionRecord> {
        let (_, mut entry) = self.records.remove(id)?;
        entry.detach();
        self.by_address
            .remove_if(&entry.record.address, |_, owner| owner == id);
        self.listeners.remove(id);
        debug!("Disposed connection '{}'", id);
        self.fire(Lifecycle::Disposed(id.clone()));
        Some(entry.record)
    }

    pub(crate) fn mark_connected(
        &self,
        id: &ConnectionId,
        epoch: u64,
        outbound: mpsc::UnboundedSender<String>,
    ) -> bool {
        let applied = match self.records.get_mut(id) {
            Some(mut entry) if entry.owns(epoch) => {
                let now = Utc::now();
                entry.record.status = ConnectionStatus::Connected;
                entry.record.connected_at = Some(now);
                entry.record.last_error = None;
                if let Some(transport) = entry.transport.as_mut() {
                    transport.outbound = Some(outbound);
                }
                info!(
                    "Connected to {} (attempt {})",
                    entry.record.address, entry.record.attempt_count
                );
                true
            }
            _ => false,
        };

        if applied {
            self.publish();
        }
        applied
    }

    /// Final transition for a transport task. Ignored when the record has
    /// since been closed, reconnected or disposed.
    pub(crate) fn settle(
        &self,
        id: &ConnectionId,
        epoch: u64,
        status: ConnectionStatus,
        error: Option<String>,
    ) {
        let applied = match self.records.get_mut(id) {
            Some(mut entry) if entry.owns(epoch) => {
                entry.transport = None;
                entry.record.status = status;
                entry.record.last_error = error;
                true
            }
            _ => false,
        };

        if applied {
            self.publish();
        } else {
            debug!("Dropping stale transition for '{}' (epoch {})", id, epoch);
        }
    }

    /// Decode an inbound frame and fan it out to listeners. Returns a reply
    /// to write back, if the message calls for one.
    pub(crate) fn dispatch_inbound(&self, id: &ConnectionId, text: &str) -> Option<String> {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding undecodable message on '{}': {}", id, e);
                return None;
            }
        };

        let listeners: Vec<MessageListener> = self
            .listeners
            .get(id)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(id, &message);
        }

        match message {
            InboundMessage::Ping => OutboundMessage::Pong.encode().ok(),
            _ => None,
        }
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }
}

/// Registry of live connections to remote classifier endpoints
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>, secure_origin: bool) -> Self {
        let (state_tx, _) = watch::channel(AggregateState::default());
        Self {
            inner: Arc::new(RegistryInner {
                connector,
                secure_origin,
                records: DashMap::new(),
                by_address: DashMap::new(),
                listeners: DashMap::new(),
                subscribers: SubscriberList::new(),
                lifecycle_hooks: RwLock::new(Vec::new()),
                state_tx,
                publish_lock: ReentrantMutex::new(()),
                next_epoch: AtomicU64::new(1),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Create a record for `address` and start connecting.
    ///
    /// An existing record for the same address is superseded: its transport
    /// is cancelled and the record disposed before the new one is installed.
    pub fn open(&self, address: &str, auto_reconnect: bool) -> ConnectionRecord {
        let address = resolve_address(address, self.inner.secure_origin);

        let prior = self.inner.by_address.get(&address).map(|e| e.value().clone());
        let superseded = prior.and_then(|prior| {
            info!("Replacing connection '{}' for {}", prior, address);
            self.inner.dispose(&prior)
        });

        // Ids for one address must differ across reopen cycles even when the
        // clock has not advanced.
        let mut created_at = Utc::now();
        if let Some(old) = &superseded {
            if created_at <= old.created_at {
                created_at = old.created_at + chrono::Duration::microseconds(1);
            }
        }

        let record = ConnectionRecord::new(address.clone(), auto_reconnect, created_at);
        let id = record.id.clone();
        let (epoch, cancel) = self.inner.arm();

        self.inner.records.insert(
            id.clone(),
            ConnectionEntry {
                record: record.clone(),
                transport: Some(TransportHandle {
                    epoch,
                    cancel: cancel.clone(),
                    outbound: None,
                }),
            },
        );
        self.inner.by_address.insert(address.clone(), id.clone());

        info!("Opening connection '{}' to {}", id, address);
        connection::spawn_transport(self.inner.clone(), id, epoch, address, cancel);
        self.inner.publish();

        record
    }

    /// Open one connection per unique address, preserving first-seen order
    pub fn open_many<S: AsRef<str>>(&self, addresses: &[S]) -> Vec<ConnectionRecord> {
        self.open_many_with(addresses, true)
    }

    /// Like [`open_many`](Self::open_many) with an explicit auto-reconnect
    /// flag. Addresses that resolve to the same endpoint are opened once.
    pub fn open_many_with<S: AsRef<str>>(
        &self,
        addresses: &[S],
        auto_reconnect: bool,
    ) -> Vec<ConnectionRecord> {
        let mut seen = HashSet::new();
        addresses
            .iter()
            .map(|a| a.as_ref())
            .filter(|a| seen.insert(resolve_address(a, self.inner.secure_origin)))
            .map(|a| self.open(a, auto_reconnect))
            .collect()
    }

    /// Close a connection without removing it. Returns false for unknown ids;
    /// closing an already closed record is a no-op.
    pub fn close(&self, id: &ConnectionId) -> bool {
        let changed = match self.inner.records.get_mut(id) {
            None => return false,
            Some(mut entry) => {
                entry.detach();
                entry.record.closed_by_caller = true;
                let changed = entry.record.status != ConnectionStatus::Disconnected
                    || entry.record.last_error.is_some();
                entry.record.status = ConnectionStatus::Disconnected;
                entry.record.last_error = None;
                changed
            }
        };

        self.inner.fire(Lifecycle::Closed(id.clone()));
        if changed {
            info!("Closed connection '{}'", id);
            self.inner.publish();
        }
        true
    }

    /// Close and dispose every record, leaving the registry empty
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.inner.records.iter().map(|e| e.key().clone()).collect();
        let mut disposed = 0;
        for id in &ids {
            if self.inner.dispose(id).is_some() {
                disposed += 1;
            }
        }
        info!("Closed all connections ({} disposed)", disposed);
        self.inner.publish();
    }

    /// Replace the record's transport with a fresh one to the same address,
    /// keeping its id, flags and listeners.
    pub fn reconnect(&self, id: &ConnectionId) -> Result<ConnectionRecord> {
        let (record, epoch, cancel) = {
            let mut entry = self
                .inner
                .records
                .get_mut(id)
                .ok_or_else(|| StreamError::NotFound(id.clone()))?;

            if entry.record.status.is_in_flight() {
                return Err(StreamError::AttemptInFlight(id.clone()));
            }

            entry.detach();
            let (epoch, cancel) = self.inner.arm();
            entry.transport = Some(TransportHandle {
                epoch,
                cancel: cancel.clone(),
                outbound: None,
            });
            entry.record.attempt_count += 1;
            entry.record.status = ConnectionStatus::Reconnecting;
            entry.record.last_attempt_at = Some(Utc::now());
            entry.record.closed_by_caller = false;
            (entry.record.clone(), epoch, cancel)
        };

        info!(
            "Reconnecting '{}' (attempt {})",
            record.id, record.attempt_count
        );
        connection::spawn_transport(
            self.inner.clone(),
            record.id.clone(),
            epoch,
            record.address.clone(),
            cancel,
        );
        self.inner.publish();

        Ok(record)
    }

    pub fn lookup_by_id(&self, id: &ConnectionId) -> Option<ConnectionRecord> {
        self.inner.records.get(id).map(|e| e.record.clone())
    }

    pub fn lookup_by_address(&self, address: &str) -> Option<ConnectionRecord> {
        let address = resolve_address(address, self.inner.secure_origin);
        let id = self.inner.by_address.get(&address).map(|e| e.value().clone())?;
        self.lookup_by_id(&id)
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> =
            self.inner.records.iter().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Deliver an encoded payload.
    ///
    /// With a target, delivers only on that connection. Without one, delivers
    /// to every connected record; returns true if at least one accepted it.
    /// A failure on one record never prevents delivery to the others.
    pub fn send(&self, payload: &str, target: Option<&ConnectionId>) -> bool {
        match target {
            Some(id) => self
                .inner
                .records
                .get(id)
                .map(|entry| entry.deliver(payload))
                .unwrap_or(false),
            None => {
                let mut delivered = 0usize;
                for entry in self.inner.records.iter() {
                    if entry.deliver(payload) {
                        delivered += 1;
                    }
                }
                debug!("Broadcast delivered to {} connection(s)", delivered);
                delivered > 0
            }
        }
    }

    pub fn aggregate_state(&self) -> AggregateState {
        self.inner.aggregate()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AggregateState) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Async view of the aggregate state
    pub fn watch_state(&self) -> watch::Receiver<AggregateState> {
        self.inner.state_tx.subscribe()
    }

    /// Register a listener for decoded inbound messages on `id`. Returns
    /// `None` if the connection is unknown.
    pub fn add_listener<F>(&self, id: &ConnectionId, listener: F) -> Option<ListenerId>
    where
        F: Fn(&ConnectionId, &InboundMessage) + Send + Sync + 'static,
    {
        if !self.inner.records.contains_key(id) {
            return None;
        }
        let listener_id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .entry(id.clone())
            .or_default()
            .push((listener_id, Arc::new(listener)));
        Some(listener_id)
    }

    pub fn remove_listener(&self, id: &ConnectionId, listener_id: ListenerId) -> bool {
        match self.inner.listeners.get_mut(id) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(lid, _)| *lid != listener_id);
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Register a hook for record close/dispose events
    pub fn on_lifecycle<F>(&self, hook: F)
    where
        F: Fn(&Lifecycle) + Send + Sync + 'static,
    {
        self.inner.lifecycle_hooks.write().push(Arc::new(hook));
    }
}
