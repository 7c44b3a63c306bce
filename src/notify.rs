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

// Aggregate connection state and subscriber notification

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::registry::ConnectionStatus;

/// Summary status across every record in a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GlobalStatus {
    Connected,
    Partial,
    Connecting,
    Error,
    #[default]
    Disconnected,
}

/// Derived view over the current record statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AggregateState {
    pub total: usize,
    pub connected: usize,
    pub connecting: usize,
    pub errored: usize,
    pub global_status: GlobalStatus,
}

impl AggregateState {
    /// Compute the aggregate from a set of record statuses.
    ///
    /// `reconnecting` counts as connecting.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ConnectionStatus>,
    {
        let mut state = AggregateState::default();
        for status in statuses {
            state.total += 1;
            match status {
                ConnectionStatus::Connected => state.connected += 1,
                ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
                    state.connecting += 1
                }
                ConnectionStatus::Error => state.errored += 1,
                ConnectionStatus::Disconnected => {}
            }
        }

        state.global_status = if state.total > 0 && state.connected == state.total {
            GlobalStatus::Connected
        } else if state.connected > 0 {
            GlobalStatus::Partial
        } else if state.connecting > 0 {
            GlobalStatus::Connecting
        } else if state.errored > 0 {
            GlobalStatus::Error
        } else {
            GlobalStatus::Disconnected
        };

        state
    }
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type StateListener = Arc<dyn Fn(&AggregateState) + Send + Sync>;

/// Observer list for aggregate state changes.
///
/// Listeners run synchronously on the thread that performed the transition.
/// They must not call back into registry operations that mutate state.
#[derive(Default)]
pub struct SubscriberList {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, StateListener)>>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AggregateState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, state: &AggregateState) {
        // Snapshot so a listener may unsubscribe itself without deadlocking
        let listeners: Vec<StateListener> =
            self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(state);
        }
    }
}
