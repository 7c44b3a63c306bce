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

// Automatic reconnection with exponential backoff
//
// A periodic scan finds records that dropped (disconnected or error) and arms
// at most one timer per record. When the timer fires the registry reconnects
// the record in place. Timers are cancelled, not ignored, when the record is
// closed or disposed.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::registry::{ConnectionId, ConnectionRecord, ConnectionRegistry, Lifecycle};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Period of the scan over the registry
    pub check_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            check_interval: Duration::from_millis(1000),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            check_interval: Duration::from_millis(config.check_interval_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (1-indexed): `min(base * 2^(n-1), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Per-connection retry bookkeeping. `retry_count` counts timers armed in the
/// current outage and is for display only; the ceiling and the backoff follow
/// the record's `attempt_count`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconnectState {
    pub retry_count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub armed: bool,
}

/// Service status for observability
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ReconnectStatus {
    pub running: bool,
    pub in_flight: usize,
}

struct ReconnectShared {
    states: DashMap<ConnectionId, ReconnectState>,
    timers: DashMap<ConnectionId, JoinHandle<()>>,
}

impl ReconnectShared {
    fn cancel(&self, id: &ConnectionId) -> bool {
        let cancelled = match self.timers.remove(id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        };
        if let Some(mut state) = self.states.get_mut(id) {
            state.armed = false;
            state.next_attempt_at = None;
        }
        cancelled
    }

    fn forget(&self, id: &ConnectionId) {
        self.cancel(id);
        self.states.remove(id);
    }

    fn cancel_all(&self) {
        let ids: Vec<ConnectionId> = self.timers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel(&id);
        }
    }
}

/// Background monitor that reconnects dropped connections
pub struct AutoReconnectService {
    registry: ConnectionRegistry,
    policy: ReconnectPolicy,
    shared: Arc<ReconnectShared>,
    loop_cancel: Mutex<Option<CancellationToken>>,
}

impl AutoReconnectService {
    pub fn new(registry: ConnectionRegistry, policy: ReconnectPolicy) -> Self {
        let shared = Arc::new(ReconnectShared {
            states: DashMap::new(),
            timers: DashMap::new(),
        });

        let hook_shared = shared.clone();
        registry.on_lifecycle(move |event| match event {
            Lifecycle::Closed(id) => {
                hook_shared.cancel(id);
            }
            Lifecycle::Disposed(id) => hook_shared.forget(id),
        });

        Self {
            registry,
            policy,
            shared,
            loop_cancel: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Start the periodic scan. Returns false if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.loop_cancel.lock();
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.policy.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => service.check_now(),
                    _ = cancel.cancelled() => {
                        debug!("Reconnect loop shutting down");
                        break;
                    }
                }
            }
        });

        info!(
            "Auto-reconnect started (max_retries={}, base={:?}, max={:?})",
            self.policy.max_retries, self.policy.base_delay, self.policy.max_delay
        );
        true
    }

    /// Stop the scan and cancel every armed timer
    pub fn stop(&self) {
        if let Some(cancel) = self.loop_cancel.lock().take() {
            cancel.cancel();
            info!("Auto-reconnect stopped");
        }
        self.shared.cancel_all();
    }

    pub fn is_running(&self) -> bool {
        self.loop_cancel.lock().is_some()
    }

    /// Run one scan over the registry
    pub fn check_now(&self) {
        for record in self.registry.records() {
            if record.is_connected() {
                // Recovered: drop the display state; attempt_count carries on
                let recovered = self
                    .shared
                    .states
                    .remove_if(&record.id, |_, state| !state.armed)
                    .is_some();
                if recovered {
                    debug!("Connection '{}' recovered, clearing retry state", record.id);
                }
                continue;
            }

            if self.is_eligible(&record) {
                self.schedule(&record);
            }
        }
    }

    fn is_eligible(&self, record: &ConnectionRecord) -> bool {
        record.auto_reconnect && !record.closed_by_caller && record.status.is_retryable()
    }

    fn schedule(&self, record: &ConnectionRecord) {
        let id = record.id.clone();

        let slot = match self.shared.timers.entry(id.clone()) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => slot,
        };

        let mut state = self
            .shared
            .states
            .entry(id.clone())
            .or_insert_with(|| ReconnectState {
                retry_count: 0,
                next_attempt_at: None,
                armed: false,
            });

        // The record's attempt counter survives recoveries, so a connection
        // that keeps dropping runs out of automatic retries for good.
        if record.attempt_count > self.policy.max_retries {
            state.next_attempt_at = None;
            state.armed = false;
            debug!(
                "Connection '{}' used {} attempts (max retries {}), leaving it in {}",
                id, record.attempt_count, self.policy.max_retries, record.status
            );
            return;
        }

        state.retry_count += 1;
        let delay = self.policy.delay_for_attempt(record.attempt_count);
        state.armed = true;
        state.next_attempt_at = chrono::Duration::from_std(delay)
            .ok()
            .map(|d| Utc::now() + d);
        drop(state);

        info!(
            "Scheduling reconnect {}/{} for '{}' in {:?}",
            record.attempt_count, self.policy.max_retries, id, delay
        );

        let registry = self.registry.clone();
        let shared = self.shared.clone();
        let timer_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            shared.timers.remove(&timer_id);
            if let Some(mut state) = shared.states.get_mut(&timer_id) {
                state.armed = false;
                state.next_attempt_at = None;
            }

            match registry.lookup_by_id(&timer_id) {
                Some(record) if record.status.is_retryable() && !record.closed_by_caller => {
                    if let Err(e) = registry.reconnect(&timer_id) {
                        warn!("Reconnect of '{}' failed: {}", timer_id, e);
                    }
                }
                Some(_) => debug!("Skipping reconnect of '{}': state changed", timer_id),
                None => debug!("Skipping reconnect of '{}': disposed", timer_id),
            }
        });
        slot.insert(handle);
    }

    /// Cancel an armed timer without touching the connection status
    pub fn cancel_reconnect(&self, id: &ConnectionId) -> bool {
        let cancelled = self.shared.cancel(id);
        if cancelled {
            debug!("Cancelled pending reconnect for '{}'", id);
        }
        cancelled
    }

    pub fn get_status(&self) -> ReconnectStatus {
        ReconnectStatus {
            running: self.is_running(),
            in_flight: self.shared.timers.len(),
        }
    }

    pub fn get_reconnect_state(&self, id: &ConnectionId) -> Option<ReconnectState> {
        self.shared.states.get(id).map(|s| s.clone())
    }

    pub fn get_all_reconnect_states(&self) -> Vec<(ConnectionId, ReconnectState)> {
        let mut states: Vec<(ConnectionId, ReconnectState)> = self
            .shared
            .states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl Drop for AutoReconnectService {
    fn drop(&mut self) {
        self.stop();
    }
}
