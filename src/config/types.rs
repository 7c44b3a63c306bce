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

// Configuration types for landmark-streamer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StreamerConfig {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote classifier endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Upgrade ws:// and http:// to their secure schemes
    #[serde(default)]
    pub secure_origin: bool,

    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["ws://localhost:8000/ws".to_string()],
            secure_origin: false,
            auto_reconnect: default_auto_reconnect(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl EndpointsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Backoff policy for automatic reconnection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How often the registry is scanned for dropped connections
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

/// Sample buffering and admission
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Flush cadence of the sample window
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u64,

    /// Send the first frame of a capture session immediately
    #[serde(default = "default_send_first_frame")]
    pub send_first_frame: bool,

    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: default_buffer_duration_ms(),
            send_first_frame: default_send_first_frame(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl CaptureConfig {
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms)
    }
}

/// Thresholds for the kinematic admission gate, in normalized units per frame
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct AdmissionConfig {
    #[serde(default = "default_acceleration_threshold")]
    pub acceleration_threshold: f32,

    /// Per-step displacement below this is treated as jitter
    #[serde(default = "default_min_movement_threshold")]
    pub min_movement_threshold: f32,

    /// Net displacement over a triplet below this is treated as jitter
    #[serde(default = "default_total_movement_threshold")]
    pub total_movement_threshold: f32,

    #[serde(default = "default_required_detections")]
    pub required_consecutive_detections: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            acceleration_threshold: default_acceleration_threshold(),
            min_movement_threshold: default_min_movement_threshold(),
            total_movement_threshold: default_total_movement_threshold(),
            required_consecutive_detections: default_required_detections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "compact"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_auto_reconnect() -> bool { true }
fn default_connect_timeout_ms() -> u64 { 10_000 }
fn default_max_retries() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 30_000 }
fn default_check_interval_ms() -> u64 { 1000 }
fn default_buffer_duration_ms() -> u64 { 1000 }
fn default_send_first_frame() -> bool { true }
fn default_acceleration_threshold() -> f32 { 0.08 }
fn default_min_movement_threshold() -> f32 { 0.005 }
fn default_total_movement_threshold() -> f32 { 0.02 }
fn default_required_detections() -> u32 { 2 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
