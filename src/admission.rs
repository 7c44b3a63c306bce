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

// Window admission and flush policies
//
// The flush policy decides when a window is evaluated; the admission policy
// decides whether it is transmitted. Both are injected into the capture
// pipeline independently.

use std::time::Duration;
use tracing::debug;

use crate::config::AdmissionConfig;
use crate::sample::{Hand, Point3, Sample, SampleWindow};

/// Result of evaluating a window
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Accept,
    /// Motion was too fast to classify reliably
    Reject {
        hand: Hand,
        keypoint: usize,
        /// Index of the first sample of the triplet that tripped the gate
        frame: usize,
        acceleration: f32,
    },
}

impl AdmissionDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, AdmissionDecision::Accept)
    }
}

/// Decides whether a window may be transmitted
pub trait AdmissionPolicy: Send + Sync {
    fn evaluate(&self, window: &SampleWindow) -> AdmissionDecision;
}

/// Decides how often the pending window is evaluated
pub trait FlushPolicy: Send + Sync {
    fn interval(&self) -> Duration;

    /// Whether a taken window is worth evaluating at all
    fn should_evaluate(&self, window: &SampleWindow) -> bool {
        !window.is_empty()
    }
}

/// Evaluate on a fixed cadence regardless of sample rate
#[derive(Debug, Clone, Copy)]
pub struct FixedCadence {
    interval: Duration,
}

impl FixedCadence {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl FlushPolicy for FixedCadence {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Accepts every window
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AdmissionPolicy for AcceptAll {
    fn evaluate(&self, _window: &SampleWindow) -> AdmissionDecision {
        AdmissionDecision::Accept
    }
}

/// Rejects windows in which a hand keypoint shows several consecutive
/// frame-to-frame accelerations above the threshold.
///
/// Differences are taken per frame. Triplets whose steps are below the
/// movement thresholds are skipped as sensor jitter and do not affect the
/// consecutive counter; a triplet under the acceleration threshold resets it.
#[derive(Debug, Clone, Copy)]
pub struct KinematicGate {
    config: AdmissionConfig,
}

impl KinematicGate {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    fn point(sample: &Sample, hand: Hand, keypoint: usize) -> Option<Point3> {
        sample.hand(hand).and_then(|points| points.get(keypoint)).copied()
    }

    /// Acceleration magnitude for a triplet, or `None` if it is jitter
    fn triplet_acceleration(&self, p1: Point3, p2: Point3, p3: Point3) -> Option<f32> {
        let min = self.config.min_movement_threshold;
        if p1.distance(p2) < min || p2.distance(p3) < min {
            return None;
        }
        if p1.distance(p3) < self.config.total_movement_threshold {
            return None;
        }

        let v1 = p2.sub(p1);
        let v2 = p3.sub(p2);
        Some(v2.sub(v1).magnitude())
    }

    fn scan_keypoint(&self, samples: &[Sample], hand: Hand, keypoint: usize) -> Option<AdmissionDecision> {
        let required = self.config.required_consecutive_detections.max(1);
        let mut consecutive = 0u32;

        for (frame, triplet) in samples.windows(3).enumerate() {
            let (Some(p1), Some(p2), Some(p3)) = (
                Self::point(&triplet[0], hand, keypoint),
                Self::point(&triplet[1], hand, keypoint),
                Self::point(&triplet[2], hand, keypoint),
            ) else {
                continue;
            };

            let Some(acceleration) = self.triplet_acceleration(p1, p2, p3) else {
                continue;
            };

            if acceleration > self.config.acceleration_threshold {
                consecutive += 1;
                if consecutive >= required {
                    return Some(AdmissionDecision::Reject {
                        hand,
                        keypoint,
                        frame,
                        acceleration,
                    });
                }
            } else {
                consecutive = 0;
            }
        }

        None
    }
}

impl AdmissionPolicy for KinematicGate {
    fn evaluate(&self, window: &SampleWindow) -> AdmissionDecision {
        let samples = window.samples();
        if samples.len() < 3 {
            return AdmissionDecision::Accept;
        }

        for hand in Hand::BOTH {
            let keypoints = samples
                .iter()
                .filter_map(|s| s.hand(hand))
                .map(|points| points.len())
                .max()
                .unwrap_or(0);

            for keypoint in 0..keypoints {
                if let Some(decision) = self.scan_keypoint(samples, hand, keypoint) {
                    debug!("Window rejected: {:?}", decision);
                    return decision;
                }
            }
        }

        AdmissionDecision::Accept
    }
}
