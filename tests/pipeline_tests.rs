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

mod common;

use common::{right_hand_at, right_wrist_at, settle, MockConnector, Peer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use landmark_streamer::config::AdmissionConfig;
use landmark_streamer::{
    CaptureEvent, CapturePipeline, ConnectionRegistry, FixedCadence, FlushOutcome,
    KinematicGate, PushOutcome, WindowTransmitter,
};

const A: &str = "ws://classifier-a:8000/ws";
const B: &str = "ws://classifier-b:8000/ws";

struct Harness {
    connector: Arc<MockConnector>,
    registry: ConnectionRegistry,
    pipeline: Arc<CapturePipeline>,
}

impl Harness {
    async fn new(send_first_frame: bool, addresses: &[&str]) -> Self {
        Self::with_admission(AdmissionConfig::default(), send_first_frame, addresses).await
    }

    async fn with_admission(
        admission: AdmissionConfig,
        send_first_frame: bool,
        addresses: &[&str],
    ) -> Self {
        let connector = MockConnector::new();
        let registry = ConnectionRegistry::new(connector.clone(), false);
        registry.open_many(addresses);
        settle().await;

        let pipeline = Arc::new(CapturePipeline::new(
            Arc::new(KinematicGate::new(admission)),
            Arc::new(FixedCadence::new(Duration::from_millis(1000))),
            Arc::new(WindowTransmitter::new(registry.clone())),
            send_first_frame,
        ));

        Self {
            connector,
            registry,
            pipeline,
        }
    }

    fn peer(&self, address: &str) -> Peer {
        self.connector.take_peer(address).unwrap()
    }
}

fn decode(frames: &[String]) -> Vec<Value> {
    frames
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect()
}

#[tokio::test]
async fn test_samples_dropped_when_not_capturing() {
    let h = Harness::new(false, &[A]).await;

    assert_eq!(h.pipeline.push_sample(right_hand_at(0.1)), PushOutcome::Dropped);
    assert_eq!(h.pipeline.buffer().pending(), 0);
    assert_eq!(h.pipeline.flush_now(), FlushOutcome::Empty);
    assert_eq!(h.pipeline.buffer().stats().dropped_samples, 1);
}

#[tokio::test]
async fn test_steady_window_is_sent() {
    let h = Harness::new(false, &[A]).await;
    let mut peer = h.peer(A);
    let mut events = h.pipeline.subscribe_events();

    let session = h.pipeline.start_capture();
    for i in 0..6 {
        h.pipeline.push_sample(right_hand_at(0.10 + 0.03 * i as f32));
    }

    assert_eq!(
        h.pipeline.flush_now(),
        FlushOutcome::Sent {
            frames: 6,
            delivered: true
        }
    );
    assert_eq!(h.pipeline.buffer().pending(), 0);
    assert_eq!(
        events.try_recv().unwrap(),
        CaptureEvent::WindowSent {
            session: Some(session),
            frames: 6,
            delivered: true
        }
    );

    settle().await;
    let messages = decode(&peer.drain());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "landmarks_sequence");
    assert_eq!(messages[0]["data"]["frame_count"], 6);

    let sequence = messages[0]["data"]["sequence"].as_array().unwrap();
    assert_eq!(sequence.len(), 6);
    assert!(sequence[0]["body"].is_null());
    assert!(sequence[0]["hand_left"].is_null());
    assert_eq!(sequence[0]["hand_right"].as_array().unwrap().len(), 21);
}

#[tokio::test]
async fn test_fast_wrist_window_is_rejected() {
    let h = Harness::new(false, &[A]).await;
    let mut peer = h.peer(A);
    let mut events = h.pipeline.subscribe_events();

    let session = h.pipeline.start_capture();
    for x in [0.50, 0.52, 0.60, 0.80, 1.10] {
        h.pipeline.push_sample(right_wrist_at(x));
    }

    assert_eq!(h.pipeline.flush_now(), FlushOutcome::Rejected { frames: 5 });
    assert_eq!(h.pipeline.buffer().pending(), 0);
    assert_eq!(
        events.try_recv().unwrap(),
        CaptureEvent::SlowDown {
            session: Some(session),
            frames: 5
        }
    );

    settle().await;
    assert!(peer.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wrist_spike_rejected_on_next_tick() {
    let admission = AdmissionConfig {
        required_consecutive_detections: 1,
        ..AdmissionConfig::default()
    };
    let h = Harness::with_admission(admission, false, &[A]).await;
    let mut peer = h.peer(A);
    let mut events = h.pipeline.subscribe_events();

    h.pipeline.start();
    h.pipeline.start_capture();
    // Sharp acceleration between samples 2 and 4
    for x in [0.50, 0.52, 0.54, 0.80, 0.82] {
        h.pipeline.push_sample(right_wrist_at(x));
    }

    tokio::time::sleep(Duration::from_millis(1100)).await;
    settle().await;

    assert_eq!(h.pipeline.buffer().pending(), 0);
    assert!(matches!(
        events.try_recv().unwrap(),
        CaptureEvent::SlowDown { frames: 5, .. }
    ));
    assert!(peer.drain().is_empty());
    h.pipeline.stop();
}

#[tokio::test]
async fn test_single_fast_triplet_is_tolerated() {
    let h = Harness::new(false, &[A]).await;
    let mut peer = h.peer(A);

    h.pipeline.start_capture();
    // One triplet over the threshold, then steady motion
    for x in [0.50, 0.52, 0.54, 0.66, 0.78, 0.90] {
        h.pipeline.push_sample(right_wrist_at(x));
    }

    assert!(matches!(h.pipeline.flush_now(), FlushOutcome::Sent { frames: 6, .. }));
    settle().await;
    assert_eq!(peer.drain().len(), 1);
}

#[tokio::test]
async fn test_first_frame_sent_immediately() {
    let h = Harness::new(true, &[A]).await;
    let mut peer = h.peer(A);
    let mut events = h.pipeline.subscribe_events();

    let session = h.pipeline.start_capture();
    assert_eq!(
        h.pipeline.push_sample(right_hand_at(0.2)),
        PushOutcome::FirstOfSession
    );
    assert_eq!(h.pipeline.push_sample(right_hand_at(0.2)), PushOutcome::Appended);

    assert_eq!(
        events.try_recv().unwrap(),
        CaptureEvent::FirstFrameSent {
            session: Some(session),
            delivered: true
        }
    );

    settle().await;
    let messages = decode(&peer.drain());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "landmarks");
    assert!(messages[0]["timestamp"].as_i64().unwrap() > 0);

    // The first frame also stays in the window
    assert_eq!(h.pipeline.buffer().pending(), 2);
}

#[tokio::test]
async fn test_new_session_resends_first_frame() {
    let h = Harness::new(true, &[A]).await;
    let mut peer = h.peer(A);

    let first = h.pipeline.start_capture();
    h.pipeline.push_sample(right_hand_at(0.2));
    h.pipeline.stop_capture();

    let second = h.pipeline.start_capture();
    assert_ne!(first, second);
    assert_eq!(
        h.pipeline.push_sample(right_hand_at(0.2)),
        PushOutcome::FirstOfSession
    );

    settle().await;
    let messages = decode(&peer.drain());
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m["type"] == "landmarks"));
}

#[tokio::test]
async fn test_window_targets_one_connection() {
    let h = Harness::new(false, &[A, B]).await;
    let mut peer_a = h.peer(A);
    let mut peer_b = h.peer(B);

    let b = h.registry.lookup_by_address(B).unwrap();
    h.pipeline.transmitter().set_target(b.id.clone());
    assert_eq!(h.pipeline.transmitter().target(), Some(b.id));

    h.pipeline.start_capture();
    h.pipeline.push_sample(right_hand_at(0.3));
    h.pipeline.flush_now();
    settle().await;

    assert!(peer_a.drain().is_empty());
    assert_eq!(peer_b.drain().len(), 1);

    // Back to broadcast
    h.pipeline.transmitter().clear_target();
    h.pipeline.push_sample(right_hand_at(0.3));
    h.pipeline.flush_now();
    settle().await;

    assert_eq!(peer_a.drain().len(), 1);
    assert_eq!(peer_b.drain().len(), 1);
}

#[tokio::test]
async fn test_window_without_connections_is_discarded() {
    let h = Harness::new(false, &[]).await;

    h.pipeline.start_capture();
    h.pipeline.push_sample(right_hand_at(0.3));
    assert_eq!(
        h.pipeline.flush_now(),
        FlushOutcome::Sent {
            frames: 1,
            delivered: false
        }
    );
    assert_eq!(h.pipeline.buffer().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cadence_flushes_periodically() {
    let h = Harness::new(false, &[A]).await;
    let mut peer = h.peer(A);

    assert!(h.pipeline.start());
    assert!(!h.pipeline.start());
    h.pipeline.start_capture();

    for i in 0..5 {
        h.pipeline.push_sample(right_hand_at(0.10 + 0.03 * i as f32));
    }

    // Nothing leaves before the first period elapses
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(peer.drain().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    let messages = decode(&peer.drain());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["data"]["frame_count"], 5);

    // Empty periods send nothing
    tokio::time::sleep(Duration::from_millis(1000)).await;
    settle().await;
    assert!(peer.drain().is_empty());

    h.pipeline.stop();
    assert!(!h.pipeline.is_running());
}

#[tokio::test]
async fn test_stop_discards_pending() {
    let h = Harness::new(false, &[A]).await;
    let mut peer = h.peer(A);

    h.pipeline.start();
    h.pipeline.start_capture();
    h.pipeline.push_sample(right_hand_at(0.3));
    h.pipeline.stop();

    assert!(!h.pipeline.buffer().is_capturing());
    assert_eq!(h.pipeline.buffer().pending(), 0);
    assert_eq!(h.pipeline.flush_now(), FlushOutcome::Empty);
    settle().await;
    assert!(peer.drain().is_empty());
}
