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

// Capture pipeline
//
// estimation engine -> SampleBuffer -> (cadence) -> admission -> transmitter

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionDecision, AdmissionPolicy, FlushPolicy};
use crate::buffer::{PushOutcome, SampleBuffer};
use crate::sample::Sample;
use crate::transmit::WindowTransmitter;

const EVENT_CAPACITY: usize = 64;

/// Signals raised by the pipeline for the caller to surface
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// First frame of a session sent on the low-latency path
    FirstFrameSent { session: Option<Uuid>, delivered: bool },
    /// An admitted window was transmitted
    WindowSent {
        session: Option<Uuid>,
        frames: usize,
        delivered: bool,
    },
    /// The window moved too fast and was discarded
    SlowDown { session: Option<Uuid>, frames: usize },
}

/// What a single flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Sent { frames: usize, delivered: bool },
    Rejected { frames: usize },
}

pub struct CapturePipeline {
    buffer: Arc<SampleBuffer>,
    admission: Arc<dyn AdmissionPolicy>,
    flush: Arc<dyn FlushPolicy>,
    transmitter: Arc<WindowTransmitter>,
    send_first_frame: bool,
    events: broadcast::Sender<CaptureEvent>,
    cadence: Mutex<Option<CancellationToken>>,
}

impl CapturePipeline {
    pub fn new(
        admission: Arc<dyn AdmissionPolicy>,
        flush: Arc<dyn FlushPolicy>,
        transmitter: Arc<WindowTransmitter>,
        send_first_frame: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            buffer: Arc::new(SampleBuffer::new()),
            admission,
            flush,
            transmitter,
            send_first_frame,
            events,
            cadence: Mutex::new(None),
        }
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn transmitter(&self) -> &Arc<WindowTransmitter> {
        &self.transmitter
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    pub fn start_capture(&self) -> Uuid {
        self.buffer.start_capture()
    }

    pub fn stop_capture(&self) {
        self.buffer.stop_capture()
    }

    /// Entry point for the estimation engine, called once per frame
    pub fn push_sample(&self, sample: Sample) -> PushOutcome {
        let live = if self.send_first_frame {
            Some(sample.clone())
        } else {
            None
        };

        let outcome = self.buffer.push_sample(sample);
        if outcome == PushOutcome::FirstOfSession {
            if let Some(frame) = live {
                let delivered = self.transmitter.send_frame(frame);
                debug!("First frame of session sent (delivered={})", delivered);
                self.emit(CaptureEvent::FirstFrameSent {
                    session: self.buffer.session_id(),
                    delivered,
                });
            }
        }
        outcome
    }

    /// Evaluate and clear the current window
    pub fn flush_now(&self) -> FlushOutcome {
        let window = self.buffer.take_window();
        if !self.flush.should_evaluate(&window) {
            return FlushOutcome::Empty;
        }

        let frames = window.frame_count();
        let session = self.buffer.session_id();

        match self.admission.evaluate(&window) {
            AdmissionDecision::Accept => {
                let delivered = self.transmitter.send_window(window);
                debug!("Window of {} frames sent (delivered={})", frames, delivered);
                self.emit(CaptureEvent::WindowSent {
                    session,
                    frames,
                    delivered,
                });
                FlushOutcome::Sent { frames, delivered }
            }
            AdmissionDecision::Reject { acceleration, .. } => {
                warn!(
                    "Window of {} frames rejected (acceleration {:.3}), asking user to slow down",
                    frames, acceleration
                );
                self.emit(CaptureEvent::SlowDown { session, frames });
                FlushOutcome::Rejected { frames }
            }
        }
    }

    /// Start the flush cadence. Returns false if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.cadence.lock();
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        *slot = Some(cancel.clone());

        let pipeline = Arc::clone(self);
        let interval = self.flush.interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pipeline.flush_now();
                    }
                    _ = cancel.cancelled() => {
                        debug!("Flush cadence shutting down");
                        break;
                    }
                }
            }
        });

        info!("Capture pipeline started (flush every {:?})", interval);
        true
    }

    /// Stop the cadence and discard whatever is pending
    pub fn stop(&self) {
        if let Some(cancel) = self.cadence.lock().take() {
            cancel.cancel();
            info!("Capture pipeline stopped");
        }
        self.buffer.stop_capture();
        self.buffer.clear();
    }

    pub fn is_running(&self) -> bool {
        self.cadence.lock().is_some()
    }

    fn emit(&self, event: CaptureEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}
