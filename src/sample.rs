// Motion samples produced by the landmark estimation engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single 3D keypoint in normalized coordinates
///
/// Serialized as a `[x, y, z]` triple on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, other: Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn magnitude(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Point3) -> f32 {
        self.sub(other).magnitude()
    }
}

impl From<[f32; 3]> for Point3 {
    fn from(v: [f32; 3]) -> Self {
        Point3::new(v[0], v[1], v[2])
    }
}

impl From<Point3> for [f32; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Hand keypoint group selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];
}

/// One processed video frame: up to three keypoint groups.
///
/// Absent groups are serialized as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub body: Option<Vec<Point3>>,
    #[serde(default)]
    pub hand_left: Option<Vec<Point3>>,
    #[serde(default)]
    pub hand_right: Option<Vec<Point3>>,
}

impl Sample {
    pub fn hand(&self, hand: Hand) -> Option<&[Point3]> {
        match hand {
            Hand::Left => self.hand_left.as_deref(),
            Hand::Right => self.hand_right.as_deref(),
        }
    }

    /// True when no keypoint group was detected in this frame
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.hand_left.is_none() && self.hand_right.is_none()
    }
}

/// Ordered batch of samples awaiting an admission decision
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<Sample>,
    started_at: DateTime<Utc>,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            started_at: Utc::now(),
        }
    }

    /// Append in arrival order. The window start is reset on the first append
    /// so an idle window does not report a stale start time.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.is_empty() {
            self.started_at = Utc::now();
        }
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}
