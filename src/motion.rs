use serde::Serialize;

use crate::my_types::*;

/// Displacements below this many pixels count as no motion
const STATIC_DISPLACEMENT: f64 = 1.;

/// Apparent motion between two frames, over the points that were matched.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MotionSummary {
    /// Number of valid correspondences
    pub count: usize,
    /// Mean displacement in pixels
    pub mean_flow: [f64; 2],
    /// Largest single displacement in pixels
    pub max_displacement: f64,
}

impl MotionSummary {
    /// Summarize the valid pairs of `points0` and `points1`. None when no
    /// point was matched.
    pub fn new(points0: &[Point], points1: &[Point], mask: &[bool]) -> Option<Self> {
        let mut count = 0;
        let mut sum = Vector2d::zeros();
        let mut max_displacement2: f64 = 0.;
        for ((p0, p1), valid) in points0.iter().zip(points1).zip(mask) {
            if !valid {
                continue;
            }
            let flow = p1 - p0;
            sum += flow;
            max_displacement2 = max_displacement2.max(flow.norm_squared());
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        Some(Self {
            count,
            mean_flow: [mean.x, mean.y],
            max_displacement: max_displacement2.sqrt(),
        })
    }

    /// True if no tracked point moved noticeably
    pub fn is_static(&self) -> bool {
        self.max_displacement <= STATIC_DISPLACEMENT
    }
}
