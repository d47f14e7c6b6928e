use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::{EmptyTrackPolicy, TrackerConfig};
use crate::detector::Detector;
use crate::error::TrackingError;
use crate::frame::PyramidFrame;
use crate::image::Image;
use crate::motion::MotionSummary;
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// No point set yet, the next frame runs feature selection
    Uninitialized,
    /// A previous frame and point set exist, the next frame is matched
    Tracking,
}

/// Counters over the whole run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackStatistics {
    pub frames: usize,
    /// Feature selections that produced points
    pub initializations: usize,
    pub selected: usize,
    pub tracked: usize,
    pub lost: usize,
}

/// Keep only the points whose mask entry is set, preserving their order.
pub fn compact(points: &[Point], mask: &[bool]) -> PointSet {
    points
        .iter()
        .zip(mask)
        .filter(|(_, valid)| **valid)
        .map(|(point, _)| *point)
        .collect()
}

/// Owns the frame and point buffers between iterations and decides when
/// features are selected anew.
pub struct Tracker {
    config: TrackerConfig,
    detector: Detector,
    optical_flow: OpticalFlow,
    state: TrackingState,
    previous_frame: Option<PyramidFrame>,
    previous_points: PointSet,
    motion: Option<MotionSummary>,
    statistics: TrackStatistics,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            detector: Detector::new(config.detector_config()),
            optical_flow: OpticalFlow::new(config.flow_config()),
            config,
            state: TrackingState::Uninitialized,
            previous_frame: None,
            previous_points: vec![],
            motion: None,
            statistics: TrackStatistics::default(),
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    /// Points of the last processed frame, in preprocessed image coordinates
    pub fn points(&self) -> &[Point] {
        &self.previous_points
    }

    /// Motion measured on the last processed frame, if it was matched
    pub fn motion(&self) -> Option<&MotionSummary> {
        self.motion.as_ref()
    }

    pub fn statistics(&self) -> &TrackStatistics {
        &self.statistics
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Drop the current point set; the next frame selects new features.
    pub fn request_reinitialize(&mut self) {
        if self.state == TrackingState::Tracking {
            info!("reinitializing features to track");
        }
        self.state = TrackingState::Uninitialized;
        self.previous_points.clear();
        self.motion = None;
    }

    /// Run one iteration on a preprocessed frame and return the resulting point
    /// set. On error the tracker keeps the state of the previous iteration.
    #[instrument(skip_all, fields(frame = self.statistics.frames))]
    pub fn process(&mut self, frame: Image) -> Result<&[Point], TrackingError> {
        let current = PyramidFrame::new(frame, self.config.pyramid_levels)?;
        if let (TrackingState::Tracking, Some(previous)) = (self.state, &self.previous_frame) {
            if previous.image.shape() != current.image.shape() {
                return Err(TrackingError::CorrespondenceInputMismatch {
                    previous: previous.image.shape(),
                    current: current.image.shape(),
                });
            }
        }

        let points = match (self.state, &self.previous_frame) {
            (TrackingState::Tracking, Some(previous)) => {
                if self.previous_points.is_empty() {
                    self.motion = None;
                    vec![]
                } else {
                    let (points, mask) =
                        self.optical_flow
                            .estimate(previous, &current, &self.previous_points)?;
                    self.motion = MotionSummary::new(&self.previous_points, &points, &mask);

                    let points = compact(&points, &mask);
                    let lost = self.previous_points.len() - points.len();
                    self.statistics.tracked += points.len();
                    self.statistics.lost += lost;
                    debug!("tracked {} points, lost {}", points.len(), lost);

                    if points.is_empty() {
                        match self.config.empty_track_policy {
                            EmptyTrackPolicy::Reinitialize => {
                                info!("all points lost, selecting new features");
                                self.state = TrackingState::Uninitialized;
                            }
                            EmptyTrackPolicy::Wait => info!("all points lost"),
                        }
                    }
                    points
                }
            }
            _ => {
                self.motion = None;
                let points = self.detector.detect(&current.image);
                if points.is_empty() {
                    debug!("no features to track yet");
                } else {
                    info!("tracking {} new features", points.len());
                    self.state = TrackingState::Tracking;
                    self.statistics.initializations += 1;
                    self.statistics.selected += points.len();
                }
                points
            }
        };

        // rotate buffers, the current frame becomes the previous one
        self.statistics.frames += 1;
        self.previous_frame = Some(current);
        self.previous_points = points;
        Ok(&self.previous_points)
    }
}
