use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::motion::MotionSummary;
use crate::my_types::*;
use crate::tracker::TrackingState;

/// One line of the tracking output, written after every processed frame.
/// Coordinates are in the preprocessed (half resolution) frame.
#[derive(Debug, Serialize)]
pub struct TrackRecord {
    pub frame: usize,
    pub time: f64,
    pub state: TrackingState,
    pub points: Vec<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionSummary>,
}

impl TrackRecord {
    pub fn new(
        frame: usize,
        time: f64,
        state: TrackingState,
        points: &[Point],
        motion: Option<&MotionSummary>,
    ) -> Self {
        Self {
            frame,
            time,
            state,
            points: points.iter().map(|p| [p.x, p.y]).collect(),
            motion: motion.copied(),
        }
    }
}

/// Serialize the record as a single JSON line
pub fn write_record<W: Write>(writer: &mut W, record: &TrackRecord) -> Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_line() {
        let mut out = vec![];
        let points = vec![Vector2d::new(1.5, 2.), Vector2d::new(3., 4.25)];
        let record = TrackRecord::new(0, 0., TrackingState::Tracking, &points, None);
        write_record(&mut out, &record).unwrap();
        let motion = MotionSummary::new(&points, &points, &[true, true]);
        let record = TrackRecord::new(1, 0.5, TrackingState::Tracking, &points, motion.as_ref());
        write_record(&mut out, &record).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["state"], "tracking");
        assert_eq!(first["points"][1][1], 4.25);
        assert!(first.get("motion").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["frame"], 1);
        assert_eq!(second["motion"]["count"], 2);
    }
}
