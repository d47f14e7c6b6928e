use std::fs;
use std::path::PathBuf;

use flow_avoidance::command::Command;
use flow_avoidance::config::TrackerConfig;
use flow_avoidance::dataset::{Dataset, FrameSource, InputEvent};
use flow_avoidance::image::ColorImage;
use flow_avoidance::preprocess::preprocess;
use flow_avoidance::synthetic::SyntheticSequence;
use flow_avoidance::tracker::{Tracker, TrackingState};

fn config() -> TrackerConfig {
    TrackerConfig {
        max_feature_count: 120,
        ..TrackerConfig::default()
    }
}

/// Drive the tracker over a source the way the binary does, returning the
/// point count after every frame.
fn run(source: &mut dyn FrameSource, tracker: &mut Tracker) -> Vec<usize> {
    let mut counts = vec![];
    while let Some(data) = source.next().unwrap() {
        match data.event {
            InputEvent::Frame(raw) => {
                let gray = preprocess(&raw).unwrap();
                counts.push(tracker.process(gray).unwrap().len());
            }
            InputEvent::Command(Command::Reinitialize) => tracker.request_reinitialize(),
            InputEvent::Command(Command::Terminate) => break,
        }
    }
    counts
}

#[test]
fn test_synthetic_sequence_is_tracked() {
    // 6 px per frame at full resolution, 3 px after preprocessing
    let mut source = SyntheticSequence::new(200, 160, [6, 0], 6, 3);
    let mut tracker = Tracker::new(config());
    let counts = run(&mut source, &mut tracker);

    assert_eq!(counts.len(), 6);
    assert!(counts[0] > 0);
    // points only get lost, never added, while tracking
    assert!(counts.windows(2).all(|w| w[1] <= w[0]));
    assert!(*counts.last().unwrap() > 0);

    let motion = tracker.motion().unwrap();
    assert!((motion.mean_flow[0] - 3.).abs() < 0.2);
    assert!(motion.mean_flow[1].abs() < 0.2);
    assert_eq!(tracker.state(), TrackingState::Tracking);
    assert_eq!(tracker.statistics().initializations, 1);
    assert_eq!(tracker.statistics().frames, 6);
}

#[test]
fn test_recorded_dataset_with_commands() {
    let folder = std::env::temp_dir().join(format!("flow-avoidance-pipeline-{}", std::process::id()));
    fs::create_dir_all(folder.join("frames")).unwrap();

    let sequence = SyntheticSequence::new(160, 120, [2, 2], 4, 8);
    let mut lines = vec![];
    for i in 0..4 {
        let frame = ColorImage::from_gray(&sequence.frame(i));
        let relative = PathBuf::from("frames").join(format!("{i:06}.png"));
        image::save_buffer(
            folder.join(&relative),
            &frame.to_rgb(),
            frame.width as u32,
            frame.height as u32,
            image::ColorType::Rgb8,
        )
        .unwrap();
        lines.push(format!(
            r#"{{"time": {}, "frame": "{}"}}"#,
            i as f64 / 30.,
            relative.display()
        ));
        if i == 1 {
            lines.push(r#"{"time": 0.04, "command": "reinitialize"}"#.to_string());
        }
        if i == 2 {
            lines.push(r#"{"time": 0.07, "command": "terminate"}"#.to_string());
        }
    }
    fs::write(folder.join("data.jsonl"), lines.join("\n")).unwrap();

    let mut dataset = Dataset::new(&folder).unwrap();
    assert_eq!(dataset.length, 6);
    let mut tracker = Tracker::new(config());
    let counts = run(&mut dataset, &mut tracker);

    // the fourth frame is never reached
    assert_eq!(counts.len(), 3);
    assert!(counts.iter().all(|c| *c > 0));
    assert_eq!(tracker.statistics().initializations, 2);

    fs::remove_dir_all(&folder).unwrap();
}
