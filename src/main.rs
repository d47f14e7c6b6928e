use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

use indicatif::ProgressStyle;
use tracing::{error, info, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use flow_avoidance::command::Command;
use flow_avoidance::config::TrackerConfig;
use flow_avoidance::dataset::*;
use flow_avoidance::preprocess::{downscale_color, preprocess};
use flow_avoidance::record::{write_record, TrackRecord};
use flow_avoidance::synthetic::SyntheticSequence;
use flow_avoidance::tracker::Tracker;
use flow_avoidance::visualization::{save_frame, visualize_tracked_points};

#[derive(Parser)]
#[clap(about = "Track sparse features through a sequence of frames")]
pub struct Args {
    /// Folder with a data.jsonl recording, a synthetic sequence is used without it
    #[clap(short, long)]
    pub input_folder: Option<String>,

    /// JSON file with tracking parameters, replaces the tracking flags
    #[clap(long)]
    pub config_file: Option<PathBuf>,

    /// Write the tracked points of every frame as JSON lines
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Save every frame with its tracked points drawn on it
    #[clap(long)]
    pub annotate_dir: Option<PathBuf>,

    #[clap(long, default_value = "120")]
    pub synthetic_frames: usize,

    #[clap(long, default_value = "640")]
    pub synthetic_width: usize,

    #[clap(long, default_value = "480")]
    pub synthetic_height: usize,

    /// Horizontal motion of the synthetic sequence, in pixels per frame
    #[clap(long, default_value = "4", allow_hyphen_values = true)]
    pub synthetic_vx: i32,

    #[clap(long, default_value = "2", allow_hyphen_values = true)]
    pub synthetic_vy: i32,

    #[clap(long, default_value = "0")]
    pub seed: u64,

    #[clap(short, long)]
    pub verbose: bool,

    #[clap(flatten)]
    pub config: TrackerConfig,
}

/// Failures that end the run, each with its own exit code
#[derive(Error, Debug)]
enum RunError {
    #[error("{0:#}")]
    Usage(anyhow::Error),
    #[error("could not open the frame source: {0:#}")]
    OpenSource(anyhow::Error),
    #[error("could not get a frame: {0:#}")]
    Frame(anyhow::Error),
    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl RunError {
    fn exit_code(&self) -> u8 {
        match self {
            RunError::Usage(_) => 1,
            RunError::Other(_) => 2,
            RunError::OpenSource(_) => 3,
            RunError::Frame(_) => 4,
        }
    }
}

fn main() -> ExitCode {
    // parse the config
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if let Err(print_err) = err.print() {
                eprintln!("{err}\n({print_err})");
            }
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // setup logging
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stdout_writer())
                .with_filter(level),
        )
        .with(indicatif_layer)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match &args.input_folder {
        Some(folder) => Box::new(Dataset::new(Path::new(folder))?),
        None => {
            info!(
                "no input folder, tracking {} synthetic frames",
                args.synthetic_frames
            );
            Box::new(SyntheticSequence::new(
                args.synthetic_width,
                args.synthetic_height,
                [args.synthetic_vx, args.synthetic_vy],
                args.synthetic_frames,
                args.seed,
            ))
        }
    };
    Ok(source)
}

fn run(args: &Args) -> Result<(), RunError> {
    let config = match &args.config_file {
        Some(path) => TrackerConfig::from_file(path).map_err(RunError::Usage)?,
        None => args.config.clone(),
    };
    config.validate().map_err(RunError::Usage)?;

    let mut source = open_source(args).map_err(RunError::OpenSource)?;

    let mut output = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Could not create {}", path.display()))
                .map_err(RunError::Other)?;
            Some(BufWriter::new(file))
        }
        None => None,
    };
    if let Some(dir) = &args.annotate_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create {}", dir.display()))
            .map_err(RunError::Other)?;
    }

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(source.length());
    let header_span_enter = header_span.enter();

    let mut tracker = Tracker::new(config);
    let mut frame_index = 0;

    while let Some(data) = source.next().map_err(RunError::Frame)? {
        header_span.pb_inc(1);

        let raw = match data.event {
            InputEvent::Frame(raw) => raw,
            InputEvent::Command(Command::Terminate) => {
                info!("terminated at frame {frame_index}");
                break;
            }
            InputEvent::Command(Command::Reinitialize) => {
                tracker.request_reinitialize();
                continue;
            }
        };

        let gray = preprocess(&raw).map_err(|err| RunError::Frame(err.into()))?;
        tracker
            .process(gray)
            .map_err(|err| RunError::Other(err.into()))?;

        if let Some(writer) = output.as_mut() {
            let record = TrackRecord::new(
                frame_index,
                data.time,
                tracker.state(),
                tracker.points(),
                tracker.motion(),
            );
            write_record(writer, &record).map_err(RunError::Other)?;
        }

        if let Some(dir) = &args.annotate_dir {
            let downscaled = downscale_color(&raw).map_err(|err| RunError::Frame(err.into()))?;
            let annotated =
                visualize_tracked_points(&downscaled, tracker.points()).map_err(RunError::Other)?;
            save_frame(&annotated, &dir.join(format!("{frame_index:06}.png")))
                .map_err(RunError::Other)?;
        }

        frame_index += 1;
    }

    if let Some(mut writer) = output {
        writer
            .flush()
            .context("Could not flush the output")
            .map_err(RunError::Other)?;
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    let statistics = tracker.statistics();
    info!(
        "{} frames, {} selections, {} points selected, {} tracked, {} lost",
        statistics.frames,
        statistics.initializations,
        statistics.selected,
        statistics.tracked,
        statistics.lost
    );
    Ok(())
}
