use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use log::warn;

use crate::command::Command;
use crate::image::ColorImage;

pub enum InputEvent {
    Frame(ColorImage),
    Command(Command),
}

pub struct InputData {
    pub time: f64,
    pub event: InputEvent,
}

/// Pull based supplier of frames and user commands. `Ok(None)` ends the stream.
pub trait FrameSource {
    /// Number of records, used for progress reporting
    fn length(&self) -> u64;

    fn next(&mut self) -> Result<Option<InputData>>;
}

/// Recorded sequence: a folder with a `data.jsonl` file listing frame images
/// and commands in playback order, e.g.
///
/// ```text
/// {"time": 0.00, "frame": "frames/000000.png"}
/// {"time": 0.03, "command": "reinitialize"}
/// ```
pub struct Dataset {
    folder: PathBuf,
    reader: BufReader<File>,
    line: String,
    pub length: u64,
}

impl Dataset {
    pub fn new(path: &Path) -> Result<Dataset> {
        let data_path = path.join("data.jsonl");
        let file = File::open(&data_path)
            .with_context(|| format!("Could not open {}", data_path.display()))?;
        let length = BufReader::new(File::open(&data_path)?).lines().count() as u64;
        Ok(Dataset {
            folder: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
            length,
        })
    }

    fn load_frame(&self, relative: &str) -> Result<ColorImage> {
        let path = self.folder.join(relative);
        let image = image::open(&path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        Ok(ColorImage::from_rgb(
            width as usize,
            height as usize,
            image.as_raw(),
        ))
    }
}

impl FrameSource for Dataset {
    fn length(&self) -> u64 {
        self.length
    }

    fn next(&mut self) -> Result<Option<InputData>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Err(err) => bail!("Failed to read line {}", err),
                _ => {}
            }
            if self.line.trim().is_empty() {
                continue;
            }

            let value: serde_json::Value = serde_json::from_str(&self.line)
                .context(format!("JSON deserialization failed for line: {}", self.line))?;
            let value = value
                .as_object()
                .ok_or(anyhow!("JSON line is not a map"))?;

            let time = value
                .get("time")
                .and_then(|t| t.as_f64())
                .ok_or(anyhow!("Time is not a number"))?;

            if let Some(frame) = value.get("frame") {
                let relative = frame
                    .as_str()
                    .ok_or(anyhow!("Frame path is not a string"))?;
                return Ok(Some(InputData {
                    time,
                    event: InputEvent::Frame(self.load_frame(relative)?),
                }));
            } else if let Some(command) = value.get("command") {
                let command = command
                    .as_str()
                    .ok_or(anyhow!("Command is not a string"))?;
                match command.parse::<Command>() {
                    Ok(command) => {
                        return Ok(Some(InputData {
                            time,
                            event: InputEvent::Command(command),
                        }))
                    }
                    Err(err) => {
                        warn!("{err}");
                        continue;
                    }
                }
            } else {
                warn!("Unrecognised data format {}", self.line);
                continue;
            }
        }
    }
}
