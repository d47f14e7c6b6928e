use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::dataset::{FrameSource, InputData, InputEvent};
use crate::image::{ColorImage, Image};

/// Lattice spacings of the two value noise octaves, in pixels
const OCTAVES: [(usize, f64); 2] = [(6, 0.65), (3, 0.35)];

/// Deterministic smooth random texture with corners at a scale of a few
/// pixels. Same seed and size give the same image.
pub fn textured_image(width: usize, height: usize, seed: u64) -> Image {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut values = vec![0f64; width * height];

    for (spacing, amplitude) in OCTAVES {
        let lw = width / spacing + 2;
        let lh = height / spacing + 2;
        let lattice: Vec<f64> = (0..lw * lh).map(|_| rng.gen::<f64>()).collect();
        let smooth = |t: f64| t * t * (3. - 2. * t);

        for y in 0..height {
            let gy = y / spacing;
            let ty = smooth((y % spacing) as f64 / spacing as f64);
            for x in 0..width {
                let gx = x / spacing;
                let tx = smooth((x % spacing) as f64 / spacing as f64);
                let l = |i: usize, j: usize| lattice[j * lw + i];
                let top = (1. - tx) * l(gx, gy) + tx * l(gx + 1, gy);
                let bottom = (1. - tx) * l(gx, gy + 1) + tx * l(gx + 1, gy + 1);
                values[y * width + x] += amplitude * ((1. - ty) * top + ty * bottom);
            }
        }
    }

    Image {
        data: values.iter().map(|v| (v * 255.).round() as u8).collect(),
        width,
        height,
    }
}

/// Frames cut from one large texture that slides by a fixed velocity every
/// frame, for running the pipeline without recorded data.
pub struct SyntheticSequence {
    canvas: Image,
    margin: i32,
    width: usize,
    height: usize,
    /// pixels per frame at full resolution
    velocity: [i32; 2],
    frame_count: usize,
    frame_rate: f64,
    index: usize,
}

impl SyntheticSequence {
    pub fn new(
        width: usize,
        height: usize,
        velocity: [i32; 2],
        frame_count: usize,
        seed: u64,
    ) -> Self {
        let travel = velocity[0].abs().max(velocity[1].abs()) as usize * frame_count;
        let margin = travel.min(2 * width.max(height));
        let canvas = textured_image(width + 2 * margin, height + 2 * margin, seed);
        Self {
            canvas,
            margin: margin as i32,
            width,
            height,
            velocity,
            frame_count,
            frame_rate: 30.,
            index: 0,
        }
    }

    /// Gray frame number `index`; content moves by `velocity` per frame
    pub fn frame(&self, index: usize) -> Image {
        let k = index as i32;
        self.canvas.crop(
            self.margin - k * self.velocity[0],
            self.margin - k * self.velocity[1],
            self.width,
            self.height,
        )
    }
}

impl FrameSource for SyntheticSequence {
    fn length(&self) -> u64 {
        self.frame_count as u64
    }

    fn next(&mut self) -> Result<Option<InputData>> {
        if self.index >= self.frame_count {
            return Ok(None);
        }
        let frame = ColorImage::from_gray(&self.frame(self.index));
        let time = self.index as f64 / self.frame_rate;
        self.index += 1;
        Ok(Some(InputData {
            time,
            event: InputEvent::Frame(frame),
        }))
    }
}
