//! Frame normalization: color to gray, then a bicubic half-size resample.
//!
//! Every frame goes through the same transform so that consecutive frames
//! share one geometry.

use num_traits::clamp;

use crate::error::TrackingError;
use crate::image::{ColorImage, Image};

/// Scale applied to both dimensions
pub const DOWNSCALE_FACTOR: f64 = 0.5;

/// Free parameter of the Keys cubic convolution kernel
const CUBIC_A: f64 = -0.75;

/// Convert a raw frame into the grayscale, half resolution image the tracker
/// works on.
pub fn preprocess(raw: &ColorImage) -> Result<Image, TrackingError> {
    raw.validate()?;
    let gray = to_gray(raw);
    Ok(resize_bicubic(&gray, DOWNSCALE_FACTOR))
}

/// Half resolution color frame matching the coordinates of [`preprocess`],
/// for drawing overlays.
pub fn downscale_color(raw: &ColorImage) -> Result<ColorImage, TrackingError> {
    raw.validate()?;
    let mut channels = [Image::empty(), Image::empty(), Image::empty()];
    for (c, channel) in channels.iter_mut().enumerate() {
        *channel = Image {
            data: raw.data.iter().skip(c).step_by(3).copied().collect(),
            width: raw.width,
            height: raw.height,
        };
        *channel = resize_bicubic(channel, DOWNSCALE_FACTOR);
    }

    let (width, height) = channels[0].shape();
    let mut out = ColorImage {
        data: vec![0; width * height * 3],
        width,
        height,
    };
    for y in 0..height {
        for x in 0..width {
            out.set_pixel(
                x,
                y,
                [
                    channels[0].value(x, y),
                    channels[1].value(x, y),
                    channels[2].value(x, y),
                ],
            );
        }
    }
    Ok(out)
}

/// ITU-R BT.601 luma
pub fn to_gray(raw: &ColorImage) -> Image {
    let data = raw
        .data
        .chunks_exact(3)
        .map(|bgr| {
            let luma = 0.114 * bgr[0] as f64 + 0.587 * bgr[1] as f64 + 0.299 * bgr[2] as f64;
            clamp(luma.round(), 0., 255.) as u8
        })
        .collect();
    Image {
        data,
        width: raw.width,
        height: raw.height,
    }
}

/// Output dimension for a scale factor, at least one pixel
fn scaled_size(size: usize, scale: f64) -> usize {
    usize::max(1, (size as f64 * scale).round() as usize)
}

/// Kernel weights for the four taps around a sample with fractional offset `t`
fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let near = |x: f64| ((a + 2.) * x - (a + 3.)) * x * x + 1.;
    let far = |x: f64| ((a * x - 5. * a) * x + 8. * a) * x - 4. * a;
    let w0 = far(t + 1.);
    let w1 = near(t);
    let w2 = near(1. - t);
    [w0, w1, w2, 1. - w0 - w1 - w2]
}

/// Taps and weights along one axis for every output coordinate
fn axis_taps(src: usize, dst: usize) -> Vec<(i32, [f64; 4])> {
    let ratio = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let s = (d as f64 + 0.5) * ratio - 0.5;
            let base = s.floor();
            (base as i32 - 1, cubic_weights(s - base))
        })
        .collect()
}

/// Separable bicubic resampling. Reads outside the image replicate the border.
pub fn resize_bicubic(image: &Image, scale: f64) -> Image {
    let width = scaled_size(image.width, scale);
    let height = scaled_size(image.height, scale);
    let x_taps = axis_taps(image.width, width);
    let y_taps = axis_taps(image.height, height);

    // horizontal pass keeps full precision
    let mut rows = vec![0f64; width * image.height];
    for y in 0..image.height as i32 {
        for (x, (x0, wx)) in x_taps.iter().enumerate() {
            let mut acc = 0.;
            for (k, w) in wx.iter().enumerate() {
                acc += w * image.value_clamped(x0 + k as i32, y) as f64;
            }
            rows[y as usize * width + x] = acc;
        }
    }

    let row = |x: usize, y: i32| rows[y.clamp(0, image.height as i32 - 1) as usize * width + x];
    let mut data = Vec::with_capacity(width * height);
    for (y0, wy) in y_taps.iter() {
        for x in 0..width {
            let mut acc = 0.;
            for (k, w) in wy.iter().enumerate() {
                acc += w * row(x, y0 + k as i32);
            }
            data.push(clamp(acc.round(), 0., 255.) as u8);
        }
    }

    Image {
        data,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::textured_image;

    #[test]
    fn test_empty_frame_is_invalid() {
        let err = preprocess(&ColorImage::empty()).unwrap_err();
        assert_eq!(
            err,
            TrackingError::InvalidFrame {
                width: 0,
                height: 0,
                len: 0
            }
        );
    }

    #[test]
    fn test_truncated_frame_is_invalid() {
        let frame = ColorImage {
            data: vec![0; 10],
            width: 4,
            height: 4,
        };
        assert!(matches!(
            preprocess(&frame),
            Err(TrackingError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_output_shape() {
        let frame = ColorImage::from_gray(&Image::filled(640, 480, 0));
        let image = preprocess(&frame).unwrap();
        assert_eq!(image.shape(), (320, 240));

        let frame = ColorImage::from_gray(&Image::filled(1, 1, 0));
        assert_eq!(preprocess(&frame).unwrap().shape(), (1, 1));
    }

    #[test]
    fn test_gray_weights() {
        let frame = ColorImage::from_rgb(3, 1, &[255, 0, 0, 0, 255, 0, 0, 0, 255]);
        let gray = to_gray(&frame);
        assert_eq!(gray.data, vec![76, 150, 29]);
    }

    #[test]
    fn test_cubic_weights_sum_to_one() {
        for t in [0., 0.25, 0.5, 0.9] {
            let w = cubic_weights(t);
            assert!((w.iter().sum::<f64>() - 1.).abs() < 1e-12);
        }
        assert_eq!(cubic_weights(0.), [0., 1., 0., 0.]);
    }

    #[test]
    fn test_constant_frame_stays_constant() {
        let frame = ColorImage::from_gray(&Image::filled(30, 20, 117));
        let image = preprocess(&frame).unwrap();
        assert!(image.data.iter().all(|&v| v == 117));
    }

    #[test]
    fn test_idempotent_on_identical_input() {
        let frame = ColorImage::from_gray(&textured_image(64, 48, 7));
        let first = preprocess(&frame).unwrap();
        let second = preprocess(&frame.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_color_overlay_matches_gray_geometry() {
        let frame = ColorImage::from_gray(&textured_image(40, 30, 3));
        let color = downscale_color(&frame).unwrap();
        let gray = preprocess(&frame).unwrap();
        assert_eq!((color.width, color.height), gray.shape());
        // gray replicated into all channels resamples to the same values
        for y in 0..gray.height {
            for x in 0..gray.width {
                let [b, g, r] = color.pixel(x, y);
                assert_eq!(b, gray.value(x, y));
                assert_eq!(g, b);
                assert_eq!(r, b);
            }
        }
    }
}
