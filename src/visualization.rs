use std::path::Path;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

use crate::image::ColorImage;
use crate::my_types::*;

/// Radius of the disc drawn on every tracked point
pub const MARKER_RADIUS: i32 = 3;

pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub fn color_image_to_rgb(frame: &ColorImage) -> Result<RgbImage> {
    RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.to_rgb())
        .ok_or_else(|| anyhow!("frame buffer does not match {} x {}", frame.width, frame.height))
}

/// Copy of the frame with a filled disc on every tracked point. Discs are
/// clipped at the frame border.
pub fn visualize_tracked_points(frame: &ColorImage, points: &[Point]) -> Result<RgbImage> {
    let mut image = color_image_to_rgb(frame)?;
    for point in points {
        if !point.x.is_finite() || !point.y.is_finite() {
            continue;
        }
        let center = (point.x.round() as i32, point.y.round() as i32);
        draw_filled_circle_mut(&mut image, center, MARKER_RADIUS, MARKER_COLOR);
    }
    Ok(image)
}

/// Encode the image, format picked from the extension
pub fn save_frame(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn gray_frame(width: usize, height: usize, value: u8) -> ColorImage {
        ColorImage::from_gray(&Image::filled(width, height, value))
    }

    #[test]
    fn test_marker_is_a_disc() {
        let frame = gray_frame(20, 20, 50);
        let image = visualize_tracked_points(&frame, &[Vector2d::new(10.2, 9.8)]).unwrap();
        assert_eq!(*image.get_pixel(10, 10), MARKER_COLOR);
        assert_eq!(*image.get_pixel(13, 10), MARKER_COLOR);
        assert_eq!(*image.get_pixel(10, 7), MARKER_COLOR);
        // corners of the bounding square stay untouched
        assert_eq!(*image.get_pixel(13, 13), Rgb([50, 50, 50]));
        assert_eq!(*image.get_pixel(14, 10), Rgb([50, 50, 50]));
        // the input frame is left alone
        assert_eq!(frame.pixel(10, 10), [50, 50, 50]);
    }

    #[test]
    fn test_markers_are_clipped() {
        let frame = gray_frame(8, 6, 0);
        let image = visualize_tracked_points(
            &frame,
            &[
                Vector2d::new(0., 0.),
                Vector2d::new(7.4, 5.9),
                Vector2d::new(-40., 3.),
                Vector2d::new(f64::NAN, 1.),
            ],
        )
        .unwrap();
        assert_eq!(*image.get_pixel(0, 0), MARKER_COLOR);
        assert_eq!(*image.get_pixel(7, 5), MARKER_COLOR);
        assert_eq!(*image.get_pixel(4, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_channel_order() {
        // blue, green, red in, red, green, blue out
        let frame = ColorImage {
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
        };
        assert_eq!(*color_image_to_rgb(&frame).unwrap().get_pixel(0, 0), Rgb([3, 2, 1]));
        let broken = ColorImage {
            data: vec![1, 2],
            width: 1,
            height: 1,
        };
        assert!(color_image_to_rgb(&broken).is_err());
    }

    #[test]
    fn test_save_frame() {
        let dir = std::env::temp_dir().join(format!("flow-avoidance-vis-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.png");

        let frame = ColorImage::from_rgb(2, 1, &[255, 0, 0, 0, 0, 255]);
        save_frame(&color_image_to_rgb(&frame).unwrap(), &path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.as_raw(), &vec![255, 0, 0, 0, 0, 255]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
