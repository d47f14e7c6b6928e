use crate::error::TrackingError;
use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create an image where every pixel has the same value
    pub fn filled(width: usize, height: usize, value: u8) -> Image {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Check that the image is non-empty and the buffer matches its shape
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.is_empty() || self.data.len() != self.width * self.height {
            return Err(TrackingError::InvalidFrame {
                width: self.width,
                height: self.height,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    /// True if the point lies within the pixel centers of the image
    pub fn contains(&self, point: Vector2d) -> bool {
        !self.is_empty()
            && point.x >= 0.
            && point.y >= 0.
            && point.x <= (self.width - 1) as f64
            && point.y <= (self.height - 1) as f64
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel access replicating the border for coordinates outside the image
    #[inline(always)]
    pub fn value_clamped(&self, x: i32, y: i32) -> u8 {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.data[y as usize * self.width + x as usize]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `patch` so that its top-left corner lands on (x, y). Pixels falling
    /// outside the image are skipped.
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, patch: &Image) {
        for py in 0..patch.height as i32 {
            for px in 0..patch.width as i32 {
                let (tx, ty) = (x + px, y + py);
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.set_value(
                    tx as usize,
                    ty as usize,
                    patch.value(px as usize, py as usize),
                );
            }
        }
    }

    /// Cut a `width` x `height` window with its top-left corner at (x, y).
    /// The border is replicated where the window leaves the image.
    pub fn crop(&self, x: i32, y: i32, width: usize, height: usize) -> Image {
        let mut data = Vec::with_capacity(width * height);
        for cy in 0..height as i32 {
            for cx in 0..width as i32 {
                data.push(self.value_clamped(x + cx, y + cy));
            }
        }
        Image {
            data,
            width,
            height,
        }
    }
}

/// Sample the image at a sub-pixel location with bilinear interpolation.
/// Reads outside the image replicate the border.
pub fn bilinear(image: &Image, point: Vector2d) -> f64 {
    let x0 = point.x.floor();
    let y0 = point.y.floor();
    let ax = point.x - x0;
    let ay = point.y - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);

    let v00 = image.value_clamped(x0, y0) as f64;
    let v10 = image.value_clamped(x0 + 1, y0) as f64;
    let v01 = image.value_clamped(x0, y0 + 1) as f64;
    let v11 = image.value_clamped(x0 + 1, y0 + 1) as f64;

    (1. - ay) * ((1. - ax) * v00 + ax * v10) + ay * ((1. - ax) * v01 + ax * v11)
}

/// Interleaved 3 channel frame in blue, green, red order, as delivered by
/// capture devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl ColorImage {
    pub fn empty() -> ColorImage {
        ColorImage {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Build a frame from tightly packed RGB bytes
    pub fn from_rgb(width: usize, height: usize, rgb: &[u8]) -> ColorImage {
        let mut data = Vec::with_capacity(rgb.len());
        for pixel in rgb.chunks_exact(3) {
            data.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
        }
        ColorImage {
            data,
            width,
            height,
        }
    }

    /// Replicate a grayscale image into all three channels
    pub fn from_gray(image: &Image) -> ColorImage {
        let mut data = Vec::with_capacity(image.data.len() * 3);
        for &v in &image.data {
            data.extend_from_slice(&[v, v, v]);
        }
        ColorImage {
            data,
            width: image.width,
            height: image.height,
        }
    }

    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.width == 0 || self.height == 0 || self.data.len() != self.width * self.height * 3 {
            return Err(TrackingError::InvalidFrame {
                width: self.width,
                height: self.height,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    #[inline(always)]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = 3 * (y * self.width + x);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline(always)]
    pub fn set_pixel(&mut self, x: usize, y: usize, bgr: [u8; 3]) {
        let i = 3 * (y * self.width + x);
        self.data[i..i + 3].copy_from_slice(&bgr);
    }

    /// Pixels back in RGB order, for encoders
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for pixel in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
        }
        rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear() {
        let image = Image {
            data: vec![0, 10, 20, 30],
            width: 2,
            height: 2,
        };
        assert_eq!(bilinear(&image, Vector2d::new(0., 0.)), 0.);
        assert_eq!(bilinear(&image, Vector2d::new(1., 1.)), 30.);
        assert!((bilinear(&image, Vector2d::new(0.5, 0.5)) - 15.).abs() < 1e-12);
        assert!((bilinear(&image, Vector2d::new(0.25, 0.)) - 2.5).abs() < 1e-12);
        // border is replicated
        assert_eq!(bilinear(&image, Vector2d::new(-3., 5.)), 20.);
    }

    #[test]
    fn test_validate() {
        assert!(Image::empty().validate().is_err());
        assert!(Image::filled(3, 2, 7).validate().is_ok());
        let broken = Image {
            data: vec![0; 5],
            width: 3,
            height: 2,
        };
        assert_eq!(
            broken.validate(),
            Err(TrackingError::InvalidFrame {
                width: 3,
                height: 2,
                len: 5
            })
        );
        assert!(ColorImage::empty().validate().is_err());
    }

    #[test]
    fn test_color_channel_order() {
        let frame = ColorImage::from_rgb(1, 1, &[1, 2, 3]);
        assert_eq!(frame.pixel(0, 0), [3, 2, 1]);
        assert_eq!(frame.to_rgb(), vec![1, 2, 3]);
    }

    #[test]
    fn test_crop_replicates_border() {
        let mut image = Image::filled(4, 4, 0);
        image.set_value(0, 0, 9);
        let crop = image.crop(-1, -1, 2, 2);
        assert_eq!(crop.data, vec![9, 9, 9, 9]);
    }
}
