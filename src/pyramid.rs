use crate::error::TrackingError;
use crate::image::Image;

/// Coarse levels of an image, each half the size of the previous one. The
/// full resolution image itself is not stored here.
#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
}

impl Pyramid {
    pub fn empty() -> Self {
        Self { levels: vec![] }
    }

    pub fn compute(&mut self, frame: &Image, level_count: usize) -> Result<(), TrackingError> {
        frame.validate()?;
        self.compute_levels(frame, level_count);
        Ok(())
    }

    fn compute_levels(&mut self, frame: &Image, level_count: usize) {
        self.levels.truncate(level_count);
        while self.levels.len() < level_count {
            self.levels.push(Image::empty())
        }
        if level_count == 0 {
            return;
        }
        downscale(frame, &mut self.levels[0]);
        for i in 0..(level_count - 1) {
            let rest = &mut self.levels[i..];
            if let Some((parent, rest)) = rest.split_first_mut() {
                downscale(parent, &mut rest[0]);
            }
        }
    }
}

/// downscale the parent image and store the result in child. Odd sizes round up.
fn downscale(parent: &Image, child: &mut Image) {
    let w = parent.width as i32;
    let h = parent.height as i32;

    let w_half = (w + 1) / 2;
    let h_half = (h + 1) / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;

    // replicate the border
    let v = |x: i32, y: i32| -> u16 { parent.value_clamped(x, y) as u16 };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            let value = (4 * v(x2, y2)
                + 2 * (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1))
                + (v(x2 + 1, y2 + 1) + v(x2 - 1, y2 - 1) + v(x2 - 1, y2 + 1) + v(x2 + 1, y2 - 1))
                + 8)
                / 16;
            child.data.push(value as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_sizes() {
        let image = Image::filled(101, 60, 50);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 3).unwrap();
        let sizes: Vec<_> = pyramid.levels.iter().map(|l| l.shape()).collect();
        assert_eq!(sizes, vec![(51, 30), (26, 15), (13, 8)]);
    }

    #[test]
    fn test_constant_image_stays_constant() {
        let image = Image::filled(16, 16, 200);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 2).unwrap();
        for level in &pyramid.levels {
            assert!(level.data.iter().all(|&v| v == 200));
        }
    }

    #[test]
    fn test_recompute_with_fewer_levels() {
        let image = Image::filled(16, 16, 1);
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 3).unwrap();
        pyramid.compute(&image, 1).unwrap();
        assert_eq!(pyramid.levels.len(), 1);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let mut pyramid = Pyramid::empty();
        assert!(pyramid.compute(&Image::empty(), 3).is_err());
    }
}
