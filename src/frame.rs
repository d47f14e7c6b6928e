use crate::error::TrackingError;
use crate::image::Image;
use crate::pyramid::Pyramid;

/// A preprocessed frame together with the coarse levels used for matching.
#[derive(Debug)]
pub struct PyramidFrame {
    /// preprocessed image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn new(image: Image, level_count: usize) -> Result<PyramidFrame, TrackingError> {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, level_count)?;
        Ok(PyramidFrame { image, pyramid })
    }

    /// Number of levels including the full resolution image
    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len() + 1
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }
}
