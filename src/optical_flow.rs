use nalgebra as na;
use tracing::{debug, instrument};

use crate::detector::TerminationCriteria;
use crate::error::TrackingError;
use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

/// Scharr responses are normalized to gray levels per pixel. The customary
/// minimum eigenvalue threshold is expressed for a 32x larger derivative over
/// a 2^20 fixed point scale.
const EIGEN_SCALE: f64 = 1. / 1024.;

/// Two consecutive updates cancelling each other within this bound are
/// treated as an oscillation around the optimum.
const OSCILLATION_TOLERANCE: f64 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct FlowConfig {
    /// Side of the square matching window in pixels
    pub search_window: usize,
    /// Coarse levels used on top of the full image
    pub pyramid_levels: usize,
    pub criteria: TerminationCriteria,
    /// Smallest acceptable eigenvalue of the window's gradient matrix, divided
    /// by the window area
    pub min_eigen_threshold: f64,
    /// Largest acceptable mean absolute intensity difference between the
    /// matched windows, in gray levels
    pub max_residual: f64,
    /// Largest acceptable residual relative to the mean absolute deviation
    /// of the previous window
    pub max_relative_residual: f64,
}

/// Pyramidal Lucas-Kanade matcher.
pub struct OpticalFlow {
    config: FlowConfig,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new(config: FlowConfig) -> OpticalFlow {
        let n = window_side(&config);
        OpticalFlow {
            config,
            ix: na::DMatrix::zeros(n, n),
            iy: na::DMatrix::zeros(n, n),
            it: na::DMatrix::zeros(n, n),
            grid: na::DMatrix::zeros(n + 2, n + 2),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Match every point of `points0` from `pyramid_frame0` into
    /// `pyramid_frame1`. The returned points and mask have the same length
    /// and order as the input; lost points are flagged, never dropped.
    #[instrument(skip_all, fields(points = points0.len()))]
    pub fn estimate(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        points0: &[Point],
    ) -> Result<(PointSet, ValidityMask), TrackingError> {
        pyramid_frame0.image.validate()?;
        pyramid_frame1.image.validate()?;
        if pyramid_frame0.image.shape() != pyramid_frame1.image.shape() {
            return Err(TrackingError::CorrespondenceInputMismatch {
                previous: pyramid_frame0.image.shape(),
                current: pyramid_frame1.image.shape(),
            });
        }

        let mut points1 = Vec::with_capacity(points0.len());
        let mut mask = Vec::with_capacity(points0.len());
        for point0 in points0 {
            let (point1, valid) = self.process_feature(pyramid_frame0, pyramid_frame1, *point0);
            points1.push(point1);
            mask.push(valid);
        }
        debug!(
            "{} of {} points matched",
            mask.iter().filter(|v| **v).count(),
            mask.len()
        );
        Ok((points1, mask))
    }

    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    fn process_feature(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Point,
    ) -> (Point, bool) {
        let base = &pyramid_frame0.image;
        if !point0.x.is_finite() || !point0.y.is_finite() || !base.contains(point0) {
            return (point0, false);
        }

        let r = window_side(&self.config) / 2;
        let lk_term2 = self.config.criteria.epsilon.powi(2);
        let area = ((2 * r + 1) * (2 * r + 1)) as f64;
        let top = usize::min(
            self.config.pyramid_levels,
            usize::min(pyramid_frame0.level_count(), pyramid_frame1.level_count()) - 1,
        );

        // displacement in pixels of the current level
        let mut d = Vector2d::zeros();
        let mut valid = true;
        for level in (0..top + 1).rev() {
            if level < top {
                d *= 2.;
            }
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / 2f64.powi(level as i32);

            fill_grid(level0, u, r + 1, &mut self.grid);
            scharr(&self.grid, &mut self.ix, &mut self.iy);
            mask_outside(level0, u, r, &mut self.ix);
            mask_outside(level0, u, r, &mut self.iy);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            let inv_gradient = match gradient.try_inverse() {
                Some(inv) => inv,
                // no texture at this scale, keep the coarser estimate
                None => {
                    if level == 0 {
                        valid = false;
                    }
                    continue;
                }
            };
            // coarse levels carry the large motions, only the final level
            // has to be well conditioned
            if level == 0 {
                let min_eig = gradient.symmetric_eigenvalues().min() / area * EIGEN_SCALE;
                if min_eig < self.config.min_eigen_threshold {
                    valid = false;
                    continue;
                }
            }

            let d_start = d;
            let mut converged = false;
            let mut previous_eta = Vector2d::zeros();
            for iteration in 0..self.config.criteria.max_iterations {
                let center = u + d;
                if !within_reach(level1, center, r) {
                    break;
                }
                image_difference(r, &self.grid, &mut self.it, level1, center);
                let eta = flow_vector(&inv_gradient, &self.ix, &self.iy, &self.it);
                d += eta;
                if eta.norm_squared() <= lk_term2 {
                    converged = true;
                    break;
                }
                if iteration > 0
                    && (eta.x + previous_eta.x).abs() < OSCILLATION_TOLERANCE
                    && (eta.y + previous_eta.y).abs() < OSCILLATION_TOLERANCE
                {
                    d -= 0.5 * eta;
                    converged = true;
                    break;
                }
                previous_eta = eta;
            }

            if !converged {
                if level == 0 {
                    valid = false;
                } else {
                    // a diverging coarse level must not spoil the finer ones
                    d = d_start;
                }
            }
        }

        let point1 = point0 + d;
        if !valid || !base.contains(point1) {
            return (point1, false);
        }
        let valid = match window_residual(base, &pyramid_frame1.image, point0, point1, r) {
            Some((residual, deviation)) => {
                residual <= self.config.max_residual
                    && residual <= self.config.max_relative_residual * deviation
            }
            None => false,
        };
        (point1, valid)
    }
}

/// Convenience wrapper building the pyramids of two plain images.
pub fn estimate_correspondence(
    image0: &Image,
    image1: &Image,
    points0: &[Point],
    config: &FlowConfig,
) -> Result<(PointSet, ValidityMask), TrackingError> {
    let pyramid_frame0 = PyramidFrame::new(image0.clone(), config.pyramid_levels)?;
    let pyramid_frame1 = PyramidFrame::new(image1.clone(), config.pyramid_levels)?;
    OpticalFlow::new(config.clone()).estimate(&pyramid_frame0, &pyramid_frame1, points0)
}

/// Odd window side, at least 3
fn window_side(config: &FlowConfig) -> usize {
    usize::max(config.search_window / 2, 1) * 2 + 1
}

/// The window around `center` still overlaps the image
fn within_reach(level: &Image, center: Vector2d, r: usize) -> bool {
    let r = r as f64;
    center.x >= -r
        && center.y >= -r
        && center.x <= (level.width - 1) as f64 + r
        && center.y <= (level.height - 1) as f64 + r
}

fn flow_vector(inv_gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Vector2d {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    inv_gradient * b
}

/// `it` = previous window (inner part of `grid0`) minus the window of `level`
/// around `center`. Samples outside `level` are zeroed.
fn image_difference(r: usize, grid0: &Matrixd, it: &mut Matrixd, level: &Image, center: Vector2d) {
    fill_grid(level, center, r, it);
    *it *= -1.;
    *it += grid0.view((1, 1), (it.nrows(), it.ncols()));
    mask_outside(level, center, r, it);
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    assert_eq!(ix.nrows(), iy.nrows());
    assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// Derivatives of the inner part of `grid`, which carries a one pixel ring.
/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(grid: &Matrixd, out_x: &mut Matrixd, out_y: &mut Matrixd) {
    let (rows, cols) = (grid.nrows() - 2, grid.ncols() - 2);
    if out_x.shape() != (rows, cols) {
        *out_x = Matrixd::zeros(rows, cols);
        *out_y = Matrixd::zeros(rows, cols);
    }
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

/// Sample the `(2r + 1)^2` window around `center`, replicating the border.
fn fill_grid(level: &Image, center: Vector2d, r: usize, grid: &mut Matrixd) {
    let n = 2 * r + 1;
    if grid.shape() != (n, n) {
        *grid = na::DMatrix::zeros(n, n);
    }

    let r = r as i32;
    for (y_ind, y) in (-r..=r).enumerate() {
        for (x_ind, x) in (-r..=r).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Zero the entries of the `(2r + 1)^2` window around `center` whose sample
/// falls outside `level`. Replicated border pixels do not move with the
/// scene and would pull the estimate towards zero motion.
fn mask_outside(level: &Image, center: Vector2d, r: usize, window: &mut Matrixd) {
    let r = r as i32;
    for (y_ind, y) in (-r..=r).enumerate() {
        for (x_ind, x) in (-r..=r).enumerate() {
            if !level.contains(center + Vector2d::new(x as f64, y as f64)) {
                window[(y_ind, x_ind)] = 0.;
            }
        }
    }
}

/// Mean absolute difference between the window around `point0` in `image0`
/// and the window around `point1` in `image1`, together with the mean
/// absolute deviation of the first window. Only offsets where both samples
/// lie inside their frames count. None if there is no such offset.
fn window_residual(
    image0: &Image,
    image1: &Image,
    point0: Point,
    point1: Point,
    r: usize,
) -> Option<(f64, f64)> {
    let r = r as i32;
    let mut samples = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for y in -r..=r {
        for x in -r..=r {
            let offset = Vector2d::new(x as f64, y as f64);
            let (p0, p1) = (point0 + offset, point1 + offset);
            if image0.contains(p0) && image1.contains(p1) {
                samples.push((bilinear(image0, p0), bilinear(image1, p1)));
            }
        }
    }
    if samples.is_empty() {
        return None;
    }

    let n = samples.len() as f64;
    let mean0 = samples.iter().map(|(v0, _)| v0).sum::<f64>() / n;
    let residual = samples.iter().map(|(v0, v1)| (v0 - v1).abs()).sum::<f64>() / n;
    let deviation = samples.iter().map(|(v0, _)| (v0 - mean0).abs()).sum::<f64>() / n;
    Some((residual, deviation))
}
