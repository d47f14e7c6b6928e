//! Corner selection for tracking.
//!
//! Candidates are scored by the smaller eigenvalue of the local structure
//! tensor (Shi-Tomasi), thresholded relative to the strongest response,
//! thinned greedily by distance and finally refined to sub-pixel accuracy.

use tracing::{debug, instrument};

use crate::image::{bilinear, Image};
use crate::my_types::*;

/// Refinements moving a point further than this many pixels are discarded.
/// Keeps the selected points roughly `min_distance` apart.
pub const MAX_REFINEMENT_SHIFT: f64 = 1.;

/// Stopping rule shared by all iterative refinements: stop after
/// `max_iterations` or once an update is shorter than `epsilon`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerminationCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Upper bound on returned points, 0 disables the bound
    pub max_count: usize,
    /// Fraction of the strongest corner response a candidate must exceed
    pub quality_level: f64,
    /// Minimum pixel distance between two returned points
    pub min_distance: f64,
    /// Half size of the sub-pixel refinement window
    pub sub_pix_window: usize,
    pub criteria: TerminationCriteria,
}

pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Detector { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Select corners and refine them. An empty result means the frame has no
    /// usable texture.
    #[instrument(skip_all, fields(width = frame.width, height = frame.height))]
    pub fn detect(&self, frame: &Image) -> PointSet {
        let mut points = select_features(
            frame,
            self.config.max_count,
            self.config.quality_level,
            self.config.min_distance,
        );
        refine_corners(
            frame,
            &mut points,
            self.config.sub_pix_window,
            self.config.criteria,
        );
        debug!("selected {} features", points.len());
        points
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    x: usize,
    y: usize,
    response: f64,
}

/// Pick up to `max_count` strong corners at least `min_distance` apart, on
/// integer pixel locations, strongest first.
pub fn select_features(
    frame: &Image,
    max_count: usize,
    quality_level: f64,
    min_distance: f64,
) -> PointSet {
    if frame.width < 3 || frame.height < 3 || frame.data.len() != frame.width * frame.height {
        return vec![];
    }

    let response = min_eigen_response(frame);
    let max_response = response.iter().cloned().fold(0., f64::max);
    if max_response <= 0. {
        return vec![];
    }
    let threshold = max_response * quality_level;

    let mut candidates = local_maxima(&response, frame.width, frame.height, threshold);
    // strongest first, raster order among equals
    candidates.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then((a.y, a.x).cmp(&(b.y, b.x)))
    });

    let max_count = if max_count == 0 {
        usize::MAX
    } else {
        max_count
    };
    let mut grid = DistanceGrid::new(frame.width, frame.height, min_distance);
    let mut points = vec![];
    for candidate in candidates {
        if points.len() >= max_count {
            break;
        }
        let point = Vector2d::new(candidate.x as f64, candidate.y as f64);
        if grid.try_insert(point) {
            points.push(point);
        }
    }
    points
}

/// Minimum eigenvalue of the 3x3 Sobel structure tensor summed over a 3x3
/// block, per pixel.
fn min_eigen_response(frame: &Image) -> Vec<f64> {
    let (w, h) = (frame.width, frame.height);
    let v = |x: i32, y: i32| frame.value_clamped(x, y) as f64;

    let mut dxx = vec![0f64; w * h];
    let mut dyy = vec![0f64; w * h];
    let mut dxy = vec![0f64; w * h];
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let gx = (v(x + 1, y - 1) + 2. * v(x + 1, y) + v(x + 1, y + 1))
                - (v(x - 1, y - 1) + 2. * v(x - 1, y) + v(x - 1, y + 1));
            let gy = (v(x - 1, y + 1) + 2. * v(x, y + 1) + v(x + 1, y + 1))
                - (v(x - 1, y - 1) + 2. * v(x, y - 1) + v(x + 1, y - 1));
            let i = y as usize * w + x as usize;
            dxx[i] = gx * gx;
            dyy[i] = gy * gy;
            dxy[i] = gx * gy;
        }
    }

    let block = |buffer: &[f64], x: usize, y: usize| {
        let mut sum = 0.;
        for by in y.saturating_sub(1)..usize::min(h, y + 2) {
            for bx in x.saturating_sub(1)..usize::min(w, x + 2) {
                sum += buffer[by * w + bx];
            }
        }
        sum
    };

    let mut response = vec![0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let a = block(&dxx, x, y);
            let b = block(&dxy, x, y);
            let c = block(&dyy, x, y);
            let half_trace = 0.5 * (a + c);
            let root = (0.25 * (a - c) * (a - c) + b * b).sqrt();
            response[y * w + x] = f64::max(half_trace - root, 0.);
        }
    }
    response
}

/// Pixels above `threshold` that are maximal in their 3x3 neighborhood. The
/// outermost pixel ring is skipped.
fn local_maxima(response: &[f64], w: usize, h: usize, threshold: f64) -> Vec<Candidate> {
    let mut out = vec![];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = response[y * w + x];
            if r <= threshold {
                continue;
            }
            let mut is_max = true;
            'neighbors: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if response[ny * w + nx] > r {
                        is_max = false;
                        break 'neighbors;
                    }
                }
            }
            if is_max {
                out.push(Candidate { x, y, response: r });
            }
        }
    }
    out
}

/// Bucketed lookup of accepted points for the minimum distance test
struct DistanceGrid {
    cell: f64,
    cols: usize,
    rows: usize,
    min_distance2: f64,
    cells: Vec<Vec<Vector2d>>,
}

impl DistanceGrid {
    fn new(width: usize, height: usize, min_distance: f64) -> Self {
        let cell = f64::max(min_distance, 1.);
        let cols = (width as f64 / cell).ceil() as usize + 1;
        let rows = (height as f64 / cell).ceil() as usize + 1;
        Self {
            cell,
            cols,
            rows,
            min_distance2: if min_distance > 0. {
                min_distance * min_distance
            } else {
                0.
            },
            cells: vec![vec![]; cols * rows],
        }
    }

    /// Accept the point unless an accepted point lies closer than the minimum
    /// distance.
    fn try_insert(&mut self, point: Vector2d) -> bool {
        let cx = (point.x / self.cell) as usize;
        let cy = (point.y / self.cell) as usize;
        if self.min_distance2 > 0. {
            for y in cy.saturating_sub(1)..usize::min(self.rows, cy + 2) {
                for x in cx.saturating_sub(1)..usize::min(self.cols, cx + 2) {
                    for other in &self.cells[y * self.cols + x] {
                        if (other - point).norm_squared() < self.min_distance2 {
                            return false;
                        }
                    }
                }
            }
        }
        self.cells[cy * self.cols + cx].push(point);
        true
    }
}

/// Move each point to the location where the surrounding gradients are
/// orthogonal to the offsets, which is the exact corner for ideal corners.
/// `window` is the half size of the search window. A point whose estimate
/// wanders further than [`MAX_REFINEMENT_SHIFT`] is left where it was.
pub fn refine_corners(
    frame: &Image,
    points: &mut [Point],
    window: usize,
    criteria: TerminationCriteria,
) {
    if window == 0 || frame.is_empty() {
        return;
    }
    let r = window as i32;
    let n = 2 * window + 1;

    // gaussian weights over the window
    let mut weights = Matrixd::zeros(n, n);
    for i in 0..n {
        let y = (i as f64 - window as f64) / window as f64;
        for j in 0..n {
            let x = (j as f64 - window as f64) / window as f64;
            weights[(i, j)] = (-(x * x) - (y * y)).exp();
        }
    }

    let epsilon2 = criteria.epsilon * criteria.epsilon;
    let max_iterations = usize::max(criteria.max_iterations, 1);

    for point in points.iter_mut() {
        let start = *point;
        let mut current = start;
        for _ in 0..max_iterations {
            let sample = |dx: i32, dy: i32| {
                bilinear(frame, current + Vector2d::new(dx as f64, dy as f64))
            };

            let (mut a, mut b, mut c) = (0., 0., 0.);
            let (mut bb1, mut bb2) = (0., 0.);
            for i in -r..=r {
                for j in -r..=r {
                    let gx = sample(j + 1, i) - sample(j - 1, i);
                    let gy = sample(j, i + 1) - sample(j, i - 1);
                    let m = weights[((i + r) as usize, (j + r) as usize)];
                    let (px, py) = (j as f64, i as f64);
                    let gxx = gx * gx * m;
                    let gxy = gx * gy * m;
                    let gyy = gy * gy * m;
                    a += gxx;
                    b += gxy;
                    c += gyy;
                    bb1 += gxx * px + gxy * py;
                    bb2 += gxy * px + gyy * py;
                }
            }

            let system = Matrix2d::new(a, b, b, c);
            let step = match system.try_inverse() {
                Some(inv) => inv * Vector2d::new(bb1, bb2),
                None => break,
            };
            current += step;
            if step.norm_squared() <= epsilon2 {
                break;
            }
        }

        if (current - start).norm() <= MAX_REFINEMENT_SHIFT {
            *point = current;
        }
    }
}
