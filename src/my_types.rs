use nalgebra as na;

pub type Vector2d = na::Vector2<f64>;
pub type Matrix2d = na::Matrix2<f64>;
pub type Matrixd = na::DMatrix<f64>;

/// Image coordinate, x is the column and y the row. Pixel centers sit on
/// integer coordinates.
pub type Point = Vector2d;

pub type PointSet = Vec<Point>;
pub type ValidityMask = Vec<bool>;
