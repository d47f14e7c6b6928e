use thiserror::Error;

/// Hard failures of one tracking iteration. Losing individual points is not
/// an error, it shows up in the validity mask instead.
#[derive(Error, PartialEq, Eq, Clone, Debug)]
pub enum TrackingError {
    #[error("invalid frame: {width} x {height} with {len} bytes")]
    InvalidFrame {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("frame size mismatch: previous {previous:?}, current {current:?}")]
    CorrespondenceInputMismatch {
        previous: (usize, usize),
        current: (usize, usize),
    },
}
