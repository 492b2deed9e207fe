pub mod change_point;
pub mod drift;
pub mod kernel;

pub use change_point::{standardized_residuals, ChangePoint, ChangePointDetector};
pub use drift::{scott_bandwidth, DriftEstimate, NonParametricDriftEstimator};
pub use kernel::KernelSmoother;
