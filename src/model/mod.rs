pub mod params;
pub mod series;

pub use params::{ParameterBounds, ParameterVector, PARAMETER_NAMES};
pub use series::ObservedSeries;
