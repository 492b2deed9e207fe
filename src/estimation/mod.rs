pub mod lasso;
pub mod qmle;

pub use lasso::{
    adaptive_weights, aggregate_hessian, step_hessian, AdaptiveLassoEstimator, LassoFallback,
    LassoFit, LassoObjective, LassoPenalty,
};
pub use qmle::{QmleEstimator, QmleFit, QmleObjective};
