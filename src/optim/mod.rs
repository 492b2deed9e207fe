pub mod bounded;
pub mod constrained;

pub use bounded::{
    projected_gradient, BoundedMinimizer, MinimizerOutcome, MinimizerStatus, Objective,
    ProjectedBfgs, Tolerances,
};
pub use constrained::{
    ConstrainedSolver, IntervalSolver, LinearConstraint, ScalarProgram, ScalarSolution,
    SolveStatus,
};
