pub mod config;
pub mod control;
pub mod error;
pub mod estimation;
pub mod market_data;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod regime;
pub mod simulation;
pub mod stats;
