pub mod account;
pub mod decision;
pub mod mpc;

pub use account::{account_expected_value, AccountTrajectories};
pub use decision::{DecisionConfig, InvestmentDecision, InvestmentDecisionEngine};
pub use mpc::{round_within, MpcConfig, MpcSolution, StochasticMpcController, TradeDirection};
