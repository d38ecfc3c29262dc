pub mod candidate;
pub mod config;
pub mod constraints;
pub mod error;
pub mod optimizer;
pub mod output;
pub mod portfolio;
pub mod ranking;
pub mod server;
pub mod snapshot;

pub use candidate::{normalize, Candidate, ConditionProfile, RawCandidate};
pub use constraints::{build, ConstraintOptions, ConstraintSet};
pub use error::{CandidateIssue, ValidationError};
pub use optimizer::{
    optimize, AllocationResult, AllocationSolver, Method, MilpSolver, Objective, Optimizer,
};
pub use portfolio::{aggregate, compare, MetricsComparison, PortfolioMetrics};
pub use ranking::{rank, RankedCandidate};
