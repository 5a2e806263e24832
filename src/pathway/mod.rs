//! Technology transition pathway engine
//!
//! Year-by-year simulation of production assets moving between technologies
//! under demand, cost and emissions constraints.

pub mod agents;
pub mod asset;
pub mod carbon_budget;
pub mod carbon_cost;
pub mod constraints;
pub mod inputs;
pub mod output;
pub mod ranking;
pub mod simulation;
pub mod transition;

pub use asset::{Asset, AssetFilter, AssetStack, AssetStatus, NewAsset, StackSnapshot};
pub use carbon_budget::{BudgetShape, CarbonBudget};
pub use carbon_cost::{CarbonCostTrajectory, CostShape};
pub use constraints::{
    CandidateTransition, ChainVerdict, Constraint, ConstraintChain, ConstraintSpec, PathwayContext,
    StackContext, Verdict,
};
pub use inputs::{DataImporter, DemandSeries, PathwayInputs, TechnologyTable};
pub use output::PathwayOutput;
pub use ranking::{RankedCandidate, RankingConfig, RankingEngine, RankingMethod};
pub use simulation::{
    BudgetExceededSignal, PathwayState, SimulationPathway, SurplusCapacityWarning, UnmetDemandWarning, YearOutcome,
};
pub use transition::{DecommissionReason, Transition, TransitionKind, TransitionRegistry};
