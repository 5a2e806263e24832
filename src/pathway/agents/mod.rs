//! Yearly agent procedures
//!
//! Each simulated year runs [`decommission`], [`brownfield`] and [`greenfield`]
//! in that order against a shared [`YearContext`]. Rankings may be computed in
//! parallel, but every mutation of the working stack happens here, one at a time.

pub mod brownfield;
pub mod decommission;
pub mod greenfield;

use ahash::AHashMap;
use rand_chacha::ChaCha8Rng;

use crate::core::config::PathwayConfig;
use crate::core::types::{Technology, Year};
use crate::pathway::asset::{Asset, AssetStack};
use crate::pathway::carbon_budget::CarbonBudget;
use crate::pathway::constraints::{CandidateTransition, ChainVerdict, ConstraintChain, PathwayContext, StackContext};
use crate::pathway::inputs::{DemandSeries, TechnologyTable};
use crate::pathway::ranking::RankingEngine;
use crate::pathway::simulation::UnmetDemandWarning;
use crate::pathway::transition::Transition;

/// Everything the agents read and write while one year is open
pub struct YearContext<'a> {
    pub year: Year,
    /// Working copy of the previous year's snapshot
    pub stack: AssetStack,
    pub config: &'a PathwayConfig,
    pub technologies: &'a TechnologyTable,
    pub demand: &'a DemandSeries,
    pub budget: &'a CarbonBudget,
    pub chain: &'a ConstraintChain,
    pub ranking: &'a RankingEngine,
    pub rng: &'a mut ChaCha8Rng,
    /// Transitions applied this year, in application order
    pub transitions: Vec<Transition>,
    /// Count of transitions into each technology this year
    pub additions: AHashMap<Technology, u32>,
    pub unmet_demand: Vec<UnmetDemandWarning>,
    /// Candidates rejected by the constraint chain this year
    pub denied: usize,
}

/// What a closed year leaves behind
pub struct YearResult {
    pub stack: AssetStack,
    pub transitions: Vec<Transition>,
    pub unmet_demand: Vec<UnmetDemandWarning>,
    pub denied: usize,
}

impl<'a> YearContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        year: Year,
        stack: AssetStack,
        config: &'a PathwayConfig,
        technologies: &'a TechnologyTable,
        demand: &'a DemandSeries,
        budget: &'a CarbonBudget,
        chain: &'a ConstraintChain,
        ranking: &'a RankingEngine,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            year,
            stack,
            config,
            technologies,
            demand,
            budget,
            chain,
            ranking,
            rng,
            transitions: Vec::new(),
            additions: AHashMap::new(),
            unmet_demand: Vec::new(),
            denied: 0,
        }
    }

    /// Technical lifetime of an asset's current technology
    pub fn lifetime_of(&self, asset: &Asset) -> u32 {
        let table_lifetime = self
            .technologies
            .info(asset.technology.as_str())
            .and_then(|info| info.lifetime);
        self.config.lifetime_for(&asset.technology, table_lifetime)
    }

    pub fn is_past_lifetime(&self, asset: &Asset) -> bool {
        asset.is_past_lifetime(self.year, self.lifetime_of(asset))
    }

    fn evaluate(&self, candidate: &CandidateTransition) -> ChainVerdict {
        let pathway = PathwayContext {
            year: self.year,
            budget: self.budget,
            demand: self.demand,
            technologies: self.technologies,
            additions: &self.additions,
        };
        self.chain.evaluate(candidate, &StackContext::new(&self.stack), &pathway)
    }

    /// Chain verdict for a candidate that will not be applied; nothing is counted
    pub fn is_admissible(&self, candidate: &CandidateTransition) -> bool {
        matches!(self.evaluate(candidate), ChainVerdict::Admissible)
    }

    /// Run a candidate through the constraint chain against the working stack
    pub fn admit(&mut self, candidate: &CandidateTransition) -> bool {
        match self.evaluate(candidate) {
            ChainVerdict::Admissible => true,
            ChainVerdict::Denied { constraint, reason } => {
                tracing::debug!(
                    year = self.year,
                    sector = candidate.sector(),
                    region = candidate.region(),
                    destination = ?candidate.destination().map(Technology::as_str),
                    "{} denied candidate: {}",
                    constraint,
                    reason
                );
                self.denied += 1;
                false
            }
        }
    }

    /// Append an applied transition to this year's log
    pub fn record(&mut self, transition: Transition) {
        if let Some(destination) = transition.kind.destination() {
            if transition.kind.origin() != Some(destination) {
                *self.additions.entry(destination.clone()).or_insert(0) += 1;
            }
        }
        tracing::debug!(
            year = transition.year,
            asset = %transition.asset_id,
            kind = transition.kind.label(),
            capacity = transition.capacity,
            "Applied transition"
        );
        self.transitions.push(transition);
    }

    pub fn finish(self) -> YearResult {
        YearResult {
            stack: self.stack,
            transitions: self.transitions,
            unmet_demand: self.unmet_demand,
            denied: self.denied,
        }
    }
}
