//! Admissibility constraints for candidate transitions
//!
//! Each constraint is a small value implementing [`Constraint`]. A
//! [`ConstraintChain`] evaluates them in order and admits a candidate only if
//! every one allows it. Evaluation is fail-closed: an error or a panic inside a
//! constraint counts as a deny, so one faulty constraint cannot stop a run.
//!
//! Agent procedures only ever talk to the chain, so adding a constraint means
//! adding a [`ConstraintSpec`] variant or pushing a custom implementation.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::core::error::{PathwayError, Result};
use crate::core::types::{Technology, TechnologyClass, Year};
use crate::pathway::asset::{Asset, AssetFilter, AssetStack, NewAsset};
use crate::pathway::carbon_budget::CarbonBudget;
use crate::pathway::inputs::{DemandSeries, TechnologyTable};
use crate::pathway::transition::DecommissionReason;

/// Relative slack for floating point comparisons against limits
const LIMIT_EPSILON: f64 = 1e-9;

/// A transition under consideration, before it is applied
#[derive(Debug, Clone, Copy)]
pub enum CandidateTransition<'a> {
    Decommission {
        asset: &'a Asset,
        reason: DecommissionReason,
    },
    Brownfield {
        asset: &'a Asset,
        destination: &'a Technology,
        emission_intensity: f64,
    },
    Greenfield {
        asset: &'a NewAsset,
    },
}

impl<'a> CandidateTransition<'a> {
    pub fn sector(&self) -> &'a str {
        match self {
            CandidateTransition::Decommission { asset, .. }
            | CandidateTransition::Brownfield { asset, .. } => asset.sector.as_str(),
            CandidateTransition::Greenfield { asset } => asset.sector.as_str(),
        }
    }

    pub fn region(&self) -> &'a str {
        match self {
            CandidateTransition::Decommission { asset, .. }
            | CandidateTransition::Brownfield { asset, .. } => asset.region.as_str(),
            CandidateTransition::Greenfield { asset } => asset.region.as_str(),
        }
    }

    pub fn origin(&self) -> Option<&'a Technology> {
        match self {
            CandidateTransition::Decommission { asset, .. }
            | CandidateTransition::Brownfield { asset, .. } => Some(&asset.technology),
            CandidateTransition::Greenfield { .. } => None,
        }
    }

    pub fn destination(&self) -> Option<&'a Technology> {
        match self {
            CandidateTransition::Brownfield { destination, .. } => Some(*destination),
            CandidateTransition::Greenfield { asset } => Some(&asset.technology),
            CandidateTransition::Decommission { .. } => None,
        }
    }

    /// True when the transition brings a technology into a market it was not in
    /// on this asset (greenfield, or a brownfield switch)
    pub fn adds_technology(&self) -> bool {
        match self {
            CandidateTransition::Brownfield {
                asset, destination, ..
            } => &asset.technology != *destination,
            CandidateTransition::Greenfield { .. } => true,
            CandidateTransition::Decommission { .. } => false,
        }
    }

    pub fn capacity_delta(&self) -> f64 {
        match self {
            CandidateTransition::Decommission { asset, .. } => -asset.capacity,
            CandidateTransition::Brownfield { .. } => 0.0,
            CandidateTransition::Greenfield { asset } => asset.capacity,
        }
    }

    pub fn emissions_delta(&self) -> f64 {
        match self {
            CandidateTransition::Decommission { asset, .. } => -asset.emissions(),
            CandidateTransition::Brownfield {
                asset,
                emission_intensity,
                ..
            } => asset.capacity * (emission_intensity - asset.emission_intensity),
            CandidateTransition::Greenfield { asset } => asset.emissions(),
        }
    }
}

/// Read-only view of the working stack
#[derive(Debug, Clone, Copy)]
pub struct StackContext<'a> {
    stack: &'a AssetStack,
}

impl<'a> StackContext<'a> {
    pub fn new(stack: &'a AssetStack) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &'a AssetStack {
        self.stack
    }

    pub fn total_emissions(&self) -> f64 {
        self.stack.total_emissions(&AssetFilter::all())
    }

    pub fn market_capacity(&self, sector: &str, region: &str) -> f64 {
        self.stack.total_capacity(&AssetFilter::market(sector, region))
    }
}

/// Year-level data available to constraints
#[derive(Debug, Clone, Copy)]
pub struct PathwayContext<'a> {
    pub year: Year,
    pub budget: &'a CarbonBudget,
    pub demand: &'a DemandSeries,
    pub technologies: &'a TechnologyTable,
    /// Transitions into each technology applied so far this year
    pub additions: &'a AHashMap<Technology, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(String),
}

/// A single admissibility check
pub trait Constraint: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict>;
}

/// Denies transitions that would push the year's emissions over the ceiling
///
/// Transitions that lower emissions are always allowed, even when the stack is
/// already over the ceiling.
#[derive(Debug, Clone, Default)]
pub struct EmissionsBudgetConstraint;

impl Constraint for EmissionsBudgetConstraint {
    fn name(&self) -> &str {
        "emissions_budget"
    }

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict> {
        let delta = candidate.emissions_delta();
        if delta <= 0.0 {
            return Ok(Verdict::Allow);
        }

        let limit = pathway.budget.limit_for_year(pathway.year)?;
        let after = stack.total_emissions() + delta;
        if after > limit * (1.0 + LIMIT_EPSILON) {
            return Ok(Verdict::Deny(format!(
                "emissions {:.3} would exceed ceiling {:.3} in {}",
                after, limit, pathway.year
            )));
        }
        Ok(Verdict::Allow)
    }
}

/// Forbids moving an asset from an end-state technology to a less advanced one
#[derive(Debug, Clone)]
pub struct NoBackslidingConstraint {
    /// Configured advancement levels; technologies not listed use their class
    levels: AHashMap<Technology, u8>,
    end_state_level: u8,
    /// Apply the rule at every level, not only from end-state technologies
    strict: bool,
}

impl NoBackslidingConstraint {
    pub fn new(levels: BTreeMap<Technology, u8>, strict: bool) -> Self {
        let end_state_level = levels
            .values()
            .copied()
            .max()
            .unwrap_or(0)
            .max(TechnologyClass::EndState.level());
        Self {
            levels: levels.into_iter().collect(),
            end_state_level,
            strict,
        }
    }

    fn level(&self, technology: &Technology, table: &TechnologyTable) -> Result<u8> {
        if let Some(level) = self.levels.get(technology) {
            return Ok(*level);
        }
        table
            .class_of(technology.as_str())
            .map(|class| class.level())
            .ok_or_else(|| PathwayError::UnregisteredTechnology(technology.clone()))
    }
}

impl Constraint for NoBackslidingConstraint {
    fn name(&self) -> &str {
        "no_backsliding"
    }

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        _stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict> {
        let CandidateTransition::Brownfield {
            asset, destination, ..
        } = candidate
        else {
            return Ok(Verdict::Allow);
        };

        let origin_level = self.level(&asset.technology, pathway.technologies)?;
        let destination_level = self.level(destination, pathway.technologies)?;
        let applies = self.strict || origin_level >= self.end_state_level;

        if applies && destination_level < origin_level {
            return Ok(Verdict::Deny(format!(
                "{} (level {}) is less advanced than {} (level {})",
                destination, destination_level, asset.technology, origin_level
            )));
        }
        Ok(Verdict::Allow)
    }
}

/// Bans transitions into given technologies from a cutoff year on
#[derive(Debug, Clone)]
pub struct TechnologyMoratoriumConstraint {
    technologies: AHashSet<Technology>,
    classes: Vec<TechnologyClass>,
    cutoff_year: Year,
}

impl TechnologyMoratoriumConstraint {
    pub fn new(technologies: Vec<Technology>, classes: Vec<TechnologyClass>, cutoff_year: Year) -> Self {
        Self {
            technologies: technologies.into_iter().collect(),
            classes,
            cutoff_year,
        }
    }

    pub fn is_banned(&self, technology: &Technology, year: Year, table: &TechnologyTable) -> bool {
        if year < self.cutoff_year {
            return false;
        }
        self.technologies.contains(technology)
            || table
                .class_of(technology.as_str())
                .map_or(false, |class| self.classes.contains(&class))
    }
}

impl Constraint for TechnologyMoratoriumConstraint {
    fn name(&self) -> &str {
        "technology_moratorium"
    }

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        _stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict> {
        match candidate.destination() {
            Some(destination) if self.is_banned(destination, pathway.year, pathway.technologies) => {
                Ok(Verdict::Deny(format!(
                    "{} is under moratorium since {}",
                    destination, self.cutoff_year
                )))
            }
            _ => Ok(Verdict::Allow),
        }
    }
}

/// Keeps sector/region capacity reconcilable with demand
///
/// Capacity reductions may not leave a market below `demand * (1 - tolerance)`.
/// Capacity additions are only allowed while the market is below that level and
/// may not take it above `demand * (1 + tolerance)`.
#[derive(Debug, Clone)]
pub struct CapacityConsistencyConstraint {
    tolerance: f64,
}

impl CapacityConsistencyConstraint {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl Constraint for CapacityConsistencyConstraint {
    fn name(&self) -> &str {
        "capacity_consistency"
    }

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict> {
        let delta = candidate.capacity_delta();
        if delta == 0.0 {
            return Ok(Verdict::Allow);
        }

        let (sector, region) = (candidate.sector(), candidate.region());
        let current = stack.market_capacity(sector, region);

        let Some(demand) = pathway.demand.demand(pathway.year, sector, region) else {
            return Ok(if delta > 0.0 {
                Verdict::Deny(format!("no demand for {}/{} in {}", sector, region, pathway.year))
            } else {
                Verdict::Allow
            });
        };

        let floor = demand * (1.0 - self.tolerance);
        if delta < 0.0 && current + delta < floor * (1.0 - LIMIT_EPSILON) {
            return Ok(Verdict::Deny(format!(
                "capacity {:.3} would fall below {:.3} in {}/{}",
                current + delta,
                floor,
                sector,
                region
            )));
        }
        if delta > 0.0 && current >= floor {
            return Ok(Verdict::Deny(format!(
                "capacity {:.3} already covers demand {:.3} in {}/{}",
                current, demand, sector, region
            )));
        }
        let ceiling = demand * (1.0 + self.tolerance);
        if delta > 0.0 && current + delta > ceiling * (1.0 + LIMIT_EPSILON) {
            return Ok(Verdict::Deny(format!(
                "capacity {:.3} would exceed {:.3} in {}/{}",
                current + delta,
                ceiling,
                sector,
                region
            )));
        }
        Ok(Verdict::Allow)
    }
}

/// Caps how many assets can move into a technology per year while it ramps up
///
/// The cap starts at `initial_max_additions` in the technology's first available
/// year and grows by `growth_rate` per year for `ramp_up_years` years.
#[derive(Debug, Clone)]
pub struct TechnologyRampupConstraint {
    initial_max_additions: u32,
    growth_rate: f64,
    ramp_up_years: u32,
    /// Technologies subject to ramp-up; empty means all
    technologies: AHashSet<Technology>,
}

impl TechnologyRampupConstraint {
    pub fn new(
        initial_max_additions: u32,
        growth_rate: f64,
        ramp_up_years: u32,
        technologies: Vec<Technology>,
    ) -> Self {
        Self {
            initial_max_additions,
            growth_rate,
            ramp_up_years,
            technologies: technologies.into_iter().collect(),
        }
    }

    /// Maximum additions for a technology in a year; `None` when unconstrained
    pub fn max_additions(&self, available_from: Year, year: Year) -> Option<u32> {
        let years_in = year.checked_sub(available_from)?;
        if years_in >= self.ramp_up_years {
            return None;
        }
        let cap = self.initial_max_additions as f64 * (1.0 + self.growth_rate).powi(years_in as i32);
        Some(cap.round() as u32)
    }
}

impl Constraint for TechnologyRampupConstraint {
    fn name(&self) -> &str {
        "technology_rampup"
    }

    fn evaluate(
        &self,
        candidate: &CandidateTransition,
        _stack: &StackContext,
        pathway: &PathwayContext,
    ) -> Result<Verdict> {
        let Some(destination) = candidate.destination() else {
            return Ok(Verdict::Allow);
        };
        if !candidate.adds_technology()
            || (!self.technologies.is_empty() && !self.technologies.contains(destination))
        {
            return Ok(Verdict::Allow);
        }

        let info = pathway
            .technologies
            .info(destination.as_str())
            .ok_or_else(|| PathwayError::UnregisteredTechnology(destination.clone()))?;

        if let Some(cap) = self.max_additions(info.available_from, pathway.year) {
            let added = pathway.additions.get(destination).copied().unwrap_or(0);
            if added >= cap {
                return Ok(Verdict::Deny(format!(
                    "{} already gained {} assets in {} (ramp-up cap {})",
                    destination, added, pathway.year, cap
                )));
            }
        }
        Ok(Verdict::Allow)
    }
}

/// Configuration entry naming one constraint and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    EmissionsBudget,
    NoBacksliding {
        #[serde(default)]
        levels: BTreeMap<Technology, u8>,
        #[serde(default)]
        strict: bool,
    },
    TechnologyMoratorium {
        #[serde(default)]
        technologies: Vec<Technology>,
        #[serde(default)]
        classes: Vec<TechnologyClass>,
        cutoff_year: Year,
    },
    CapacityConsistency {
        #[serde(default)]
        tolerance: f64,
    },
    TechnologyRampup {
        initial_max_additions: u32,
        growth_rate: f64,
        ramp_up_years: u32,
        #[serde(default)]
        technologies: Vec<Technology>,
    },
}

impl ConstraintSpec {
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ConstraintSpec::TechnologyMoratorium {
                technologies,
                classes,
                ..
            } if technologies.is_empty() && classes.is_empty() => {
                Err("technology_moratorium must name technologies or classes".into())
            }
            ConstraintSpec::CapacityConsistency { tolerance } if !(0.0..1.0).contains(tolerance) => {
                Err(format!("capacity_consistency tolerance ({}) must lie in [0, 1)", tolerance))
            }
            ConstraintSpec::TechnologyRampup { growth_rate, .. }
                if !growth_rate.is_finite() || *growth_rate < 0.0 =>
            {
                Err(format!("technology_rampup growth_rate ({}) must be >= 0", growth_rate))
            }
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn Constraint> {
        match self {
            ConstraintSpec::EmissionsBudget => Box::new(EmissionsBudgetConstraint),
            ConstraintSpec::NoBacksliding { levels, strict } => {
                Box::new(NoBackslidingConstraint::new(levels.clone(), *strict))
            }
            ConstraintSpec::TechnologyMoratorium {
                technologies,
                classes,
                cutoff_year,
            } => Box::new(TechnologyMoratoriumConstraint::new(
                technologies.clone(),
                classes.clone(),
                *cutoff_year,
            )),
            ConstraintSpec::CapacityConsistency { tolerance } => {
                Box::new(CapacityConsistencyConstraint::new(*tolerance))
            }
            ConstraintSpec::TechnologyRampup {
                initial_max_additions,
                growth_rate,
                ramp_up_years,
                technologies,
            } => Box::new(TechnologyRampupConstraint::new(
                *initial_max_additions,
                *growth_rate,
                *ramp_up_years,
                technologies.clone(),
            )),
        }
    }
}

/// Outcome of evaluating a whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    Admissible,
    Denied { constraint: String, reason: String },
}

impl ChainVerdict {
    pub fn is_admissible(&self) -> bool {
        matches!(self, ChainVerdict::Admissible)
    }
}

/// Ordered list of constraints; all must allow
#[derive(Debug, Default)]
pub struct ConstraintChain {
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConstraintChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ConstraintSpec]) -> Self {
        Self {
            constraints: specs.iter().map(ConstraintSpec::build).collect(),
        }
    }

    pub fn push(&mut self, constraint: Box<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }

    /// Evaluate every constraint in order, stopping at the first deny
    pub fn evaluate(
        &self,
        candidate: &CandidateTransition,
        stack: &StackContext,
        pathway: &PathwayContext,
    ) -> ChainVerdict {
        for constraint in &self.constraints {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                constraint.evaluate(candidate, stack, pathway)
            }));

            let reason = match outcome {
                Ok(Ok(Verdict::Allow)) => continue,
                Ok(Ok(Verdict::Deny(reason))) => reason,
                Ok(Err(e)) => {
                    tracing::warn!(
                        constraint = constraint.name(),
                        year = pathway.year,
                        "constraint evaluation failed, denying: {}",
                        e
                    );
                    format!("evaluation failed: {}", e)
                }
                Err(_) => {
                    tracing::warn!(
                        constraint = constraint.name(),
                        year = pathway.year,
                        "constraint panicked, denying"
                    );
                    "evaluation panicked".to_string()
                }
            };

            return ChainVerdict::Denied {
                constraint: constraint.name().to_string(),
                reason,
            };
        }
        ChainVerdict::Admissible
    }
}
