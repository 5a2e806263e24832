//! Pathway configuration
//!
//! Every recognized run option lives here. Configurations are usually loaded
//! from TOML and must pass [`PathwayConfig::validate`] before a run starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::core::error::{PathwayError, Result};
use crate::core::types::{Technology, Year};
use crate::pathway::carbon_budget::BudgetShape;
use crate::pathway::carbon_cost::CostShape;
use crate::pathway::constraints::ConstraintSpec;
use crate::pathway::ranking::RankingConfig;

/// Configuration for one simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwayConfig {
    /// First simulated year (transitions are enacted from this year on)
    pub start_year: Year,

    /// Last simulated year, inclusive
    pub end_year: Year,

    /// Seed for the single random source threaded through the run
    ///
    /// Two runs with the same seed and inputs produce identical registries.
    pub random_seed: u64,

    pub carbon_budget: CarbonBudgetConfig,

    pub carbon_cost: CarbonCostConfig,

    pub ranking: RankingConfig,

    /// Ordered constraint chain; a transition must pass every entry
    pub constraints: Vec<ConstraintSpec>,

    /// Technical lifetime per technology (years)
    pub asset_lifetime_by_technology: BTreeMap<Technology, u32>,

    /// Lifetime used when neither this config nor the technology table names one
    pub default_asset_lifetime: u32,

    /// Years between investment decisions for a running asset
    ///
    /// An asset becomes eligible for a voluntary brownfield switch once its age
    /// since commissioning (or its last retrofit) reaches this value.
    pub investment_cycle: u32,

    /// Upper bound on voluntary brownfield switches per year, as a share of
    /// operating assets. End-of-life renewals are not counted.
    pub max_annual_brownfield_share: f64,

    /// Capacity of each greenfield asset. `None` sizes new assets to the gap.
    pub standard_asset_capacity: Option<f64>,

    /// Relative tolerance when reconciling capacity against demand
    pub capacity_tolerance: f64,

    /// Retire surplus capacity worst-first when a sector/region is oversupplied.
    /// On by default; surplus left over is reported either way.
    pub decommission_surplus: bool,

    /// Minimum batch size before rankings are computed in parallel
    pub parallel_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonBudgetConfig {
    pub shape: BudgetShape,
    /// Cumulative allowance over the horizon
    pub total: f64,
    /// Permit ceilings that rise from one year to the next
    pub allow_increasing: bool,
}

impl Default for CarbonBudgetConfig {
    fn default() -> Self {
        Self {
            shape: BudgetShape::Linear { end_fraction: 0.05 },
            total: 500.0,
            allow_increasing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonCostConfig {
    pub shape: CostShape,
    /// Cost per unit of emissions in the start year
    pub initial_cost: f64,
    /// Cost per unit of emissions in the end year
    pub final_cost: f64,
    /// Scales the cost for individual technologies (e.g. partial exemptions)
    pub technology_multipliers: BTreeMap<Technology, f64>,
}

impl Default for CarbonCostConfig {
    fn default() -> Self {
        Self {
            shape: CostShape::Constant,
            initial_cost: 0.0,
            final_cost: 0.0,
            technology_multipliers: BTreeMap::new(),
        }
    }
}

impl Default for PathwayConfig {
    fn default() -> Self {
        Self {
            start_year: 2020,
            end_year: 2050,
            random_seed: 42,
            carbon_budget: CarbonBudgetConfig::default(),
            carbon_cost: CarbonCostConfig::default(),
            ranking: RankingConfig::default(),
            constraints: vec![
                ConstraintSpec::EmissionsBudget,
                ConstraintSpec::NoBacksliding {
                    levels: BTreeMap::new(),
                    strict: false,
                },
            ],
            asset_lifetime_by_technology: BTreeMap::new(),
            default_asset_lifetime: 40,
            investment_cycle: 10,
            max_annual_brownfield_share: 0.2,
            standard_asset_capacity: None,
            capacity_tolerance: 0.0,
            decommission_surplus: true,
            parallel_threshold: 64,
        }
    }
}

impl PathwayConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PathwayConfig = toml::from_str(content)?;
        config.validate().map_err(PathwayError::InvalidConfig)?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// All simulated years, in order
    pub fn horizon(&self) -> RangeInclusive<Year> {
        self.start_year..=self.end_year
    }

    /// Lifetime of a technology: explicit config first, then the table value
    pub fn lifetime_for(&self, technology: &Technology, table_lifetime: Option<u32>) -> u32 {
        self.asset_lifetime_by_technology
            .get(technology)
            .copied()
            .or(table_lifetime)
            .unwrap_or(self.default_asset_lifetime)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.start_year == 0 {
            return Err("start_year must be positive (the base year is start_year - 1)".into());
        }

        if self.end_year < self.start_year {
            return Err(format!(
                "end_year ({}) must not precede start_year ({})",
                self.end_year, self.start_year
            ));
        }

        if !self.carbon_budget.total.is_finite() || self.carbon_budget.total <= 0.0 {
            return Err(format!(
                "carbon_budget.total must be positive, got {}",
                self.carbon_budget.total
            ));
        }

        if self.carbon_cost.initial_cost < 0.0 || self.carbon_cost.final_cost < 0.0 {
            return Err("carbon costs must not be negative".into());
        }

        if self.carbon_cost.technology_multipliers.values().any(|m| *m < 0.0) {
            return Err("carbon cost multipliers must not be negative".into());
        }

        self.ranking.validate()?;

        if !(0.0..=1.0).contains(&self.max_annual_brownfield_share) {
            return Err(format!(
                "max_annual_brownfield_share ({}) must lie in [0, 1]",
                self.max_annual_brownfield_share
            ));
        }

        if !(0.0..1.0).contains(&self.capacity_tolerance) {
            return Err(format!(
                "capacity_tolerance ({}) must lie in [0, 1)",
                self.capacity_tolerance
            ));
        }

        if let Some(capacity) = self.standard_asset_capacity {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(format!("standard_asset_capacity must be positive, got {}", capacity));
            }
        }

        if self.default_asset_lifetime == 0
            || self.asset_lifetime_by_technology.values().any(|l| *l == 0)
        {
            return Err("asset lifetimes must be positive".into());
        }

        for spec in &self.constraints {
            spec.validate()?;
        }

        Ok(())
    }
}
