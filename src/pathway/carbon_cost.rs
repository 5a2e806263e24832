//! Carbon price trajectory used to bias the ranking metric

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::PathwayConfig;
use crate::core::error::{PathwayError, Result};
use crate::core::types::Year;

/// Interpolation between the initial and final carbon cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostShape {
    /// Initial cost throughout
    Constant,
    Linear,
    /// S-curve; larger `steepness` concentrates the increase mid-horizon
    Logistic { steepness: f64 },
    /// Constant growth rate (falls back to linear when either endpoint is zero)
    Exponential,
}

/// Year -> cost per unit of emissions, optionally scaled per technology
#[derive(Debug, Clone)]
pub struct CarbonCostTrajectory {
    shape: CostShape,
    start_year: Year,
    end_year: Year,
    initial_cost: f64,
    final_cost: f64,
    multipliers: AHashMap<String, f64>,
}

impl CarbonCostTrajectory {
    pub fn new(
        shape: CostShape,
        start_year: Year,
        end_year: Year,
        initial_cost: f64,
        final_cost: f64,
    ) -> Result<Self> {
        if let CostShape::Logistic { steepness } = shape {
            if !steepness.is_finite() || steepness <= 0.0 {
                return Err(PathwayError::InvalidConfig(format!(
                    "logistic steepness must be positive, got {}",
                    steepness
                )));
            }
        }
        if initial_cost < 0.0 || final_cost < 0.0 {
            return Err(PathwayError::InvalidConfig("carbon costs must not be negative".into()));
        }

        Ok(Self {
            shape,
            start_year,
            end_year,
            initial_cost,
            final_cost,
            multipliers: AHashMap::new(),
        })
    }

    /// A trajectory that never adds a carbon term
    pub fn zero(start_year: Year, end_year: Year) -> Self {
        Self {
            shape: CostShape::Constant,
            start_year,
            end_year,
            initial_cost: 0.0,
            final_cost: 0.0,
            multipliers: AHashMap::new(),
        }
    }

    pub fn from_config(config: &PathwayConfig) -> Result<Self> {
        let cost = &config.carbon_cost;
        let mut trajectory = Self::new(
            cost.shape.clone(),
            config.start_year,
            config.end_year,
            cost.initial_cost,
            cost.final_cost,
        )?;
        for (technology, multiplier) in &cost.technology_multipliers {
            trajectory = trajectory.with_multiplier(technology.as_str(), *multiplier);
        }
        Ok(trajectory)
    }

    /// Scale the cost seen by one technology
    pub fn with_multiplier(mut self, technology: &str, multiplier: f64) -> Self {
        self.multipliers.insert(technology.to_string(), multiplier);
        self
    }

    /// Position of `year` in the horizon, clamped to [0, 1]
    fn progress(&self, year: Year) -> f64 {
        if self.end_year <= self.start_year {
            return if year > self.start_year { 1.0 } else { 0.0 };
        }
        let elapsed = year as f64 - self.start_year as f64;
        let span = (self.end_year - self.start_year) as f64;
        (elapsed / span).clamp(0.0, 1.0)
    }

    /// Carbon cost before technology conditioning
    pub fn base_cost(&self, year: Year) -> f64 {
        let t = self.progress(year);
        let (a, b) = (self.initial_cost, self.final_cost);

        match self.shape {
            CostShape::Constant => a,
            CostShape::Linear => a + (b - a) * t,
            CostShape::Exponential if a > 0.0 && b > 0.0 => a * (b / a).powf(t),
            CostShape::Exponential => a + (b - a) * t,
            CostShape::Logistic { steepness } => {
                let s = |x: f64| 1.0 / (1.0 + (-steepness * (x - 0.5)).exp());
                let normalized = (s(t) - s(0.0)) / (s(1.0) - s(0.0));
                a + (b - a) * normalized
            }
        }
    }

    /// Cost per unit of emissions for a technology in a year
    pub fn cost_per_unit(&self, year: Year, technology: &str) -> f64 {
        let multiplier = self.multipliers.get(technology).copied().unwrap_or(1.0);
        self.base_cost(year) * multiplier
    }
}
