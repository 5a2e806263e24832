//! Carbon budget: annual emission ceilings and consumed-to-date accounting
//!
//! A budget spreads a cumulative allowance over the horizon according to a shape.
//! The ceilings always sum to the allowance; the shape only decides how the
//! allowance is distributed across years.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::PathwayConfig;
use crate::core::error::{PathwayError, Result};
use crate::core::types::Year;

/// Relative slack when checking that ceilings do not increase
const MONOTONIC_EPSILON: f64 = 1e-12;

/// How the cumulative allowance is spread over the years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetShape {
    /// Equal ceiling every year
    Flat,
    /// Constant annual decrease; the final ceiling is `end_fraction` of the first
    Linear { end_fraction: f64 },
    /// Ceiling shrinks by `rate` (a fraction) every year
    Exponential { rate: f64 },
    /// User-supplied curve, resampled onto the horizon and rescaled
    Curve { points: Vec<f64> },
}

impl BudgetShape {
    /// Unnormalized weight per year for a horizon of `years` years
    fn weights(&self, years: usize) -> std::result::Result<Vec<f64>, String> {
        let weights = match self {
            BudgetShape::Flat => vec![1.0; years],
            BudgetShape::Linear { end_fraction } => {
                if !end_fraction.is_finite() || *end_fraction < 0.0 {
                    return Err(format!("linear end_fraction must be >= 0, got {}", end_fraction));
                }
                if years == 1 {
                    vec![1.0]
                } else {
                    let step = (1.0 - end_fraction) / (years - 1) as f64;
                    (0..years).map(|i| 1.0 - step * i as f64).collect()
                }
            }
            BudgetShape::Exponential { rate } => {
                if !rate.is_finite() || *rate >= 1.0 {
                    return Err(format!("exponential rate must be < 1, got {}", rate));
                }
                (0..years).map(|i| (1.0 - rate).powi(i as i32)).collect()
            }
            BudgetShape::Curve { points } => {
                if points.is_empty() {
                    return Err("curve needs at least one point".into());
                }
                if points.iter().any(|p| !p.is_finite() || *p < 0.0) {
                    return Err("curve points must be finite and non-negative".into());
                }
                resample(points, years)
            }
        };
        Ok(weights)
    }
}

/// Linear interpolation of `points` onto `years` evenly spaced samples
fn resample(points: &[f64], years: usize) -> Vec<f64> {
    if points.len() == years {
        return points.to_vec();
    }
    if points.len() == 1 || years == 1 {
        return vec![points[0]; years];
    }

    let last = (points.len() - 1) as f64;
    (0..years)
        .map(|i| {
            let t = i as f64 * last / (years - 1) as f64;
            let lo = t.floor() as usize;
            let hi = (lo + 1).min(points.len() - 1);
            let frac = t - lo as f64;
            points[lo] + (points[hi] - points[lo]) * frac
        })
        .collect()
}

/// Annual emission ceilings plus realized emissions per year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonBudget {
    start_year: Year,
    end_year: Year,
    total: f64,
    shape: BudgetShape,
    /// Ceiling per year, index 0 = start_year
    ceilings: Vec<f64>,
    /// Realized emissions recorded per year
    actuals: BTreeMap<Year, f64>,
}

impl CarbonBudget {
    /// Build a non-increasing budget
    pub fn build(shape: BudgetShape, start_year: Year, end_year: Year, total_budget: f64) -> Result<Self> {
        Self::build_with(shape, start_year, end_year, total_budget, false)
    }

    pub fn build_with(
        shape: BudgetShape,
        start_year: Year,
        end_year: Year,
        total_budget: f64,
        allow_increasing: bool,
    ) -> Result<Self> {
        if end_year < start_year {
            return Err(PathwayError::InvalidConfig(format!(
                "budget end year {} precedes start year {}",
                end_year, start_year
            )));
        }
        if !total_budget.is_finite() || total_budget <= 0.0 {
            return Err(PathwayError::InvalidConfig(format!(
                "total carbon budget must be positive, got {}",
                total_budget
            )));
        }

        let years = (end_year - start_year + 1) as usize;
        let weights = shape.weights(years).map_err(PathwayError::InvalidConfig)?;

        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return Err(PathwayError::InvalidConfig(
                "budget shape assigns no weight to any year".into(),
            ));
        }

        if !allow_increasing {
            let rising = weights
                .windows(2)
                .position(|w| w[1] > w[0] * (1.0 + MONOTONIC_EPSILON) + MONOTONIC_EPSILON);
            if let Some(i) = rising {
                return Err(PathwayError::InvalidConfig(format!(
                    "budget ceiling rises between {} and {}",
                    start_year + i as Year,
                    start_year + i as Year + 1
                )));
            }
        }

        let ceilings = weights
            .iter()
            .map(|w| total_budget * w / weight_sum)
            .collect();

        Ok(Self {
            start_year,
            end_year,
            total: total_budget,
            shape,
            ceilings,
            actuals: BTreeMap::new(),
        })
    }

    pub fn from_config(config: &PathwayConfig) -> Result<Self> {
        Self::build_with(
            config.carbon_budget.shape.clone(),
            config.start_year,
            config.end_year,
            config.carbon_budget.total,
            config.carbon_budget.allow_increasing,
        )
    }

    pub fn start_year(&self) -> Year {
        self.start_year
    }

    pub fn end_year(&self) -> Year {
        self.end_year
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn shape(&self) -> &BudgetShape {
        &self.shape
    }

    fn index(&self, year: Year) -> Result<usize> {
        if year < self.start_year || year > self.end_year {
            return Err(PathwayError::OutOfRange {
                year,
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok((year - self.start_year) as usize)
    }

    /// Annual emission ceiling for a year
    pub fn limit_for_year(&self, year: Year) -> Result<f64> {
        Ok(self.ceilings[self.index(year)?])
    }

    /// Sum of ceilings from the start year up to and including `year`
    pub fn cumulative_limit(&self, year: Year) -> Result<f64> {
        let i = self.index(year)?;
        Ok(self.ceilings[..=i].iter().sum())
    }

    pub fn annual_limits(&self) -> impl Iterator<Item = (Year, f64)> + '_ {
        self.ceilings
            .iter()
            .enumerate()
            .map(move |(i, c)| (self.start_year + i as Year, *c))
    }

    /// Record realized emissions for a year; recording a year again replaces it
    pub fn record_actual(&mut self, year: Year, emissions: f64) -> Result<()> {
        self.index(year)?;
        if !emissions.is_finite() {
            return Err(PathwayError::InvalidConfig(format!(
                "realized emissions for {} are not finite",
                year
            )));
        }
        self.actuals.insert(year, emissions);
        Ok(())
    }

    pub fn actual_for_year(&self, year: Year) -> Option<f64> {
        self.actuals.get(&year).copied()
    }

    pub fn consumed_to_date(&self) -> f64 {
        self.actuals.values().sum()
    }

    /// Allowance left; negative once the budget is overspent
    pub fn remaining_budget(&self) -> f64 {
        self.total - self.consumed_to_date()
    }
}
