//! Ranking of candidate technologies
//!
//! Candidates are scored on cost (levelized cost plus the carbon cost of their
//! emissions) and emission intensity, both min-max normalized over the candidate
//! set and combined with configured weights. The score is then turned into a
//! comparative cost by one of two methods:
//!
//! - Histogram: the score range is cut into `n_bins` bins and the bin index is
//!   the comparative cost, so candidates sharing a bin tie.
//! - Uncertainty bins: each candidate's cost is drawn uniformly from
//!   `cost * (1 +/- relative_uncertainty)` before normalization, so near-tied
//!   candidates can trade places from one draw to the next.
//!
//! Ties are broken by earlier availability year, then by registration order.

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::config::PathwayConfig;
use crate::core::error::Result;
use crate::core::types::{AssetId, Technology, Year};
use crate::pathway::asset::Asset;
use crate::pathway::carbon_cost::CarbonCostTrajectory;
use crate::pathway::inputs::TechnologyTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    Histogram,
    UncertaintyBins,
}

/// Which decision a ranking feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankType {
    Brownfield,
    Greenfield,
    Decommission,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub cost: f64,
    pub emissions: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            cost: 1.0,
            emissions: 0.0,
        }
    }
}

impl RankingWeights {
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.cost.is_finite() || !self.emissions.is_finite() || self.cost < 0.0 || self.emissions < 0.0 {
            return Err("ranking weights must be finite and non-negative".into());
        }
        if self.cost + self.emissions <= 0.0 {
            return Err("ranking weights must not both be zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub method: RankingMethod,

    /// Number of histogram bins
    pub n_bins: usize,

    /// Half-width of the uniform draw around a score, as a fraction of the score
    pub relative_uncertainty: f64,

    /// Weights used when no per-kind override is set
    pub weights: RankingWeights,

    pub brownfield_weights: Option<RankingWeights>,
    pub greenfield_weights: Option<RankingWeights>,
    pub decommission_weights: Option<RankingWeights>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            method: RankingMethod::Histogram,
            n_bins: 50,
            relative_uncertainty: 0.05,
            weights: RankingWeights::default(),
            brownfield_weights: None,
            greenfield_weights: None,
            decommission_weights: None,
        }
    }
}

impl RankingConfig {
    pub fn weights_for(&self, kind: RankType) -> RankingWeights {
        let specific = match kind {
            RankType::Brownfield => self.brownfield_weights,
            RankType::Greenfield => self.greenfield_weights,
            RankType::Decommission => self.decommission_weights,
        };
        specific.unwrap_or(self.weights)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_bins == 0 {
            return Err("ranking.n_bins must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.relative_uncertainty) {
            return Err(format!(
                "ranking.relative_uncertainty ({}) must lie in [0, 1)",
                self.relative_uncertainty
            ));
        }
        self.weights.validate()?;
        for weights in [
            self.brownfield_weights,
            self.greenfield_weights,
            self.decommission_weights,
        ]
        .into_iter()
        .flatten()
        {
            weights.validate()?;
        }
        Ok(())
    }
}

/// A technology candidate with its scores and final position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub technology: Technology,
    pub available_from: Year,
    pub emission_intensity: f64,
    /// Cost per unit of capacity actually paid if chosen
    pub unit_cost: f64,
    /// `unit_cost` plus the carbon cost of the candidate's emissions
    pub total_cost: f64,
    pub score: f64,
    pub comparative_cost: f64,
    /// 1-based position in the ranking
    pub rank: usize,
}

/// Unscored candidate, in registration order
struct Entry {
    technology: Technology,
    available_from: Year,
    emission_intensity: f64,
    unit_cost: f64,
    total_cost: f64,
}

/// Min-max normalization; all-equal inputs map to 0
fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    values
        .iter()
        .map(|v| if span > 0.0 { (v - min) / span } else { 0.0 })
        .collect()
}

/// Uniform draw within `value * (1 +/- u)`; the band is ordered for negative values
fn draw_around(rng: &mut ChaCha8Rng, value: f64, u: f64) -> f64 {
    let (a, b) = (value * (1.0 - u), value * (1.0 + u));
    rng.gen_range(a.min(b)..=a.max(b))
}

/// Scores and ranks candidate technologies
#[derive(Debug, Clone)]
pub struct RankingEngine {
    config: RankingConfig,
    carbon_cost: CarbonCostTrajectory,
    /// Minimum batch size before rankings run on the rayon pool
    parallel_threshold: usize,
}

impl RankingEngine {
    pub fn new(config: RankingConfig, carbon_cost: CarbonCostTrajectory) -> Self {
        Self {
            config,
            carbon_cost,
            parallel_threshold: 64,
        }
    }

    pub fn from_config(config: &PathwayConfig) -> Result<Self> {
        let carbon_cost = CarbonCostTrajectory::from_config(config)?;
        Ok(Self::new(config.ranking.clone(), carbon_cost).with_parallel_threshold(config.parallel_threshold))
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn carbon_cost(&self) -> &CarbonCostTrajectory {
        &self.carbon_cost
    }

    /// Normalized weighted score, then the method-specific comparative cost
    fn comparative_costs(
        &self,
        kind: RankType,
        costs: &[f64],
        intensities: &[f64],
        rng: &mut ChaCha8Rng,
    ) -> (Vec<f64>, Vec<f64>) {
        let weights = self.config.weights_for(kind);
        let norm_cost = normalize(costs);
        let norm_emissions = normalize(intensities);
        let scores: Vec<f64> = norm_cost
            .iter()
            .zip(&norm_emissions)
            .map(|(c, e)| weights.cost * c + weights.emissions * e)
            .collect();

        let comparative = match self.config.method {
            RankingMethod::Histogram => {
                let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let span = max - min;
                let n_bins = self.config.n_bins.max(1);
                scores
                    .iter()
                    .map(|s| {
                        if span > 0.0 {
                            let bin = ((s - min) / span * n_bins as f64).floor() as usize;
                            bin.min(n_bins - 1) as f64
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
            RankingMethod::UncertaintyBins => {
                let u = self.config.relative_uncertainty;
                let drawn: Vec<f64> = costs.iter().map(|c| draw_around(rng, *c, u)).collect();
                normalize(&drawn)
                    .iter()
                    .zip(&norm_emissions)
                    .map(|(c, e)| weights.cost * c + weights.emissions * e)
                    .collect()
            }
        };
        (scores, comparative)
    }

    /// Sort entries best-first and attach ranks
    fn rank_entries(&self, kind: RankType, entries: Vec<Entry>, rng: &mut ChaCha8Rng) -> Vec<RankedCandidate> {
        if entries.is_empty() {
            return Vec::new();
        }

        let costs: Vec<f64> = entries.iter().map(|e| e.total_cost).collect();
        let intensities: Vec<f64> = entries.iter().map(|e| e.emission_intensity).collect();
        let (scores, comparative) = self.comparative_costs(kind, &costs, &intensities, rng);

        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| (OrderedFloat(comparative[i]), entries[i].available_from, i));

        let mut slots: Vec<Option<Entry>> = entries.into_iter().map(Some).collect();
        order
            .into_iter()
            .enumerate()
            .filter_map(|(position, i)| {
                slots[i].take().map(|entry| RankedCandidate {
                    technology: entry.technology,
                    available_from: entry.available_from,
                    emission_intensity: entry.emission_intensity,
                    unit_cost: entry.unit_cost,
                    total_cost: entry.total_cost,
                    score: scores[i],
                    comparative_cost: comparative[i],
                    rank: position + 1,
                })
            })
            .collect()
    }

    /// Rank the technologies an existing asset could run on, best first
    ///
    /// The asset's own technology is a candidate without retrofit capex; every
    /// other technology pays its retrofit capex on top of the levelized cost.
    pub fn rank_brownfield(
        &self,
        asset: &Asset,
        table: &TechnologyTable,
        year: Year,
        rng: &mut ChaCha8Rng,
    ) -> Vec<RankedCandidate> {
        let entries = table
            .available(&asset.sector, &asset.region, year)
            .into_iter()
            .map(|(info, record)| {
                let capex = if info.technology == asset.technology {
                    0.0
                } else {
                    record.retrofit_capex
                };
                let unit_cost = record.levelized_cost + capex;
                let carbon = self.carbon_cost.cost_per_unit(year, info.technology.as_str())
                    * record.emission_intensity;
                Entry {
                    technology: info.technology.clone(),
                    available_from: info.available_from,
                    emission_intensity: record.emission_intensity,
                    unit_cost,
                    total_cost: unit_cost + carbon,
                }
            })
            .collect();
        self.rank_entries(RankType::Brownfield, entries, rng)
    }

    /// Rank the technologies a new asset in a sector/region could use, best first
    pub fn rank_greenfield(
        &self,
        sector: &str,
        region: &str,
        table: &TechnologyTable,
        year: Year,
        rng: &mut ChaCha8Rng,
    ) -> Vec<RankedCandidate> {
        let entries = table
            .available(sector, region, year)
            .into_iter()
            .map(|(info, record)| {
                let carbon = self.carbon_cost.cost_per_unit(year, info.technology.as_str())
                    * record.emission_intensity;
                Entry {
                    technology: info.technology.clone(),
                    available_from: info.available_from,
                    emission_intensity: record.emission_intensity,
                    unit_cost: record.levelized_cost,
                    total_cost: record.levelized_cost + carbon,
                }
            })
            .collect();
        self.rank_entries(RankType::Greenfield, entries, rng)
    }

    /// Order assets worst-first for surplus decommissioning
    ///
    /// Assets whose technology has no data for the year are treated as worst and
    /// come first, in id order.
    pub fn rank_decommission(
        &self,
        assets: &[&Asset],
        table: &TechnologyTable,
        year: Year,
        rng: &mut ChaCha8Rng,
    ) -> Vec<AssetId> {
        let (priced, unpriced): (Vec<&Asset>, Vec<&Asset>) = assets
            .iter()
            .copied()
            .partition(|a| table.record(year, a.technology.as_str(), &a.region).is_some());

        let costs: Vec<f64> = priced
            .iter()
            .filter_map(|a| {
                table
                    .record(year, a.technology.as_str(), &a.region)
                    .map(|record| {
                        record.levelized_cost
                            + self.carbon_cost.cost_per_unit(year, a.technology.as_str()) * a.emission_intensity
                    })
            })
            .collect();
        let intensities: Vec<f64> = priced.iter().map(|a| a.emission_intensity).collect();

        let mut ranked: Vec<AssetId> = unpriced.iter().map(|a| a.id).collect();
        if !priced.is_empty() {
            let (_, comparative) = self.comparative_costs(RankType::Decommission, &costs, &intensities, rng);
            let mut order: Vec<usize> = (0..priced.len()).collect();
            order.sort_by_key(|&i| (std::cmp::Reverse(OrderedFloat(comparative[i])), priced[i].id));
            ranked.extend(order.into_iter().map(|i| priced[i].id));
        }
        ranked
    }

    /// Run one ranking per task, in parallel once the batch is large enough
    ///
    /// One seed per task is drawn from `rng` up front, in task order, so the
    /// result does not depend on how rayon schedules the tasks.
    pub fn rank_batch<T, R, F>(&self, tasks: &[T], rng: &mut ChaCha8Rng, rank: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T, &mut ChaCha8Rng) -> R + Sync + Send,
    {
        let seeds: Vec<u64> = tasks.iter().map(|_| rng.gen()).collect();

        if tasks.len() >= self.parallel_threshold {
            tasks
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(task, seed)| rank(task, &mut ChaCha8Rng::seed_from_u64(*seed)))
                .collect()
        } else {
            tasks
                .iter()
                .zip(&seeds)
                .map(|(task, seed)| rank(task, &mut ChaCha8Rng::seed_from_u64(*seed)))
                .collect()
        }
    }
}
