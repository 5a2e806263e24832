//! Tabular run output and serialization

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::Result;
use crate::core::types::{AssetId, Technology, Year};
use crate::pathway::asset::{AssetStatus, StackSnapshot};
use crate::pathway::simulation::{SimulationPathway, SurplusCapacityWarning, UnmetDemandWarning};
use crate::pathway::transition::TransitionRecord;

/// One asset in one year's snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRow {
    pub year: Year,
    pub asset_id: AssetId,
    pub sector: String,
    pub region: String,
    pub technology: Technology,
    pub capacity: f64,
    pub emission_intensity: f64,
    pub emissions: f64,
    pub commissioning_year: Year,
    pub renewed_in: Option<Year>,
    pub status: AssetStatus,
}

impl StackRow {
    pub fn from_snapshot(snapshot: &StackSnapshot) -> Vec<Self> {
        snapshot
            .stack()
            .iter()
            .map(|asset| Self {
                year: snapshot.year(),
                asset_id: asset.id,
                sector: asset.sector.clone(),
                region: asset.region.clone(),
                technology: asset.technology.clone(),
                capacity: asset.capacity,
                emission_intensity: asset.emission_intensity,
                emissions: asset.emissions(),
                commissioning_year: asset.commissioning_year,
                renewed_in: asset.renewed_in,
                status: asset.status,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: Year,
    pub assets: usize,
    pub total_capacity: f64,
    pub emissions: f64,
    pub emission_limit: f64,
    pub budget_remaining: f64,
    pub decommissions: usize,
    pub brownfields: usize,
    pub greenfields: usize,
    pub unmet_demand: f64,
    pub surplus_capacity: f64,
    pub budget_exceeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub start_year: Year,
    pub end_year: Year,
    pub years_simulated: usize,
    pub random_seed: u64,
    pub total_transitions: usize,
    pub budget_total: f64,
    pub budget_consumed: f64,
    pub years_over_budget: usize,
}

/// Everything an export or reporting collaborator needs from a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayOutput {
    pub stats: RunStats,
    pub years: Vec<YearSummary>,
    pub stacks: Vec<StackRow>,
    pub transitions: Vec<TransitionRecord>,
    pub unmet_demand: Vec<UnmetDemandWarning>,
    pub surplus_capacity: Vec<SurplusCapacityWarning>,
}

impl PathwayOutput {
    pub fn from_pathway(pathway: &SimulationPathway) -> Self {
        let config = pathway.config();
        let budget = pathway.budget();

        let mut consumed = 0.0;
        let years: Vec<YearSummary> = pathway
            .outcomes()
            .iter()
            .map(|outcome| {
                consumed += outcome.emissions;
                YearSummary {
                    year: outcome.year,
                    assets: pathway
                        .snapshot(outcome.year)
                        .map_or(0, |s| s.stack().len()),
                    total_capacity: outcome.total_capacity,
                    emissions: outcome.emissions,
                    emission_limit: outcome.emission_limit,
                    budget_remaining: budget.total() - consumed,
                    decommissions: outcome.decommissions,
                    brownfields: outcome.brownfields,
                    greenfields: outcome.greenfields,
                    unmet_demand: outcome.total_shortfall(),
                    surplus_capacity: outcome.total_surplus(),
                    budget_exceeded: outcome.budget_exceeded.is_some(),
                }
            })
            .collect();

        let stats = RunStats {
            start_year: config.start_year,
            end_year: config.end_year,
            years_simulated: years.len(),
            random_seed: config.random_seed,
            total_transitions: pathway.registry().len(),
            budget_total: budget.total(),
            budget_consumed: budget.consumed_to_date(),
            years_over_budget: years.iter().filter(|y| y.budget_exceeded).count(),
        };

        Self {
            stats,
            years,
            stacks: pathway
                .snapshots()
                .iter()
                .flat_map(StackRow::from_snapshot)
                .collect(),
            transitions: pathway.registry().to_records(),
            unmet_demand: pathway
                .outcomes()
                .iter()
                .flat_map(|o| o.unmet_demand.iter().cloned())
                .collect(),
            surplus_capacity: pathway
                .outcomes()
                .iter()
                .flat_map(|o| o.surplus_capacity.iter().cloned())
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Simulated {} years ({}-{}), {} transitions\nBudget: {:.1} of {:.1} consumed, {} years over ceiling",
            self.stats.years_simulated,
            self.stats.start_year,
            self.stats.end_year,
            self.stats.total_transitions,
            self.stats.budget_consumed,
            self.stats.budget_total,
            self.stats.years_over_budget,
        )];

        for y in &self.years {
            let mut line = format!(
                "  {}: {} assets, capacity {:.1}, emissions {:.1}/{:.1} (-{} ~{} +{})",
                y.year,
                y.assets,
                y.total_capacity,
                y.emissions,
                y.emission_limit,
                y.decommissions,
                y.brownfields,
                y.greenfields,
            );
            if y.unmet_demand > 0.0 {
                line.push_str(&format!(" unmet {:.1}", y.unmet_demand));
            }
            if y.surplus_capacity > 0.0 {
                line.push_str(&format!(" surplus {:.1}", y.surplus_capacity));
            }
            if y.budget_exceeded {
                line.push_str(" OVER BUDGET");
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}
