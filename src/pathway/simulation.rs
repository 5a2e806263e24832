//! Pathway orchestrator: the yearly simulation loop
//!
//! A [`SimulationPathway`] owns everything a run needs: the sealed snapshots,
//! the carbon budget, the ranking engine, the constraint chain, the transition
//! registry and the single seeded random source. Years run strictly in order;
//! a run can be stopped between years and the last sealed snapshot stays valid.

use ahash::AHashSet;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::PathwayConfig;
use crate::core::error::{PathwayError, Result};
use crate::core::types::{AssetId, Year};
use crate::pathway::agents::{brownfield, decommission, greenfield, YearContext};
use crate::pathway::asset::{AssetFilter, AssetStack, AssetStatus, StackSnapshot};
use crate::pathway::carbon_budget::CarbonBudget;
use crate::pathway::constraints::{Constraint, ConstraintChain};
use crate::pathway::inputs::{DataImporter, DemandSeries, TechnologyTable};
use crate::pathway::ranking::RankingEngine;
use crate::pathway::transition::{TransitionKind, TransitionRegistry};

/// Relative slack before realized emissions count as over the ceiling
const BUDGET_EPSILON: f64 = 1e-9;

/// Greenfield could not close a capacity gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmetDemandWarning {
    pub year: Year,
    pub sector: String,
    pub region: String,
    pub demand: f64,
    /// Capacity when the last candidate was exhausted
    pub capacity: f64,
    pub shortfall: f64,
}

/// A market ended the year with capacity above demand plus tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurplusCapacityWarning {
    pub year: Year,
    pub sector: String,
    pub region: String,
    pub demand: f64,
    pub capacity: f64,
    pub surplus: f64,
}

/// Realized emissions ended a year above its ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetExceededSignal {
    pub year: Year,
    pub emissions: f64,
    pub limit: f64,
    pub excess: f64,
}

/// Result of one simulated year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearOutcome {
    pub year: Year,
    pub total_capacity: f64,
    pub emissions: f64,
    pub emission_limit: f64,
    pub decommissions: usize,
    pub brownfields: usize,
    pub greenfields: usize,
    /// Candidates rejected by the constraint chain
    pub denied_candidates: usize,
    pub unmet_demand: Vec<UnmetDemandWarning>,
    /// Markets still oversupplied once every pass has run
    pub surplus_capacity: Vec<SurplusCapacityWarning>,
    pub budget_exceeded: Option<BudgetExceededSignal>,
}

impl YearOutcome {
    pub fn total_shortfall(&self) -> f64 {
        self.unmet_demand.iter().map(|w| w.shortfall).sum()
    }

    pub fn total_surplus(&self) -> f64 {
        self.surplus_capacity.iter().map(|w| w.surplus).sum()
    }
}

/// Markets whose capacity exceeds `demand * (1 + tolerance)`
fn surplus_markets(stack: &AssetStack, demand: &DemandSeries, year: Year, tolerance: f64) -> Vec<SurplusCapacityWarning> {
    demand
        .markets(year)
        .filter_map(|(sector, region, demand)| {
            let capacity = stack.total_capacity(&AssetFilter::market(sector, region));
            let ceiling = demand * (1.0 + tolerance);
            if capacity <= ceiling * (1.0 + BUDGET_EPSILON) {
                return None;
            }
            tracing::warn!(
                "Capacity {:.3} exceeds demand {:.3} in {}/{} for {}",
                capacity,
                demand,
                sector,
                region,
                year
            );
            Some(SurplusCapacityWarning {
                year,
                sector: sector.to_string(),
                region: region.to_string(),
                demand,
                capacity,
                surplus: capacity - demand,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathwayState {
    Initialized,
    /// The contained year is the last one sealed
    Running(Year),
    Completed,
}

/// A single simulation run over the configured horizon
pub struct SimulationPathway {
    config: PathwayConfig,
    technologies: TechnologyTable,
    demand: DemandSeries,
    budget: CarbonBudget,
    ranking: RankingEngine,
    chain: ConstraintChain,
    /// Index 0 is the base year (`start_year - 1`)
    snapshots: Vec<StackSnapshot>,
    registry: TransitionRegistry,
    outcomes: Vec<YearOutcome>,
    state: PathwayState,
    rng: ChaCha8Rng,
}

impl SimulationPathway {
    /// Validate the config, load every input and seal the base-year snapshot
    pub fn new<I: DataImporter>(config: PathwayConfig, importer: &I) -> Result<Self> {
        config.validate().map_err(PathwayError::InvalidConfig)?;

        let technologies = importer.technology_table()?;
        let demand = importer.demand_series()?;
        let initial = importer.initial_stack()?;

        for asset in initial.iter() {
            if !technologies.is_registered(asset.technology.as_str()) {
                return Err(PathwayError::UnregisteredTechnology(asset.technology.clone()));
            }
            if asset.status == AssetStatus::Decommissioned {
                return Err(PathwayError::InvalidConfig(format!(
                    "initial stack contains decommissioned {}",
                    asset.id
                )));
            }
        }

        let budget = CarbonBudget::from_config(&config)?;
        let ranking = RankingEngine::from_config(&config)?;
        let chain = ConstraintChain::from_specs(&config.constraints);
        let rng = ChaCha8Rng::seed_from_u64(config.random_seed);

        tracing::info!(
            "Initialized pathway {}-{} with {} assets, {} technologies, constraints {:?}",
            config.start_year,
            config.end_year,
            initial.len(),
            technologies.technologies().count(),
            chain.names()
        );

        let base = initial.seal(config.start_year - 1);
        Ok(Self {
            config,
            technologies,
            demand,
            budget,
            ranking,
            chain,
            snapshots: vec![base],
            registry: TransitionRegistry::new(),
            outcomes: Vec::new(),
            state: PathwayState::Initialized,
            rng,
        })
    }

    /// Append a custom constraint to the end of the chain
    pub fn push_constraint(&mut self, constraint: Box<dyn Constraint>) {
        self.chain.push(constraint);
    }

    pub fn config(&self) -> &PathwayConfig {
        &self.config
    }

    pub fn state(&self) -> PathwayState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == PathwayState::Completed
    }

    /// Year the next call to [`advance_year`](Self::advance_year) simulates
    pub fn next_year(&self) -> Option<Year> {
        match self.state {
            PathwayState::Initialized => Some(self.config.start_year),
            PathwayState::Running(year) => Some(year + 1),
            PathwayState::Completed => None,
        }
    }

    pub fn snapshots(&self) -> &[StackSnapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, year: Year) -> Option<&StackSnapshot> {
        let base = self.config.start_year - 1;
        let index = year.checked_sub(base)? as usize;
        self.snapshots.get(index)
    }

    pub fn latest_snapshot(&self) -> &StackSnapshot {
        // The base snapshot is pushed in `new` and snapshots are never removed
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn registry(&self) -> &TransitionRegistry {
        &self.registry
    }

    pub fn outcomes(&self) -> &[YearOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, year: Year) -> Option<&YearOutcome> {
        self.outcomes.iter().find(|o| o.year == year)
    }

    pub fn budget(&self) -> &CarbonBudget {
        &self.budget
    }

    pub fn technologies(&self) -> &TechnologyTable {
        &self.technologies
    }

    pub fn demand(&self) -> &DemandSeries {
        &self.demand
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    /// Simulate one year and seal its snapshot
    ///
    /// Nothing is committed if an agent fails; the pathway stays at the last
    /// sealed year.
    pub fn advance_year(&mut self) -> Result<&YearOutcome> {
        let year = self
            .next_year()
            .ok_or(PathwayError::AlreadyCompleted(self.config.end_year))?;
        let working = self.latest_snapshot().to_working();

        // Work on a copy of the random source so a failed year leaves it untouched
        let mut rng = self.rng.clone();
        let mut ctx = YearContext::new(
            year,
            working,
            &self.config,
            &self.technologies,
            &self.demand,
            &self.budget,
            &self.chain,
            &self.ranking,
            &mut rng,
        );
        decommission::run(&mut ctx)?;
        brownfield::run(&mut ctx)?;
        greenfield::run(&mut ctx)?;
        let result = ctx.finish();
        let surplus_capacity = surplus_markets(&result.stack, &self.demand, year, self.config.capacity_tolerance);

        let emissions = result.stack.total_emissions(&AssetFilter::all());
        let total_capacity = result.stack.total_capacity(&AssetFilter::all());
        let limit = self.budget.limit_for_year(year)?;
        self.budget.record_actual(year, emissions)?;

        let budget_exceeded = (emissions > limit * (1.0 + BUDGET_EPSILON)).then(|| {
            tracing::warn!(
                "Emissions {:.3} exceed the {} ceiling of {:.3}",
                emissions,
                year,
                limit
            );
            BudgetExceededSignal {
                year,
                emissions,
                limit,
                excess: emissions - limit,
            }
        });

        let mut outcome = YearOutcome {
            year,
            total_capacity,
            emissions,
            emission_limit: limit,
            decommissions: 0,
            brownfields: 0,
            greenfields: 0,
            denied_candidates: result.denied,
            unmet_demand: result.unmet_demand,
            surplus_capacity,
            budget_exceeded,
        };
        for transition in result.transitions {
            match transition.kind {
                TransitionKind::Decommission { .. } => outcome.decommissions += 1,
                TransitionKind::Brownfield { .. } => outcome.brownfields += 1,
                TransitionKind::Greenfield { .. } => outcome.greenfields += 1,
            }
            self.registry.record(transition);
        }

        tracing::info!(
            "Year {}: {} decommissioned, {} brownfield, {} greenfield, emissions {:.3} / {:.3}",
            year,
            outcome.decommissions,
            outcome.brownfields,
            outcome.greenfields,
            emissions,
            limit
        );

        self.rng = rng;
        self.snapshots.push(result.stack.seal(year));
        self.state = if year >= self.config.end_year {
            PathwayState::Completed
        } else {
            PathwayState::Running(year)
        };
        self.outcomes.push(outcome);
        Ok(&self.outcomes[self.outcomes.len() - 1])
    }

    /// Run every remaining year
    pub fn run(&mut self) -> Result<()> {
        while !self.is_completed() {
            self.advance_year()?;
        }
        tracing::info!(
            "Pathway complete: {} transitions, {:.3} of {:.3} budget consumed",
            self.registry.len(),
            self.budget.consumed_to_date(),
            self.budget.total()
        );
        Ok(())
    }

    /// Run up to and including `year`, then stop
    pub fn run_until(&mut self, year: Year) -> Result<()> {
        while let Some(next) = self.next_year() {
            if next > year {
                break;
            }
            self.advance_year()?;
        }
        Ok(())
    }

    /// Check that every transition refers to an asset from the previous year's
    /// snapshot, or to a fresh id for greenfield
    pub fn check_referential_integrity(&self) -> Result<()> {
        let mut created: AHashSet<AssetId> = AHashSet::new();
        let mut touched: AHashSet<(Year, AssetId)> = AHashSet::new();
        let mut last_year = None;

        for t in self.registry.iter() {
            if last_year.map_or(false, |y| t.year < y) {
                return Err(PathwayError::IntegrityViolation(format!(
                    "transition for {} in {} recorded after year {:?}",
                    t.asset_id, t.year, last_year
                )));
            }
            last_year = Some(t.year);

            let previous = t
                .year
                .checked_sub(1)
                .and_then(|y| self.snapshot(y))
                .ok_or_else(|| {
                    PathwayError::IntegrityViolation(format!(
                        "no snapshot precedes transition year {}",
                        t.year
                    ))
                })?;

            match t.kind {
                TransitionKind::Greenfield { .. } => {
                    if previous.stack().contains(t.asset_id)
                        || t.asset_id < previous.stack().next_id()
                        || !created.insert(t.asset_id)
                    {
                        return Err(PathwayError::IntegrityViolation(format!(
                            "greenfield in {} reuses {}",
                            t.year, t.asset_id
                        )));
                    }
                }
                TransitionKind::Decommission { .. } | TransitionKind::Brownfield { .. } => {
                    if !previous.stack().contains(t.asset_id) {
                        return Err(PathwayError::IntegrityViolation(format!(
                            "{} in {} refers to {}, absent from the {} snapshot",
                            t.kind.label(),
                            t.year,
                            t.asset_id,
                            previous.year()
                        )));
                    }
                }
            }

            if !touched.insert((t.year, t.asset_id)) {
                return Err(PathwayError::IntegrityViolation(format!(
                    "{} has more than one transition in {}",
                    t.asset_id, t.year
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Technology, TechnologyClass};
    use crate::pathway::asset::Asset;
    use crate::pathway::carbon_budget::BudgetShape;
    use crate::pathway::inputs::{DemandRow, PathwayInputs, TechnologyInfo, TechnologyRecord, TechnologyRow};

    fn inputs() -> PathwayInputs {
        let technologies = vec![
            ("Coal", TechnologyClass::Initial, 100.0, 1.0),
            ("Gas", TechnologyClass::Transition, 120.0, 0.5),
        ];
        let mut infos = Vec::new();
        let mut rows = Vec::new();
        for (name, class, cost, intensity) in technologies {
            infos.push(TechnologyInfo {
                technology: Technology::from(name),
                sector: "steel".to_string(),
                class,
                available_from: 2000,
                lifetime: None,
            });
            for year in 2025..=2030 {
                rows.push(TechnologyRow {
                    year,
                    technology: Technology::from(name),
                    region: "Europe".to_string(),
                    record: TechnologyRecord {
                        levelized_cost: cost,
                        emission_intensity: intensity,
                        retrofit_capex: 0.0,
                    },
                });
            }
        }

        PathwayInputs {
            initial_assets: vec![Asset {
                id: AssetId(1),
                sector: "steel".to_string(),
                region: "Europe".to_string(),
                technology: Technology::from("Coal"),
                capacity: 100.0,
                emission_intensity: 1.0,
                commissioning_year: 2020,
                status: AssetStatus::Operating,
                renewed_in: None,
            }],
            technologies: infos,
            technology_data: rows,
            demand: (2025..=2030)
                .map(|year| DemandRow {
                    year,
                    sector: "steel".to_string(),
                    region: "Europe".to_string(),
                    demand: 100.0 + 10.0 * (year - 2025) as f64,
                })
                .collect(),
        }
    }

    fn config() -> PathwayConfig {
        let mut config = PathwayConfig {
            start_year: 2025,
            end_year: 2030,
            ..PathwayConfig::default()
        };
        config.carbon_budget.total = 10_000.0;
        config.carbon_budget.shape = BudgetShape::Flat;
        config
    }

    #[test]
    fn test_state_machine() {
        let mut pathway = SimulationPathway::new(config(), &inputs()).unwrap();
        assert_eq!(pathway.state(), PathwayState::Initialized);
        assert_eq!(pathway.latest_snapshot().year(), 2024);

        pathway.advance_year().unwrap();
        assert_eq!(pathway.state(), PathwayState::Running(2025));

        pathway.run_until(2027).unwrap();
        assert_eq!(pathway.state(), PathwayState::Running(2027));
        assert_eq!(pathway.snapshots().len(), 4);

        pathway.run().unwrap();
        assert!(pathway.is_completed());
        assert_eq!(pathway.next_year(), None);
        assert!(matches!(
            pathway.advance_year(),
            Err(PathwayError::AlreadyCompleted(2030))
        ));
    }

    #[test]
    fn test_demand_growth_met_each_year() {
        let mut pathway = SimulationPathway::new(config(), &inputs()).unwrap();
        pathway.run().unwrap();

        for outcome in pathway.outcomes() {
            let demand = pathway.demand().demand(outcome.year, "steel", "Europe").unwrap();
            assert!((outcome.total_capacity - demand).abs() < 1e-9);
            assert!(outcome.unmet_demand.is_empty());
        }
        assert_eq!(pathway.outcome(2025).unwrap().greenfields, 0);
        assert_eq!(pathway.outcome(2026).unwrap().greenfields, 1);
        pathway.check_referential_integrity().unwrap();
    }

    #[test]
    fn test_budget_signal_reported() {
        let mut config = config();
        config.carbon_budget.total = 60.0;
        config.constraints.clear();

        let mut pathway = SimulationPathway::new(config, &inputs()).unwrap();
        pathway.run().unwrap();

        // 10 per year against 100+ emitted
        for outcome in pathway.outcomes() {
            let signal = outcome.budget_exceeded.as_ref().unwrap();
            assert!((signal.excess - (outcome.emissions - 10.0)).abs() < 1e-9);
        }
        assert!(pathway.budget().remaining_budget() < 0.0);
    }

    #[test]
    fn test_surplus_retired_and_remainder_reported() {
        let mut inputs = inputs();
        let mut second = inputs.initial_assets[0].clone();
        second.id = AssetId(2);
        inputs.initial_assets[0].capacity = 150.0;
        second.capacity = 150.0;
        inputs.initial_assets.push(second);
        for row in &mut inputs.demand {
            row.demand = 100.0;
        }
        let mut config = config();
        config.end_year = 2025;
        config.constraints.clear();

        let mut pathway = SimulationPathway::new(config, &inputs).unwrap();
        let outcome = pathway.advance_year().unwrap().clone();

        // One 150 asset fits inside the 200 surplus, the second would leave a gap
        assert_eq!(outcome.decommissions, 1);
        assert_eq!(outcome.total_capacity, 150.0);
        assert_eq!(outcome.surplus_capacity.len(), 1);
        let warning = &outcome.surplus_capacity[0];
        assert_eq!((warning.sector.as_str(), warning.region.as_str()), ("steel", "Europe"));
        assert_eq!(warning.surplus, 50.0);
        assert_eq!(outcome.total_surplus(), 50.0);
    }

    #[test]
    fn test_surplus_reported_when_retirement_disabled() {
        let mut inputs = inputs();
        inputs.initial_assets[0].capacity = 130.0;
        let mut config = config();
        config.decommission_surplus = false;
        config.capacity_tolerance = 0.2;

        let mut pathway = SimulationPathway::new(config, &inputs).unwrap();
        pathway.run_until(2026).unwrap();

        // 130 against 100 is past the 20% tolerance; 130 against 110 is not
        let first = pathway.outcome(2025).unwrap();
        assert_eq!(first.decommissions, 0);
        assert_eq!(first.surplus_capacity.len(), 1);
        assert_eq!(first.surplus_capacity[0].surplus, 30.0);
        assert!(pathway.outcome(2026).unwrap().surplus_capacity.is_empty());
    }

    #[test]
    fn test_unregistered_initial_technology_rejected() {
        let mut inputs = inputs();
        inputs.initial_assets[0].technology = Technology::from("Bessemer");
        assert!(matches!(
            SimulationPathway::new(config(), &inputs),
            Err(PathwayError::UnregisteredTechnology(_))
        ));
    }

    #[test]
    fn test_integrity_check_catches_tampering() {
        let mut pathway = SimulationPathway::new(config(), &inputs()).unwrap();
        pathway.run().unwrap();

        pathway.registry.record(crate::pathway::transition::Transition {
            asset_id: AssetId(999),
            year: 2030,
            sector: "steel".to_string(),
            region: "Europe".to_string(),
            capacity: 1.0,
            kind: TransitionKind::Decommission {
                origin: Technology::from("Coal"),
                reason: crate::pathway::transition::DecommissionReason::Surplus,
            },
            realized_cost: 0.0,
            rank: None,
        });
        assert!(matches!(
            pathway.check_referential_integrity(),
            Err(PathwayError::IntegrityViolation(_))
        ));
    }
}
