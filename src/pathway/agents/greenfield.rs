//! Greenfield procedure
//!
//! Closes the gap between capacity and demand in each sector/region by adding
//! new assets on the best admissible technology. A gap that cannot be closed is
//! reported as an [`UnmetDemandWarning`].

use crate::core::error::Result;
use crate::pathway::agents::YearContext;
use crate::pathway::asset::{AssetFilter, NewAsset};
use crate::pathway::constraints::CandidateTransition;
use crate::pathway::ranking::RankedCandidate;
use crate::pathway::simulation::UnmetDemandWarning;
use crate::pathway::transition::{Transition, TransitionKind};

/// Gaps smaller than this fraction of demand count as closed
const GAP_EPSILON: f64 = 1e-9;

/// One sector/region demand entry for the year
struct Market {
    sector: String,
    region: String,
    demand: f64,
}

pub fn run(ctx: &mut YearContext) -> Result<()> {
    let year = ctx.year;
    let markets: Vec<Market> = ctx
        .demand
        .markets(year)
        .map(|(sector, region, demand)| Market {
            sector: sector.to_string(),
            region: region.to_string(),
            demand,
        })
        .collect();

    // Rankings only depend on the year's tables, so one per market is enough
    let (ranking, technologies) = (ctx.ranking, ctx.technologies);
    let rankings = ranking.rank_batch(&markets, &mut *ctx.rng, |market, rng| {
        ranking.rank_greenfield(&market.sector, &market.region, technologies, year, rng)
    });

    for (market, candidates) in markets.iter().zip(&rankings) {
        fill_gap(ctx, market, candidates)?;
    }
    Ok(())
}

fn fill_gap(ctx: &mut YearContext, market: &Market, candidates: &[RankedCandidate]) -> Result<()> {
    let floor = market.demand * (1.0 - ctx.config.capacity_tolerance);

    loop {
        let capacity = ctx
            .stack
            .total_capacity(&AssetFilter::market(&market.sector, &market.region));
        if floor - capacity <= GAP_EPSILON * floor.max(1.0) {
            return Ok(());
        }

        let gap = market.demand - capacity;
        // Standard-sized assets are trimmed so the market ends within tolerance
        let headroom = market.demand * (1.0 + ctx.config.capacity_tolerance) - capacity;
        let size = ctx
            .config
            .standard_asset_capacity
            .map_or(gap, |standard| standard.min(headroom));

        let chosen = candidates.iter().find_map(|candidate| {
            let new_asset = NewAsset {
                sector: market.sector.clone(),
                region: market.region.clone(),
                technology: candidate.technology.clone(),
                capacity: size,
                emission_intensity: candidate.emission_intensity,
                commissioning_year: ctx.year,
            };
            let admitted = ctx.admit(&CandidateTransition::Greenfield { asset: &new_asset });
            admitted.then_some((new_asset, candidate))
        });

        let Some((new_asset, candidate)) = chosen else {
            tracing::warn!(
                year = ctx.year,
                sector = %market.sector,
                region = %market.region,
                shortfall = gap,
                "No admissible greenfield candidate, demand left unmet"
            );
            ctx.unmet_demand.push(UnmetDemandWarning {
                year: ctx.year,
                sector: market.sector.clone(),
                region: market.region.clone(),
                demand: market.demand,
                capacity,
                shortfall: gap,
            });
            return Ok(());
        };

        let capacity_added = new_asset.capacity;
        let intensity = new_asset.emission_intensity;
        let id = ctx.stack.apply_greenfield(new_asset)?;
        ctx.record(Transition {
            asset_id: id,
            year: ctx.year,
            sector: market.sector.clone(),
            region: market.region.clone(),
            capacity: capacity_added,
            kind: TransitionKind::Greenfield {
                destination: candidate.technology.clone(),
                emission_intensity: intensity,
            },
            realized_cost: candidate.unit_cost * capacity_added,
            rank: Some(candidate.rank),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PathwayConfig;
    use crate::core::types::{AssetId, Technology, TechnologyClass};
    use crate::pathway::asset::{Asset, AssetStack, AssetStatus};
    use crate::pathway::carbon_budget::{BudgetShape, CarbonBudget};
    use crate::pathway::constraints::{ConstraintChain, ConstraintSpec};
    use crate::pathway::inputs::{DemandSeries, TechnologyInfo, TechnologyRecord, TechnologyTable};
    use crate::pathway::ranking::RankingEngine;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn table() -> TechnologyTable {
        let mut table = TechnologyTable::new();
        for (name, cost) in [("SMR", 300.0), ("Electrolyser", 250.0)] {
            table.register(TechnologyInfo {
                technology: Technology::from(name),
                sector: "ammonia".to_string(),
                class: TechnologyClass::Transition,
                available_from: 2020,
                lifetime: None,
            });
            table
                .insert(
                    2030,
                    &Technology::from(name),
                    "Europe",
                    TechnologyRecord {
                        levelized_cost: cost,
                        emission_intensity: 1.0,
                        retrofit_capex: 0.0,
                    },
                )
                .unwrap();
        }
        table
    }

    fn stack() -> AssetStack {
        AssetStack::from_assets(vec![Asset {
            id: AssetId(1),
            sector: "ammonia".to_string(),
            region: "Europe".to_string(),
            technology: Technology::from("SMR"),
            capacity: 100.0,
            emission_intensity: 1.0,
            commissioning_year: 2025,
            status: AssetStatus::Operating,
            renewed_in: None,
        }])
        .unwrap()
    }

    fn run_year(config: PathwayConfig, demand: f64) -> (AssetStack, Vec<Transition>, Vec<UnmetDemandWarning>) {
        let table = table();
        let mut series = DemandSeries::new();
        series.insert(2030, "ammonia", "Europe", demand);
        let budget = CarbonBudget::build(BudgetShape::Flat, 2030, 2030, 1e6).unwrap();
        let chain = ConstraintChain::from_specs(&config.constraints);
        let ranking = RankingEngine::from_config(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut ctx = YearContext::new(
            2030, stack(), &config, &table, &series, &budget, &chain, &ranking, &mut rng,
        );
        run(&mut ctx).unwrap();
        let result = ctx.finish();
        (result.stack, result.transitions, result.unmet_demand)
    }

    #[test]
    fn test_gap_filled_with_cheapest_technology() {
        let (stack, transitions, unmet) = run_year(PathwayConfig::default(), 130.0);

        assert!(unmet.is_empty());
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].asset_id, AssetId(2));
        assert_eq!(transitions[0].kind.destination(), Some(&Technology::from("Electrolyser")));
        assert_eq!(transitions[0].capacity, 30.0);
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 130.0);
    }

    #[test]
    fn test_standard_capacity_adds_several_assets() {
        let config = PathwayConfig {
            standard_asset_capacity: Some(25.0),
            ..PathwayConfig::default()
        };
        let (stack, transitions, _) = run_year(config, 160.0);

        // 25 + 25 + a trimmed 10
        assert_eq!(transitions.len(), 3);
        assert_eq!(transitions[2].capacity, 10.0);
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 160.0);
    }

    #[test]
    fn test_last_asset_uses_capacity_tolerance() {
        let config = PathwayConfig {
            standard_asset_capacity: Some(25.0),
            capacity_tolerance: 0.1,
            ..PathwayConfig::default()
        };
        // Floor 144, ceiling 176: 100 + 25 + 25 = 150 stops the loop
        let (stack, transitions, _) = run_year(config, 160.0);
        assert_eq!(transitions.len(), 2);
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 150.0);
    }

    #[test]
    fn test_standard_capacity_passes_capacity_consistency() {
        let config = PathwayConfig {
            standard_asset_capacity: Some(1000.0),
            constraints: vec![ConstraintSpec::CapacityConsistency { tolerance: 0.0 }],
            ..PathwayConfig::default()
        };
        let (stack, transitions, unmet) = run_year(config, 130.0);

        assert!(unmet.is_empty());
        assert_eq!(transitions.len(), 1);
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 130.0);
    }

    #[test]
    fn test_unmet_demand_reported() {
        let config = PathwayConfig {
            constraints: vec![ConstraintSpec::TechnologyMoratorium {
                technologies: vec![Technology::from("SMR"), Technology::from("Electrolyser")],
                classes: vec![],
                cutoff_year: 2025,
            }],
            ..PathwayConfig::default()
        };
        let (_, transitions, unmet) = run_year(config, 150.0);

        assert!(transitions.is_empty());
        assert_eq!(unmet.len(), 1);
        assert_eq!(unmet[0].shortfall, 50.0);
    }

    #[test]
    fn test_no_build_when_demand_is_met() {
        let (_, transitions, unmet) = run_year(PathwayConfig::default(), 80.0);
        assert!(transitions.is_empty());
        assert!(unmet.is_empty());
    }
}
