//! Shared fixtures for pathway integration tests

#![allow(dead_code)]

use decarb_pathway::core::{AssetId, PathwayConfig, Technology, TechnologyClass, Year};
use decarb_pathway::pathway::asset::{Asset, AssetStatus};
use decarb_pathway::pathway::inputs::{DemandRow, PathwayInputs, TechnologyInfo, TechnologyRecord, TechnologyRow};
use decarb_pathway::pathway::{BudgetShape, CostShape, RankingMethod};

pub fn asset(id: u64, sector: &str, region: &str, technology: &str, capacity: f64, intensity: f64, commissioned: Year) -> Asset {
    Asset {
        id: AssetId(id),
        sector: sector.to_string(),
        region: region.to_string(),
        technology: Technology::from(technology),
        capacity,
        emission_intensity: intensity,
        commissioning_year: commissioned,
        status: AssetStatus::Operating,
        renewed_in: None,
    }
}

pub fn info(name: &str, sector: &str, class: TechnologyClass, available_from: Year, lifetime: Option<u32>) -> TechnologyInfo {
    TechnologyInfo {
        technology: Technology::from(name),
        sector: sector.to_string(),
        class,
        available_from,
        lifetime,
    }
}

pub fn row(year: Year, name: &str, region: &str, cost: f64, intensity: f64, capex: f64) -> TechnologyRow {
    TechnologyRow {
        year,
        technology: Technology::from(name),
        region: region.to_string(),
        record: TechnologyRecord {
            levelized_cost: cost,
            emission_intensity: intensity,
            retrofit_capex: capex,
        },
    }
}

pub fn demand(year: Year, sector: &str, region: &str, value: f64) -> DemandRow {
    DemandRow {
        year,
        sector: sector.to_string(),
        region: region.to_string(),
        demand: value,
    }
}

pub const REGIONS: [&str; 2] = ["Europe", "China"];

/// Cement sector in two regions over 2025-2045 with four kiln technologies
pub fn cement_inputs() -> PathwayInputs {
    let technologies = vec![
        info("Kiln coal", "cement", TechnologyClass::Initial, 1950, Some(25)),
        info("Kiln gas", "cement", TechnologyClass::Transition, 1990, Some(30)),
        info("Kiln CCS", "cement", TechnologyClass::EndState, 2028, Some(30)),
        info("Electric kiln", "cement", TechnologyClass::EndState, 2035, Some(30)),
    ];

    let mut rows = Vec::new();
    for year in 2025..=2045 {
        let t = (year - 2025) as f64;
        for (i, region) in REGIONS.iter().enumerate() {
            let regional = 1.0 + 0.05 * i as f64;
            rows.push(row(year, "Kiln coal", region, 100.0 * regional, 0.9, 10.0));
            rows.push(row(year, "Kiln gas", region, 108.0 * regional, 0.6, 20.0));
            rows.push(row(year, "Kiln CCS", region, (150.0 - 2.0 * t) * regional, 0.1, 60.0));
            rows.push(row(year, "Electric kiln", region, (170.0 - 3.0 * t) * regional, 0.05, 80.0));
        }
    }

    let mut assets = Vec::new();
    for i in 0..20u64 {
        let region = REGIONS[(i % 2) as usize];
        let commissioned = 1985 + (i as Year * 7) % 36;
        assets.push(asset(i + 1, "cement", region, "Kiln coal", 50.0, 0.9, commissioned));
    }

    let mut demand_rows = Vec::new();
    for year in 2025..=2045 {
        let growth = 1.0 + 0.01 * (year - 2025) as f64;
        demand_rows.push(demand(year, "cement", "Europe", 500.0 * growth));
        demand_rows.push(demand(year, "cement", "China", 500.0 * growth));
    }

    PathwayInputs {
        initial_assets: assets,
        technologies,
        technology_data: rows,
        demand: demand_rows,
    }
}

pub fn cement_config() -> PathwayConfig {
    let mut config = PathwayConfig {
        start_year: 2025,
        end_year: 2045,
        random_seed: 2024,
        standard_asset_capacity: Some(50.0),
        parallel_threshold: 2,
        ..PathwayConfig::default()
    };
    config.carbon_budget.shape = BudgetShape::Linear { end_fraction: 0.05 };
    config.carbon_budget.total = 15_000.0;
    config.carbon_cost.shape = CostShape::Linear;
    config.carbon_cost.initial_cost = 0.0;
    config.carbon_cost.final_cost = 150.0;
    config.ranking.method = RankingMethod::UncertaintyBins;
    config.ranking.relative_uncertainty = 0.1;
    config
}
