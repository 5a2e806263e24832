//! External inputs: technology tables, demand series and the importer seam
//!
//! All external data is loaded once before the yearly loop starts. The loop only
//! reads from these tables.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::error::{PathwayError, Result};
use crate::core::types::{Technology, TechnologyClass, Year};
use crate::pathway::asset::{Asset, AssetStack};

/// Static characteristics of a registered technology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyInfo {
    pub technology: Technology,
    pub sector: String,
    pub class: TechnologyClass,
    /// First year in which the technology can be chosen
    pub available_from: Year,
    /// Technical lifetime in years, if the data names one
    #[serde(default)]
    pub lifetime: Option<u32>,
}

/// Cost and emissions of a technology for one (year, region)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnologyRecord {
    /// Levelized cost of production per unit of capacity
    pub levelized_cost: f64,
    /// Emissions per unit of capacity
    pub emission_intensity: f64,
    /// Extra cost per unit of capacity for switching an existing asset to this technology
    #[serde(default)]
    pub retrofit_capex: f64,
}

/// Flat row form of a technology record, as delivered by importers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyRow {
    pub year: Year,
    pub technology: Technology,
    pub region: String,
    #[serde(flatten)]
    pub record: TechnologyRecord,
}

/// Technology cost/emission table keyed by (year, technology, region)
#[derive(Debug, Clone, Default)]
pub struct TechnologyTable {
    /// Registered technologies in registration order
    infos: Vec<TechnologyInfo>,
    index: AHashMap<Technology, usize>,
    /// technology -> region -> year -> record
    records: AHashMap<Technology, AHashMap<String, BTreeMap<Year, TechnologyRecord>>>,
}

impl TechnologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a technology; re-registering replaces its characteristics
    pub fn register(&mut self, info: TechnologyInfo) {
        match self.index.get(&info.technology) {
            Some(&i) => self.infos[i] = info,
            None => {
                self.index.insert(info.technology.clone(), self.infos.len());
                self.infos.push(info);
            }
        }
    }

    /// Insert a record for a registered technology
    pub fn insert(
        &mut self,
        year: Year,
        technology: &Technology,
        region: &str,
        record: TechnologyRecord,
    ) -> Result<()> {
        if !self.index.contains_key(technology) {
            return Err(PathwayError::UnregisteredTechnology(technology.clone()));
        }
        self.records
            .entry(technology.clone())
            .or_default()
            .entry(region.to_string())
            .or_default()
            .insert(year, record);
        Ok(())
    }

    pub fn from_rows(infos: Vec<TechnologyInfo>, rows: Vec<TechnologyRow>) -> Result<Self> {
        let mut table = Self::new();
        for info in infos {
            table.register(info);
        }
        for row in rows {
            table.insert(row.year, &row.technology, &row.region, row.record)?;
        }
        Ok(table)
    }

    pub fn info(&self, technology: &str) -> Option<&TechnologyInfo> {
        self.index.get(technology).map(|&i| &self.infos[i])
    }

    pub fn class_of(&self, technology: &str) -> Option<TechnologyClass> {
        self.info(technology).map(|info| info.class)
    }

    pub fn is_registered(&self, technology: &str) -> bool {
        self.index.contains_key(technology)
    }

    pub fn technologies(&self) -> impl Iterator<Item = &TechnologyInfo> {
        self.infos.iter()
    }

    pub fn record(&self, year: Year, technology: &str, region: &str) -> Option<&TechnologyRecord> {
        self.records.get(technology)?.get(region)?.get(&year)
    }

    /// Like [`record`](Self::record) but missing data is an error
    pub fn require(&self, year: Year, technology: &Technology, region: &str) -> Result<&TechnologyRecord> {
        self.record(year, technology.as_str(), region)
            .ok_or_else(|| PathwayError::MissingTechnologyData {
                technology: technology.clone(),
                region: region.to_string(),
                year,
            })
    }

    /// Technologies that can be chosen in a sector/region/year, in registration order
    pub fn available(
        &self,
        sector: &str,
        region: &str,
        year: Year,
    ) -> Vec<(&TechnologyInfo, &TechnologyRecord)> {
        self.infos
            .iter()
            .filter(|info| info.sector == sector && info.available_from <= year)
            .filter_map(|info| {
                self.record(year, info.technology.as_str(), region)
                    .map(|record| (info, record))
            })
            .collect()
    }
}

/// One demand entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRow {
    pub year: Year,
    pub sector: String,
    pub region: String,
    pub demand: f64,
}

/// Required production capacity keyed by (year, sector, region)
#[derive(Debug, Clone, Default)]
pub struct DemandSeries {
    by_year: BTreeMap<Year, BTreeMap<(String, String), f64>>,
}

impl DemandSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: Year, sector: &str, region: &str, demand: f64) {
        self.by_year
            .entry(year)
            .or_default()
            .insert((sector.to_string(), region.to_string()), demand);
    }

    pub fn from_rows(rows: Vec<DemandRow>) -> Self {
        let mut series = Self::new();
        for row in rows {
            series.insert(row.year, &row.sector, &row.region, row.demand);
        }
        series
    }

    pub fn demand(&self, year: Year, sector: &str, region: &str) -> Option<f64> {
        self.by_year
            .get(&year)?
            .get(&(sector.to_string(), region.to_string()))
            .copied()
    }

    /// All (sector, region, demand) entries for a year, in sorted order
    pub fn markets(&self, year: Year) -> impl Iterator<Item = (&str, &str, f64)> {
        self.by_year
            .get(&year)
            .into_iter()
            .flat_map(|markets| markets.iter())
            .map(|((sector, region), demand)| (sector.as_str(), region.as_str(), *demand))
    }

    /// Total demand for a year across every sector and region
    pub fn total(&self, year: Year) -> f64 {
        self.markets(year).map(|(_, _, d)| d).sum()
    }
}

/// Source of everything the pathway needs before the loop starts
pub trait DataImporter {
    fn initial_stack(&self) -> Result<AssetStack>;
    fn technology_table(&self) -> Result<TechnologyTable>;
    fn demand_series(&self) -> Result<DemandSeries>;
}

/// In-memory inputs, also the JSON interchange format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathwayInputs {
    pub initial_assets: Vec<Asset>,
    pub technologies: Vec<TechnologyInfo>,
    pub technology_data: Vec<TechnologyRow>,
    pub demand: Vec<DemandRow>,
}

impl PathwayInputs {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

impl DataImporter for PathwayInputs {
    fn initial_stack(&self) -> Result<AssetStack> {
        AssetStack::from_assets(self.initial_assets.clone())
    }

    fn technology_table(&self) -> Result<TechnologyTable> {
        TechnologyTable::from_rows(self.technologies.clone(), self.technology_data.clone())
    }

    fn demand_series(&self) -> Result<DemandSeries> {
        Ok(DemandSeries::from_rows(self.demand.clone()))
    }
}
