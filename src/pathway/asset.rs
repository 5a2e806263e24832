//! Assets and the asset stack
//!
//! An [`AssetStack`] is the set of production assets active in one year. During a
//! simulated year the agent procedures mutate a working copy of the stack; when
//! the year closes the working copy is sealed into an immutable [`StackSnapshot`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{PathwayError, Result};
use crate::core::types::{AssetId, Technology, Year};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Operating,
    /// Switched technology this year; becomes `Operating` when the year is sealed
    Retrofitting,
    Decommissioned,
}

/// A production unit (plant) with a single technology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub sector: String,
    pub region: String,
    pub technology: Technology,
    /// Annual production capacity
    pub capacity: f64,
    /// Emissions per unit of capacity
    pub emission_intensity: f64,
    pub commissioning_year: Year,
    pub status: AssetStatus,
    /// Year of the last brownfield investment, if any
    #[serde(default)]
    pub renewed_in: Option<Year>,
}

impl Asset {
    /// Annual emissions of the asset at full capacity
    pub fn emissions(&self) -> f64 {
        self.capacity * self.emission_intensity
    }

    pub fn age(&self, year: Year) -> u32 {
        year.saturating_sub(self.commissioning_year)
    }

    /// Year of the most recent investment (commissioning or retrofit)
    pub fn last_investment_year(&self) -> Year {
        self.renewed_in.unwrap_or(self.commissioning_year)
    }

    /// Age counted from the most recent investment
    pub fn age_since_investment(&self, year: Year) -> u32 {
        year.saturating_sub(self.last_investment_year())
    }

    pub fn is_operating(&self) -> bool {
        self.status == AssetStatus::Operating
    }

    /// True once the asset has run `lifetime` years since its last investment
    pub fn is_past_lifetime(&self, year: Year, lifetime: u32) -> bool {
        self.age_since_investment(year) >= lifetime
    }
}

/// Template for a greenfield asset; the stack assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub sector: String,
    pub region: String,
    pub technology: Technology,
    pub capacity: f64,
    pub emission_intensity: f64,
    pub commissioning_year: Year,
}

impl NewAsset {
    pub fn emissions(&self) -> f64 {
        self.capacity * self.emission_intensity
    }
}

/// Selection criteria for stack queries; unset fields match everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetFilter<'a> {
    sector: Option<&'a str>,
    region: Option<&'a str>,
    technology: Option<&'a Technology>,
    status: Option<AssetStatus>,
}

impl<'a> AssetFilter<'a> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sector(mut self, sector: &'a str) -> Self {
        self.sector = Some(sector);
        self
    }

    pub fn region(mut self, region: &'a str) -> Self {
        self.region = Some(region);
        self
    }

    pub fn technology(mut self, technology: &'a Technology) -> Self {
        self.technology = Some(technology);
        self
    }

    pub fn status(mut self, status: AssetStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter for a sector/region pair
    pub fn market(sector: &'a str, region: &'a str) -> Self {
        Self::all().sector(sector).region(region)
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        self.sector.map_or(true, |s| asset.sector == s)
            && self.region.map_or(true, |r| asset.region == r)
            && self.technology.map_or(true, |t| &asset.technology == t)
            && self.status.map_or(true, |s| asset.status == s)
    }
}

/// The set of assets active in a given year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStack {
    /// Active assets keyed by id (ordered for deterministic iteration)
    assets: BTreeMap<AssetId, Asset>,
    /// Assets decommissioned during the current working year
    retired: Vec<Asset>,
    /// Next id to allocate for a greenfield asset
    next_id: AssetId,
}

impl AssetStack {
    pub fn new() -> Self {
        Self {
            assets: BTreeMap::new(),
            retired: Vec::new(),
            next_id: AssetId(1),
        }
    }

    /// Build a stack from existing assets, rejecting duplicate ids
    pub fn from_assets(assets: Vec<Asset>) -> Result<Self> {
        let mut stack = Self::new();
        for asset in assets {
            if stack.assets.contains_key(&asset.id) {
                return Err(PathwayError::DuplicateAsset(asset.id));
            }
            if asset.id >= stack.next_id {
                stack.next_id = asset.id.next();
            }
            stack.assets.insert(asset.id, asset);
        }
        Ok(stack)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(&id)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(&id)
    }

    pub fn age_of(&self, id: AssetId, year: Year) -> Result<u32> {
        self.get(id)
            .map(|a| a.age(year))
            .ok_or_else(|| self.missing(id))
    }

    /// Active assets in id order
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    /// The id the next greenfield asset will receive
    pub fn next_id(&self) -> AssetId {
        self.next_id
    }

    /// Assets decommissioned since the stack was last sealed
    pub fn retired(&self) -> &[Asset] {
        &self.retired
    }

    pub fn assets_matching(&self, filter: &AssetFilter) -> Vec<&Asset> {
        self.assets.values().filter(|a| filter.matches(a)).collect()
    }

    pub fn total_capacity(&self, filter: &AssetFilter) -> f64 {
        self.assets
            .values()
            .filter(|a| filter.matches(a))
            .map(|a| a.capacity)
            .sum()
    }

    pub fn total_emissions(&self, filter: &AssetFilter) -> f64 {
        self.assets
            .values()
            .filter(|a| filter.matches(a))
            .map(Asset::emissions)
            .sum()
    }

    pub fn count_matching(&self, filter: &AssetFilter) -> usize {
        self.assets.values().filter(|a| filter.matches(a)).count()
    }

    /// All (sector, region) pairs present in the stack
    pub fn markets(&self) -> BTreeSet<(String, String)> {
        self.assets
            .values()
            .map(|a| (a.sector.clone(), a.region.clone()))
            .collect()
    }

    /// Remove an asset from the active set and mark it decommissioned
    pub fn apply_decommission(&mut self, id: AssetId) -> Result<Asset> {
        let Some(mut asset) = self.assets.remove(&id) else {
            return Err(self.missing(id));
        };
        asset.status = AssetStatus::Decommissioned;
        self.retired.push(asset.clone());
        Ok(asset)
    }

    /// Swap an asset's technology in place, keeping its id and capacity
    ///
    /// Returns the origin technology.
    pub fn apply_brownfield(
        &mut self,
        id: AssetId,
        destination: Technology,
        emission_intensity: f64,
        year: Year,
    ) -> Result<Technology> {
        let Some(asset) = self.assets.get_mut(&id) else {
            return Err(self.missing(id));
        };
        if asset.status == AssetStatus::Decommissioned {
            return Err(PathwayError::AssetDecommissioned(id));
        }

        let origin = std::mem::replace(&mut asset.technology, destination);
        asset.emission_intensity = emission_intensity;
        asset.renewed_in = Some(year);
        asset.status = AssetStatus::Retrofitting;
        Ok(origin)
    }

    /// Insert a new asset under a freshly allocated id
    pub fn apply_greenfield(&mut self, new_asset: NewAsset) -> Result<AssetId> {
        let id = self.next_id;
        if self.assets.contains_key(&id) || self.retired.iter().any(|a| a.id == id) {
            return Err(PathwayError::DuplicateAsset(id));
        }
        self.next_id = id.next();

        self.assets.insert(
            id,
            Asset {
                id,
                sector: new_asset.sector,
                region: new_asset.region,
                technology: new_asset.technology,
                capacity: new_asset.capacity,
                emission_intensity: new_asset.emission_intensity,
                commissioning_year: new_asset.commissioning_year,
                status: AssetStatus::Operating,
                renewed_in: None,
            },
        );
        Ok(id)
    }

    /// Freeze the working stack into the snapshot for `year`
    pub fn seal(mut self, year: Year) -> StackSnapshot {
        for asset in self.assets.values_mut() {
            if asset.status == AssetStatus::Retrofitting {
                asset.status = AssetStatus::Operating;
            }
        }
        self.retired.clear();
        StackSnapshot { year, stack: self }
    }

    fn missing(&self, id: AssetId) -> PathwayError {
        if self.retired.iter().any(|a| a.id == id) {
            PathwayError::AssetDecommissioned(id)
        } else {
            PathwayError::UnknownAsset(id)
        }
    }
}

impl Default for AssetStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable asset stack for a closed year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSnapshot {
    year: Year,
    stack: AssetStack,
}

impl StackSnapshot {
    pub fn year(&self) -> Year {
        self.year
    }

    pub fn stack(&self) -> &AssetStack {
        &self.stack
    }

    /// Mutable working copy for the following year
    pub fn to_working(&self) -> AssetStack {
        self.stack.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: u64, technology: &str, region: &str, capacity: f64) -> Asset {
        Asset {
            id: AssetId(id),
            sector: "aluminium".to_string(),
            region: region.to_string(),
            technology: Technology::from(technology),
            capacity,
            emission_intensity: 2.0,
            commissioning_year: 2000,
            status: AssetStatus::Operating,
            renewed_in: None,
        }
    }

    fn sample_stack() -> AssetStack {
        AssetStack::from_assets(vec![
            asset(1, "Prebake", "Europe", 100.0),
            asset(2, "Prebake", "China", 150.0),
            asset(3, "Inert anode", "Europe", 50.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_assets_rejects_duplicates() {
        let result = AssetStack::from_assets(vec![
            asset(1, "Prebake", "Europe", 100.0),
            asset(1, "Prebake", "China", 100.0),
        ]);
        assert!(matches!(result, Err(PathwayError::DuplicateAsset(AssetId(1)))));
    }

    #[test]
    fn test_aggregations() {
        let stack = sample_stack();
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 300.0);
        assert_eq!(stack.total_emissions(&AssetFilter::all()), 600.0);
        assert_eq!(stack.total_capacity(&AssetFilter::all().region("Europe")), 150.0);

        let prebake = Technology::from("Prebake");
        let matching = stack.assets_matching(&AssetFilter::all().technology(&prebake));
        assert_eq!(matching.len(), 2);
        assert_eq!(
            stack.count_matching(&AssetFilter::market("aluminium", "China")),
            1
        );
    }

    #[test]
    fn test_decommission_removes_asset() {
        let mut stack = sample_stack();
        let retired = stack.apply_decommission(AssetId(2)).unwrap();

        assert_eq!(retired.status, AssetStatus::Decommissioned);
        assert!(!stack.contains(AssetId(2)));
        assert_eq!(stack.total_capacity(&AssetFilter::all()), 150.0);
        assert_eq!(stack.retired().len(), 1);
    }

    #[test]
    fn test_decommission_unknown_asset() {
        let mut stack = sample_stack();
        assert!(matches!(
            stack.apply_decommission(AssetId(99)),
            Err(PathwayError::UnknownAsset(AssetId(99)))
        ));
    }

    #[test]
    fn test_brownfield_preserves_identity_and_capacity() {
        let mut stack = sample_stack();
        let origin = stack
            .apply_brownfield(AssetId(1), Technology::from("Inert anode"), 0.5, 2030)
            .unwrap();

        assert_eq!(origin, Technology::from("Prebake"));
        let updated = stack.get(AssetId(1)).unwrap();
        assert_eq!(updated.technology, Technology::from("Inert anode"));
        assert_eq!(updated.capacity, 100.0);
        assert_eq!(updated.status, AssetStatus::Retrofitting);
        assert_eq!(updated.renewed_in, Some(2030));
        assert_eq!(updated.age_since_investment(2035), 5);
        assert_eq!(stack.age_of(AssetId(1), 2035).unwrap(), 35);
        assert!(!updated.is_past_lifetime(2035, 10));
        assert!(updated.is_past_lifetime(2040, 10));
    }

    #[test]
    fn test_brownfield_on_decommissioned_asset_fails() {
        let mut stack = sample_stack();
        stack.apply_decommission(AssetId(1)).unwrap();
        let result = stack.apply_brownfield(AssetId(1), Technology::from("Inert anode"), 0.5, 2030);
        assert!(matches!(result, Err(PathwayError::AssetDecommissioned(AssetId(1)))));
    }

    #[test]
    fn test_brownfield_unknown_asset() {
        let mut stack = sample_stack();
        let result = stack.apply_brownfield(AssetId(99), Technology::from("Inert anode"), 0.5, 2030);
        assert!(matches!(result, Err(PathwayError::UnknownAsset(AssetId(99)))));
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_greenfield_allocates_fresh_ids() {
        let mut stack = sample_stack();
        let new_asset = NewAsset {
            sector: "aluminium".to_string(),
            region: "India".to_string(),
            technology: Technology::from("Inert anode"),
            capacity: 20.0,
            emission_intensity: 0.5,
            commissioning_year: 2031,
        };

        let first = stack.apply_greenfield(new_asset.clone()).unwrap();
        let second = stack.apply_greenfield(new_asset).unwrap();
        assert_eq!(first, AssetId(4));
        assert_eq!(second, AssetId(5));
        assert_eq!(stack.get(first).unwrap().status, AssetStatus::Operating);
    }

    #[test]
    fn test_seal_finalizes_retrofits() {
        let mut stack = sample_stack();
        stack
            .apply_brownfield(AssetId(1), Technology::from("Inert anode"), 0.5, 2030)
            .unwrap();
        stack.apply_decommission(AssetId(2)).unwrap();

        let snapshot = stack.seal(2030);
        assert_eq!(snapshot.year(), 2030);
        assert!(snapshot.stack().retired().is_empty());
        assert!(snapshot.stack().iter().all(Asset::is_operating));

        let working = snapshot.to_working();
        assert_eq!(working.next_id(), AssetId(4));
        assert_eq!(working.len(), 2);
    }
}
