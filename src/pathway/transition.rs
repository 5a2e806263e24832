//! Transition records and the append-only registry

use serde::{Deserialize, Serialize};

use crate::core::error::{PathwayError, Result};
use crate::core::types::{AssetId, Technology, Year};
use crate::pathway::asset::{AssetStack, NewAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecommissionReason {
    /// Past technical lifetime with no admissible renewal
    EndOfLife,
    /// Capacity above demand
    Surplus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionKind {
    Decommission {
        origin: Technology,
        reason: DecommissionReason,
    },
    Brownfield {
        origin: Technology,
        destination: Technology,
        emission_intensity: f64,
    },
    Greenfield {
        destination: Technology,
        emission_intensity: f64,
    },
}

impl TransitionKind {
    pub fn origin(&self) -> Option<&Technology> {
        match self {
            TransitionKind::Decommission { origin, .. } | TransitionKind::Brownfield { origin, .. } => {
                Some(origin)
            }
            TransitionKind::Greenfield { .. } => None,
        }
    }

    pub fn destination(&self) -> Option<&Technology> {
        match self {
            TransitionKind::Brownfield { destination, .. }
            | TransitionKind::Greenfield { destination, .. } => Some(destination),
            TransitionKind::Decommission { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransitionKind::Decommission { .. } => "decommission",
            TransitionKind::Brownfield { .. } => "brownfield",
            TransitionKind::Greenfield { .. } => "greenfield",
        }
    }
}

/// One applied technology change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub asset_id: AssetId,
    pub year: Year,
    pub sector: String,
    pub region: String,
    pub capacity: f64,
    pub kind: TransitionKind,
    pub realized_cost: f64,
    /// 1-based position of the chosen candidate in its ranking
    pub rank: Option<usize>,
}

/// Flat tabular form of a transition, for export collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub asset_id: AssetId,
    pub year: Year,
    pub kind: String,
    pub sector: String,
    pub region: String,
    pub capacity: f64,
    pub origin: Option<Technology>,
    pub destination: Option<Technology>,
    pub reason: Option<DecommissionReason>,
    pub realized_cost: f64,
    pub rank: Option<usize>,
}

impl From<&Transition> for TransitionRecord {
    fn from(t: &Transition) -> Self {
        let reason = match &t.kind {
            TransitionKind::Decommission { reason, .. } => Some(*reason),
            _ => None,
        };
        Self {
            asset_id: t.asset_id,
            year: t.year,
            kind: t.kind.label().to_string(),
            sector: t.sector.clone(),
            region: t.region.clone(),
            capacity: t.capacity,
            origin: t.kind.origin().cloned(),
            destination: t.kind.destination().cloned(),
            reason,
            realized_cost: t.realized_cost,
            rank: t.rank,
        }
    }
}

/// Append-only log of every technology change in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRegistry {
    transitions: Vec<Transition>,
}

impl TransitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn as_slice(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn for_year(&self, year: Year) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.year == year)
    }

    pub fn for_asset(&self, id: AssetId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.asset_id == id)
    }

    pub fn to_records(&self) -> Vec<TransitionRecord> {
        self.transitions.iter().map(TransitionRecord::from).collect()
    }

    /// Rebuild a stack by applying every transition, in order, to `initial`
    ///
    /// Greenfield ids are re-allocated by the stack and must match the recorded
    /// ids, which holds as long as the registry came from a run on `initial`.
    pub fn replay_onto(&self, initial: &AssetStack) -> Result<AssetStack> {
        let mut stack = initial.clone();
        let mut current_year: Option<Year> = None;

        for t in &self.transitions {
            if let Some(year) = current_year {
                if t.year != year {
                    stack = stack.seal(year).to_working();
                }
            }
            current_year = Some(t.year);

            match &t.kind {
                TransitionKind::Decommission { .. } => {
                    stack.apply_decommission(t.asset_id)?;
                }
                TransitionKind::Brownfield {
                    destination,
                    emission_intensity,
                    ..
                } => {
                    stack.apply_brownfield(t.asset_id, destination.clone(), *emission_intensity, t.year)?;
                }
                TransitionKind::Greenfield {
                    destination,
                    emission_intensity,
                } => {
                    let id = stack.apply_greenfield(NewAsset {
                        sector: t.sector.clone(),
                        region: t.region.clone(),
                        technology: destination.clone(),
                        capacity: t.capacity,
                        emission_intensity: *emission_intensity,
                        commissioning_year: t.year,
                    })?;
                    if id != t.asset_id {
                        return Err(PathwayError::IntegrityViolation(format!(
                            "replayed greenfield received {} but registry recorded {}",
                            id, t.asset_id
                        )));
                    }
                }
            }
        }

        Ok(match current_year {
            Some(year) => stack.seal(year).to_working(),
            None => stack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathway::asset::{Asset, AssetFilter, AssetStatus};

    fn initial() -> AssetStack {
        AssetStack::from_assets(vec![Asset {
            id: AssetId(1),
            sector: "cement".to_string(),
            region: "Europe".to_string(),
            technology: Technology::from("Dry kiln coal"),
            capacity: 10.0,
            emission_intensity: 0.8,
            commissioning_year: 1990,
            status: AssetStatus::Operating,
            renewed_in: None,
        }])
        .unwrap()
    }

    fn greenfield(id: u64, year: Year) -> Transition {
        Transition {
            asset_id: AssetId(id),
            year,
            sector: "cement".to_string(),
            region: "Europe".to_string(),
            capacity: 5.0,
            kind: TransitionKind::Greenfield {
                destination: Technology::from("Dry kiln + CCS"),
                emission_intensity: 0.1,
            },
            realized_cost: 500.0,
            rank: Some(1),
        }
    }

    #[test]
    fn test_kind_accessors() {
        let kind = TransitionKind::Decommission {
            origin: Technology::from("Dry kiln coal"),
            reason: DecommissionReason::EndOfLife,
        };
        assert_eq!(kind.origin(), Some(&Technology::from("Dry kiln coal")));
        assert_eq!(kind.destination(), None);
        assert_eq!(kind.label(), "decommission");
    }

    #[test]
    fn test_registry_queries() {
        let mut registry = TransitionRegistry::new();
        registry.record(greenfield(2, 2030));
        registry.record(greenfield(3, 2031));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.for_year(2031).count(), 1);
        assert_eq!(registry.for_asset(AssetId(2)).count(), 1);

        let records = registry.to_records();
        assert_eq!(records[0].kind, "greenfield");
        assert_eq!(records[0].origin, None);
        assert_eq!(records[0].destination, Some(Technology::from("Dry kiln + CCS")));
    }

    #[test]
    fn test_replay_reproduces_stack() {
        let mut registry = TransitionRegistry::new();
        registry.record(greenfield(2, 2030));
        registry.record(Transition {
            asset_id: AssetId(1),
            year: 2031,
            sector: "cement".to_string(),
            region: "Europe".to_string(),
            capacity: 10.0,
            kind: TransitionKind::Decommission {
                origin: Technology::from("Dry kiln coal"),
                reason: DecommissionReason::EndOfLife,
            },
            realized_cost: 0.0,
            rank: None,
        });

        let replayed = registry.replay_onto(&initial()).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed.total_capacity(&AssetFilter::all()), 5.0);
    }

    #[test]
    fn test_replay_detects_id_mismatch() {
        let mut registry = TransitionRegistry::new();
        registry.record(greenfield(7, 2030));
        assert!(matches!(
            registry.replay_onto(&initial()),
            Err(PathwayError::IntegrityViolation(_))
        ));
    }
}
