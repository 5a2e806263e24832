//! Decommission procedure
//!
//! Retires assets past their technical lifetime that have no admissible renewal,
//! then, when enabled, retires surplus capacity worst-first.

use crate::core::error::Result;
use crate::core::types::AssetId;
use crate::pathway::agents::YearContext;
use crate::pathway::asset::{Asset, AssetFilter, AssetStatus};
use crate::pathway::constraints::CandidateTransition;
use crate::pathway::ranking::RankedCandidate;
use crate::pathway::transition::{DecommissionReason, Transition, TransitionKind};

pub fn run(ctx: &mut YearContext) -> Result<()> {
    retire_end_of_life(ctx)?;
    if ctx.config.decommission_surplus {
        retire_surplus(ctx)?;
    }
    Ok(())
}

/// Remove an asset and log the decommission
pub(crate) fn retire(ctx: &mut YearContext, id: AssetId, reason: DecommissionReason, rank: Option<usize>) -> Result<()> {
    let asset = ctx.stack.apply_decommission(id)?;
    ctx.record(Transition {
        asset_id: asset.id,
        year: ctx.year,
        sector: asset.sector,
        region: asset.region,
        capacity: asset.capacity,
        kind: TransitionKind::Decommission {
            origin: asset.technology,
            reason,
        },
        realized_cost: 0.0,
        rank,
    });
    Ok(())
}

/// True if some ranked renewal of `asset` passes the chain right now
///
/// Only a lookahead; the brownfield pass counts its own denials.
fn has_admissible_renewal(ctx: &YearContext, asset: &Asset, candidates: &[RankedCandidate]) -> bool {
    candidates.iter().any(|candidate| {
        ctx.is_admissible(&CandidateTransition::Brownfield {
            asset,
            destination: &candidate.technology,
            emission_intensity: candidate.emission_intensity,
        })
    })
}

fn retire_end_of_life(ctx: &mut YearContext) -> Result<()> {
    let expired: Vec<Asset> = ctx
        .stack
        .iter()
        .filter(|a| a.status == AssetStatus::Operating && ctx.is_past_lifetime(a))
        .cloned()
        .collect();
    if expired.is_empty() {
        return Ok(());
    }

    let (ranking, technologies, year) = (ctx.ranking, ctx.technologies, ctx.year);
    let rankings = ranking.rank_batch(&expired, &mut *ctx.rng, |asset, rng| {
        ranking.rank_brownfield(asset, technologies, year, rng)
    });

    for (asset, candidates) in expired.iter().zip(&rankings) {
        if has_admissible_renewal(ctx, asset, candidates) {
            // Renewed by the brownfield pass
            continue;
        }
        tracing::debug!(year, asset = %asset.id, technology = %asset.technology, "End of life with no admissible renewal");
        retire(ctx, asset.id, DecommissionReason::EndOfLife, None)?;
    }
    Ok(())
}

fn retire_surplus(ctx: &mut YearContext) -> Result<()> {
    let year = ctx.year;

    for (sector, region) in ctx.stack.markets() {
        let Some(demand) = ctx.demand.demand(year, &sector, &region) else {
            continue;
        };

        let assets: Vec<Asset> = ctx
            .stack
            .assets_matching(&AssetFilter::market(&sector, &region).status(AssetStatus::Operating))
            .into_iter()
            .cloned()
            .collect();
        let refs: Vec<&Asset> = assets.iter().collect();
        let order = ctx
            .ranking
            .rank_decommission(&refs, ctx.technologies, year, &mut *ctx.rng);

        for (position, id) in order.into_iter().enumerate() {
            let Some(asset) = assets.iter().find(|a| a.id == id) else {
                continue;
            };
            let surplus = ctx.stack.total_capacity(&AssetFilter::market(&sector, &region)) - demand;
            if surplus <= 0.0 {
                break;
            }
            if asset.capacity > surplus {
                continue;
            }

            let candidate = CandidateTransition::Decommission {
                asset,
                reason: DecommissionReason::Surplus,
            };
            if ctx.admit(&candidate) {
                retire(ctx, id, DecommissionReason::Surplus, Some(position + 1))?;
            }
        }
    }
    Ok(())
}
