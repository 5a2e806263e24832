//! Brownfield procedure
//!
//! Assets past their lifetime must be renewed (onto the same or another
//! technology) or they are retired. Assets whose age since the last investment
//! reaches the investment cycle may switch voluntarily; voluntary switches per
//! year are capped at a share of the operating assets.

use crate::core::error::Result;
use crate::pathway::agents::decommission::retire;
use crate::pathway::agents::YearContext;
use crate::pathway::asset::{Asset, AssetFilter, AssetStatus};
use crate::pathway::constraints::CandidateTransition;
use crate::pathway::ranking::RankedCandidate;
use crate::pathway::transition::{DecommissionReason, Transition, TransitionKind};

/// What happened to one eligible asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    /// Own technology ranked best, nothing to do
    Stay,
    Switched,
    Renewed,
    /// No admissible candidate
    Unchanged,
    /// Voluntary switch skipped because the year's cap is used up
    Capped,
}

pub fn run(ctx: &mut YearContext) -> Result<()> {
    let year = ctx.year;
    let cycle = ctx.config.investment_cycle;

    let eligible: Vec<(Asset, bool)> = ctx
        .stack
        .iter()
        .filter(|a| a.status == AssetStatus::Operating)
        .filter_map(|a| {
            let expired = ctx.is_past_lifetime(a);
            (expired || a.age_since_investment(year) >= cycle).then(|| (a.clone(), expired))
        })
        .collect();
    if eligible.is_empty() {
        return Ok(());
    }

    let operating = ctx
        .stack
        .count_matching(&AssetFilter::all().status(AssetStatus::Operating));
    let max_switches = (ctx.config.max_annual_brownfield_share * operating as f64).ceil() as usize;

    let (ranking, technologies) = (ctx.ranking, ctx.technologies);
    let rankings = ranking.rank_batch(&eligible, &mut *ctx.rng, |task, rng| {
        ranking.rank_brownfield(&task.0, technologies, year, rng)
    });

    let mut switches = 0;
    for ((asset, expired), candidates) in eligible.iter().zip(&rankings) {
        let decision = decide(ctx, asset, *expired, candidates, switches < max_switches)?;
        match decision {
            Decision::Switched if !*expired => switches += 1,
            Decision::Unchanged | Decision::Capped if *expired => {
                tracing::debug!(year, asset = %asset.id, "No admissible renewal, retiring");
                retire(ctx, asset.id, DecommissionReason::EndOfLife, None)?;
            }
            _ => {}
        }
    }

    if switches > 0 {
        tracing::debug!(year, switches, max_switches, "Voluntary brownfield switches");
    }
    Ok(())
}

/// Walk the ranking best-first and apply the first admissible change
fn decide(
    ctx: &mut YearContext,
    asset: &Asset,
    expired: bool,
    candidates: &[RankedCandidate],
    may_switch: bool,
) -> Result<Decision> {
    for candidate in candidates {
        let same = candidate.technology == asset.technology;
        if same && !expired {
            return Ok(Decision::Stay);
        }
        if !same && !expired && !may_switch {
            return Ok(Decision::Capped);
        }

        let admissible = ctx.admit(&CandidateTransition::Brownfield {
            asset,
            destination: &candidate.technology,
            emission_intensity: candidate.emission_intensity,
        });
        if admissible {
            apply(ctx, asset, candidate)?;
            return Ok(if same { Decision::Renewed } else { Decision::Switched });
        }
    }
    Ok(Decision::Unchanged)
}

fn apply(ctx: &mut YearContext, asset: &Asset, candidate: &RankedCandidate) -> Result<()> {
    let origin = ctx.stack.apply_brownfield(
        asset.id,
        candidate.technology.clone(),
        candidate.emission_intensity,
        ctx.year,
    )?;
    ctx.record(Transition {
        asset_id: asset.id,
        year: ctx.year,
        sector: asset.sector.clone(),
        region: asset.region.clone(),
        capacity: asset.capacity,
        kind: TransitionKind::Brownfield {
            origin,
            destination: candidate.technology.clone(),
            emission_intensity: candidate.emission_intensity,
        },
        realized_cost: candidate.unit_cost * asset.capacity,
        rank: Some(candidate.rank),
    });
    Ok(())
}
