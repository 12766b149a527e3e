use chrono::{DateTime, Utc};
use discovery_core::{
    ActionTag, Candidate, EnrichedSymbol, Field, ScoreWeights, SubScores, TierThresholds,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::reasons::build_reasons;
use crate::sub_scores::{self, ScoringContext};
use crate::weighting::combine_weighted;

pub fn score_sub_scores(enriched: &EnrichedSymbol, ctx: &ScoringContext) -> SubScores {
    SubScores {
        volume_momentum: sub_scores::volume_momentum(enriched, ctx),
        squeeze: sub_scores::squeeze(enriched),
        catalyst: sub_scores::catalyst(enriched),
        sentiment: sub_scores::sentiment(enriched),
        options: sub_scores::options(enriched),
        technical: sub_scores::technical(enriched, ctx),
    }
}

/// `composite_score = round(sum(w_i * s_i), 1)` over known buckets, with
/// weights renormalized to the known subset. Returns `(composite,
/// confidence)` where confidence is the fraction of total weight that was
/// known.
pub fn composite_score(sub_scores: &SubScores, weights: &ScoreWeights) -> (f64, f64) {
    let components: Vec<(Field<f64>, f64)> = sub_scores
        .iter_named()
        .map(|(name, score)| (score, weights.get(name).unwrap_or(0.0)))
        .collect();

    match combine_weighted(&components) {
        (Some(value), confidence) => ((value * 10.0).round() / 10.0, confidence),
        (None, _) => (0.0, 0.0),
    }
}

pub fn tag(composite: f64, thresholds: &TierThresholds, stale: bool) -> ActionTag {
    if stale {
        return ActionTag::Monitor;
    }
    if composite >= thresholds.trade_ready {
        ActionTag::TradeReady
    } else if composite >= thresholds.watchlist {
        ActionTag::Watchlist
    } else {
        ActionTag::Monitor
    }
}

fn derive_levels(enriched: &EnrichedSymbol) -> (Decimal, Decimal, Decimal, Decimal) {
    let price = enriched.snapshot.last_price;
    let atr_pct = enriched.atr_pct.known().unwrap_or(5.0).max(0.5);
    let atr_fraction = Decimal::from_f64_or_default(atr_pct / 100.0);

    let entry = price;
    let stop = (price * (Decimal::ONE - atr_fraction)).max(Decimal::ZERO);
    let target_1 = price * (Decimal::ONE + atr_fraction);
    let target_2 = price * (Decimal::ONE + atr_fraction * Decimal::from(2));

    (entry, stop, target_1, target_2)
}

trait DecimalFromF64Ext {
    fn from_f64_or_default(v: f64) -> Decimal;
}

impl DecimalFromF64Ext for Decimal {
    fn from_f64_or_default(v: f64) -> Decimal {
        Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO)
    }
}

/// Scores one enriched symbol end to end into a published `Candidate`.
/// Returns `None` if the composite confidence is below 0.5 - the
/// orchestrator drops it (`ScoreUnderconfident`).
pub fn score_candidate(
    enriched: &EnrichedSymbol,
    ctx: &ScoringContext,
    weights: &ScoreWeights,
    thresholds: &TierThresholds,
    strategy_id: &str,
    stale: bool,
    now: DateTime<Utc>,
) -> Option<Candidate> {
    let sub_scores = score_sub_scores(enriched, ctx);
    let (composite, confidence) = composite_score(&sub_scores, weights);

    if confidence < 0.5 {
        return None;
    }

    let (entry, stop, target_1, target_2) = derive_levels(enriched);

    Some(Candidate {
        symbol: enriched.symbol().to_string(),
        price: enriched.snapshot.last_price,
        composite_score: composite,
        sub_scores,
        action_tag: tag(composite, thresholds, stale),
        reasons: build_reasons(enriched),
        entry,
        stop,
        target_1,
        target_2,
        computed_at: now,
        strategy_id: strategy_id.to_string(),
        confidence,
        intraday_relvol: enriched.intraday_relvol,
    })
}

/// Tie-break ordering: composite desc, then intraday_relvol desc, then
/// volume_momentum desc, then price asc.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ar = a.intraday_relvol.known().unwrap_or(f64::MIN);
                let br = b.intraday_relvol.known().unwrap_or(f64::MIN);
                br.partial_cmp(&ar).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                let av = a.sub_scores.volume_momentum.known().unwrap_or(f64::MIN);
                let bv = b.sub_scores.volume_momentum.known().unwrap_or(f64::MIN);
                bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.price.cmp(&b.price))
    });
}

/// Ensures at least `floor` candidates carry a tier above `monitor` by
/// lowering the `watchlist` threshold toward `monitor`, never touching
/// hard guards. Operates on already-tagged candidates; re-tags in place.
pub fn apply_elastic_floor(
    candidates: &mut [Candidate],
    thresholds: &TierThresholds,
    floor: usize,
    stale: bool,
) {
    // S2: a stale run tags everything `monitor` regardless of composite;
    // the floor never un-caps that.
    if stale {
        return;
    }

    let above_monitor = candidates
        .iter()
        .filter(|c| c.action_tag != ActionTag::Monitor)
        .count();
    if above_monitor >= floor || candidates.is_empty() {
        return;
    }

    let mut sorted_scores: Vec<f64> = candidates.iter().map(|c| c.composite_score).collect();
    sorted_scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let target_count = floor.min(sorted_scores.len());
    if target_count == 0 {
        return;
    }
    let relaxed_watchlist = sorted_scores[target_count - 1];

    let mut relaxed = *thresholds;
    relaxed.watchlist = relaxed.watchlist.min(relaxed_watchlist);

    for candidate in candidates.iter_mut() {
        if candidate.action_tag == ActionTag::Monitor {
            candidate.action_tag = tag(candidate.composite_score, &relaxed, false);
        }
    }
}

pub fn enriched_price_f64(enriched: &EnrichedSymbol) -> f64 {
    enriched.snapshot.last_price.to_f64().unwrap_or(0.0)
}
