use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A field that is either known or first-class absent. Never conflated with
/// zero or a midpoint default - downstream scoring treats `Unknown`
/// differently from any concrete value, including 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Known(v) => Field::Known(v),
            Field::Unknown => Field::Unknown,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Known(v) => Field::Known(f(v)),
            Field::Unknown => Field::Unknown,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

impl<T> Serialize for Field<T>
where
    T: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Known(v) => v.serialize(serializer),
            Field::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de, T> Deserialize<'de> for Field<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<T>::deserialize(deserializer).map_err(de::Error::custom)?;
        Ok(opt.into())
    }
}

/// Raw per-symbol daily snapshot, as delivered by the grouped-bars endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: Decimal,
    pub session_volume: i64,
    pub prev_close: Decimal,
    pub session_high: Decimal,
    pub session_low: Decimal,
    pub vwap: Field<Decimal>,
    pub open: Decimal,
    /// Issuer/company name, used only for the ETP name-regex guard; not
    /// part of the upstream grouped-bars payload, so usually `Unknown`
    /// until enrichment fills it in.
    pub name: Field<String>,
}

/// `TickerSnapshot` plus every field filled in by enrichment and the
/// feature calculator. Absent inputs stay `Field::Unknown`, never 0 or a
/// midpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSymbol {
    pub snapshot: TickerSnapshot,

    pub avg_volume_20d: Field<i64>,
    pub float_shares: Field<i64>,
    pub short_interest_pct: Field<f64>,
    pub borrow_fee_pct: Field<f64>,
    pub utilization_pct: Field<f64>,
    pub call_put_ratio: Field<f64>,
    pub iv_percentile: Field<f64>,
    pub catalyst_strength: Field<f64>,
    pub catalyst_age_hours: Field<f64>,
    pub catalyst_source_verified: bool,
    pub sentiment_z_score: Field<f64>,

    // Populated by the feature calculator (C3).
    pub ema9: Field<f64>,
    pub ema20: Field<f64>,
    pub rsi14: Field<f64>,
    pub atr_pct: Field<f64>,
    pub intraday_relvol: Field<f64>,
    pub float_rotation_pct: Field<f64>,
    pub friction_index: Field<f64>,
}

impl EnrichedSymbol {
    pub fn symbol(&self) -> &str {
        &self.snapshot.symbol
    }
}

/// One sub-score bucket, each independently renormalizable to `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubScores {
    pub volume_momentum: Field<f64>,
    pub squeeze: Field<f64>,
    pub catalyst: Field<f64>,
    pub sentiment: Field<f64>,
    pub options: Field<f64>,
    pub technical: Field<f64>,
}

impl SubScores {
    pub fn iter_named(&self) -> impl Iterator<Item = (&'static str, Field<f64>)> {
        [
            ("volume_momentum", self.volume_momentum),
            ("squeeze", self.squeeze),
            ("catalyst", self.catalyst),
            ("sentiment", self.sentiment),
            ("options", self.options),
            ("technical", self.technical),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    TradeReady,
    Watchlist,
    Monitor,
}

/// A symbol that survived the full pipeline, scored and tiered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub price: Decimal,
    pub composite_score: f64,
    pub sub_scores: SubScores,
    pub action_tag: ActionTag,
    pub reasons: Vec<String>,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target_1: Decimal,
    pub target_2: Decimal,
    pub computed_at: DateTime<Utc>,
    pub strategy_id: String,
    /// Fraction of the weight vector that was known (unrenormalized away).
    pub confidence: f64,
    pub intraday_relvol: Field<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub volume_momentum: f64,
    pub squeeze: f64,
    pub catalyst: f64,
    pub sentiment: f64,
    pub options: f64,
    pub technical: f64,
}

impl ScoreWeights {
    pub const ALPHASTACK_4_1: ScoreWeights = ScoreWeights {
        volume_momentum: 0.30,
        squeeze: 0.25,
        catalyst: 0.20,
        sentiment: 0.10,
        options: 0.08,
        technical: 0.07,
    };

    pub fn sum(&self) -> f64 {
        self.volume_momentum
            + self.squeeze
            + self.catalyst
            + self.sentiment
            + self.options
            + self.technical
    }

    /// Weight-vector validation: load-time rejection of sums deviating from
    /// 1.00 by more than 1e-6.
    pub fn validate(&self) -> Result<(), crate::DiscoveryError> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(crate::DiscoveryError::InvalidConfig(format!(
                "weight vector sums to {sum}, expected 1.00 +/- 1e-6"
            )));
        }
        Ok(())
    }

    pub fn get(&self, bucket: &str) -> Option<f64> {
        match bucket {
            "volume_momentum" => Some(self.volume_momentum),
            "squeeze" => Some(self.squeeze),
            "catalyst" => Some(self.catalyst),
            "sentiment" => Some(self.sentiment),
            "options" => Some(self.options),
            "technical" => Some(self.technical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    pub trade_ready: f64,
    pub watchlist: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            trade_ready: 75.0,
            watchlist: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardConfig {
    pub min_price: Decimal,
    pub min_dollar_volume: Decimal,
    pub max_spread_bps: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_price: Decimal::new(150, 2),
            min_dollar_volume: Decimal::new(1_000_000, 0),
            max_spread_bps: 60.0,
        }
    }
}

/// A named weight/threshold/guard bundle. Strategies are the only axis of
/// variance - there is one canonical pipeline, never parallel code paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub weights: ScoreWeights,
    #[serde(default)]
    pub tier_thresholds: TierThresholds,
    #[serde(default)]
    pub guards: GuardConfig,
    pub universe_cap: usize,
    pub enrichment_concurrency: usize,
    pub elastic_floor: usize,
}

impl StrategyConfig {
    pub fn default_alphastack(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weights: ScoreWeights::ALPHASTACK_4_1,
            tier_thresholds: TierThresholds::default(),
            guards: GuardConfig::default(),
            universe_cap: 300,
            enrichment_concurrency: 8,
            elastic_floor: 3,
        }
    }

    pub fn validate(&self) -> Result<(), crate::DiscoveryError> {
        self.weights.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// Per-stage input/output counts, monotone non-increasing across stages.
pub type StageCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub strategy_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub counts_in: StageCounts,
    pub counts_out: StageCounts,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: Uuid, strategy_id: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            strategy_id: strategy_id.into(),
            enqueued_at,
            started_at: None,
            finished_at: None,
            state: RunState::Queued,
            counts_in: StageCounts::new(),
            counts_out: StageCounts::new(),
            error: None,
        }
    }

    pub fn record_stage(&mut self, stage: &str, count_in: usize, count_out: usize) {
        self.counts_in.insert(stage.to_string(), count_in);
        self.counts_out.insert(stage.to_string(), count_out);
    }
}

/// Market volatility classification used to adapt technical thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    HighVol,
    Normal,
    LowVol,
}

/// System health as surfaced on `X-System-State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemState {
    Healthy,
    Stale,
    Degraded,
}
