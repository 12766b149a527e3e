use std::collections::HashMap;

use discovery_core::{DiscoveryError, GuardConfig, ScoreWeights, StrategyConfig, TierThresholds};
use serde::Deserialize;
use tracing::{info, warn};

/// On-disk shape of the optional strategy file named in `SPEC_FULL.md`
/// §6 Configuration. Each entry validates independently (weight vector
/// sum, via `StrategyConfig::validate`) before being admitted.
#[derive(Debug, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    strategy: Vec<StrategyEntry>,
}

#[derive(Debug, Deserialize)]
struct StrategyEntry {
    id: String,
    weights: ScoreWeights,
    #[serde(default)]
    tier_thresholds: TierThresholds,
    #[serde(default)]
    guards: GuardConfig,
    #[serde(default = "default_universe_cap")]
    universe_cap: usize,
    #[serde(default = "default_enrichment_concurrency")]
    enrichment_concurrency: usize,
    #[serde(default = "default_elastic_floor")]
    elastic_floor: usize,
}

fn default_universe_cap() -> usize {
    300
}

fn default_enrichment_concurrency() -> usize {
    8
}

fn default_elastic_floor() -> usize {
    3
}

impl From<StrategyEntry> for StrategyConfig {
    fn from(entry: StrategyEntry) -> Self {
        StrategyConfig {
            id: entry.id,
            weights: entry.weights,
            tier_thresholds: entry.tier_thresholds,
            guards: entry.guards,
            universe_cap: entry.universe_cap,
            enrichment_concurrency: entry.enrichment_concurrency,
            elastic_floor: entry.elastic_floor,
        }
    }
}

fn builtin_defaults() -> HashMap<String, StrategyConfig> {
    let mut strategies = HashMap::new();
    for id in ["default", "legacy_v0", "hybrid_v1"] {
        strategies.insert(id.to_string(), StrategyConfig::default_alphastack(id));
    }
    strategies
}

/// Loads strategies from the TOML file named by `STRATEGY_CONFIG_PATH`, if
/// set and readable; otherwise falls back to the built-in AlphaStack 4.1
/// defaults for `default`/`legacy_v0`/`hybrid_v1`. Every loaded entry is
/// weight-validated (§3 invariant: sum = 1.00 +/- 1e-6) before being kept -
/// an invalid entry is a startup error, not a silently dropped strategy.
pub fn load() -> Result<HashMap<String, StrategyConfig>, DiscoveryError> {
    let path = match std::env::var("STRATEGY_CONFIG_PATH") {
        Ok(p) => p,
        Err(_) => return Ok(builtin_defaults()),
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path, error = %e, "strategy config path set but unreadable, using built-in defaults");
            return Ok(builtin_defaults());
        }
    };

    let parsed: StrategyFile = toml::from_str(&raw)
        .map_err(|e| DiscoveryError::InvalidConfig(format!("strategy file '{path}': {e}")))?;

    let mut strategies = HashMap::new();
    for entry in parsed.strategy {
        let config: StrategyConfig = entry.into();
        config.validate()?;
        info!(strategy_id = %config.id, "loaded strategy from config file");
        strategies.insert(config.id.clone(), config);
    }

    if strategies.is_empty() {
        warn!(path, "strategy file contained no entries, using built-in defaults");
        return Ok(builtin_defaults());
    }

    Ok(strategies)
}
