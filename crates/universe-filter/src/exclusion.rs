use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Embedded list of ~80 common exchange-traded products, checked against
/// the raw symbol. Generalizes the ad hoc `.`/`-`/length>5 ticker filter
/// this guard is grounded on into an explicit named set plus a name
/// suffix regex.
const ETP_SYMBOLS: &[&str] = &[
    "SPY", "QQQ", "DIA", "IWM", "VTI", "VOO", "IVV", "VEA", "VWO", "AGG",
    "BND", "GLD", "SLV", "USO", "UNG", "XLF", "XLK", "XLE", "XLV", "XLY",
    "XLP", "XLI", "XLB", "XLU", "XLRE", "XLC", "XBI", "XRT", "XOP", "SMH",
    "SOXX", "ARKK", "ARKG", "ARKW", "ARKF", "ARKQ", "TQQQ", "SQQQ", "SPXU",
    "UPRO", "SPXL", "SPXS", "TNA", "TZA", "UVXY", "VXX", "SVXY", "EEM",
    "EFA", "FXI", "EWZ", "EWJ", "EWG", "EWU", "HYG", "LQD", "TLT", "IEF",
    "SHY", "TIP", "MUB", "VNQ", "SCHD", "VYM", "VIG", "DVY", "HDV", "JEPI",
    "JEPQ", "SPLG", "RSP", "MDY", "IJH", "IJR", "VB", "VO", "VUG", "VTV",
    "IWF", "IWD", "IWO", "IWN", "BIL", "SHV", "GOVT", "BNDX", "VXUS",
    "SCHF", "SCHX", "SCHB",
];

static SYMBOL_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| ETP_SYMBOLS.iter().copied().collect());
static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(ETF|FUND|TRUST)\b").expect("static regex compiles"));

pub struct ExclusionSet;

impl ExclusionSet {
    pub fn is_excluded(symbol: &str, name: Option<&str>) -> bool {
        if SYMBOL_SET.contains(symbol.to_uppercase().as_str()) {
            return true;
        }
        if let Some(name) = name {
            if NAME_REGEX.is_match(name) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_etf_symbol_excluded() {
        assert!(ExclusionSet::is_excluded("SPY", None));
        assert!(ExclusionSet::is_excluded("spy", None));
    }

    #[test]
    fn name_regex_catches_unlisted_funds() {
        assert!(ExclusionSet::is_excluded("FUNDX", Some("SPDR FUND")));
        assert!(ExclusionSet::is_excluded("ZZZZ", Some("Some Trust II")));
    }

    #[test]
    fn ordinary_equity_not_excluded() {
        assert!(!ExclusionSet::is_excluded("AAPL", Some("Apple Inc.")));
    }
}
