use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Market data domain a factor is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataDomain {
    Price,
    Volume,
    Volatility,
    Fundamental,
    Sentiment,
    Flow,
}

pub const DOMAIN_COUNT: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct FactorInfo {
    pub name: &'static str,
    pub domain: DataDomain,
    pub description: &'static str,
}

pub const FACTOR_CATALOG: &[FactorInfo] = &[
    // Price
    FactorInfo { name: "close", domain: DataDomain::Price, description: "Closing price" },
    FactorInfo { name: "open", domain: DataDomain::Price, description: "Opening price" },
    FactorInfo { name: "high", domain: DataDomain::Price, description: "Session high" },
    FactorInfo { name: "low", domain: DataDomain::Price, description: "Session low" },
    FactorInfo { name: "vwap", domain: DataDomain::Price, description: "Volume weighted average price" },
    FactorInfo { name: "returns", domain: DataDomain::Price, description: "Daily close-to-close return" },
    FactorInfo { name: "momentum_20d", domain: DataDomain::Price, description: "20 day price momentum" },
    // Volume
    FactorInfo { name: "volume", domain: DataDomain::Volume, description: "Traded shares" },
    FactorInfo { name: "amount", domain: DataDomain::Volume, description: "Traded notional" },
    FactorInfo { name: "turnover_rate", domain: DataDomain::Volume, description: "Volume over float" },
    FactorInfo { name: "obv", domain: DataDomain::Volume, description: "On balance volume" },
    // Volatility
    FactorInfo { name: "atr", domain: DataDomain::Volatility, description: "Average true range" },
    FactorInfo { name: "realized_vol", domain: DataDomain::Volatility, description: "Rolling realized volatility" },
    FactorInfo { name: "bollinger_width", domain: DataDomain::Volatility, description: "Bollinger band width" },
    // Fundamental
    FactorInfo { name: "pe_ratio", domain: DataDomain::Fundamental, description: "Price to earnings" },
    FactorInfo { name: "pb_ratio", domain: DataDomain::Fundamental, description: "Price to book" },
    FactorInfo { name: "roe", domain: DataDomain::Fundamental, description: "Return on equity" },
    FactorInfo { name: "earnings_growth", domain: DataDomain::Fundamental, description: "YoY earnings growth" },
    FactorInfo { name: "dividend_yield", domain: DataDomain::Fundamental, description: "Trailing dividend yield" },
    // Sentiment
    FactorInfo { name: "news_sentiment", domain: DataDomain::Sentiment, description: "News tone score" },
    FactorInfo { name: "analyst_revisions", domain: DataDomain::Sentiment, description: "Net estimate revisions" },
    // Flow
    FactorInfo { name: "northbound_flow", domain: DataDomain::Flow, description: "Cross-border net buying" },
    FactorInfo { name: "margin_balance", domain: DataDomain::Flow, description: "Outstanding margin debt" },
    FactorInfo { name: "order_imbalance", domain: DataDomain::Flow, description: "Bid/ask volume imbalance" },
];

pub fn lookup(name: &str) -> Option<&'static FactorInfo> {
    FACTOR_CATALOG.iter().find(|f| f.name == name)
}

pub fn is_factor(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn domain_of(name: &str) -> Option<DataDomain> {
    lookup(name).map(|f| f.domain)
}

/// Catalog factors mentioned anywhere in a code body (identifier match).
pub fn factors_in_code(code: &str) -> BTreeSet<String> {
    code.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| is_factor(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_unique() {
        let names: BTreeSet<_> = FACTOR_CATALOG.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), FACTOR_CATALOG.len());
    }

    #[test]
    fn test_every_domain_is_populated() {
        let domains: BTreeSet<_> = FACTOR_CATALOG.iter().map(|f| f.domain).collect();
        assert_eq!(domains.len(), DOMAIN_COUNT);
    }

    #[test]
    fn test_factors_in_code_matches_whole_identifiers() {
        let code = "let s = rank(close) * zscore(volume_ratio) + atr;";
        let found = factors_in_code(code);
        assert!(found.contains("close"));
        assert!(found.contains("atr"));
        // volume_ratio is not a catalog factor and must not match "volume"
        assert!(!found.contains("volume"));
    }
}
