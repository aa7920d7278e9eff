//! Default ticker list.

/// Symbols tracked when no explicit list is configured.
pub const DEFAULT_SYMBOLS: [&str; 25] = [
    "AAPL", "GOOG", "TSLA", "AMZN", "MSFT", "NVDA", "META", "NFLX", "AMD", "INTC", "ORCL", "CSCO",
    "ADBE", "CRM", "PYPL", "SQ", "SHOP", "UBER", "LYFT", "ABNB", "COIN", "ROKU", "SNAP", "PINS",
    "ZM",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_symbols_unique() {
        let unique: HashSet<_> = DEFAULT_SYMBOLS.iter().collect();
        assert_eq!(unique.len(), DEFAULT_SYMBOLS.len());
    }
}
