//! Oracle response parser.
//!
//! Scans free text for directives of the form `<buy|sell> <TICKER|all> [<hours>]`.
//! Anything that does not fit the grammar is skipped, so a response mixing
//! prose and well-formed directives still yields every directive it contains.

use crate::models::TradeAdvice;

const ALL_KEYWORD: &str = "all";
const MAX_TICKER_LEN: usize = 10;
const PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '*', '`',
];

/// Maps oracle text to trade advice
#[derive(Debug, Clone)]
pub struct AdviceParser {
    default_duration_hours: u32,
    all_alias_asset: String,
}

impl AdviceParser {
    /// # Arguments
    /// * `default_duration_hours` - Holding time used when a buy omits one
    /// * `all_alias_asset` - Asset bought when the oracle says `buy all`
    pub fn new(default_duration_hours: u32, all_alias_asset: impl Into<String>) -> Self {
        Self {
            default_duration_hours,
            all_alias_asset: all_alias_asset.into(),
        }
    }

    pub fn default_duration_hours(&self) -> u32 {
        self.default_duration_hours
    }

    pub fn all_alias_asset(&self) -> &str {
        &self.all_alias_asset
    }

    /// Extract every well-formed directive, in order of appearance
    pub fn parse(&self, response: &str) -> Vec<TradeAdvice> {
        let tokens: Vec<&str> = response
            .split_whitespace()
            .map(|t| t.trim_matches(PUNCTUATION))
            .collect();

        let mut advices = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let Some(side) = parse_side(tokens[i]) else {
                i += 1;
                continue;
            };
            let Some(asset) = tokens.get(i + 1).and_then(|t| parse_asset(t)) else {
                i += 1;
                continue;
            };

            let duration = tokens.get(i + 2).and_then(|t| parse_duration(t));
            let consumed = if duration.is_some() { 3 } else { 2 };

            let advice = match (side, asset) {
                (Directive::Buy, AssetToken::All) => {
                    TradeAdvice::buy(self.all_alias_asset.clone(), self.resolve(duration))
                }
                (Directive::Buy, AssetToken::Ticker(ticker)) => {
                    TradeAdvice::buy(ticker, self.resolve(duration))
                }
                (Directive::Sell, AssetToken::All) => TradeAdvice::sell_all(),
                (Directive::Sell, AssetToken::Ticker(ticker)) => TradeAdvice::sell(ticker),
            };

            advices.push(advice);
            i += consumed;
        }

        advices
    }

    fn resolve(&self, duration: Option<u32>) -> u32 {
        duration.unwrap_or(self.default_duration_hours)
    }
}

#[derive(Debug, Clone, Copy)]
enum Directive {
    Buy,
    Sell,
}

#[derive(Debug)]
enum AssetToken<'a> {
    Ticker(&'a str),
    All,
}

fn parse_side(token: &str) -> Option<Directive> {
    if token.eq_ignore_ascii_case("buy") {
        Some(Directive::Buy)
    } else if token.eq_ignore_ascii_case("sell") {
        Some(Directive::Sell)
    } else {
        None
    }
}

fn parse_asset(token: &str) -> Option<AssetToken<'_>> {
    if token == ALL_KEYWORD {
        return Some(AssetToken::All);
    }

    let mut chars = token.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_uppercase()
        && (2..=MAX_TICKER_LEN).contains(&token.len())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

    valid.then_some(AssetToken::Ticker(token))
}

fn parse_duration(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse::<u32>().ok().filter(|hours| *hours > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parser() -> AdviceParser {
        AdviceParser::new(24, "BTC")
    }

    #[test]
    fn test_buy_with_duration() {
        assert_eq!(parser().parse("buy BTC 24"), vec![TradeAdvice::buy("BTC", 24)]);
    }

    #[test]
    fn test_sell_without_duration() {
        assert_eq!(parser().parse("sell ETH"), vec![TradeAdvice::sell("ETH")]);
    }

    #[test]
    fn test_buy_defaults_duration() {
        assert_eq!(parser().parse("buy SOL"), vec![TradeAdvice::buy("SOL", 24)]);
    }

    #[test]
    fn test_buy_all_resolves_to_alias() {
        assert_eq!(parser().parse("buy all 12"), vec![TradeAdvice::buy("BTC", 12)]);

        let avax = AdviceParser::new(24, "AVAX");
        assert_eq!(avax.parse("buy all"), vec![TradeAdvice::buy("AVAX", 24)]);
    }

    #[test]
    fn test_sell_all_is_marker() {
        assert_eq!(parser().parse("sell all"), vec![TradeAdvice::sell_all()]);
    }

    #[test]
    fn test_position_is_case_insensitive() {
        let advices = parser().parse("Buy DOGE 6\nSELL XRP\nsElL ADA");
        assert_eq!(
            advices,
            vec![
                TradeAdvice::buy("DOGE", 6),
                TradeAdvice::sell("XRP"),
                TradeAdvice::sell("ADA"),
            ]
        );
    }

    #[test]
    fn test_lowercase_ticker_ignored() {
        assert!(parser().parse("buy btc 24").is_empty());
        assert!(parser().parse("sell Eth").is_empty());
    }

    #[test]
    fn test_partial_success() {
        let text = "I think you should buy LINK 48 now. Also sell maybe. buy ??? 3";
        assert_eq!(parser().parse(text), vec![TradeAdvice::buy("LINK", 48)]);
    }

    #[test]
    fn test_surrounding_punctuation_stripped() {
        let text = "Recommendation: **buy ARB 12**, then \"sell OP\".";
        assert_eq!(
            parser().parse(text),
            vec![TradeAdvice::buy("ARB", 12), TradeAdvice::sell("OP")]
        );
    }

    #[test]
    fn test_invalid_durations_fall_back_to_default() {
        assert_eq!(parser().parse("buy BTC 0"), vec![TradeAdvice::buy("BTC", 24)]);
        assert_eq!(parser().parse("buy BTC 100"), vec![TradeAdvice::buy("BTC", 24)]);
        assert_eq!(parser().parse("buy BTC 5h"), vec![TradeAdvice::buy("BTC", 24)]);
    }

    #[test]
    fn test_sell_ignores_trailing_number_but_consumes_it() {
        assert_eq!(
            parser().parse("sell ETH 12 buy SOL 3"),
            vec![TradeAdvice::sell("ETH"), TradeAdvice::buy("SOL", 3)]
        );
    }

    #[test]
    fn test_adjacent_directives_without_duration() {
        assert_eq!(
            parser().parse("sell BTC buy ETH"),
            vec![TradeAdvice::sell("BTC"), TradeAdvice::buy("ETH", 24)]
        );
    }

    #[test]
    fn test_ticker_bounds() {
        assert!(parser().parse("buy B 4").is_empty());
        assert!(parser().parse("buy ABCDEFGHIJK 4").is_empty());
        assert!(parser().parse("buy 1INCH 4").is_empty());
        assert_eq!(parser().parse("buy PEPE2 4"), vec![TradeAdvice::buy("PEPE2", 4)]);
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(parser().parse("").is_empty());
        assert!(parser().parse("   \n\t ").is_empty());
        assert!(parser().parse("buy").is_empty());
        assert!(parser().parse("hold BTC 24").is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_panics(text in "\\PC*") {
            let _ = parser().parse(&text);
        }

        #[test]
        fn prop_buy_durations_in_range(text in "((buy|sell|Buy|all|BTC|ETH|[0-9]{1,3}|x) ){0,12}") {
            for advice in parser().parse(&text) {
                if let TradeAdvice::Buy { duration_hours, asset } = advice {
                    prop_assert!((1..=99).contains(&duration_hours));
                    prop_assert!(asset == "BTC" || asset == "ETH");
                }
            }
        }

        #[test]
        fn prop_wellformed_directive_found(ticker in "[A-Z]{2,6}", hours in 1u32..100) {
            let text = format!("noise words buy {} {} trailing", ticker, hours);
            prop_assert_eq!(parser().parse(&text), vec![TradeAdvice::buy(ticker, hours)]);
        }
    }
}
