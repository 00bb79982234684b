//! `key=value key2=value2` parameter strings.

use std::collections::HashMap;

/// Parsed task parameters.
pub type Parameters = HashMap<String, String>;

/// Parse a whitespace-separated list of `key=value` tokens.
///
/// Lossy:
/// - tokens are split on every `=`, and only tokens with exactly two segments
///   survive (`bad` and `c=3=` are dropped);
/// - an empty key (`=x`) drops the token, an empty value (`x=`) is kept;
/// - a later duplicate key overwrites the earlier one.
///
/// Empty or whitespace-only input yields an empty map. This never fails.
pub fn parse_params(text: &str) -> Parameters {
    let mut params = Parameters::new();
    for token in text.split_whitespace() {
        let mut segments = token.split('=');
        let (Some(key), Some(value), None) = (segments.next(), segments.next(), segments.next())
        else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        params.insert(key.to_string(), value.to_string());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn map(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case("", &[])]
    #[case("   \t \n ", &[])]
    #[case("a=1", &[("a", "1")])]
    #[case("a=1 b=2 bad c=3= d=4", &[("a", "1"), ("b", "2"), ("d", "4")])]
    #[case("  a=1\t\tb=2\n", &[("a", "1"), ("b", "2")])]
    #[case("=orphan k=v", &[("k", "v")])]
    #[case("empty=", &[("empty", "")])]
    #[case("a=1 a=2", &[("a", "2")])]
    fn parses_token_grammar(#[case] input: &str, #[case] expected: &[(&str, &str)]) {
        assert_eq!(parse_params(input), map(expected));
    }

    #[test]
    fn key_order_does_not_matter() {
        assert_eq!(parse_params("x=1 y=2"), parse_params("y=2 x=1"));
    }
}
