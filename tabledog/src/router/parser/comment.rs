//! Statement hint comments.

use once_cell::sync::Lazy;
use pg_query::protobuf::Token;
use pg_query::scan;
use regex::Regex;

static NO_SHARDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bnosharding\b").unwrap());

/// Check for the `nosharding` hint, e.g.:
///
/// ```sql
/// SELECT /* nosharding */ * FROM orders
/// ```
///
/// The hint uses C-style comments so it can appear anywhere in the
/// statement. Tokenizing the query first keeps string literals that
/// happen to contain the word from triggering the hint.
pub fn no_sharding_hint(query: &str) -> bool {
    let Ok(tokens) = scan(query) else {
        return false;
    };

    tokens.tokens.iter().any(|token| {
        token.token == Token::CComment as i32
            && NO_SHARDING.is_match(&query[token.start as usize..token.end as usize])
    })
}
