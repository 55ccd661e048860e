//! Settling bare tokens (literals and numbers) cut off mid-token

use std::borrow::Cow;

use tracing::debug;

const LITERALS: [&str; 3] = ["true", "false", "null"];

/// Complete a truncated `true`/`false`/`null`
///
/// Returns the full literal when `token` is a non-empty prefix of one.
pub fn complete_literal(token: &str) -> Option<&'static str> {
    if token.is_empty() {
        return None;
    }
    LITERALS.iter().copied().find(|lit| lit.starts_with(token))
}

/// Longest prefix of `token` that is a valid JSON number
///
/// `12` stays `12`, `1.` becomes `1`, `1e+` becomes `1`, `-` has no valid
/// prefix and yields `None`.
pub fn number_prefix(token: &str) -> Option<&str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Start,
        Minus,
        Zero,
        Int,
        Dot,
        Frac,
        Exp,
        ExpSign,
        ExpDigits,
    }

    let mut state = State::Start;
    let mut accepted = None;

    for (i, c) in token.char_indices() {
        state = match (state, c) {
            (State::Start, '-') => State::Minus,
            (State::Start | State::Minus, '0') => State::Zero,
            (State::Start | State::Minus, '1'..='9') => State::Int,
            (State::Int, '0'..='9') => State::Int,
            (State::Zero | State::Int, '.') => State::Dot,
            (State::Dot | State::Frac, '0'..='9') => State::Frac,
            (State::Zero | State::Int | State::Frac, 'e' | 'E') => State::Exp,
            (State::Exp, '+' | '-') => State::ExpSign,
            (State::Exp | State::ExpSign | State::ExpDigits, '0'..='9') => State::ExpDigits,
            _ => break,
        };
        if matches!(state, State::Zero | State::Int | State::Frac | State::ExpDigits) {
            accepted = Some(i + c.len_utf8());
        }
    }

    accepted.map(|end| &token[..end])
}

/// Turn a bare token into something a JSON parser accepts
///
/// Literal prefixes are completed, numbers lose any incomplete suffix, and
/// anything else (an unquoted word, a lone `-`) becomes `null`.
pub fn settle(token: &str) -> Cow<'_, str> {
    if let Some(lit) = complete_literal(token) {
        if lit.len() != token.len() {
            debug!(%token, %lit, "settle: completed literal");
        }
        return Cow::Borrowed(lit);
    }

    match number_prefix(token) {
        Some(num) if num.len() == token.len() => Cow::Borrowed(token),
        Some(num) => {
            debug!(%token, %num, "settle: trimmed numeric suffix");
            Cow::Borrowed(num)
        }
        None => {
            debug!(%token, "settle: unrecognized bare token, using null");
            Cow::Borrowed("null")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_literal() {
        assert_eq!(complete_literal("t"), Some("true"));
        assert_eq!(complete_literal("tru"), Some("true"));
        assert_eq!(complete_literal("fa"), Some("false"));
        assert_eq!(complete_literal("n"), Some("null"));
        assert_eq!(complete_literal("null"), Some("null"));
        assert_eq!(complete_literal(""), None);
        assert_eq!(complete_literal("trux"), None);
        assert_eq!(complete_literal("True"), None);
    }

    #[test]
    fn test_number_prefix() {
        assert_eq!(number_prefix("12"), Some("12"));
        assert_eq!(number_prefix("-0.5"), Some("-0.5"));
        assert_eq!(number_prefix("1."), Some("1"));
        assert_eq!(number_prefix("1e"), Some("1"));
        assert_eq!(number_prefix("1e+"), Some("1"));
        assert_eq!(number_prefix("2.5E-3"), Some("2.5E-3"));
        assert_eq!(number_prefix("01"), Some("0"));
        assert_eq!(number_prefix("-"), None);
        assert_eq!(number_prefix("abc"), None);
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle("fals"), "false");
        assert_eq!(settle("42"), "42");
        assert_eq!(settle("3.1e"), "3.1");
        assert_eq!(settle("-"), "null");
        assert_eq!(settle("Infinity"), "null");
    }
}
