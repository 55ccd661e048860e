//! jsonmend - best-effort repair of truncated JSON
//!
//! A language model streaming a JSON document produces text that is invalid
//! JSON at almost every point: strings are cut mid-word, keys dangle without
//! values, brackets are left open. `jsonmend` turns any such prefix into the
//! complete, valid JSON value it most plausibly represents.
//!
//! Every call is independent and deterministic: the whole prefix is rescanned
//! each time, so there is no parser state to carry between chunks.
//!
//! # Repair rules
//!
//! - A markdown fence (```` ```json ````) around the document is stripped, as
//!   is any prose before the first `{` or `[` and anything after the top-level
//!   value closes
//! - An open string is closed; a dangling backslash or half-written `\u`
//!   escape is dropped
//! - A key with no value gets `null` (`{"na` becomes `{"na":null}`)
//! - `tr`/`fa`/`nu` are completed to `true`/`false`/`null`
//! - Numbers are kept, minus any suffix that cannot end a number (`1.`, `1e`)
//! - A trailing comma before a closer is removed
//! - Open containers are closed innermost first; stray closers are ignored
//!
//! If the result still does not parse, [`repair`] returns an empty object.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//!
//! let value = jsonmend::repair(r#"{"steps": [{"title": "Buy a h"#);
//! assert_eq!(value, json!({"steps": [{"title": "Buy a h"}]}));
//! ```

pub mod fence;
pub mod literal;
pub mod scanner;

use serde_json::{Map, Value};
use tracing::debug;

pub use scanner::Scanner;

/// Result of a repair with diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    /// The repaired value; always an object or array
    pub value: Value,
    /// The repaired JSON text that was parsed
    pub text: String,
    /// True when `value` is the empty-object fallback: the input held no
    /// `{` or `[` at all, or the repaired text still failed to parse
    pub fallback: bool,
}

/// Repair a truncated JSON prefix into a valid value
///
/// Never panics. Returns an empty object when nothing usable is found.
pub fn repair(input: &str) -> Value {
    repair_outcome(input).value
}

/// Repair a truncated JSON prefix and return the repaired text
///
/// The text is what [`repair`] parses; it is compact (insignificant
/// whitespace removed).
pub fn repair_text(input: &str) -> String {
    Scanner::repair(fence::strip(input))
}

/// Repair with diagnostics
pub fn repair_outcome(input: &str) -> Repaired {
    debug!(input_len = input.len(), "repair_outcome: called");
    let mut scanner = Scanner::new();
    scanner.feed(fence::strip(input));
    if !scanner.found_container() {
        debug!("repair_outcome: no container in input, using fallback");
        return fallback(scanner.finish());
    }
    let text = scanner.finish();

    match serde_json::from_str::<Value>(&text) {
        Ok(value) if value.is_object() || value.is_array() => Repaired {
            value,
            text,
            fallback: false,
        },
        Ok(_) => {
            debug!("repair_outcome: repaired value is not a container, using fallback");
            fallback(text)
        }
        Err(e) => {
            debug!(error = %e, "repair_outcome: repaired text did not parse, using fallback");
            fallback(text)
        }
    }
}

fn fallback(text: String) -> Repaired {
    Repaired {
        value: Value::Object(Map::new()),
        text,
        fallback: true,
    }
}
