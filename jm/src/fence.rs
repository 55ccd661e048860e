//! Markdown fence stripping
//!
//! Models often wrap JSON in a ```json ... ``` block even when told not to.
//! Only the fence markers are removed here; whitespace and prose handling is
//! left to the scanner.

use tracing::debug;

const FENCE: &str = "```";

/// Strip a leading fence (with optional language tag) and a trailing fence
pub fn strip(input: &str) -> &str {
    debug!(input_len = input.len(), "strip: called");
    let body = strip_leading(input.trim_start());
    strip_trailing(body)
}

/// Remove an opening fence and its language tag
///
/// The fence may be preceded by prose ("Here is the plan:"), but only when
/// no JSON container has opened before it.
fn strip_leading(s: &str) -> &str {
    let Some(pos) = s.find(FENCE) else {
        debug!("strip_leading: no fence");
        return s;
    };

    if s[..pos].contains(['{', '[']) {
        debug!(pos, "strip_leading: fence after content, leaving as-is");
        return s;
    }

    let rest = &s[pos + FENCE.len()..];
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(rest.len());
    debug!(tag = %&rest[..tag_len], "strip_leading: stripped opening fence");
    &rest[tag_len..]
}

/// Remove a closing fence that sits on its own line or directly after a closer
fn strip_trailing(s: &str) -> &str {
    let trimmed = s.trim_end();
    let Some(body) = trimmed.strip_suffix(FENCE) else {
        return s;
    };

    match body.trim_end_matches([' ', '\t']).chars().last() {
        None | Some('\n') | Some('\r') | Some('}') | Some(']') => {
            debug!("strip_trailing: stripped closing fence");
            body
        }
        Some(_) => s,
    }
}
