//! Property tests for the repair engine
//!
//! These exercise the guarantees callers rely on when feeding every prefix of
//! a streamed document through `repair`.

use jsonmend::{repair, repair_outcome, repair_text};
use proptest::prelude::*;
use serde_json::{Value, json};

const PLAN: &str = r#"```json
{
  "steps": [
    {"title": "Research neighborhoods", "steps": [
      {"title": "List \"must have\" features", "steps": []},
      {"title": "Visit on a weekend\nand a weekday"}
    ]},
    {"title": "Get pre-approved", "done": false, "budget": 350000.50, "notes": null},
    {"title": "Make an offer 🏠", "steps": [{"title": "Saïd's checklist"}]}
  ]
}
```"#;

/// Every prefix of a well-formed (fenced) document
fn prefixes(doc: &str) -> Vec<&str> {
    doc.char_indices().map(|(i, _)| &doc[..i]).chain(std::iter::once(doc)).collect()
}

#[test]
fn test_every_prefix_repairs_without_fallback() {
    for prefix in prefixes(PLAN).into_iter().filter(|p| p.contains('{')) {
        let outcome = repair_outcome(prefix);
        assert!(!outcome.fallback, "fallback for prefix {:?} -> {:?}", prefix, outcome.text);
        assert!(outcome.value.is_object());
    }
}

#[test]
fn test_prefixes_before_first_brace_fall_back() {
    let open = PLAN.find('{').unwrap();
    for prefix in prefixes(&PLAN[..open]) {
        let outcome = repair_outcome(prefix);
        assert!(outcome.fallback, "no fallback for prefix {:?}", prefix);
        assert_eq!(outcome.value, json!({}));
    }
}

#[test]
fn test_full_document_round_trips() {
    let expected: Value = serde_json::from_str(PLAN.trim_start_matches("```json").trim_end_matches("```")).unwrap();
    assert_eq!(repair(PLAN), expected);
}

#[test]
fn test_step_count_never_shrinks_across_prefixes() {
    let mut last = 0;
    for prefix in prefixes(PLAN) {
        let value = repair(prefix);
        let count = value["steps"].as_array().map(|a| a.len()).unwrap_or(0);
        assert!(count >= last, "step count shrank at prefix {:?}", prefix);
        last = count;
    }
    assert_eq!(last, 3);
}

#[test]
fn test_unmatched_closers() {
    assert_eq!(repair("}}}"), json!({}));
    assert_eq!(repair("]]"), json!({}));
    assert_eq!(repair("{]}"), json!({}));
}

proptest! {
    #[test]
    fn prop_never_panics_and_returns_container(s in ".*") {
        let value = repair(&s);
        prop_assert!(value.is_object() || value.is_array());
    }

    #[test]
    fn prop_output_serializes_to_valid_json(s in r#"[\[\]{}",:a-z0-9\\ \n.\-]{0,64}"#) {
        let value = repair(&s);
        let text = serde_json::to_string(&value).unwrap();
        prop_assert!(serde_json::from_str::<Value>(&text).is_ok());
    }

    #[test]
    fn prop_repair_is_idempotent_per_input(s in r#"[\[\]{}",:a-z\\ ]{0,48}"#) {
        prop_assert_eq!(repair(&s), repair(&s));
        prop_assert_eq!(repair_text(&s), repair_text(&s));
    }

    #[test]
    fn prop_prefixes_of_valid_documents_never_fall_back(cut in 0usize..400) {
        let end = PLAN.char_indices().map(|(i, _)| i).nth(cut).unwrap_or(PLAN.len());
        prop_assume!(PLAN[..end].contains('{'));
        let outcome = repair_outcome(&PLAN[..end]);
        prop_assert!(!outcome.fallback);
    }
}
