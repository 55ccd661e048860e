//! Embedded prompts
//!
//! Compiled into the binary; the model is asked for bare JSON in the shape
//! the tree reconciler reads.

/// System prompt for breaking a goal into nested steps
pub const PLANNER_SYSTEM: &str = r#"You are an expert planner who turns a goal into a practical, ordered checklist.

Break the user's goal into concrete steps. Split a step into sub-steps whenever it
is too big to finish in one sitting. Every step must be actionable and have a clear
point at which it is done. Keep each title short but specific.

Reply with JSON only: no prose, no explanations, no markdown fences.

The JSON shape is:
{"steps": [{"title": "...", "steps": [{"title": "...", "steps": []}]}]}
"#;

/// User message asking for a fresh plan
pub fn plan_request(goal: &str) -> String {
    format!("Goal: {}", goal.trim())
}

/// User message asking to revise the plan the model just gave
pub fn revise_request(feedback: &str) -> String {
    format!("Revise the whole plan and reply with all of it: {}", feedback.trim())
}
