//! Plain-text rendering of a task tree

use colored::Colorize;

use crate::session::SessionUpdate;
use crate::tree::{TaskNode, TaskTree};

/// Shown in place of a title that has not streamed in yet
const PLACEHOLDER: &str = "…";

/// Render the tree as an indented checklist, one task per line
///
/// Colors follow the `colored` crate's global override, so callers printing
/// to a pipe can switch them off.
pub fn render_tree(tree: &TaskTree) -> String {
    let mut out = String::new();
    for (depth, node) in tree.iter_depth_first() {
        out.push_str(&render_line(depth, node));
        out.push('\n');
    }
    out
}

fn render_line(depth: usize, node: &TaskNode) -> String {
    let indent = "  ".repeat(depth);
    let check = if node.is_completed() { "[x]".green() } else { "[ ]".normal() };
    let title = if node.is_placeholder() {
        PLACEHOLDER.dimmed()
    } else if node.is_completed() {
        node.title().strikethrough()
    } else {
        node.title().normal()
    };
    format!("{}{} {} {}", indent, check, title, node.id().to_string().dimmed())
}

/// One-line status for a session in progress, e.g. "streaming [0/7] 312 bytes"
pub fn progress_line(tree: &TaskTree, bytes: usize, label: &str) -> String {
    format!("{} {} {} bytes", label, tree.counts().progress_string(), bytes)
}

/// Progress text for stderr, or None when nothing should be written
///
/// On a terminal every update redraws one line in place. Anywhere else only
/// the final update is written, as a plain line without control codes.
pub fn progress_status(update: &SessionUpdate<'_>, terminal: bool) -> Option<String> {
    let label = if update.done { "done" } else { "streaming" };
    let line = progress_line(update.tree, update.content.len(), label);
    if !terminal {
        return update.done.then(|| format!("{}\n", line));
    }

    let latest = update
        .tree
        .iter_depth_first()
        .last()
        .map(|(_, node)| node.title().to_string())
        .unwrap_or_default();
    Some(format!("\r\x1b[2K{} {}", line, latest.dimmed()))
}
