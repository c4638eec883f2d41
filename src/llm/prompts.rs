//! Prompt builders for the locator and planner requests.

use crate::types::ContextSnapshot;

/// Plan action kinds the execution engine knows how to run.
pub const SUPPORTED_PLAN_ACTIONS: &[&str] = &["click", "input", "extract"];

/// Upper bound on the serialized DOM tree embedded in a prompt.
const MAX_TREE_CHARS: usize = 12_000;

pub fn build_locator_system_prompt() -> String {
    "You are helping the user automate a browser by locating a single element \
on the current page from a natural language description.\n\nYou will be given:\n\
1. the element description\n\
2. the page URL and title\n\
3. a pruned JSON tree of the page DOM\n\n\
Respond with JSON only. If you find the element, reply with an object with keys \
`selector` (a CSS selector that uniquely matches it), `rect` (an object with \
`x`, `y`, `width`, `height`, its viewport bounding box in CSS pixels, or null \
if the box cannot be determined), and `confidence` (a number in [0, 1]). \
If no element matches the description, reply with `null`. Never reply with more \
than one element and never include prose outside the JSON."
        .to_string()
}

pub fn build_locator_user_message(description: &str, snapshot: &ContextSnapshot) -> String {
    format!(
        "Element description: {description}\n\n{}",
        render_snapshot(snapshot)
    )
}

pub fn build_planner_system_prompt() -> String {
    format!(
        "You are helping the user automate a browser by planning a short sequence \
of page actions that accomplish a goal.\n\nYou will be given:\n\
1. the goal\n\
2. the page URL and title\n\
3. a pruned JSON tree of the page DOM\n\n\
Respond with JSON only: an object with an `actions` array. Each action is an \
object with keys `type` (one of: {}), `params`, and optionally `optional` \
(boolean, default false). `click` takes params.element (a natural language \
description of the element to click). `input` takes params.element and \
params.text. `extract` takes an optional params.selector (a CSS selector). \
Mark steps whose failure should not abort the plan as optional. Keep plans \
short and concrete; never include prose outside the JSON.",
        SUPPORTED_PLAN_ACTIONS.join(", ")
    )
}

pub fn build_planner_user_message(goal: &str, snapshot: &ContextSnapshot) -> String {
    format!("Goal: {goal}\n\n{}", render_snapshot(snapshot))
}

fn render_snapshot(snapshot: &ContextSnapshot) -> String {
    let tree = snapshot
        .dom_tree
        .as_ref()
        .and_then(|tree| serde_json::to_string(tree).ok())
        .unwrap_or_else(|| "null".to_string());
    let tree = truncate(&tree, MAX_TREE_CHARS);

    format!(
        "Page URL: {}\nPage title: {}\nViewport: {}x{}\nDOM tree: {tree}",
        snapshot.url, snapshot.title, snapshot.viewport.width, snapshot.viewport.height
    )
}

fn truncate(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    let mut cut = limit;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &value[..cut])
}
