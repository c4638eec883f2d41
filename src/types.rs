//! Shared data types for action execution, planning, and page context.
//!
//! Everything that crosses the public API or gets serialized for an AI
//! model lives here. Wire shapes use camelCase field names so plan JSON
//! produced by a model round-trips without renaming.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Outcome envelope returned by every browser action.
///
/// `error` is populated only on failure; `data` carries operation-specific
/// payloads (extracted values, screenshot paths, plan step outcomes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    pub fn ok_with(data: Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }

    /// Failure that still carries a payload. Plan execution uses this to
    /// report the prefix of steps attempted before the failing one.
    pub fn fail_with(error: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: Some(data),
        }
    }
}

/// Browser viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Direction for a scroll action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// (dx, dy) multipliers applied to a scroll distance.
    pub fn deltas(self, distance: i64) -> (i64, i64) {
        match self {
            ScrollDirection::Up => (0, -distance),
            ScrollDirection::Down => (0, distance),
            ScrollDirection::Left => (-distance, 0),
            ScrollDirection::Right => (distance, 0),
        }
    }
}

/// A point in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// An axis-aligned box in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Position {
        Position {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// An element located on the page.
///
/// Geometry is optional: a match can name an element whose viewport box
/// could not be resolved. Such a match has no coordinate click target,
/// but its selector may still be usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMatch {
    /// CSS selector that resolved to the element.
    pub selector: String,
    /// Bounding box in viewport pixels, when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    /// Center of `rect`; present exactly when `rect` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Confidence in [0, 1]; heuristic matches report 0.5.
    pub confidence: f64,
}

impl ElementMatch {
    /// Build a match from a resolved bounding box.
    pub fn from_rect(selector: impl Into<String>, rect: Rect, confidence: f64) -> Self {
        Self {
            selector: selector.into(),
            position: Some(rect.center()),
            rect: Some(rect),
            confidence,
        }
    }

    /// Fill in `position` from `rect` when a deserialized match carries
    /// only the box.
    pub fn with_derived_position(mut self) -> Self {
        if self.position.is_none() {
            self.position = self.rect.map(|rect| rect.center());
        }
        self
    }
}

/// Result of a structured extraction for a single described field.
///
/// Serializes as JSON `null` (nothing matched), a string (single match),
/// or an array of strings (multiple matches).
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Missing,
    Text(String),
    Many(Vec<String>),
}

impl StructuredValue {
    /// Collapse a list of extracted texts into the tri-state shape.
    pub fn from_texts(mut texts: Vec<String>) -> Self {
        match texts.len() {
            0 => StructuredValue::Missing,
            1 => StructuredValue::Text(texts.remove(0)),
            _ => StructuredValue::Many(texts),
        }
    }
}

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StructuredValue::Missing => serializer.serialize_none(),
            StructuredValue::Text(text) => serializer.serialize_str(text),
            StructuredValue::Many(texts) => texts.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StructuredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(StructuredValue::Missing),
            Value::String(text) => Ok(StructuredValue::Text(text)),
            Value::Array(items) => {
                let texts = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(text) => Ok(text),
                        other => Err(DeError::custom(format!(
                            "expected string in extraction array, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StructuredValue::Many(texts))
            }
            other => Err(DeError::custom(format!(
                "expected null, string, or array, got {other}"
            ))),
        }
    }
}

/// One action inside a plan. The set of supported kinds is closed;
/// anything else a model emits is preserved as [`PlanAction::Unsupported`]
/// so execution can record it as a failed step instead of rejecting the
/// whole plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    /// Locate an element by description and click it.
    Click { element: String },
    /// Locate an element by description, click it, and type into it.
    Input { element: String, text: String },
    /// Extract text content from elements matching the selector.
    Extract { selector: Option<String> },
    /// An action kind this engine does not implement.
    Unsupported { kind: String },
}

impl PlanAction {
    pub fn kind(&self) -> &str {
        match self {
            PlanAction::Click { .. } => "click",
            PlanAction::Input { .. } => "input",
            PlanAction::Extract { .. } => "extract",
            PlanAction::Unsupported { kind } => kind,
        }
    }
}

/// A plan step: an action plus whether its failure aborts the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub action: PlanAction,
    pub optional: bool,
}

impl PlanStep {
    pub fn required(action: PlanAction) -> Self {
        Self {
            action,
            optional: false,
        }
    }

    pub fn optional(action: PlanAction) -> Self {
        Self {
            action,
            optional: true,
        }
    }
}

/// The wire shape of a step: `{"type": ..., "params": {...}, "optional": ...}`.
#[derive(Debug, Serialize, Deserialize)]
struct RawStep {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: BTreeMap<String, Value>,
    #[serde(default)]
    optional: bool,
}

fn require_str(params: &BTreeMap<String, Value>, field: &'static str) -> Result<String, String> {
    match params.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(format!("step parameter `{field}` must be a string, got {other}")),
        None => Err(format!("step parameter `{field}` is missing")),
    }
}

impl<'de> Deserialize<'de> for PlanStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawStep::deserialize(deserializer)?;
        let action = match raw.kind.as_str() {
            "click" => PlanAction::Click {
                element: require_str(&raw.params, "element").map_err(DeError::custom)?,
            },
            "input" => PlanAction::Input {
                element: require_str(&raw.params, "element").map_err(DeError::custom)?,
                text: require_str(&raw.params, "text").map_err(DeError::custom)?,
            },
            "extract" => PlanAction::Extract {
                selector: match raw.params.get("selector") {
                    Some(Value::String(selector)) => Some(selector.clone()),
                    Some(Value::Null) | None => None,
                    Some(other) => {
                        return Err(DeError::custom(format!(
                            "step parameter `selector` must be a string, got {other}"
                        )))
                    }
                },
            },
            other => PlanAction::Unsupported {
                kind: other.to_string(),
            },
        };
        Ok(PlanStep {
            action,
            optional: raw.optional,
        })
    }
}

impl Serialize for PlanStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut params = BTreeMap::new();
        match &self.action {
            PlanAction::Click { element } => {
                params.insert("element".to_string(), Value::String(element.clone()));
            }
            PlanAction::Input { element, text } => {
                params.insert("element".to_string(), Value::String(element.clone()));
                params.insert("text".to_string(), Value::String(text.clone()));
            }
            PlanAction::Extract { selector } => {
                if let Some(selector) = selector {
                    params.insert("selector".to_string(), Value::String(selector.clone()));
                }
            }
            PlanAction::Unsupported { .. } => {}
        }
        let raw = RawStep {
            kind: self.action.kind().to_string(),
            params,
            optional: self.optional,
        };
        raw.serialize(serializer)
    }
}

/// An ordered multi-step plan, typically produced by a planner model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<PlanStep>,
}

impl Plan {
    pub fn new(actions: Vec<PlanStep>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// A pruned DOM subtree captured for model context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Trimmed text content, truncated to 100 characters at capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomNode>,
}

/// Everything captured about the current page state in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub url: String,
    pub title: String,
    /// Base64-encoded screenshot bytes, for visual reasoning.
    pub screenshot: String,
    /// Filesystem path of the screenshot written for this snapshot.
    pub screenshot_path: String,
    pub viewport: Viewport,
    /// Pruned DOM tree; `None` when the tree query failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_tree: Option<DomNode>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_result_skips_empty_fields() {
        let rendered = serde_json::to_value(ActionResult::ok()).unwrap();
        assert_eq!(rendered, json!({"success": true}));

        let rendered = serde_json::to_value(ActionResult::fail("boom")).unwrap();
        assert_eq!(rendered, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn element_match_geometry_is_optional() {
        let bare: ElementMatch =
            serde_json::from_str(r##"{"selector":"#login","confidence":0.7}"##).unwrap();
        assert!(bare.rect.is_none());
        assert!(bare.position.is_none());
        let rendered = serde_json::to_value(&bare).unwrap();
        assert!(rendered.get("rect").is_none());
        assert!(rendered.get("position").is_none());

        let boxed: ElementMatch = serde_json::from_str::<ElementMatch>(
            r##"{"selector":"#login","rect":{"x":10.0,"y":20.0,"width":80.0,"height":30.0},"confidence":0.9}"##,
        )
        .unwrap()
        .with_derived_position();
        assert_eq!(boxed.position, Some(Position { x: 50.0, y: 35.0 }));
    }

    #[test]
    fn structured_value_collapses_by_count() {
        assert_eq!(StructuredValue::from_texts(vec![]), StructuredValue::Missing);
        assert_eq!(
            StructuredValue::from_texts(vec!["one".into()]),
            StructuredValue::Text("one".into())
        );
        assert_eq!(
            serde_json::to_value(StructuredValue::from_texts(vec![
                "a".into(),
                "b".into()
            ]))
            .unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            serde_json::to_value(StructuredValue::Missing).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn plan_steps_parse_known_kinds() {
        let plan: Plan = serde_json::from_value(json!({
            "actions": [
                {"type": "click", "params": {"element": "login button"}},
                {"type": "input", "params": {"element": "search box", "text": "rust"}, "optional": true},
                {"type": "extract", "params": {"selector": "h1"}},
                {"type": "extract"}
            ]
        }))
        .unwrap();

        assert_eq!(plan.actions.len(), 4);
        assert_eq!(
            plan.actions[0].action,
            PlanAction::Click {
                element: "login button".into()
            }
        );
        assert!(plan.actions[1].optional);
        assert_eq!(
            plan.actions[2].action,
            PlanAction::Extract {
                selector: Some("h1".into())
            }
        );
        assert_eq!(plan.actions[3].action, PlanAction::Extract { selector: None });
    }

    #[test]
    fn unknown_step_kind_becomes_unsupported() {
        let step: PlanStep =
            serde_json::from_value(json!({"type": "hover", "params": {"element": "menu"}}))
                .unwrap();
        assert_eq!(
            step.action,
            PlanAction::Unsupported {
                kind: "hover".into()
            }
        );
    }

    #[test]
    fn click_without_element_is_a_parse_error() {
        let err = serde_json::from_value::<PlanStep>(json!({"type": "click"})).unwrap_err();
        assert!(err.to_string().contains("element"));
    }

    #[test]
    fn plan_round_trips_through_wire_shape() {
        let plan = Plan::new(vec![
            PlanStep::required(PlanAction::Click {
                element: "submit".into(),
            }),
            PlanStep::optional(PlanAction::Extract { selector: None }),
        ]);
        let wire = serde_json::to_value(&plan).unwrap();
        assert_eq!(wire["actions"][0]["type"], "click");
        assert_eq!(wire["actions"][1]["optional"], true);
        let back: Plan = serde_json::from_value(wire).unwrap();
        assert_eq!(back, plan);
    }
}
