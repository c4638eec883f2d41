//! AI-enhanced automation agent.
//!
//! [`WebPilot`] composes an [`ActionAgent`] with two optional reasoning
//! capabilities, an [`ElementLocator`] and an [`ActionPlanner`]. Absence
//! of a capability is decided at construction time; every AI-assisted
//! operation degrades to a deterministic fallback (keyword heuristic for
//! location, a fixed extraction plan for planning) when the capability is
//! missing or fails, so the pilot keeps working without a model.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::agent::{ActionAgent, ERR_NOT_INITIALIZED};
use crate::config::PilotConfig;
use crate::driver::PageQuery;
use crate::llm::{PilotLlmClient, PilotLlmError};
use crate::reasoning::{
    heuristic_target, ActionPlanner, ElementLocator, HeuristicTarget, FALLBACK_EXTRACT_SELECTOR,
    HEURISTIC_CONFIDENCE,
};
use crate::snapshot;
use crate::types::{ActionResult, ContextSnapshot, ElementMatch, Plan, PlanAction, PlanStep, Rect};

/// Instruction used for opportunistic post-navigation planning.
const AUTONOMOUS_PLANNING_GOAL: &str =
    "Analyze the page and propose the most useful next actions.";

/// Selector used by plan `extract` steps that name no selector.
const DEFAULT_EXTRACT_SELECTOR: &str = "body";

pub struct WebPilot {
    agent: ActionAgent,
    locator: Option<Arc<dyn ElementLocator>>,
    planner: Option<Arc<dyn ActionPlanner>>,
}

impl WebPilot {
    /// Build a pilot without reasoning capabilities attached.
    pub fn new(config: PilotConfig) -> Self {
        Self::with_agent(ActionAgent::new(config))
    }

    /// Build a pilot around an existing agent.
    pub fn with_agent(agent: ActionAgent) -> Self {
        Self {
            agent,
            locator: None,
            planner: None,
        }
    }

    /// Build a pilot with the OpenAI-backed locator and planner attached.
    pub fn with_model(config: PilotConfig) -> Result<Self, PilotLlmError> {
        let client = Arc::new(PilotLlmClient::from_config(&config)?);
        Ok(Self::with_agent(ActionAgent::new(config))
            .locator(Some(client.clone() as Arc<dyn ElementLocator>))
            .planner(Some(client as Arc<dyn ActionPlanner>)))
    }

    pub fn locator(mut self, locator: Option<Arc<dyn ElementLocator>>) -> Self {
        self.locator = locator;
        self
    }

    pub fn planner(mut self, planner: Option<Arc<dyn ActionPlanner>>) -> Self {
        self.planner = planner;
        self
    }

    pub fn agent(&self) -> &ActionAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut ActionAgent {
        &mut self.agent
    }

    pub async fn initialize(&mut self) -> ActionResult {
        self.agent.initialize().await
    }

    pub async fn close(&mut self) -> ActionResult {
        self.agent.close().await
    }

    /// Navigate, wait for the page to settle, and, when autonomous
    /// planning is enabled, propose follow-up actions for the new page.
    /// Planning is best effort and never affects the navigation result.
    pub async fn navigate_to(&self, url: &str) -> ActionResult {
        let navigated = self.agent.navigate(url).await;
        if !navigated.success {
            return navigated;
        }

        let waited = self.agent.wait_for_navigation(None).await;
        if !waited.success {
            return waited;
        }

        let mut data = json!({ "url": url });
        if let Some(complete) = waited.data.as_ref().and_then(|d| d.get("complete")) {
            data["complete"] = complete.clone();
        }

        if self.agent.config().autonomous_planning {
            let plan = self.create_plan_for_page(AUTONOMOUS_PLANNING_GOAL).await;
            match serde_json::to_value(&plan) {
                Ok(rendered) => data["plan"] = rendered,
                Err(err) => self.agent.logger().debug(
                    format!("post-navigation plan could not be rendered: {err}"),
                    Some("pilot"),
                    None,
                ),
            }
        }

        ActionResult::ok_with(data)
    }

    /// Capture the current page context as an envelope payload.
    pub async fn capture_context(&self) -> ActionResult {
        match snapshot::capture_context(&self.agent).await {
            Ok(snapshot) => match serde_json::to_value(&snapshot) {
                Ok(rendered) => ActionResult::ok_with(rendered),
                Err(err) => ActionResult::fail(err.to_string()),
            },
            Err(err) => ActionResult::fail(err.to_string()),
        }
    }

    /// Find an element from a natural-language description.
    ///
    /// Tries the attached locator first (when AI detection is enabled),
    /// then the keyword heuristic. Matches below the configured confidence
    /// threshold are discarded in favor of the heuristic.
    pub async fn locate_element(&self, description: &str) -> ActionResult {
        if !self.agent.is_ready() {
            return ActionResult::fail(ERR_NOT_INITIALIZED);
        }

        match self.resolve_element(description).await {
            Ok(found) => match serde_json::to_value(&found) {
                Ok(rendered) => ActionResult::ok_with(rendered),
                Err(err) => ActionResult::fail(err.to_string()),
            },
            Err(err) => ActionResult::fail(err),
        }
    }

    /// Build a plan for a goal. Never hard-fails: when no planner is
    /// attached, or planning fails, a fixed single-step extraction plan
    /// over common content selectors is returned instead.
    pub async fn create_plan_for_page(&self, goal: &str) -> Plan {
        let Some(planner) = &self.planner else {
            self.agent.logger().debug(
                "no planner attached, using the fallback plan".to_string(),
                Some("pilot"),
                None,
            );
            return fallback_plan();
        };

        let snapshot = match self.capture_for_reasoning().await {
            Some(snapshot) => snapshot,
            None => return fallback_plan(),
        };

        match planner.plan(goal, &snapshot).await {
            Ok(plan) => plan,
            Err(err) => {
                self.agent.logger().debug(
                    format!("planning failed, using the fallback plan: {err}"),
                    Some("pilot"),
                    None,
                );
                fallback_plan()
            }
        }
    }

    /// Run a plan step by step.
    ///
    /// A failed step whose `optional` flag is unset stops execution
    /// immediately. `data.actions` always holds one record per attempted
    /// step, and the overall result succeeds only when every attempted
    /// step did.
    pub async fn execute_plan(&self, plan: &Plan) -> ActionResult {
        if !self.agent.is_ready() {
            return ActionResult::fail(ERR_NOT_INITIALIZED);
        }

        let mut records = Vec::with_capacity(plan.actions.len());
        let mut first_error: Option<String> = None;

        for (index, step) in plan.actions.iter().enumerate() {
            let kind = step.action.kind().to_string();
            match self.run_step(step).await {
                Ok(data) => {
                    let mut record = json!({ "type": kind, "success": true });
                    if !data.is_null() {
                        record["data"] = data;
                    }
                    records.push(record);
                }
                Err(err) => {
                    records.push(json!({
                        "type": kind,
                        "success": false,
                        "error": err,
                    }));
                    if first_error.is_none() {
                        first_error =
                            Some(format!("plan step {} ({kind}) failed: {err}", index + 1));
                    }
                    if !step.optional {
                        break;
                    }
                }
            }
        }

        let data = json!({ "actions": records });
        match first_error {
            None => ActionResult::ok_with(data),
            Some(error) => ActionResult::fail_with(error, data),
        }
    }

    async fn run_step(&self, step: &PlanStep) -> Result<JsonValue, String> {
        match &step.action {
            PlanAction::Click { element } => {
                let found = self.resolve_element(element).await?;
                self.click_match(element, &found).await?;
                Ok(json!({ "element": element, "selector": found.selector }))
            }
            PlanAction::Input { element, text } => {
                let found = self.resolve_element(element).await?;
                self.click_match(element, &found).await?;
                into_step_data(self.agent.type_text(text).await)?;
                Ok(json!({ "element": element, "selector": found.selector }))
            }
            PlanAction::Extract { selector } => {
                let selector = selector.as_deref().unwrap_or(DEFAULT_EXTRACT_SELECTOR);
                into_step_data(self.agent.extract_text(selector).await)
            }
            PlanAction::Unsupported { kind } => Err(format!("unsupported action type '{kind}'")),
        }
    }

    /// Click a located element.
    ///
    /// Prefers the selector path, which scrolls the element into view
    /// before clicking, so off-viewport targets end up at coordinates the
    /// input layer can hit. A match without a usable selector falls back
    /// to its recorded center; one with neither has no click target.
    async fn click_match(&self, description: &str, found: &ElementMatch) -> Result<(), String> {
        if !found.selector.is_empty() {
            match self.agent.click_selector(&found.selector).await {
                Ok(()) => return Ok(()),
                Err(err) if found.position.is_none() => return Err(err),
                Err(err) => self.agent.logger().debug(
                    format!(
                        "selector click failed for '{description}', using coordinates: {err}"
                    ),
                    Some("pilot"),
                    None,
                ),
            }
        }

        match found.position {
            Some(position) => self
                .agent
                .click_point(position.x, position.y)
                .await
                .map_err(|err| err.to_string()),
            None => Err(format!(
                "located '{description}' but its click target is undeterminable"
            )),
        }
    }

    /// Two-tier location: attached locator first, heuristic second.
    async fn resolve_element(&self, description: &str) -> Result<ElementMatch, String> {
        if self.agent.config().ai_element_detection {
            if let Some(locator) = &self.locator {
                if let Some(snapshot) = self.capture_for_reasoning().await {
                    match locator.locate(description, &snapshot).await {
                        Ok(Some(found))
                            if found.confidence >= self.agent.config().confidence_threshold =>
                        {
                            return Ok(found);
                        }
                        Ok(Some(found)) => self.agent.logger().debug(
                            format!(
                                "discarding low-confidence match ({:.2}) for '{description}'",
                                found.confidence
                            ),
                            Some("pilot"),
                            None,
                        ),
                        Ok(None) => self.agent.logger().debug(
                            format!("model found no element for '{description}'"),
                            Some("pilot"),
                            None,
                        ),
                        Err(err) => self.agent.logger().debug(
                            format!("element location failed for '{description}': {err}"),
                            Some("pilot"),
                            None,
                        ),
                    }
                }
            }
        }

        self.heuristic_match(description).await
    }

    async fn heuristic_match(&self, description: &str) -> Result<ElementMatch, String> {
        let (selector, rect) = match heuristic_target(description) {
            HeuristicTarget::Selector(selector) => {
                let rect = self
                    .agent
                    .run_query(&PageQuery::BoundingBox {
                        selector: selector.to_string(),
                    })
                    .await
                    .map_err(|err| err.to_string())?;
                (selector.to_string(), rect)
            }
            HeuristicTarget::Text(text) => {
                let found = self
                    .agent
                    .run_query(&PageQuery::FindByText { text })
                    .await
                    .map_err(|err| err.to_string())?;
                let selector = found
                    .get("selector")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                (selector, found)
            }
        };

        element_from_rect(selector, &rect)
            .ok_or_else(|| format!("no element found matching '{description}'"))
    }

    /// Snapshot capture for the reasoning layer; failures are logged and
    /// reported as absence so callers fall through to their fallback.
    async fn capture_for_reasoning(&self) -> Option<ContextSnapshot> {
        match snapshot::capture_context(&self.agent).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                self.agent.logger().debug(
                    format!("context capture failed, continuing without it: {err}"),
                    Some("pilot"),
                    None,
                );
                None
            }
        }
    }
}

fn fallback_plan() -> Plan {
    Plan::new(vec![PlanStep::required(PlanAction::Extract {
        selector: Some(FALLBACK_EXTRACT_SELECTOR.to_string()),
    })])
}

/// Convert a page rect into a center-point match at heuristic confidence.
fn element_from_rect(selector: String, rect: &JsonValue) -> Option<ElementMatch> {
    let rect: Rect = serde_json::from_value(rect.clone()).ok()?;
    Some(ElementMatch::from_rect(selector, rect, HEURISTIC_CONFIDENCE))
}

fn into_step_data(result: ActionResult) -> Result<JsonValue, String> {
    if result.success {
        Ok(result.data.unwrap_or(JsonValue::Null))
    } else {
        Err(result
            .error
            .unwrap_or_else(|| "action failed without detail".to_string()))
    }
}
