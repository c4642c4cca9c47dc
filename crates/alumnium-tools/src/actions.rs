//! Natural-language tools: do, check, get and area
//!
//! `do`, `check` and `get` each exist twice, once against a whole driver
//! (`alumnium_*`) and once confined to an area (`area_*`). The two variants
//! differ only in the id they take and how the store resolves it.

use std::sync::Arc;

use alumnium_core::{
    ActOutcome, Property, Result, SchemaBuilder, SessionStore, Tool, ToolResult, Verdict,
};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::args::{flag, required_str};

/// What an operation runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The whole view of a driver, by `driver_id`
    Driver,
    /// A region created by `alumnium_area`, by `area_id`
    Area,
}

impl Target {
    fn id_param(self) -> &'static str {
        match self {
            Self::Driver => "driver_id",
            Self::Area => "area_id",
        }
    }

    fn id_property(self) -> Property<'static> {
        match self {
            Self::Driver => Property::string("driver_id", "Driver ID from alumnium_start_driver"),
            Self::Area => Property::string("area_id", "Area ID from alumnium_area"),
        }
    }
}

fn vision_property() -> Property<'static> {
    Property::boolean(
        "vision",
        "Also send a screenshot to the model; slower but sees visual-only details",
        false,
    )
}

async fn act(store: &SessionStore, target: Target, id: &str, goal: String) -> Result<ActOutcome> {
    match target {
        Target::Driver => {
            store
                .with_session(id, move |session| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .act(session.driver.as_ref(), &goal, None)
                            .await
                    })
                })
                .await
        }
        Target::Area => {
            store
                .with_area(id, move |session, area| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .act(session.driver.as_ref(), &goal, Some(&area))
                            .await
                    })
                })
                .await
        }
    }
}

async fn check(
    store: &SessionStore,
    target: Target,
    id: &str,
    statement: String,
    vision: bool,
) -> Result<Verdict> {
    match target {
        Target::Driver => {
            store
                .with_session(id, move |session| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .check(session.driver.as_ref(), &statement, vision, None)
                            .await
                    })
                })
                .await
        }
        Target::Area => {
            store
                .with_area(id, move |session, area| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .check(session.driver.as_ref(), &statement, vision, Some(&area))
                            .await
                    })
                })
                .await
        }
    }
}

async fn get(
    store: &SessionStore,
    target: Target,
    id: &str,
    data: String,
    vision: bool,
) -> Result<Value> {
    match target {
        Target::Driver => {
            store
                .with_session(id, move |session| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .get(session.driver.as_ref(), &data, vision, None)
                            .await
                    })
                })
                .await
        }
        Target::Area => {
            store
                .with_area(id, move |session, area| {
                    Box::pin(async move {
                        session
                            .interpreter
                            .get(session.driver.as_ref(), &data, vision, Some(&area))
                            .await
                    })
                })
                .await
        }
    }
}

/// `alumnium_do` / `area_do`
pub struct DoTool {
    store: Arc<SessionStore>,
    target: Target,
}

impl DoTool {
    pub fn new(store: Arc<SessionStore>, target: Target) -> Self {
        Self { store, target }
    }
}

#[async_trait]
impl Tool for DoTool {
    fn name(&self) -> &str {
        match self.target {
            Target::Driver => "alumnium_do",
            Target::Area => "area_do",
        }
    }

    fn description(&self) -> &str {
        match self.target {
            Target::Driver => {
                "Perform an action described in natural language, e.g. \
                 'click the login button' or 'type hello into the search box'."
            }
            Target::Area => "Perform a natural-language action inside an area only.",
        }
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![
            self.target.id_property(),
            Property::string("goal", "What to do, in natural language"),
        ])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let id = required_str(&input, self.target.id_param())?;
        let goal = required_str(&input, "goal")?;

        let outcome = act(&self.store, self.target, &id, goal.clone()).await?;
        let steps: Vec<String> = outcome.steps.iter().map(ToString::to_string).collect();

        ToolResult::json(&json!({
            self.target.id_param(): id,
            "status": "success",
            "goal": goal,
            "steps": steps,
            "cached": outcome.cached,
        }))
    }
}

/// `alumnium_check` / `area_check`
pub struct CheckTool {
    store: Arc<SessionStore>,
    target: Target,
}

impl CheckTool {
    pub fn new(store: Arc<SessionStore>, target: Target) -> Self {
        Self { store, target }
    }
}

#[async_trait]
impl Tool for CheckTool {
    fn name(&self) -> &str {
        match self.target {
            Target::Driver => "alumnium_check",
            Target::Area => "area_check",
        }
    }

    fn description(&self) -> &str {
        match self.target {
            Target::Driver => {
                "Verify a statement about the current page, e.g. 'the cart shows 3 items'. \
                 Returns result true or false with an explanation; a false result is not an error."
            }
            Target::Area => "Verify a statement about an area only. A false result is not an error.",
        }
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![
            self.target.id_property(),
            Property::string("statement", "Statement to verify"),
            vision_property(),
        ])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let id = required_str(&input, self.target.id_param())?;
        let statement = required_str(&input, "statement")?;
        let vision = flag(&input, "vision");

        let verdict = check(&self.store, self.target, &id, statement.clone(), vision).await?;

        ToolResult::json(&json!({
            self.target.id_param(): id,
            "statement": statement,
            "result": verdict.passed,
            "explanation": verdict.explanation,
        }))
    }
}

/// `alumnium_get` / `area_get`
pub struct GetTool {
    store: Arc<SessionStore>,
    target: Target,
}

impl GetTool {
    pub fn new(store: Arc<SessionStore>, target: Target) -> Self {
        Self { store, target }
    }
}

#[async_trait]
impl Tool for GetTool {
    fn name(&self) -> &str {
        match self.target {
            Target::Driver => "alumnium_get",
            Target::Area => "area_get",
        }
    }

    fn description(&self) -> &str {
        match self.target {
            Target::Driver => {
                "Extract data from the current page, e.g. 'the product prices' or \
                 'the title of the first article'."
            }
            Target::Area => "Extract data from an area only.",
        }
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![
            self.target.id_property(),
            Property::string("data", "Description of the data to extract"),
            vision_property(),
        ])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let id = required_str(&input, self.target.id_param())?;
        let data = required_str(&input, "data")?;
        let vision = flag(&input, "vision");

        let value = get(&self.store, self.target, &id, data.clone(), vision).await?;

        ToolResult::json(&json!({
            self.target.id_param(): id,
            "data": data,
            "value": value,
        }))
    }
}

/// `alumnium_area`
pub struct AreaTool {
    store: Arc<SessionStore>,
}

impl AreaTool {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AreaTool {
    fn name(&self) -> &str {
        "alumnium_area"
    }

    fn description(&self) -> &str {
        "Find a region of the page, e.g. 'the navigation menu' or 'the login form', \
         and return an area_id for area_do, area_check and area_get."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![
            Target::Driver.id_property(),
            Property::string("description", "Natural-language description of the region"),
        ])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let driver_id = required_str(&input, "driver_id")?;
        let description = required_str(&input, "description")?;

        let area = self.store.create_area(&driver_id, &description).await?;

        ToolResult::json(&json!({
            "area_id": area.id,
            "driver_id": driver_id,
            "description": area.scope.description,
        }))
    }
}
