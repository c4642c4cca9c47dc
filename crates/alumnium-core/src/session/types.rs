//! Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::driver::{Driver, Platform};
use crate::interpreter::{AreaScope, Interpreter};

/// An active automation session
pub struct DriverSession {
    /// Unique session identifier handed out as `driver_id`
    pub id: String,
    pub platform: Platform,
    /// `provider/model-name` the interpreter talks to
    pub model: String,
    /// Start URL or app path
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub driver: Box<dyn Driver>,
    pub interpreter: Box<dyn Interpreter>,
    pub(crate) closed: bool,
}

impl DriverSession {
    pub fn new(
        platform: Platform,
        model: impl Into<String>,
        url: Option<String>,
        driver: Box<dyn Driver>,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform,
            model: model.into(),
            url,
            created_at: Utc::now(),
            driver,
            interpreter,
            closed: false,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            platform: self.platform,
            model: self.model.clone(),
            url: self.url.clone(),
            created_at: self.created_at,
        }
    }
}

/// Serializable description of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub platform: Platform,
    pub model: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Scoped region of a session's view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub session_id: String,
    pub scope: AreaScope,
    pub created_at: DateTime<Utc>,
}

impl Area {
    pub fn new(session_id: impl Into<String>, scope: AreaScope) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            scope,
            created_at: Utc::now(),
        }
    }

    pub fn description(&self) -> &str {
        &self.scope.description
    }
}
