//! Tool definitions: payload validation and prompt assembly
//!
//! Each tool is a [`Tool`] implementation pairing a JSON payload with a
//! validator and a deterministic prompt assembler. Tools never talk to the
//! network; the handler feeds the assembled request into the tool's cascade.

use crate::error::AppResult;
use crate::provider::CompletionRequest;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

pub mod cleaner;
pub mod explainer;
pub mod format;
pub mod optimizer;

pub use cleaner::QueryCleaner;
pub use explainer::PlanExplainer;
pub use format::Formatter;
pub use optimizer::OracleOptimizer;

/// The tools served by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    Format,
    OptimizeOracle,
    ExecutionPlanExplainer,
    OracleQueryCleaner,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Format,
        ToolKind::OptimizeOracle,
        ToolKind::ExecutionPlanExplainer,
        ToolKind::OracleQueryCleaner,
    ];

    /// Config key, metrics label and URL segment
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Format => "format",
            ToolKind::OptimizeOracle => "optimize-oracle",
            ToolKind::ExecutionPlanExplainer => "execution-plan-explainer",
            ToolKind::OracleQueryCleaner => "oracle-query-cleaner",
        }
    }

    /// Route path of the tool endpoint
    pub fn path(&self) -> String {
        format!("/api/{}", self.as_str())
    }

    pub fn default_temperature(&self) -> f64 {
        match self {
            ToolKind::Format => 0.1,
            ToolKind::OptimizeOracle => 0.0,
            ToolKind::ExecutionPlanExplainer => 0.1,
            ToolKind::OracleQueryCleaner => 0.0,
        }
    }

    pub fn default_max_tokens(&self) -> u32 {
        match self {
            ToolKind::Format => 6000,
            ToolKind::OptimizeOracle => 8192,
            ToolKind::ExecutionPlanExplainer => 8192,
            ToolKind::OracleQueryCleaner => 4096,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

/// Generation parameters fixed per tool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSettings {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ToolSettings {
    pub fn defaults_for(tool: ToolKind) -> Self {
        Self {
            temperature: tool.default_temperature(),
            max_tokens: tool.default_max_tokens(),
        }
    }
}

/// Inputs to prompt assembly that do not come from the payload
#[derive(Debug, Clone)]
pub struct AssembleContext {
    pub settings: ToolSettings,
    /// Local time of the request, `dd/mm/yyyy HH:MM:SS`
    pub timestamp: String,
}

impl AssembleContext {
    pub fn new(settings: ToolSettings, timestamp: impl Into<String>) -> Self {
        Self {
            settings,
            timestamp: timestamp.into(),
        }
    }

    /// Context stamped with the current local time
    pub fn now(settings: ToolSettings) -> Self {
        Self::new(
            settings,
            chrono::Local::now().format("%d/%m/%Y %H:%M:%S").to_string(),
        )
    }

    fn request(&self, system: String, user: String) -> CompletionRequest {
        CompletionRequest::new(
            system,
            user,
            self.settings.temperature,
            self.settings.max_tokens,
        )
    }
}

/// A prompt-driven tool
pub trait Tool {
    const KIND: ToolKind;

    /// JSON body accepted by the endpoint
    type Payload: DeserializeOwned + Send + 'static;

    /// Payload after validation
    type Valid: Send;

    /// Check required fields and shapes; no side effects
    fn validate(payload: Self::Payload) -> AppResult<Self::Valid>;

    /// Build the system + user message pair
    fn assemble(valid: &Self::Valid, ctx: &AssembleContext) -> CompletionRequest;
}

/// Returns the trimmed-nonempty value of a required text field
pub(crate) fn required_text(value: Option<String>, message: &str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(crate::error::AppError::Validation(message.to_string())),
    }
}

/// Optional free-text field, with blank values treated as absent
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
