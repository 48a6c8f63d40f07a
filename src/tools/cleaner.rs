//! Oracle query cleaner: EXECUTE IMMEDIATE string <-> plain SQL

use crate::error::{AppError, AppResult};
use crate::provider::CompletionRequest;
use crate::tools::{AssembleContext, Tool, ToolKind, optional_text, required_text};
use serde::Deserialize;

/// Returned by the model when the input is not SQL
pub const INVALID_SQL_MARKER: &str = "INVALID_SQL_INPUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// EXECUTE IMMEDIATE string -> clean SQL
    Clean,
    /// clean SQL -> EXECUTE IMMEDIATE string
    #[default]
    ExecuteImmediate,
}

impl Direction {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "clean" => Some(Direction::Clean),
            "execute_immediate" => Some(Direction::ExecuteImmediate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Clean => "clean",
            Direction::ExecuteImmediate => "execute_immediate",
        }
    }

    fn task(&self) -> &'static str {
        match self {
            Direction::Clean => {
                "Your task is to convert the provided Oracle PL/SQL 'EXECUTE IMMEDIATE' string \
                 into a clean, readable and executable SQL query. Remove all concatenation \
                 operators ('||'), the single quotes used for string literals and the \
                 'v_sql :=' boilerplate. The output must be only the final, clean SQL."
            }
            Direction::ExecuteImmediate => {
                "Your task is to convert a clean SQL query into an Oracle PL/SQL 'EXECUTE \
                 IMMEDIATE' string. Wrap the query in single quotes, escape existing single \
                 quotes by doubling them ('') and prepare it for assignment to a variable \
                 (e.g. 'v_sql := ...;')."
            }
        }
    }

    fn example(&self) -> (&'static str, &'static str) {
        match self {
            Direction::Clean => (
                "v_sql := 'SELECT name, value FROM settings WHERE type = ''' || p_type || ''' AND group = ''SYSTEM''';",
                "SELECT name, value FROM settings WHERE type = p_type AND group = 'SYSTEM';",
            ),
            Direction::ExecuteImmediate => (
                "SELECT status, count(*) FROM tasks WHERE owner = 'JOHN' GROUP BY status;",
                "v_sql := 'SELECT status, count(*) FROM tasks WHERE owner = ''JOHN'' GROUP BY status;';",
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanerPayload {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanerInput {
    pub query: String,
    pub direction: Direction,
}

pub struct QueryCleaner;

impl Tool for QueryCleaner {
    const KIND: ToolKind = ToolKind::OracleQueryCleaner;
    type Payload = CleanerPayload;
    type Valid = CleanerInput;

    fn validate(payload: CleanerPayload) -> AppResult<CleanerInput> {
        let query = required_text(payload.query, "No query provided.")?;
        let direction = match optional_text(payload.direction) {
            None => Direction::default(),
            Some(raw) => Direction::parse(&raw).ok_or_else(|| {
                AppError::Validation(
                    "Direction must be 'clean' or 'execute_immediate'.".to_string(),
                )
            })?,
        };
        Ok(CleanerInput { query, direction })
    }

    fn assemble(input: &CleanerInput, ctx: &AssembleContext) -> CompletionRequest {
        let (example_in, example_out) = input.direction.example();
        let system = format!(
            "You are an expert Oracle SQL and PL/SQL assistant. You will receive a text block \
             and a specific instruction.\n\
             {task}\n\
             Follow these rules strictly:\n\
             1. Identify the current format of the input (clean or EXECUTE IMMEDIATE).\n\
             2. Perform the requested conversion flawlessly.\n\
             3. Do NOT add any explanation, introduction or text before or after the result. \
             Reply with the finished SQL only.\n\
             4. If the input is not a recognizable SQL query, return exactly: \
             \"{INVALID_SQL_MARKER}\".\n\n\
             Example input:\n```sql\n{example_in}\n```\n\
             Expected output:\n```sql\n{example_out}\n```",
            task = input.direction.task(),
        );
        let user = format!(
            "Process the following SQL text block according to the rules:\n```\n{}\n```",
            input.query
        );
        ctx.request(system, user)
    }
}
