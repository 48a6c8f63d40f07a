//! Oracle query optimizer
//!
//! Rewrites a query with optimizer hints. Table metadata, parallelism policy and
//! an optional current execution plan steer the rules the model has to apply.

use crate::error::{AppError, AppResult};
use crate::provider::CompletionRequest;
use crate::tools::{AssembleContext, Tool, ToolKind, optional_text, required_text};
use serde::Deserialize;
use serde_json::Value;

/// Separates the rewritten query from the change summary in model output
pub const SUMMARY_SEPARATOR: &str = "---OPTIMIZATION_SUMMARY---";

/// Table metadata as sent by the caller: pasted dictionary output or a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TablesPayload {
    Text(String),
    List(Vec<TableDescriptor>),
}

/// One table row from the metadata form; fields may be strings or numbers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub columns: Option<Value>,
    #[serde(default)]
    pub indexes: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerPayload {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tables: Option<TablesPayload>,
    #[serde(default)]
    pub parallel: Option<Value>,
    #[serde(default)]
    pub is_execute_immediate: Option<bool>,
    #[serde(default)]
    pub execution_plan: Option<String>,
    #[serde(default)]
    pub execution_time: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: Option<String>,
    pub size_gb: Option<String>,
    pub columns: Option<String>,
    pub indexes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableMetadata {
    None,
    Text(String),
    List(Vec<TableSummary>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Disallowed,
    Allowed { degree: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerInput {
    pub query: String,
    pub tables: TableMetadata,
    pub parallel: Parallelism,
    pub execute_immediate: bool,
    pub execution_plan: Option<String>,
    pub execution_time: Option<String>,
}

fn invalid(reason: &str) -> AppError {
    AppError::Validation(reason.to_string())
}

/// String form of a scalar JSON value; blanks and nulls are absent
fn scalar_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => optional_text(Some(s)).map(|s| s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_parallel(value: Option<Value>) -> AppResult<Parallelism> {
    let object = match value {
        None | Some(Value::Null) => return Ok(Parallelism::Disallowed),
        Some(Value::Object(object)) => object,
        Some(_) => return Err(invalid("Parallel must be an object.")),
    };

    let allowed = match object.get("allowed") {
        Some(Value::Bool(allowed)) => *allowed,
        None | Some(Value::Null) => false,
        Some(_) => return Err(invalid("Parallel 'allowed' must be a boolean.")),
    };
    if !allowed {
        return Ok(Parallelism::Disallowed);
    }

    // Form inputs arrive as strings as often as numbers
    let degree = match object.get("degree") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match degree.and_then(|d| u32::try_from(d).ok()) {
        Some(degree) if degree > 0 => Ok(Parallelism::Allowed { degree }),
        _ => Err(invalid(
            "Parallel 'degree' must be a positive integer when parallel execution is allowed.",
        )),
    }
}

fn parse_tables(tables: Option<TablesPayload>) -> TableMetadata {
    match tables {
        None => TableMetadata::None,
        Some(TablesPayload::Text(text)) => match optional_text(Some(text)) {
            Some(text) => TableMetadata::Text(text),
            None => TableMetadata::None,
        },
        Some(TablesPayload::List(list)) if list.is_empty() => TableMetadata::None,
        Some(TablesPayload::List(list)) => TableMetadata::List(
            list.into_iter()
                .map(|t| TableSummary {
                    name: scalar_text(t.name),
                    size_gb: scalar_text(t.size),
                    columns: scalar_text(t.columns),
                    indexes: scalar_text(t.indexes),
                })
                .collect(),
        ),
    }
}

fn render_tables(tables: &TableMetadata) -> String {
    match tables {
        TableMetadata::None => "No table metadata was provided.".to_string(),
        TableMetadata::Text(text) => format!(
            "The user supplied the following metadata output from their database. Treat it \
             as the main source of truth for table sizes, indexes and structure:\n\n{text}"
        ),
        TableMetadata::List(list) => list
            .iter()
            .map(|t| {
                format!(
                    "- Table: {}\n  Size: {} GB\n  Approx. columns: {}\n  Indexed fields: {}",
                    t.name.as_deref().unwrap_or("N/A"),
                    t.size_gb.as_deref().unwrap_or("N/A"),
                    t.columns.as_deref().unwrap_or("N/A"),
                    t.indexes.as_deref().unwrap_or("None"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn system_prompt(input: &OptimizerInput) -> String {
    let parallel_hint = match input.parallel {
        Parallelism::Allowed { degree } => {
            format!("Parallel execution is allowed with a degree of up to {degree}.")
        }
        Parallelism::Disallowed => "Parallel execution is not allowed.".to_string(),
    };
    let execute_immediate_hint = if input.execute_immediate {
        "**Special instruction (EXECUTE IMMEDIATE):** the query is a string inside an \
         `EXECUTE IMMEDIATE` block. First rebuild the clean, executable SQL from that string.\n"
    } else {
        ""
    };

    format!(
        "You are a senior Oracle database performance tuning specialist. Your only task is \
to rewrite a SQL query for maximum performance, strictly applying the decision flow and \
rules below.

**CRITICAL DIRECTIVES AND OUTPUT FORMAT:**
{execute_immediate_hint}1. **Surgical changes:** act as a surgical code editor, not a rewriter. Preserve the \
original formatting (whitespace, line breaks) and only insert or modify the exact lines the \
optimization needs. This is your most important instruction.
2. **Semantic equivalence:** the optimized query must always return exactly the same result \
set as the original.
3. **Mandatory output format:** your answer has parts separated by \"{SUMMARY_SEPARATOR}\".
   - Part 1: the complete optimized SQL query, with minimal modifications.
   - Part 2: a Markdown changelog in English under the title \"**Query Changes**\", one bullet \
per modification (e.g. `* Line 5: Inserted /*+ LEADING(a) USE_NL(b) */ after SELECT.`).
   - Part 3: optional Markdown recommendations in English for DDL-level changes that hints \
cannot achieve (new indexes, partitioning, statistics gathering). Only include them when \
they really make sense.

---

**DECISION FLOW AND TUNING RULES** (apply in this order):

**1. Master rule: the user's parallelism preference**
- Strict user preference: \"{parallel_hint}\"
- If it is not allowed, NEVER use the `PARALLEL` keyword or hint.
- If it is allowed, only use `PARALLEL` when the ideal plan involves large FULL TABLE SCANS. \
Never use it for index-driven queries.

**2. Golden rule: index validity**
- Only hint indexes explicitly listed in the provided metadata.
- Never suggest an index whose columns are unrelated to the WHERE/JOIN predicates.
- Hint syntax: `/*+ INDEX(table_alias index_name) */`.

**3. Main strategy (by table size):**
- **Scenario A, extremely large tables (> 700 GB):** index access first; never force FULL \
scans on them; drive the query from the most selective indexed filter; use `USE_NL` and \
`INDEX` for the following joins.
- **Scenario B, small or medium driving table (< 5 GB or the smallest in the query):** the \
default. Start from the smallest table with `/*+ FULL(alias) */`, add `/*+ PARALLEL(degree) */` \
if the master rule allows it, force it first with `/*+ CARDINALITY(alias 1) */`, and join the \
rest with `/*+ USE_NL(alias) */` over indexed join columns.
- **Scenario C, several small tables without useful indexes:** prefer hash joins with \
`/*+ USE_HASH(alias) */` and allow FULL scans.

**4. Additional optimizations:**
- Rewrite `OR` conditions as `UNION ALL` where possible.
- Add `/*+ UNNEST */` to `EXISTS` / `NOT EXISTS` subqueries.
- For `CREATE TABLE AS` with parallelism allowed, add `NOLOGGING PARALLEL`.
- Place all hints immediately after the `SELECT` keyword.
- Use the current execution plan and execution time as references without overriding the \
rules above."
    )
}

fn user_prompt(input: &OptimizerInput) -> String {
    let mut prompt = format!(
        "Following your rules (especially \"Surgical changes\" and the mandatory changelog), \
         optimize the following Oracle SQL query.\n\n\
         **Table metadata:**\n{}\n\n\
         **Original query:**\n```sql\n{}\n```",
        render_tables(&input.tables),
        input.query
    );
    if let Some(plan) = &input.execution_plan {
        prompt.push_str(&format!(
            "\n\n**Current execution plan (XML):**\n```xml\n{plan}\n```"
        ));
    }
    if let Some(seconds) = &input.execution_time {
        prompt.push_str(&format!(
            "\n\n**Reported current execution time:** {seconds} seconds."
        ));
    }
    prompt
}

pub struct OracleOptimizer;

impl Tool for OracleOptimizer {
    const KIND: ToolKind = ToolKind::OptimizeOracle;
    type Payload = OptimizerPayload;
    type Valid = OptimizerInput;

    fn validate(payload: OptimizerPayload) -> AppResult<OptimizerInput> {
        let query = required_text(payload.query, "Query is required.")?;
        let parallel = parse_parallel(payload.parallel)?;

        Ok(OptimizerInput {
            query,
            tables: parse_tables(payload.tables),
            parallel,
            execute_immediate: payload.is_execute_immediate.unwrap_or(false),
            execution_plan: optional_text(payload.execution_plan),
            execution_time: scalar_text(payload.execution_time),
        })
    }

    fn assemble(input: &OptimizerInput, ctx: &AssembleContext) -> CompletionRequest {
        ctx.request(system_prompt(input), user_prompt(input))
    }
}
