//! Execution plan explainer

use crate::error::AppResult;
use crate::provider::CompletionRequest;
use crate::tools::{AssembleContext, Tool, ToolKind, required_text};
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "You are an expert Oracle DBA. Explain an XML execution plan in an \
extremely simple, step-by-step format, in English, using Markdown.

Your response MUST follow this structure:

### Execution Flow
Walk the plan from the first step Oracle performs (most indented) to the last.
Separate every step with a blank line.

For each step use:

**Step X:**
- **Operation:** `[Operation Name]` (e.g. `TABLE ACCESS FULL`, `INDEX RANGE SCAN`)
- **Target:** `[Table Name]`
- **Details:** one simple sentence. If an index is used you MUST name it.
- For JOIN operations the Target is `(Results of previous steps)` and Details names the \
steps being combined and the join method.

### Summary & Suggestions
1. **Overall Cost:** the total estimated CPU cost of the top-level operation (Id=0).
2. **Analysis:** one or two sentences on the plan's efficiency.
3. **Improvements:** if there is a bottleneck (such as a full table scan) suggest \
improvements and recommend the Oracle Query Optimizer tool for a rewritten query. \
If the plan is good, say that no major improvements are needed.";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainerPayload {
    #[serde(default)]
    pub execution_plan_xml: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplainerInput {
    pub execution_plan_xml: String,
}

pub struct PlanExplainer;

impl Tool for PlanExplainer {
    const KIND: ToolKind = ToolKind::ExecutionPlanExplainer;
    type Payload = ExplainerPayload;
    type Valid = ExplainerInput;

    fn validate(payload: ExplainerPayload) -> AppResult<ExplainerInput> {
        Ok(ExplainerInput {
            execution_plan_xml: required_text(
                payload.execution_plan_xml,
                "No execution plan provided.",
            )?,
        })
    }

    fn assemble(input: &ExplainerInput, ctx: &AssembleContext) -> CompletionRequest {
        let user = format!(
            "Here is the Oracle execution plan in XML format. Analyze it and provide the \
             explanation in the requested step-by-step format.\n\n```xml\n{}\n```",
            input.execution_plan_xml
        );
        ctx.request(SYSTEM_PROMPT.to_string(), user)
    }
}
