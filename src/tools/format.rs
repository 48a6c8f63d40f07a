//! Code/log formatter

use crate::error::AppResult;
use crate::provider::CompletionRequest;
use crate::tools::{AssembleContext, Tool, ToolKind, optional_text, required_text};
use serde::Deserialize;

/// Signature written into the first-line comment of formatted output
const SIGNATURE: &str = "Formatted by pretty-formatter-tool";

/// Returned by the model when the input has no recognizable structure
pub const UNFORMATTABLE_MARKER: &str = "UNFORMATTABLE_TEXT";

#[derive(Debug, Clone, Deserialize)]
pub struct FormatPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatInput {
    /// Source text with non-breaking spaces normalized
    pub code: String,
    /// Language hint, absent when the caller sent none or "auto"
    pub language: Option<String>,
}

pub struct Formatter;

impl Tool for Formatter {
    const KIND: ToolKind = ToolKind::Format;
    type Payload = FormatPayload;
    type Valid = FormatInput;

    fn validate(payload: FormatPayload) -> AppResult<FormatInput> {
        let code = required_text(payload.code, "No code provided.")?;
        let language = optional_text(payload.language)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.eq_ignore_ascii_case("auto"));

        Ok(FormatInput {
            code: code.replace('\u{00A0}', " "),
            language,
        })
    }

    fn assemble(input: &FormatInput, ctx: &AssembleContext) -> CompletionRequest {
        let comment = format!("{SIGNATURE} -- {}", ctx.timestamp);
        let hint = match &input.language {
            Some(language) => format!(
                "The user hinted that the content is '{language}'. Pay particular attention \
                 to the conventions of that format."
            ),
            None => "Detect the language of each section yourself.".to_string(),
        };

        let system = format!(
            "You are an expert code formatter that preserves content. Your only job is to \
             return the text you receive, formatted.\n\
             Your MOST IMPORTANT rule: do NOT omit, remove or delete ANY part of the original \
             text. All input content must be present in the output.\n\n\
             Tasks:\n\
             1. Analyze the whole text.\n\
             2. Format ONLY the sections you recognize as code or logs, following best \
             practices (indentation, spacing, line breaks).\n\
             3. Keep any section that is not formattable code or log EXACTLY as it is, in its \
             original position.\n\
             4. Preserve the overall structure and order of the content.\n\
             5. On the FIRST line of the result, add a comment with the exact text: \
             \"{comment}\". Use the comment syntax of the main detected language \
             (for example \"//\", \"#\", \"--\").\n\
             6. {hint}\n\
             7. Do NOT add explanations, introductions or any text before or after the \
             result. Reply with the finished content only.\n\
             8. If the input is meaningless noise, return exactly: \"{UNFORMATTABLE_MARKER}\"."
        );
        let user = format!("Text to process:\n```\n{}\n```", input.code);

        ctx.request(system, user)
    }
}
