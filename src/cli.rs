//! Command-line interface for formatter-relay
//!
//! Provides argument parsing and subcommand handling for the formatter-relay binary.

use clap::{Parser, Subcommand};

/// Streaming LLM tool endpoints with model fallback
#[derive(Parser)]
#[command(name = "formatter-relay")]
#[command(version)]
#[command(about = "Streaming LLM tool endpoints with model fallback")]
#[command(
    long_about = "formatter-relay serves code formatting and Oracle SQL tools over HTTP. \
    Each request is sent to an ordered list of chat-completion models; the first one that \
    starts streaming is relayed to the caller as plain text."
)]
pub struct Cli {
    /// Path to configuration file (the built-in template is used if it does not exist)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
///
/// The template is also the built-in configuration: every deployment-specific
/// value is read from an environment variable.
pub fn generate_config_template() -> &'static str {
    r#"# formatter-relay Configuration
# ==============================
#
# Server settings, chat-completion providers and the model cascade of each
# tool. Values ending in `_env` name an environment variable that is read once
# at startup; a set, non-empty variable wins over a literal value.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# Seconds a model gets to accept the request and send its first token before
# the next model in the cascade is tried (1-300)
establish_timeout_seconds = 30

# Largest accepted request body in bytes
max_body_bytes = 1048576

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDERS
# ─────────────────────────────────────────────────────────────────────────────
#
# OpenAI-compatible endpoints. Requests go to {base_url}/chat/completions with
# the API key as a bearer token and the listed headers.

[providers.openrouter]
base_url_env = "OPENROUTER_BASE_URL"
api_key_env = "OPENAI_API_KEY"

[providers.openrouter.headers]
HTTP-Referer = "https://ai-formatter.com/"
X-Title = "AI Formatter"

# Last-resort provider with its own key
[providers.openai]
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_KEY_FALLBACK"

# ─────────────────────────────────────────────────────────────────────────────
# TOOLS
# ─────────────────────────────────────────────────────────────────────────────
#
# Up to 3 attempts per tool, tried in order. If the first attempt cannot be
# resolved the tool answers every request with HTTP 500. Later attempts that
# cannot be resolved are skipped.
#
# Optional per-tool overrides: temperature, max_tokens.

[tools.format]
temperature = 0.1
max_tokens = 6000

[[tools.format.attempts]]
provider = "openrouter"
model_env = "FORMAT_MODEL_PRIMARY"

[[tools.format.attempts]]
provider = "openrouter"
model_env = "FORMAT_MODEL_FALLBACK"

[[tools.format.attempts]]
provider = "openai"
model = "gpt-4o"

[tools.optimize-oracle]
temperature = 0.0
max_tokens = 8192

[[tools.optimize-oracle.attempts]]
provider = "openrouter"
model_env = "OPTIMIZER_MODEL_PRIMARY"

[[tools.optimize-oracle.attempts]]
provider = "openrouter"
model_env = "OPTIMIZER_MODEL_FALLBACK"

[tools.execution-plan-explainer]
temperature = 0.1
max_tokens = 8192

[[tools.execution-plan-explainer.attempts]]
provider = "openrouter"
model_env = "EXPLAINER_MODEL_PRIMARY"

[[tools.execution-plan-explainer.attempts]]
provider = "openrouter"
model_env = "EXPLAINER_MODEL_FALLBACK"

[[tools.execution-plan-explainer.attempts]]
provider = "openai"
model = "gpt-4o"

[tools.oracle-query-cleaner]
temperature = 0.0
max_tokens = 4096

[[tools.oracle-query-cleaner.attempts]]
provider = "openrouter"
model_env = "CLEANER_MODEL_PRIMARY"

[[tools.oracle-query-cleaner.attempts]]
provider = "openrouter"
model_env = "CLEANER_MODEL_FALLBACK"

[[tools.oracle-query-cleaner.attempts]]
provider = "openai"
model = "gpt-4o"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
