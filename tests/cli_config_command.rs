//! Integration tests for the `config` subcommand output
//!
//! The generated template doubles as the built-in configuration, so it must
//! load through the same path as a user's file.

use formatter_relay::cli::generate_config_template;
use formatter_relay::config::{Config, MAX_ATTEMPTS};
use formatter_relay::tools::ToolKind;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_generated_template_loads_as_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config = Config::from_file(&config_path).expect("template should load");

    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.establish_timeout_seconds, 30);
    assert!(config.providers.contains_key("openrouter"));
    assert!(config.providers.contains_key("openai"));
}

#[test]
fn test_template_defines_every_tool_within_attempt_limit() {
    let config = Config::builtin().expect("template should parse");

    for tool in ToolKind::ALL {
        let tool_config = config
            .tools
            .get(tool.as_str())
            .unwrap_or_else(|| panic!("template missing tool {tool}"));
        let attempts = tool_config.attempts();
        assert!(!attempts.is_empty(), "{tool} has no attempts");
        assert!(attempts.len() <= MAX_ATTEMPTS, "{tool} has too many attempts");
        assert_eq!(attempts[0].provider(), "openrouter");
    }
}

#[test]
fn test_template_settings_match_tool_defaults() {
    let config = Config::builtin().expect("template should parse");
    for tool in ToolKind::ALL {
        let settings = config.tool_settings(tool);
        assert_eq!(settings.max_tokens, tool.default_max_tokens(), "{tool}");
        assert!(
            (settings.temperature - tool.default_temperature()).abs() < f64::EPSILON,
            "{tool}"
        );
    }
}

#[test]
fn test_template_written_to_file_is_byte_identical() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");

    let template = generate_config_template();
    fs::write(&config_path, template).expect("Failed to write template");

    let content = fs::read_to_string(&config_path).expect("Failed to read back");
    assert_eq!(content, template);
}
