use std::env;
use std::fs;
use std::path::Path;

use bookbuddy_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(
        key_path: &'static str,
        env_keys: &'static [&'static str],
        value: impl ToString,
    ) -> Self {
        Self { key_path, env_keys, value: value.to_string() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let instruction_path = config
        .agent
        .instruction_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field::new("agent.name", &["BOOKBUDDY_AGENT_NAME"], &config.agent.name),
        Field::new("agent.alias", &["BOOKBUDDY_AGENT_ALIAS"], &config.agent.alias),
        Field::new(
            "agent.instruction_path",
            &["BOOKBUDDY_AGENT_INSTRUCTION_PATH"],
            instruction_path,
        ),
        Field::new(
            "llm.provider",
            &["BOOKBUDDY_LLM_PROVIDER"],
            format!("{:?}", config.llm.provider),
        ),
        Field::new("llm.model", &["BOOKBUDDY_LLM_MODEL"], &config.llm.model),
        Field::new(
            "llm.base_url",
            &["BOOKBUDDY_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["BOOKBUDDY_LLM_API_KEY"], api_key),
        Field::new("llm.timeout_secs", &["BOOKBUDDY_LLM_TIMEOUT_SECS"], config.llm.timeout_secs),
        Field::new("llm.max_retries", &["BOOKBUDDY_LLM_MAX_RETRIES"], config.llm.max_retries),
        Field::new(
            "normalizer.malformed_link_threshold",
            &["BOOKBUDDY_NORMALIZER_MALFORMED_LINK_THRESHOLD"],
            config.normalizer.malformed_link_threshold,
        ),
        Field::new(
            "normalizer.context_window",
            &["BOOKBUDDY_NORMALIZER_CONTEXT_WINDOW"],
            config.normalizer.context_window,
        ),
        Field::new("normalizer.role_labels", &[], config.normalizer.role_labels.join(", ")),
        Field::new("normalizer.stray_labels", &[], config.normalizer.stray_labels.join(", ")),
        Field::new(
            "session.history_limit",
            &["BOOKBUDDY_SESSION_HISTORY_LIMIT"],
            config.session.history_limit,
        ),
        Field::new(
            "session.max_turns",
            &["BOOKBUDDY_SESSION_MAX_TURNS"],
            config.session.max_turns,
        ),
        Field::new(
            "logging.level",
            &["BOOKBUDDY_LOGGING_LEVEL", "BOOKBUDDY_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["BOOKBUDDY_LOGGING_FORMAT", "BOOKBUDDY_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
