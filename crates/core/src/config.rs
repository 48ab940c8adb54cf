use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::{
    NormalizerSettings, DEFAULT_CONTEXT_WINDOW, DEFAULT_MALFORMED_LINK_THRESHOLD,
    DEFAULT_ROLE_LABELS, DEFAULT_STRAY_LABELS, PURCHASE_URL_PREFIX,
};

/// Config files searched, in order, when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["bookbuddy.toml", "config/bookbuddy.toml"];
pub const DEFAULT_SESSION_MAX_TURNS: usize = 10;
pub const MAX_LLM_RETRIES: u32 = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub normalizer: NormalizerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub name: String,
    pub alias: String,
    /// Replaces the built-in agent instruction with the contents of this file.
    pub instruction_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct NormalizerConfig {
    pub malformed_link_threshold: usize,
    pub context_window: usize,
    pub role_labels: Vec<String>,
    pub stray_labels: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub history_limit: usize,
    /// Prior turns of a session sent back to the agent with each query.
    pub max_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub agent_name: Option<String>,
    pub history_limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                name: "BookBuddy".to_string(),
                alias: "BookBuddy".to_string(),
                instruction_path: None,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            normalizer: NormalizerConfig {
                malformed_link_threshold: DEFAULT_MALFORMED_LINK_THRESHOLD,
                context_window: DEFAULT_CONTEXT_WINDOW,
                role_labels: owned(DEFAULT_ROLE_LABELS),
                stray_labels: owned(DEFAULT_STRAY_LABELS),
            },
            session: SessionConfig { history_limit: 3, max_turns: DEFAULT_SESSION_MAX_TURNS },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl NormalizerConfig {
    pub fn to_settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            malformed_link_threshold: self.malformed_link_threshold,
            context_window: self.context_window,
            role_labels: self.role_labels.clone(),
            stray_labels: self.stray_labels.clone(),
        }
    }
}

fn owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|label| (*label).to_string()).collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Layers defaults, the config file, `BOOKBUDDY_*` env vars, and explicit overrides, then
    /// validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(agent) = patch.agent {
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(alias) = agent.alias {
                self.agent.alias = alias;
            }
            if let Some(instruction_path) = agent.instruction_path {
                self.agent.instruction_path = Some(instruction_path);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(normalizer) = patch.normalizer {
            if let Some(threshold) = normalizer.malformed_link_threshold {
                self.normalizer.malformed_link_threshold = threshold;
            }
            if let Some(context_window) = normalizer.context_window {
                self.normalizer.context_window = context_window;
            }
            if let Some(role_labels) = normalizer.role_labels {
                self.normalizer.role_labels = role_labels;
            }
            if let Some(stray_labels) = normalizer.stray_labels {
                self.normalizer.stray_labels = stray_labels;
            }
        }

        if let Some(session) = patch.session {
            if let Some(history_limit) = session.history_limit {
                self.session.history_limit = history_limit;
            }
            if let Some(max_turns) = session.max_turns {
                self.session.max_turns = max_turns;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOOKBUDDY_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("BOOKBUDDY_AGENT_ALIAS") {
            self.agent.alias = value;
        }
        if let Some(value) = read_env("BOOKBUDDY_AGENT_INSTRUCTION_PATH") {
            self.agent.instruction_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("BOOKBUDDY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("BOOKBUDDY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BOOKBUDDY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("BOOKBUDDY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("BOOKBUDDY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("BOOKBUDDY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BOOKBUDDY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_number("BOOKBUDDY_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("BOOKBUDDY_NORMALIZER_MALFORMED_LINK_THRESHOLD") {
            self.normalizer.malformed_link_threshold =
                parse_number("BOOKBUDDY_NORMALIZER_MALFORMED_LINK_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("BOOKBUDDY_NORMALIZER_CONTEXT_WINDOW") {
            self.normalizer.context_window =
                parse_number("BOOKBUDDY_NORMALIZER_CONTEXT_WINDOW", &value)?;
        }

        if let Some(value) = read_env("BOOKBUDDY_SESSION_HISTORY_LIMIT") {
            self.session.history_limit = parse_number("BOOKBUDDY_SESSION_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("BOOKBUDDY_SESSION_MAX_TURNS") {
            self.session.max_turns = parse_number("BOOKBUDDY_SESSION_MAX_TURNS", &value)?;
        }

        let log_level =
            read_env("BOOKBUDDY_LOGGING_LEVEL").or_else(|| read_env("BOOKBUDDY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOOKBUDDY_LOGGING_FORMAT").or_else(|| read_env("BOOKBUDDY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(agent_name) = overrides.agent_name {
            self.agent.name = agent_name;
        }
        if let Some(history_limit) = overrides.history_limit {
            self.session.history_limit = history_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent(&self.agent)?;
        validate_llm(&self.llm)?;
        validate_normalizer(&self.normalizer)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read: the explicit path if it exists, else the first default.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
    }
    if agent.alias.trim().is_empty() {
        return Err(ConfigError::Validation("agent.alias must not be empty".to_string()));
    }
    if let Some(path) = &agent.instruction_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "agent.instruction_path `{}` does not exist",
                path.display()
            )));
        }
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > MAX_LLM_RETRIES {
        return Err(ConfigError::Validation(format!(
            "llm.max_retries must be in range 0..={MAX_LLM_RETRIES}"
        )));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_normalizer(normalizer: &NormalizerConfig) -> Result<(), ConfigError> {
    if normalizer.malformed_link_threshold <= PURCHASE_URL_PREFIX.len() {
        return Err(ConfigError::Validation(format!(
            "normalizer.malformed_link_threshold must be greater than {} (the bare link length)",
            PURCHASE_URL_PREFIX.len()
        )));
    }
    if normalizer.context_window == 0 {
        return Err(ConfigError::Validation(
            "normalizer.context_window must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.history_limit == 0 {
        return Err(ConfigError::Validation(
            "session.history_limit must be greater than zero".to_string(),
        ));
    }
    if session.max_turns == 0 {
        return Err(ConfigError::Validation(
            "session.max_turns must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    agent: Option<AgentPatch>,
    llm: Option<LlmPatch>,
    normalizer: Option<NormalizerPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    alias: Option<String>,
    instruction_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct NormalizerPatch {
    malformed_link_threshold: Option<usize>,
    context_window: Option<usize>,
    role_labels: Option<Vec<String>>,
    stray_labels: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    history_limit: Option<usize>,
    max_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Ollama, "default provider should be ollama")?;
        ensure(config.session.history_limit == 3, "default history limit should be 3")?;
        ensure(config.session.max_turns == 10, "default max turns should be 10")?;
        let settings = config.normalizer.to_settings();
        ensure(settings.malformed_link_threshold == 80, "default threshold should be 80")?;
        ensure(settings.context_window == 300, "default context window should be 300")?;
        ensure(config.agent.name == "BookBuddy", "default agent name should be BookBuddy")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BOOKBUDDY_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bookbuddy.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_BOOKBUDDY_OPENAI_KEY}"
base_url = "https://api.openai.com"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_BOOKBUDDY_OPENAI_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("bookbuddy.toml");
        fs::write(&path, "[llm]\nmodel = \"${TEST_BOOKBUDDY_UNSET_MODEL}\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "TEST_BOOKBUDDY_UNSET_MODEL", "error should name the variable")
            }
            other => Err(format!("expected interpolation failure, got {other:?}")),
        }
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOOKBUDDY_LOG_LEVEL", "warn");
        env::set_var("BOOKBUDDY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["BOOKBUDDY_LOG_LEVEL", "BOOKBUDDY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOOKBUDDY_LLM_MODEL", "model-from-env");
        env::set_var("BOOKBUDDY_NORMALIZER_CONTEXT_WINDOW", "150");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bookbuddy.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[normalizer]
malformed_link_threshold = 100
context_window = 500

[session]
history_limit = 5
max_turns = 6

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    history_limit: Some(7),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(
                config.normalizer.malformed_link_threshold == 100,
                "file threshold should win over default",
            )?;
            ensure(config.normalizer.context_window == 150, "env window should win over file")?;
            ensure(config.session.history_limit == 7, "override history limit should win")?;
            ensure(config.session.max_turns == 6, "file max turns should win over default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["BOOKBUDDY_LLM_MODEL", "BOOKBUDDY_NORMALIZER_CONTEXT_WINDOW"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOOKBUDDY_SESSION_HISTORY_LIMIT", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "BOOKBUDDY_SESSION_HISTORY_LIMIT",
                "error should name the offending variable",
            ),
            other => Err(format!("expected invalid override, got {other:?}")),
        };

        clear_vars(&["BOOKBUDDY_SESSION_HISTORY_LIMIT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOOKBUDDY_NORMALIZER_MALFORMED_LINK_THRESHOLD", "10");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("normalizer.malformed_link_threshold")
            );
            ensure(has_message, "validation failure should mention the threshold")
        })();

        clear_vars(&["BOOKBUDDY_NORMALIZER_MALFORMED_LINK_THRESHOLD"]);
        result
    }

    #[test]
    fn session_turn_cap_and_retry_bound_are_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let check = |key: &str, value: &str, field: &str| -> Result<(), String> {
            env::set_var(key, value);
            let result = AppConfig::load(LoadOptions::default());
            env::remove_var(key);
            match result {
                Err(ConfigError::Validation(message)) if message.contains(field) => Ok(()),
                other => Err(format!("expected {field} validation failure, got {other:?}")),
            }
        };

        check("BOOKBUDDY_SESSION_MAX_TURNS", "0", "session.max_turns")?;
        check("BOOKBUDDY_LLM_MAX_RETRIES", "11", "llm.max_retries")?;

        env::set_var("BOOKBUDDY_LLM_MAX_RETRIES", "10");
        env::set_var("BOOKBUDDY_SESSION_MAX_TURNS", "4");
        let loaded = AppConfig::load(LoadOptions::default());
        clear_vars(&["BOOKBUDDY_LLM_MAX_RETRIES", "BOOKBUDDY_SESSION_MAX_TURNS"]);

        let config = loaded.map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.llm.max_retries == 10, "ten retries should be accepted")?;
        ensure(config.session.max_turns == 4, "env max turns should apply")
    }

    #[test]
    fn hosted_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Anthropic),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .err()
        .ok_or_else(|| "anthropic without a key should fail validation".to_string())?;

        ensure(
            matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            ),
            "validation failure should mention llm.api_key",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BOOKBUDDY_LLM_PROVIDER", "openai");
        env::set_var("BOOKBUDDY_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["BOOKBUDDY_LLM_PROVIDER", "BOOKBUDDY_LLM_API_KEY"]);
        result
    }
}
