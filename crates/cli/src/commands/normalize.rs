use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use bookbuddy_core::domain::book::Recommendation;
use bookbuddy_core::normalize::{parse_recommendations, ResponseNormalizer};
use serde::Serialize;

use crate::commands::{load_config, CommandResult};
use crate::logging;

#[derive(Debug, Serialize)]
struct NormalizeOutput {
    command: &'static str,
    status: &'static str,
    normalized: String,
    recommendations: Vec<Recommendation>,
}

pub fn run(input: Option<PathBuf>, json: bool) -> CommandResult {
    let config = match load_config("normalize") {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config);

    let normalizer = match ResponseNormalizer::new(config.normalizer.to_settings()) {
        Ok(normalizer) => normalizer,
        Err(error) => {
            return CommandResult::failure("normalize", "config_validation", error.to_string(), 2)
        }
    };

    let raw = match read_input(input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure("normalize", "input_read", error.to_string(), 5)
        }
    };

    render(&normalizer, &raw, json)
}

pub fn render(normalizer: &ResponseNormalizer, raw: &str, json: bool) -> CommandResult {
    let normalized = normalizer.normalize(raw);
    if !json {
        return CommandResult::text(0, normalized);
    }

    let recommendations = parse_recommendations(&normalized);
    let output =
        NormalizeOutput { command: "normalize", status: "ok", normalized, recommendations };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => CommandResult::text(0, json),
        Err(error) => CommandResult::failure("normalize", "serialization", error.to_string(), 1),
    }
}

fn read_input(input: Option<PathBuf>) -> io::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}
