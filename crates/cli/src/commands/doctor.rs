use bookbuddy_agent::instruction::load_instruction;
use bookbuddy_agent::{AgentClient, AgentRuntime};
use bookbuddy_core::config::{AppConfig, ConfigError, LoadOptions};
use serde::Serialize;

use crate::commands::{agent_runtime, current_thread_runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

const AGENT_CHECKS: &[&str] = &["agent_instruction", "model_access", "agent_self_test"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 6 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report(loaded: Result<AppConfig, ConfigError>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(live_agent_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(skipped(AGENT_CHECKS, "configuration did not load"));
        }
    }

    finalize(checks)
}

fn live_agent_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match agent_runtime("doctor", config) {
        Ok(runtime) => runtime,
        Err(_) => {
            let mut checks = vec![instruction_check(config)];
            checks.push(DoctorCheck {
                name: "model_access",
                status: CheckStatus::Fail,
                details: "agent client could not be built from configuration".to_string(),
            });
            checks.extend(skipped(&AGENT_CHECKS[2..], "agent client is unavailable"));
            return checks;
        }
    };

    let executor = match current_thread_runtime("doctor") {
        Ok(executor) => executor,
        Err(_) => {
            return vec![DoctorCheck {
                name: "model_access",
                status: CheckStatus::Fail,
                details: "failed to initialize async runtime".to_string(),
            }]
        }
    };

    executor.block_on(agent_checks(config, &runtime))
}

/// Instruction, model access, and self-test checks against any agent client.
pub async fn agent_checks<C: AgentClient>(
    config: &AppConfig,
    runtime: &AgentRuntime<C>,
) -> Vec<DoctorCheck> {
    let mut checks = vec![instruction_check(config)];

    match runtime.initialize().await {
        Ok(()) => checks.push(DoctorCheck {
            name: "model_access",
            status: CheckStatus::Pass,
            details: format!("model `{}` is available", runtime.client().model()),
        }),
        Err(error) => {
            checks.push(DoctorCheck {
                name: "model_access",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(skipped(&AGENT_CHECKS[2..], "model is not available"));
            return checks;
        }
    }

    checks.push(match runtime.self_test().await {
        Ok(reply) => DoctorCheck {
            name: "agent_self_test",
            status: CheckStatus::Pass,
            details: format!(
                "agent answered the test query ({} chars after normalization)",
                reply.chars().count()
            ),
        },
        Err(error) => DoctorCheck {
            name: "agent_self_test",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    });
    checks
}

fn instruction_check(config: &AppConfig) -> DoctorCheck {
    match load_instruction(config.agent.instruction_path.as_deref()) {
        Ok(_) => DoctorCheck {
            name: "agent_instruction",
            status: CheckStatus::Pass,
            details: match &config.agent.instruction_path {
                Some(path) => format!("instruction loaded from `{}`", path.display()),
                None => "using the built-in instruction".to_string(),
            },
        },
        Err(error) => DoctorCheck {
            name: "agent_instruction",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn skipped(names: &[&'static str], reason: &str) -> Vec<DoctorCheck> {
    names
        .iter()
        .copied()
        .map(|name| DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: format!("skipped because {reason}"),
        })
        .collect()
}

pub fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
