use bookbuddy_agent::runtime::new_session_id;
use bookbuddy_agent::{AgentClient, AgentRuntime, ChatReply};
use bookbuddy_core::domain::book::Recommendation;
use serde::Serialize;

use crate::commands::{agent_runtime, current_thread_runtime, load_config, CommandResult};
use crate::logging;

#[derive(Clone, Debug)]
pub struct AskRequest {
    pub query: String,
    pub include_summary: bool,
    pub session_id: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    command: &'static str,
    status: &'static str,
    session_id: &'a str,
    query: &'a str,
    include_summary: bool,
    reply: &'a str,
    recommendations: &'a [Recommendation],
}

pub fn run(request: AskRequest) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config);

    let runtime = match agent_runtime("ask", &config) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let executor = match current_thread_runtime("ask") {
        Ok(executor) => executor,
        Err(result) => return result,
    };

    executor.block_on(execute(&runtime, request))
}

/// Runs one turn against any agent client. Failures exit with code 1.
pub async fn execute<C: AgentClient>(
    runtime: &AgentRuntime<C>,
    request: AskRequest,
) -> CommandResult {
    let session_id = request.session_id.clone().unwrap_or_else(new_session_id);
    let reply = runtime.chat(&session_id, &request.query, request.include_summary).await;

    match (&reply, request.json) {
        (ChatReply::Answered { text, recommendations }, true) => {
            let output = AskOutput {
                command: "ask",
                status: "ok",
                session_id: &session_id,
                query: request.query.trim(),
                include_summary: request.include_summary,
                reply: text,
                recommendations,
            };
            match serde_json::to_string_pretty(&output) {
                Ok(json) => CommandResult::text(0, json),
                Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
            }
        }
        (ChatReply::Answered { text, .. }, false) => CommandResult::text(0, text.clone()),
        (ChatReply::Failed { text, .. }, true) => {
            CommandResult::failure("ask", "agent_failure", text.clone(), 1)
        }
        (ChatReply::Failed { text, .. }, false) => CommandResult::text(1, text.clone()),
    }
}
