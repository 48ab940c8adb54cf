use std::io::{self, BufRead, Write};

use bookbuddy_agent::instruction::SummaryRequest;
use bookbuddy_agent::runtime::new_session_id;
use bookbuddy_agent::{AgentClient, AgentRuntime};
use tracing::warn;

use crate::commands::{agent_runtime, current_thread_runtime, load_config, CommandResult};
use crate::logging;

const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];
const GOODBYE: &str = "👋 Goodbye! Happy reading!";

pub fn run(session: Option<String>) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(result) => return result,
    };
    logging::init(&config);

    let runtime = match agent_runtime("chat", &config) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let executor = match current_thread_runtime("chat") {
        Ok(executor) => executor,
        Err(result) => return result,
    };

    let session_id = session.unwrap_or_else(new_session_id);
    let alias = config.agent.alias.clone();
    let history_limit = config.session.history_limit;

    executor.block_on(async {
        if let Err(error) = runtime.initialize().await {
            return CommandResult::failure("chat", "model_access", error.to_string(), 4);
        }
        if let Err(error) = runtime.self_test().await {
            warn!(event_name = "agent.self_test.failed", error = %error, "agent self-test failed");
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let session = ChatSession { session_id: &session_id, alias: &alias, history_limit };
        match session.converse(&runtime, stdin.lock(), &mut stdout).await {
            Ok(answered) => CommandResult::success(
                "chat",
                format!("session {session_id} ended after {answered} answered turns"),
            ),
            Err(error) => CommandResult::failure("chat", "terminal_io", error.to_string(), 5),
        }
    })
}

/// Interactive loop over any line source. `history` lists recent answered queries.
pub struct ChatSession<'a> {
    pub session_id: &'a str,
    pub alias: &'a str,
    pub history_limit: usize,
}

impl ChatSession<'_> {
    /// Returns how many turns were answered before the user left or input ended.
    pub async fn converse<C, R, W>(
        &self,
        runtime: &AgentRuntime<C>,
        mut input: R,
        output: &mut W,
    ) -> io::Result<usize>
    where
        C: AgentClient,
        R: BufRead,
        W: Write,
    {
        writeln!(
            output,
            "💡 Ask {} for book recommendations! Add \"with summary\" for summaries, type 'history' for recent chats, 'exit' to quit.\n",
            self.alias
        )?;

        let mut answered = 0usize;
        let mut line = String::new();
        loop {
            write!(output, "You: ")?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(output, "\n{GOODBYE}")?;
                return Ok(answered);
            }

            let typed = line.trim();
            if typed.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&typed.to_lowercase().as_str()) {
                writeln!(output, "{GOODBYE}")?;
                return Ok(answered);
            }
            if typed.eq_ignore_ascii_case("history") {
                self.write_history(runtime, output)?;
                continue;
            }

            let request = SummaryRequest::parse(typed);
            let reply =
                runtime.chat(self.session_id, &request.query, request.include_summary).await;
            if !reply.is_failure() {
                answered += 1;
            }
            writeln!(output, "{}: {}\n", self.alias, reply.text())?;
        }
    }

    fn write_history<C: AgentClient, W: Write>(
        &self,
        runtime: &AgentRuntime<C>,
        output: &mut W,
    ) -> io::Result<()> {
        let recent = runtime.recent_history(self.history_limit);
        if recent.is_empty() {
            return writeln!(output, "No conversations yet.\n");
        }

        writeln!(output, "📝 Recent conversations:")?;
        for entry in recent {
            let preview = entry.response.chars().take(100).collect::<String>();
            let marker = if entry.include_summary { " (with summary)" } else { "" };
            writeln!(
                output,
                "- [{}] {}{marker}: {preview}",
                entry.recorded_at.format("%H:%M:%S"),
                entry.query
            )?;
        }
        writeln!(output)
    }
}
