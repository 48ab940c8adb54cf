pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bookbuddy",
    about = "BookBuddy book recommendation CLI",
    long_about = "Ask a book recommendation agent for titles with purchase links, normalize saved replies, and check runtime readiness.",
    after_help = "Examples:\n  bookbuddy ask \"books like Dune\" --summary\n  bookbuddy chat\n  bookbuddy normalize --input reply.txt --json\n  bookbuddy doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send one query to the agent and print the normalized reply")]
    Ask {
        #[arg(required = true, num_args = 1.., help = "What kind of books you are looking for")]
        query: Vec<String>,
        #[arg(long, help = "Ask for a short summary of each book")]
        summary: bool,
        #[arg(long, help = "Continue an existing session id")]
        session: Option<String>,
        #[arg(long, help = "Emit the reply and parsed recommendations as JSON")]
        json: bool,
    },
    #[command(about = "Start an interactive chat session (exit, quit, or bye to leave)")]
    Chat {
        #[arg(long, help = "Session id to use instead of a generated one")]
        session: Option<String>,
    },
    #[command(
        about = "Normalize a saved agent reply from a file or stdin without calling the agent"
    )]
    Normalize {
        #[arg(long, help = "Read the reply from this file instead of stdin")]
        input: Option<PathBuf>,
        #[arg(long, help = "Emit normalized text and parsed recommendations as JSON")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model access, and agent self-test")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, summary, session, json } => {
            commands::ask::run(commands::ask::AskRequest {
                query: query.join(" "),
                include_summary: summary,
                session_id: session,
                json,
            })
        }
        Command::Chat { session } => commands::chat::run(session),
        Command::Normalize { input, json } => commands::normalize::run(input, json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
