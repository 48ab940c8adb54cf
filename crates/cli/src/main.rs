use std::process::ExitCode;

fn main() -> ExitCode {
    bookbuddy_cli::run()
}
