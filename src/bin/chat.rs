//! Terminal chat with the Quadz assistant.
//! Run with: cargo run --bin quadz-chat [session-id]

use std::process::ExitCode;

use quadz_agent::start_quadz_agent;

fn main() -> ExitCode {
    start_quadz_agent::run_chat(std::env::args().nth(1))
}
