//! Quadz assistant HTTP server.
//! Run with: cargo run --bin quadz-server

use std::process::ExitCode;

use quadz_agent::start_quadz_agent;

fn main() -> ExitCode {
    start_quadz_agent::run()
}
