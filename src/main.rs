//! Binary entrypoint for the interactive chat session.

use std::process::ExitCode;

use chat_session::start_chat_session;

/// Load configuration, lock the history store, and run the REPL.
fn main() -> ExitCode {
    start_chat_session::run()
}
