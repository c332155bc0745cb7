//! Entry point for the `midlayer` inspection CLI.
#![forbid(unsafe_code)]

use std::io::Write as _;

fn main() -> std::process::ExitCode {
    match midlayer_cli::run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "midlayer: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}
