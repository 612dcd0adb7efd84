use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match frodod::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "frodod: {error}");
            ExitCode::FAILURE
        }
    }
}
