use std::process::ExitCode;

fn main() -> ExitCode {
    freightgate_cli::run()
}
