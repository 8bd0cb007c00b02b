use std::process::ExitCode;

fn main() -> ExitCode {
    revvy_cli::run()
}
