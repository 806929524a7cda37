use std::process::ExitCode;

fn main() -> ExitCode {
    visionflow::run_cli()
}
