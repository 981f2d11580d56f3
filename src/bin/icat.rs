use std::process::ExitCode;

fn main() -> ExitCode {
    ExitCode::from(imeta::run_icat())
}
