use std::process::ExitCode;

fn main() -> ExitCode {
    event_digest_lib::run()
}
