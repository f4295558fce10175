use std::process::ExitCode;

fn main() -> ExitCode {
    match tetherd::run_server() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("tetherd: {error}");
            ExitCode::FAILURE
        }
    }
}
