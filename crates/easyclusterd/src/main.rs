use std::process::ExitCode;

use easyclusterd::Services;

fn main() -> ExitCode {
    let services = Services::default();

    #[cfg(windows)]
    if std::env::args().nth(1).as_deref() == Some(easyclusterd::launcher::RUNNER_ARG) {
        return match easyclusterd::launcher::run_connection_runner(&services) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("easyclusterd connection runner: {error}");
                ExitCode::FAILURE
            }
        };
    }

    match easyclusterd::run_daemon(services) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("easyclusterd: {error}");
            ExitCode::FAILURE
        }
    }
}
