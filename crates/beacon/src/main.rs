//! Beacon - Entry point

use std::process::ExitCode;

use beacon::{cli, Command, GatewayError};

#[tokio::main]
async fn main() -> ExitCode {
    let options = match Command::from_env() {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print!("{}", cli::HELP);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("beacon {}", beacon::VERSION);
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{err}");
            eprintln!("Use --help for usage information");
            return ExitCode::FAILURE;
        }
    };

    match beacon::run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &GatewayError) {
    // Config and logging failures happen before a subscriber exists
    if tracing::dispatcher::has_been_set() {
        tracing::error!(error = %err, "beacon stopped");
    } else {
        eprintln!("beacon: {err}");
    }
}
