mod cli;
mod commands;
mod error;
mod output;
mod session;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::session::Session;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "vaillant", &mut std::io::stdout());
            Ok(())
        }

        // Only needs the profile name
        Command::Logout => commands::account::logout(&cli.global),

        cmd => {
            let session = Session::open(&cli.global)?;
            tracing::debug!(command = ?cmd, profile = %session.profile_name(), "dispatching command");
            commands::dispatch(cmd, &session, &cli.global).await
        }
    }
}
