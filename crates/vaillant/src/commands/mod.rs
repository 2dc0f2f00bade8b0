//! Command dispatch: bridges CLI args -> API calls -> output formatting.

pub mod account;
pub mod devices;
pub mod send;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::session::Session;

/// Dispatch an account-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => account::login(session, &args, global).await,
        Command::Devices => devices::list(session, global).await,
        Command::DeviceInfo { mac } => devices::info(session, &mac, global).await,
        Command::Watch(args) => watch::handle(session, args, global).await,
        Command::Send(args) => send::handle(session, args, global).await,
        // Logout and Completions are handled before a session is opened
        Command::Logout | Command::Completions { .. } => Ok(()),
    }
}
