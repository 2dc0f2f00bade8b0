//! Login and logout.

use secrecy::ExposeSecret;

use vaillant_config::TokenCache;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;
use crate::session::Session;

pub async fn login(session: &Session, args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let password = session.password()?;
    let token = session.login_with(&password).await?;

    if args.save_password {
        vaillant_config::store_password(session.profile_name(), password.expose_secret())?;
        if !global.quiet {
            eprintln!("Password stored in system keyring");
        }
    }
    if !global.quiet {
        eprintln!(
            "Logged in as {} (profile '{}')",
            token.username,
            session.profile_name()
        );
    }
    Ok(())
}

/// Needs no credentials, only the profile name.
pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = vaillant_config::load_config_or_default();
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let removed = TokenCache::default().clear(&profile_name)?;
    if !global.quiet {
        if removed {
            eprintln!("Logged out of profile '{profile_name}'");
        } else {
            eprintln!("No cached token for profile '{profile_name}'");
        }
    }
    Ok(())
}
