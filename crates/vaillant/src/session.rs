//! Profile-bound API access with token caching.
//!
//! A cached token is tried first. If the server rejects it the cache is
//! dropped and the command runs once more after a fresh login.

use std::future::Future;
use std::io::IsTerminal;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use vaillant_api::{ApiClient, Token, WebSocketConfig};
use vaillant_config::{ConfigError, Defaults, Profile, TokenCache};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub struct Session {
    profile_name: String,
    profile: Profile,
    defaults: Defaults,
    api: ApiClient,
    cache: TokenCache,
}

impl Session {
    /// Load the config, pick the active profile and build the HTTP client.
    pub fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = vaillant_config::load_config()?;
        let profile_name = cfg.active_profile_name(global.profile.as_deref());
        let profile = cfg.profile(&profile_name)?.clone();
        let defaults = cfg.defaults;

        let api = ApiClient::new(vaillant_config::api_config(&profile, &defaults)?)?;
        Ok(Self {
            profile_name,
            profile,
            defaults,
            api,
            cache: TokenCache::default(),
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn websocket_config(&self) -> WebSocketConfig {
        vaillant_config::websocket_config(&self.profile, &self.defaults)
    }

    /// Resolve the account password, prompting on a terminal as a last resort.
    pub fn password(&self) -> Result<SecretString, CliError> {
        match vaillant_config::resolve_password(&self.profile, &self.profile_name) {
            Ok(pw) => Ok(pw),
            Err(ConfigError::NoCredentials { .. }) if std::io::stdin().is_terminal() => {
                let pw = rpassword::prompt_password(format!(
                    "Password for {}: ",
                    self.profile.username
                ))?;
                Ok(SecretString::from(pw))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Log in with `password` and cache the resulting token.
    pub async fn login_with(&self, password: &SecretString) -> Result<Token, CliError> {
        let token = self
            .api
            .login(&self.profile.username, password)
            .await
            .map_err(|e| self.scoped(e))?;
        self.cache.save(&self.profile_name, &token)?;
        info!(profile = %self.profile_name, uid = %token.uid, "logged in");
        Ok(token)
    }

    /// Token from the cache if it belongs to this profile's account.
    fn cached_token(&self) -> Option<Token> {
        match self.cache.load(&self.profile_name) {
            Ok(Some(token)) if token.username == self.profile.username => Some(token),
            Ok(Some(_)) => {
                debug!(profile = %self.profile_name, "cached token is for another account");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cached token");
                None
            }
        }
    }

    /// Run `op` with a valid token, re-authenticating at most once.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T, CliError>
    where
        F: Fn(Token) -> Fut,
        Fut: Future<Output = Result<T, vaillant_api::Error>>,
    {
        if let Some(token) = self.cached_token() {
            match op(token).await {
                Err(e) if e.is_auth_expired() => {
                    info!(profile = %self.profile_name, "cached token rejected, logging in again");
                    self.cache.clear(&self.profile_name)?;
                }
                result => return result.map_err(|e| self.scoped(e)),
            }
        }

        let password = self.password()?;
        let token = self.login_with(&password).await?;
        op(token).await.map_err(|e| self.scoped(e))
    }

    fn scoped(&self, err: vaillant_api::Error) -> CliError {
        CliError::from(err).for_profile(&self.profile_name)
    }
}
