//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use vaillant_config::ConfigError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Vaillant service")]
    #[diagnostic(
        code(vaillant::connection_failed),
        help("Check your network connection. Use -vv to see request details.")
    )]
    ConnectionFailed {
        #[source]
        source: vaillant_api::Error,
    },

    #[error("Device connection stopped before it was ready")]
    #[diagnostic(
        code(vaillant::disconnected),
        help("The device may be offline. Try: vaillant devices")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed for profile '{profile}'")]
    #[diagnostic(
        code(vaillant::auth_failed),
        help(
            "Check the username and password, then run: vaillant login --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(vaillant::no_credentials),
        help(
            "Set VAILLANT_PASSWORD, store a password with: vaillant login --save-password,\n\
             or add `password` to the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vaillant::not_found),
        help("Run: vaillant devices to see what is bound to this account")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Account has {count} devices; pick one")]
    #[diagnostic(
        code(vaillant::ambiguous_device),
        help("Pass --device <ID> or set `device` in the profile. Run: vaillant devices")
    )]
    AmbiguousDevice { count: usize },

    // ── API ──────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(vaillant::api_error))]
    Api(vaillant_api::Error),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vaillant::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vaillant::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(vaillant::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(vaillant::timeout),
        help("Increase the wait with --wait, or check that the device is online.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::AmbiguousDevice { .. }
            | Self::ProfileNotFound { .. }
            | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the profile name to library auth failures.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            Self::NoCredentials { .. } => Self::NoCredentials {
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── Library error → CliError mapping ─────────────────────────────────

impl From<vaillant_api::Error> for CliError {
    fn from(err: vaillant_api::Error) -> Self {
        use vaillant_api::Error as E;
        match err {
            E::InvalidAuth | E::InvalidCredentials => CliError::AuthFailed {
                profile: "current".into(),
            },
            E::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            E::Transport(_)
            | E::Tls(_)
            | E::WebSocketConnect(_)
            | E::WebSocketServerClosedConnection { .. }
            | E::UnexpectedResponse { .. } => CliError::ConnectionFailed { source: err },
            other => CliError::Api(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
                path: vaillant_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_exit_with_auth_code() {
        let err = CliError::from(vaillant_api::Error::InvalidAuth).for_profile("home");
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert!(err.to_string().contains("home"));
    }

    #[test]
    fn connection_errors_exit_with_connection_code() {
        let err = CliError::from(vaillant_api::Error::WebSocketConnect("refused".into()));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn config_errors_exit_with_usage_code() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "x".into(),
            available: vec![],
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        let CliError::ProfileNotFound { available, .. } = err else {
            panic!("expected ProfileNotFound");
        };
        assert_eq!(available, "(none)");
    }

    #[test]
    fn other_api_errors_are_general() {
        let err = CliError::from(vaillant_api::Error::Request {
            message: "boom".into(),
        });
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
