//! Clap derive structures for the `vaillant` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vaillant -- watch and control Vaillant Plus boilers
#[derive(Debug, Parser)]
#[command(
    name = "vaillant",
    version,
    about = "Watch and control Vaillant Plus boilers from the command line",
    long_about = "Talks to the Vaillant Plus app backend and the Gizwits IoT platform.\n\n\
        Lists bound devices, streams live attribute updates over WebSocket,\n\
        and writes attributes back to the boiler.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "VAILLANT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VAILLANT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// One compact JSON object per line
    JsonCompact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and cache the access token
    Login(LoginArgs),

    /// Forget the cached access token
    Logout,

    /// List devices bound to the account
    #[command(alias = "dev")]
    Devices,

    /// Look up serial number and model by MAC address
    DeviceInfo {
        /// Device MAC address (case-insensitive)
        mac: String,
    },

    /// Stream live attribute updates until Ctrl-C
    Watch(WatchArgs),

    /// Write attributes to a device
    Send(SendArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Store the password in the system keyring after a successful login
    #[arg(long)]
    pub save_password: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device id (defaults to the profile's device, or the only bound device)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Print only the attributes that changed since the previous update
    #[arg(long)]
    pub changes: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device id (defaults to the profile's device, or the only bound device)
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Seconds to wait for the device subscription before giving up
    #[arg(long, default_value = "30")]
    pub wait: u64,

    /// Attributes as KEY=VALUE; VALUE is parsed as JSON, else taken as a string
    #[arg(required = true, value_name = "KEY=VALUE")]
    pub attrs: Vec<String>,
}
