use clap::{Parser, Subcommand, ValueEnum};

/// Parley: peer-to-peer call session core.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place a call between two in-process participants and run the toggles.
    Demo {
        #[arg(long, value_enum, default_value_t = DemoKind::Video)]
        kind: DemoKind,

        /// Seconds to keep the call up after the toggles.
        #[arg(long, default_value_t = 1)]
        hold_secs: u64,
    },

    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config file location.
    Path,
    /// Print the effective config as JSON (secrets redacted).
    Show,
    /// Write a commented default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DemoKind {
    Audio,
    Video,
}

pub fn parse() -> Args {
    Args::parse()
}
