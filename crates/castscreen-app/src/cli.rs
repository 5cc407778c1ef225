use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// castscreen: mirror the screen to a remote display (loopback demo).
#[derive(Parser, Debug)]
#[command(name = "castscreen", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective config to this path and exit.
    #[arg(long, value_name = "PATH")]
    pub write_config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Friendly name of the simulated endpoint.
    #[arg(long, default_value = "Living Room")]
    pub endpoint: String,

    /// How long to keep presenting before ending the session.
    #[arg(long, default_value_t = 1500)]
    pub hold_ms: u64,

    /// Trigger that ends the session.
    #[arg(long, value_enum, default_value_t = EndTrigger::Unselect)]
    pub end_with: EndTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EndTrigger {
    /// The user deselects the route.
    Unselect,
    /// The receiver application disconnects.
    Disconnect,
    /// Another application takes over the receiver.
    Takeover,
    Suspend,
    ConnectionFailed,
    /// The receiver ends the remote display.
    DisplayEnded,
    /// The platform revokes screen capture.
    CaptureStopped,
    /// The host stops the session.
    Stop,
}

pub fn parse() -> Args {
    Args::parse()
}
