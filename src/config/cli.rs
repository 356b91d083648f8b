use std::path::PathBuf;

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the isledoc binary.
#[derive(Debug, Parser)]
#[command(
    name = "isledoc",
    version,
    about = "Render a directory of markdown documents to HTML and keep them up to date"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ISLEDOC_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: WatchOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchOverrides {
    /// Directory holding the markdown sources; pages are written beside them.
    #[arg(long = "root", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Override the per-file poll interval in milliseconds.
    #[arg(long = "poll-interval-ms", value_name = "MILLIS")]
    pub poll_interval_ms: Option<u64>,

    /// Override the live reload listener host.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the live reload listener port.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Render and watch without starting the live reload server.
    #[arg(long = "no-server", action = clap::ArgAction::SetTrue)]
    pub no_server: bool,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
