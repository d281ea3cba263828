use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Scriptorium binary.
#[derive(Debug, Parser)]
#[command(name = "scriptorium", version, about = "Scriptorium blog fetch pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SCRIPTORIUM_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run one blog request through the fetch pipeline and print the result as JSON.
    Fetch(Box<FetchArgs>),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub overrides: FetchOverrides,

    /// Blog identifier.
    #[arg(long, value_name = "ID")]
    pub blog: String,

    /// Requested flavor; unknown flavors fall back to the blog default.
    #[arg(long, value_name = "FLAVOR")]
    pub flavor: Option<String>,

    /// Category path, e.g. `/notes/`.
    #[arg(long, value_name = "PATH")]
    pub category: Option<String>,

    /// Serve a single entry by permalink.
    #[arg(long, value_name = "PERMALINK")]
    pub permalink: Option<String>,

    /// Comma separated plugin chain replacing the configured one.
    #[arg(long, value_name = "IDS")]
    pub plugins: Option<String>,

    /// Extra request parameter; may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Run the request this many times against the same cache.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub repeat: u32,

    /// Pause between repeated requests.
    #[arg(long = "interval-ms", value_name = "MS", default_value_t = 0)]
    pub interval_ms: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FetchOverrides {
    /// Override the content archive path.
    #[arg(long = "archive", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub archive: Option<PathBuf>,

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

    /// Override the entry-list cache capacity.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<u64>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
