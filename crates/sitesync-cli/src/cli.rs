use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sitesync",
    about = "SiteSync: replicate workload entries to every site's identity issuer",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry server
    Serve(ServeArgs),
    /// Run a site agent
    Agent(AgentArgs),
    /// Print a default configuration file
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TOML config with the bind address, poll limits and sites
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "BIND_ADDR")]
    pub bind: Option<SocketAddr>,
}

#[derive(Args, Debug)]
pub struct AgentArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "SITE_ID")]
    pub site_id: Option<String>,

    #[arg(long, env = "SITE_NAME")]
    pub site_name: Option<String>,

    /// Registry address, `host:port` or a full URL
    #[arg(long, env = "API_SERVER_ADDRESS")]
    pub api_server: Option<String>,

    /// Drive a local spire-server through this admin socket
    #[arg(long, env = "SPIRE_SOCKET_PATH")]
    pub spire_socket: Option<PathBuf>,

    #[arg(long, env = "SYNC_INTERVAL_SECONDS")]
    pub sync_interval: Option<u64>,

    #[arg(long, env = "MAX_ENTRIES")]
    pub max_entries: Option<u32>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(value_enum)]
    pub target: ConfigTarget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigTarget {
    Server,
    Agent,
}
