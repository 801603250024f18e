//! Clap derive structures for the `entcache` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// entcache -- query and mutate REST resources through a normalized cache
#[derive(Debug, Parser)]
#[command(
    name = "entcache",
    version,
    about = "Query and mutate REST API entities through a normalized cache",
    long_about = "Reads list and item endpoints of a REST API, normalizes the\n\
        payloads, and prints cache envelopes. Writes are sent as\n\
        confirm-then-invalidate; reactions are applied optimistically.",
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
    /// Config profile to use
    #[arg(long, short = 'p', env = "ENTCACHE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, short = 'u', env = "ENTCACHE_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Bearer token (overrides profile)
    #[arg(long, env = "ENTCACHE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ENTCACHE_OUTPUT",
        default_value = "json",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "ENTCACHE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a page of an entity type
    #[command(alias = "ls")]
    List(ListArgs),

    /// Fetch a single record
    Get(ItemArgs),

    /// Create a record
    Create(CreateArgs),

    /// Replace or patch a record
    Update(UpdateArgs),

    /// Delete a record
    #[command(alias = "rm")]
    Delete(ItemArgs),

    /// Update a record's view and like counters
    React(ReactArgs),

    /// Inspect and edit the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Entity type, e.g. "product"
    pub entity: String,

    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Page size (defaults to the profile's page_limit)
    #[arg(long)]
    pub limit: Option<u32>,

    /// Filter as key=value; the value is parsed as JSON when possible
    #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Follow pagination until the last page
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ItemArgs {
    /// Entity type
    pub entity: String,

    /// Record id
    pub id: String,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Entity type
    pub entity: String,

    /// JSON payload, or @path to read it from a file
    #[arg(long, short = 'd')]
    pub data: String,

    /// Submission endpoint path (defaults to the entity type)
    #[arg(long)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Entity type
    pub entity: String,

    /// Record id
    pub id: String,

    /// JSON payload, or @path to read it from a file
    #[arg(long, short = 'd')]
    pub data: String,

    /// Send PATCH instead of PUT
    #[arg(long)]
    pub partial: bool,

    /// Submission endpoint path the id is appended to (defaults to the entity type)
    #[arg(long)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReactArgs {
    /// Entity type
    pub entity: String,

    /// Record id
    pub id: String,

    /// Reacting user's id
    #[arg(long)]
    pub user: String,

    /// New view count
    #[arg(long)]
    pub views: u64,

    /// New like count
    #[arg(long)]
    pub likes: u64,

    /// Previous view count (defaults to the fetched record's)
    #[arg(long)]
    pub prev_views: Option<u64>,

    /// Previous like count (defaults to the fetched record's)
    #[arg(long)]
    pub prev_likes: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the resolved configuration (tokens redacted)
    Show,

    /// List profile names
    Profiles,

    /// Add or replace a profile
    SetProfile(SetProfileArgs),

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct SetProfileArgs {
    /// Profile name
    pub name: String,

    /// API base URL
    #[arg(long = "url")]
    pub url: String,

    /// Environment variable holding the bearer token
    #[arg(long)]
    pub token_env: Option<String>,

    /// Path to a PEM CA certificate
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Default page size for this profile
    #[arg(long)]
    pub page_limit: Option<u32>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
