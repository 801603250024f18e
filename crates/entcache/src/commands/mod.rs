//! Command dispatch: bridges CLI args -> cache operations -> output formatting.

pub mod config_cmd;
pub mod entities;
pub mod util;

use entcache_api::HttpTransport;
use entcache_core::Cache;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a cache-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    cache: &Cache<HttpTransport>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::List(args) => entities::list(cache, &args, global).await,
        Command::Get(args) => entities::get(cache, &args, global).await,
        Command::Create(args) => entities::create(cache, &args, global).await,
        Command::Update(args) => entities::update(cache, &args, global).await,
        Command::Delete(args) => entities::delete(cache, &args, global).await,
        Command::React(args) => entities::react(cache, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
