//! Entity command handlers: list, get, create, update, delete, react.

use std::sync::Arc;

use tracing::debug;

use entcache_api::HttpTransport;
use entcache_core::{Cache, ListEnvelope, Pagination, Reactions};

use crate::cli::{CreateArgs, GlobalOpts, ItemArgs, ListArgs, ReactArgs, UpdateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

type HttpCache = Cache<HttpTransport>;

pub async fn list(cache: &HttpCache, args: &ListArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let filters = util::parse_filters(&args.filters)?;
    let limit = args.limit.unwrap_or_else(|| cache.default_page_limit());

    let first = cache
        .list_read(&args.entity, args.page, limit, Some(&filters))
        .await?;
    if !args.all {
        return output::emit(global.output, &*first);
    }

    let mut merged = ListEnvelope::clone(&first);
    let mut last = first;
    let mut page = args.page;
    // Walk by the local page counter; servers may repeat `currentPage`.
    while !last.data.is_empty() && at_page(&last, page).has_next_page() {
        page += 1;
        debug!(entity = %args.entity, page, "following pagination");
        last = cache
            .list_read(&args.entity, page, limit, Some(&filters))
            .await?;
        merged.data.extend(last.data.iter().map(Arc::clone));
    }
    merged.current_page = Some(u64::from(page));
    output::emit(global.output, &merged)
}

fn at_page(envelope: &ListEnvelope, page: u32) -> Pagination {
    Pagination {
        current_page: Some(u64::from(page)),
        ..envelope.pagination()
    }
}

pub async fn get(cache: &HttpCache, args: &ItemArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let envelope = cache.item_read(&args.entity, &args.id).await?;
    output::emit(global.output, &envelope)
}

pub async fn create(
    cache: &HttpCache,
    args: &CreateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let payload = util::read_payload(&args.data)?;
    let envelope = cache
        .create(&args.entity, payload, args.endpoint.as_deref())
        .await?;
    output::emit(global.output, &envelope)
}

pub async fn update(
    cache: &HttpCache,
    args: &UpdateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let payload = util::read_payload(&args.data)?;
    let envelope = cache
        .update(
            &args.entity,
            &args.id,
            payload,
            args.partial,
            args.endpoint.as_deref(),
        )
        .await?;
    output::emit(global.output, &envelope)
}

pub async fn delete(cache: &HttpCache, args: &ItemArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let envelope = cache.remove(&args.entity, &args.id).await?;
    output::emit(global.output, &envelope)
}

/// Fetch the record first so the optimistic write has something to
/// apply to, and so omitted `--prev-*` values come from the server.
pub async fn react(cache: &HttpCache, args: &ReactArgs, global: &GlobalOpts) -> Result<(), CliError> {
    cache.item_read(&args.entity, &args.id).await?;
    let current = cache
        .select_one_item_by_guid(&args.entity, &args.id)
        .value
        .as_deref()
        .and_then(Reactions::of)
        .unwrap_or_default();

    let previous = Reactions::new(
        args.prev_views.unwrap_or(current.views),
        args.prev_likes.unwrap_or(current.likes),
    );
    let envelope = cache
        .react(
            &args.entity,
            &args.id,
            &args.user,
            Reactions::new(args.views, args.likes),
            previous,
        )
        .await?;
    output::emit(global.output, &envelope)
}
