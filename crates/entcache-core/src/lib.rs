//! Client-side normalized entity cache for REST-style APIs.
//!
//! This crate owns the cache logic between `entcache-api` (the transport
//! seam) and consumers such as the `entcache` CLI or a UI layer:
//!
//! - **[`Cache`]**: Central facade. Constructed with an injected
//!   [`Transport`](entcache_api::Transport); routes list, item, create,
//!   update, delete, and reaction operations through request building,
//!   normalization, and invalidation.
//!
//! - **[`DataStore`]**: Per-entity-type [`EntityCollection`]s held in a
//!   `DashMap` of `tokio::sync::watch` channels. Writes merge by id and
//!   swap the collection `Arc`, so identity means "unchanged".
//!
//! - **[`Selectors`]**: Memoized derivations (`select_list`,
//!   `select_one_item_by_guid`, `select_many_items_by_field`) that return
//!   the same `Arc` while their input collection is unchanged.
//!
//! - **[`Normalizer`]**: Raw payloads to envelopes, with `createdAt` and
//!   `reactions` defaulting and the recommendation re-tagging rule.
//!
//! - **[`Invalidator`]** / **[`OptimisticController`]**: per-entity list
//!   generations guarding the list query cache, and per-record
//!   apply-now/rollback-on-failure writes.

pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod model;
pub mod mutation;
pub mod normalize;
pub mod selectors;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::Cache;
pub use config::{CacheConfig, RecommendationRule, TlsVerification};
pub use error::CoreError;
pub use invalidation::{Invalidator, ListQueryKey};
pub use mutation::{MutationKey, MutationPermit, OptimisticController, OptimisticMutation, Patch};
pub use normalize::Normalizer;
pub use selectors::{RecordList, Selectors};
pub use store::{DataStore, EntityCollection};
pub use stream::EntityStream;

pub use model::{
    EntityId, ItemEnvelope, ItemSelection, ListEnvelope, Pagination, Reactions, Record,
    WriteEnvelope,
};

pub use entcache_api::Filters;
