// ── Cache facade ──
//
// Entry point for consumers. Owns the store and routes every logical
// operation through request building, the injected transport,
// normalization, and invalidation. There is no global instance: each
// `Cache` is constructed with its own transport.

use std::sync::Arc;

use entcache_api::transport::{TlsMode, TransportConfig};
use entcache_api::{Filters, HttpTransport, RequestDescriptor, Transport};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::{CacheConfig, TlsVerification};
use crate::error::CoreError;
use crate::invalidation::{Invalidator, ListQueryKey};
use crate::model::record::reactions_patch;
use crate::model::{
    EntityId, ItemEnvelope, ItemSelection, ListEnvelope, Reactions, Record, WriteEnvelope,
};
use crate::mutation::{MutationKey, OptimisticController};
use crate::normalize::Normalizer;
use crate::selectors::{RecordList, Selectors};
use crate::store::DataStore;
use crate::stream::EntityStream;

// ── Cache ────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<CacheInner>`. Reads go through the list
/// query cache and the store; writes are confirm-then-invalidate, except
/// reactions, which are applied optimistically and rolled back on failure.
pub struct Cache<T: Transport> {
    inner: Arc<CacheInner<T>>,
}

struct CacheInner<T> {
    transport: T,
    store: DataStore,
    selectors: Selectors,
    normalizer: Normalizer,
    invalidator: Invalidator,
    optimistic: OptimisticController,
    default_page_limit: u32,
}

impl<T: Transport> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Cache<T> {
    /// Create a cache over an existing transport. Nothing is fetched
    /// until the first read.
    pub fn new(transport: T, config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                transport,
                store: DataStore::new(),
                selectors: Selectors::new(),
                normalizer: Normalizer::new(
                    config.id_fields.clone(),
                    config.recommendation.clone(),
                ),
                invalidator: Invalidator::new(),
                optimistic: OptimisticController::new(),
                default_page_limit: config.default_page_limit,
            }),
        }
    }

    /// Access the underlying DataStore.
    pub fn store(&self) -> &DataStore {
        &self.inner.store
    }

    /// The transport requests are sent through.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Per-record optimistic write state.
    pub fn optimistic(&self) -> &OptimisticController {
        &self.inner.optimistic
    }

    /// Page size used when a caller has no preference.
    pub fn default_page_limit(&self) -> u32 {
        self.inner.default_page_limit
    }

    // ── Selectors ────────────────────────────────────────────────

    pub fn select_list(&self, entity: &str) -> RecordList {
        self.inner.selectors.select_list(&self.inner.store, entity)
    }

    pub fn select_one_item_by_guid(&self, entity: &str, id: &str) -> Arc<ItemSelection> {
        self.inner
            .selectors
            .select_one_item_by_guid(&self.inner.store, entity, id)
    }

    pub fn select_many_items_by_field(&self, entity: &str, field: &str, value: &Value) -> RecordList {
        self.inner
            .selectors
            .select_many_items_by_field(&self.inner.store, entity, field, value)
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Push-based view of an entity type's collection.
    pub fn subscribe(&self, entity: &str) -> EntityStream {
        self.inner.store.subscribe(entity)
    }

    /// Fires whenever cached lists of `entity` become stale.
    pub fn subscribe_invalidations(&self, entity: &str) -> watch::Receiver<u64> {
        self.inner.invalidator.subscribe_invalidations(entity)
    }

    /// Mark every cached list of `entity` stale, e.g. for a manual refresh.
    pub fn invalidate_lists(&self, entity: &str) -> u64 {
        self.inner.invalidator.invalidate_lists(entity)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Fetch one page of an entity type.
    ///
    /// Served from the list query cache while no mutation of `entity`
    /// has happened since it was fetched. Fetched records are merged
    /// into the store by id. Transport failures leave the store as is; a
    /// body that is not JSON degrades to an empty, uncached page.
    pub async fn list_read(
        &self,
        entity: &str,
        page: u32,
        limit: u32,
        filters: Option<&Filters>,
    ) -> Result<Arc<ListEnvelope>, CoreError> {
        require("entity type", entity)?;
        let empty = Filters::new();
        let filters = filters.unwrap_or(&empty);
        let inner = &self.inner;

        let key = ListQueryKey::new(entity, page, limit, filters);
        let generation = inner.invalidator.list_generation(entity);
        if let Some(cached) = inner.invalidator.fresh(&key) {
            debug!(entity, page, limit, "list served from cache");
            return Ok(cached);
        }

        let sent = inner
            .transport
            .send(RequestDescriptor::list(entity, page, limit, filters))
            .await
            .map_err(|e| CoreError::from(e).for_target(entity, None));
        let Some(raw) = absorb_malformed(sent, entity)? else {
            let list = inner.normalizer.normalize_list(entity, filters, &Value::Null);
            return Ok(Arc::new(list.into_envelope()));
        };

        let mut list = inner.normalizer.normalize_list(entity, filters, &raw);
        list.stabilize(&inner.store);
        self.merge_fetched(&list.entity, list.storable());

        let envelope = Arc::new(list.into_envelope());
        inner.invalidator.insert(key, generation, Arc::clone(&envelope));
        Ok(envelope)
    }

    /// Fetch a single record and merge it into the store.
    pub async fn item_read(&self, entity: &str, id: &str) -> Result<ItemEnvelope, CoreError> {
        require("entity type", entity)?;
        require("id", id)?;
        let inner = &self.inner;

        let sent = inner
            .transport
            .send(RequestDescriptor::item(entity, id))
            .await
            .map_err(|e| CoreError::from(e).for_target(entity, Some(id)));
        let raw = absorb_malformed(sent, entity)?.unwrap_or(Value::Null);

        let mut item = inner.normalizer.normalize_item(entity, &raw);
        item.stabilize(&inner.store);
        if let Some(record) = &item.record {
            let key = record.id.clone().unwrap_or_else(|| EntityId::from(id));
            self.merge_fetched(entity, vec![(key, Arc::new(record.record.clone()))]);
        }
        Ok(item.into_envelope())
    }

    // ── Writes ───────────────────────────────────────────────────

    /// `POST` a new record. Lists of `entity` are stale afterwards.
    pub async fn create(
        &self,
        entity: &str,
        payload: Value,
        submission_endpoint: Option<&str>,
    ) -> Result<WriteEnvelope, CoreError> {
        require("entity type", entity)?;
        let request = RequestDescriptor::create(entity, payload, submission_endpoint);
        self.confirm_then_invalidate(entity, None, request).await
    }

    /// `PUT` (or `PATCH` when `partial`) an existing record.
    pub async fn update(
        &self,
        entity: &str,
        id: &str,
        payload: Value,
        partial: bool,
        submission_endpoint: Option<&str>,
    ) -> Result<WriteEnvelope, CoreError> {
        require("entity type", entity)?;
        require("id", id)?;
        let request = RequestDescriptor::update(entity, id, payload, partial, submission_endpoint);
        self.confirm_then_invalidate(entity, Some(id), request).await
    }

    /// `DELETE` a record; once confirmed it is dropped from the store.
    pub async fn remove(&self, entity: &str, id: &str) -> Result<WriteEnvelope, CoreError> {
        require("entity type", entity)?;
        require("id", id)?;
        let envelope = self
            .confirm_then_invalidate(entity, Some(id), RequestDescriptor::delete(entity, id))
            .await?;
        self.inner.store.remove_one(entity, &EntityId::from(id));
        Ok(envelope)
    }

    /// Update a record's reaction counters optimistically.
    ///
    /// The new counters are visible in the store before the call
    /// resolves, and reads landing meanwhile keep them. On failure the
    /// stored record is restored exactly, or, if a read replaced it, only
    /// its counters go back to the fetched ones. Calls for the same record
    /// run one at a time, in issue order. If the returned future is
    /// dropped mid-flight the speculative write stays.
    pub async fn react(
        &self,
        entity: &str,
        id: &str,
        user_id: &str,
        reactions: Reactions,
        previous: Reactions,
    ) -> Result<WriteEnvelope, CoreError> {
        require("entity type", entity)?;
        require("id", id)?;
        let inner = &self.inner;
        let key = MutationKey::new(entity, id);
        let _permit = inner.optimistic.acquire(&key).await;

        let cached = inner
            .store
            .get_one(entity, &key.id)
            .and_then(|record| Reactions::of(&record));
        if cached.is_some_and(|current| current != previous) {
            warn!(entity, id, ?cached, ?previous, "caller's previous reactions differ from cache");
        }

        let mutation = inner
            .optimistic
            .begin_optimistic(&inner.store, key, reactions_patch(reactions));

        let outcome = match inner
            .transport
            .send(RequestDescriptor::reaction(entity, id, user_id, reactions.to_value()))
            .await
        {
            Ok(raw) => Normalizer::normalize_write(entity, &raw),
            Err(e) => Err(CoreError::from(e).for_target(entity, Some(id))),
        };

        match &outcome {
            Ok(_) => inner.optimistic.confirm(mutation),
            Err(e) => {
                warn!(entity, id, error = %e, "reaction update failed");
                inner.optimistic.revert(&inner.store, mutation);
            }
        }
        outcome
    }

    // ── Private helpers ──────────────────────────────────────────

    /// Merge fetched records, keeping fields of in-flight optimistic writes.
    fn merge_fetched(&self, entity: &str, mut records: Vec<(EntityId, Arc<Record>)>) {
        let inner = &self.inner;
        inner.store.update_with(entity, |_| {
            inner.optimistic.overlay(entity, &mut records);
            records
        });
    }

    async fn confirm_then_invalidate(
        &self,
        entity: &str,
        id: Option<&str>,
        request: RequestDescriptor,
    ) -> Result<WriteEnvelope, CoreError> {
        let raw = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| CoreError::from(e).for_target(entity, id))?;

        // The remote side changed even if the acknowledgement is unreadable.
        self.inner.invalidator.invalidate_lists(entity);
        Normalizer::normalize_write(entity, &raw)
    }
}

impl Cache<HttpTransport> {
    /// Build a cache over an [`HttpTransport`] described by `config`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(
            config.base_url.clone(),
            config.access_token.as_ref(),
            &build_transport(config),
        )?;
        Ok(Self::new(transport, config))
    }
}

fn build_transport(config: &CacheConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        ..TransportConfig::default()
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

/// Reads treat an unparseable body as no data; other failures propagate.
fn absorb_malformed(
    sent: Result<Value, CoreError>,
    entity: &str,
) -> Result<Option<Value>, CoreError> {
    match sent {
        Ok(raw) => Ok(Some(raw)),
        Err(err @ CoreError::MalformedResponse { .. }) => {
            warn!(entity, error = %err, "unreadable read response, treating as empty");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn require(what: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::ValidationFailed {
            message: format!("{what} must not be empty"),
        });
    }
    Ok(())
}
