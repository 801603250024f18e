// ── Reactive data store ──
//
// Normalized entity storage with push-based change notification.

mod collection;
mod data_store;

pub use collection::EntityCollection;
pub use data_store::DataStore;
