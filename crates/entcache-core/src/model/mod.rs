// ── Domain model ──
//
// Entity-agnostic: records stay JSON, identity and envelopes are typed.

pub mod entity_id;
pub mod envelope;
pub mod record;

pub use entity_id::EntityId;
pub use envelope::{ItemEnvelope, ItemSelection, ListEnvelope, Pagination, WriteEnvelope};
pub use record::{Reactions, Record};
