//! Entity trait: records identified by a server-assigned numeric key.

use crate::id::RecordId;

/// A server-owned record.
///
/// The key is assigned by the server on creation, so a record that has not
/// been persisted yet has no key. Clients never invent one.
pub trait Entity {
    /// Name of the primary key field on the wire (`<entity>_id`).
    const KEY_FIELD: &'static str;

    /// Returns the primary key, if the record has been persisted.
    fn key(&self) -> Option<RecordId>;
}
