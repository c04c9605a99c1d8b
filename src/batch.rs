//! Splits entity ids into platform-sized batches.
use crate::model::EntityId;

/// Partition `ids` into consecutive batches of `max_size`, the last one
/// holding the remainder. Empty input yields no batches.
pub fn partition(ids: &[EntityId], max_size: usize) -> Vec<&[EntityId]> {
    ids.chunks(max_size).collect()
}
