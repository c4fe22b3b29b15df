use nimbus_storage::ObjectEntry;
use time::OffsetDateTime;
use time::macros::datetime;

/// Deterministic timestamp used across listing fixtures.
#[allow(dead_code)]
pub fn fixed_time() -> OffsetDateTime {
    datetime!(2024-03-01 12:00:00 UTC)
}

/// An object entry stamped `minutes` after [`fixed_time`].
#[allow(dead_code)]
pub fn entry(key: &str, size: u64, minutes: i64) -> ObjectEntry {
    ObjectEntry::new(key, size, fixed_time() + time::Duration::minutes(minutes))
}
