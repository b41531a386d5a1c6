//! Identity types for HackHub entities

use uuid::Uuid;

/// Tenant identifier: one row of the hackathon table.
///
/// Stored as the 32-character simple (dash-free) form of a UUIDv4.
pub type HackathonId = String;

/// Project primary key (database serial).
pub type ProjectId = i64;

/// Category primary key (database serial).
pub type CategoryId = i32;

/// Number of a physical judging table; the scarce resource handed out by
/// the table allocator.
pub type TableNumber = i32;

/// Identity-provider user id.
pub type UserId = String;

/// Live update key inside the hierarchical store.
pub type UpdateId = String;

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Generate a new hackathon id.
pub fn new_hackathon_id() -> HackathonId {
    Uuid::new_v4().simple().to_string()
}

/// Generate a new live update key.
pub fn new_update_id() -> UpdateId {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> EpochMs {
    chrono::Utc::now().timestamp_millis()
}
