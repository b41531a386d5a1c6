//! HackHub Core - Entity Types
//!
//! Plain data structures shared by the storage and API layers, plus the
//! canonical error taxonomy that the storage layer translates driver
//! failures into. This crate contains no I/O.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use entities::{Category, Hackathon, LiveUpdate, Project, TableAssignment};
pub use enums::AuthLevel;
pub use error::{DataError, DataResult, ErrorKind};
pub use identity::{
    new_hackathon_id, new_update_id, now_epoch_ms, CategoryId, EpochMs, HackathonId, ProjectId,
    TableNumber, UpdateId, UserId,
};
