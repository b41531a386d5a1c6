//! Core entity types
//!
//! Plain data: persistence, validation and API shaping live in the mappers.
//! Field names match storage column names so rows deserialize directly.

use crate::identity::{CategoryId, EpochMs, HackathonId, ProjectId, TableNumber, UpdateId, UserId};
use serde::{Deserialize, Serialize};

/// A hackathon: the tenant record. Exactly one row is flagged `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hackathon {
    pub uid: HackathonId,
    pub name: String,
    pub start_time: EpochMs,
    #[serde(default)]
    pub end_time: Option<EpochMs>,
    #[serde(default)]
    pub base_pin: Option<i64>,
    #[serde(default)]
    pub active: bool,
}

impl Hackathon {
    /// New inactive hackathon starting now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: crate::identity::new_hackathon_id(),
            name: name.into(),
            start_time: crate::identity::now_epoch_ms(),
            end_time: None,
            base_pin: None,
            active: false,
        }
    }
}

/// A judging category (e.g. "Best Hardware Hack").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<CategoryId>,
    pub category_name: String,
    #[serde(default)]
    pub is_sponsor: bool,
}

/// A submitted project with its team and the categories it competes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<ProjectId>,
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hackathon: Option<HackathonId>,
    #[serde(default)]
    pub team: Vec<UserId>,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

/// Exclusive ownership of one judging table by one project in one hackathon.
///
/// Created once by the table allocator and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableAssignment {
    pub table_number: TableNumber,
    pub project_id: ProjectId,
}

/// A live update pushed to attendees during an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UpdateId>,
    pub update_title: String,
    pub update_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_image: Option<String>,
    pub update_time: EpochMs,
    /// Delivery hint for the push pipeline; not persisted.
    #[serde(default, skip_serializing)]
    pub push_notification: bool,
}
